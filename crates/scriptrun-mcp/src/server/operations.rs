//! Operation table: the fixed mapping from method name to handler.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::ServerContext;
use crate::jsonrpc::RpcError;

/// Tool description advertised through `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// One callable operation.
///
/// Domain failures (unknown script, bad directory) are `Ok` text describing
/// the problem. `Err` is reserved for malformed calls.
#[async_trait]
pub trait Operation: Send + Sync {
    fn name(&self) -> &'static str;

    fn definition(&self) -> ToolDefinition;

    async fn call(&self, ctx: &ServerContext, params: Value) -> Result<String, RpcError>;
}

/// Registry of operations, in advertised order.
#[derive(Default)]
pub struct OperationTable {
    order: Vec<&'static str>,
    operations: HashMap<&'static str, Arc<dyn Operation>>,
}

impl OperationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operation. A second registration under the same name replaces the first.
    pub fn register(&mut self, operation: impl Operation + 'static) {
        let name = operation.name();
        if self.operations.insert(name, Arc::new(operation)).is_none() {
            self.order.push(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Operation>> {
        self.operations.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.operations.contains_key(name)
    }

    pub fn names(&self) -> &[&'static str] {
        &self.order
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.operations.get(name))
            .map(|op| op.definition())
            .collect()
    }

    /// Check the table handles exactly the advertised tool names.
    pub fn ensure_matches(&self, advertised: &[&str]) -> Result<(), String> {
        let missing: Vec<&str> = advertised
            .iter()
            .copied()
            .filter(|name| !self.contains(name))
            .collect();
        let extra: Vec<&str> = self
            .order
            .iter()
            .copied()
            .filter(|name| !advertised.contains(name))
            .collect();

        if missing.is_empty() && extra.is_empty() {
            Ok(())
        } else {
            Err(format!(
                "operation table mismatch: missing {missing:?}, unadvertised {extra:?}"
            ))
        }
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl std::fmt::Debug for OperationTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationTable")
            .field("operations", &self.order)
            .finish()
    }
}

/// Wrap handler text in the MCP tool-result shape.
pub fn text_result(text: impl Into<String>) -> Value {
    json!({
        "content": [{ "type": "text", "text": text.into() }]
    })
}

/// Deserialize params, treating absent params as an empty object.
pub fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, RpcError> {
    let params = if params.is_null() { json!({}) } else { params };
    serde_json::from_value(params).map_err(RpcError::invalid_params)
}

/// A required, non-empty string parameter.
pub fn required(name: &str, value: Option<String>) -> Result<String, RpcError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(RpcError::invalid_params(format!("{name} is required"))),
    }
}
