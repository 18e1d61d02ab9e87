//! MCP server: handshake, dispatch, and the script tools.
//!
//! [`ScriptServer`] is cheap to clone; every clone shares one
//! [`ServerContext`] and one [`OperationTable`].

use std::sync::Arc;

use anyhow::{Context as _, anyhow};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite};

use scriptrun_kernel::{Executor, Registry};

use crate::jsonrpc::RpcError;

pub mod dispatcher;
pub mod operations;
pub mod tools;

pub use dispatcher::{ConnectionState, PROTOCOL_VERSIONS};
pub use operations::{Operation, OperationTable, ToolDefinition, text_result};

/// State shared by every request on the connection.
#[derive(Debug)]
pub struct ServerContext {
    pub registry: Arc<Registry>,
    pub executor: Executor,
}

/// What the server reports about itself in the `initialize` result.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    pub instructions: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: "scriptrun-mcp".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            instructions: "Runs a fixed catalog of pre-configured scripts. \
                Use list_scripts to discover them and run_script to execute one."
                .to_string(),
        }
    }
}

/// `tools/call` parameters.
#[derive(Debug, Deserialize)]
struct ToolCall {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Clone)]
pub struct ScriptServer {
    context: Arc<ServerContext>,
    operations: Arc<OperationTable>,
    info: Arc<ServerInfo>,
}

impl ScriptServer {
    /// Build a server with the standard tool set.
    pub fn new(registry: Arc<Registry>, executor: Executor) -> anyhow::Result<Self> {
        Self::with_operations(registry, executor, tools::standard_table())
    }

    /// Build a server around a custom table. The table must cover exactly
    /// the advertised tools.
    pub fn with_operations(
        registry: Arc<Registry>,
        executor: Executor,
        operations: OperationTable,
    ) -> anyhow::Result<Self> {
        operations
            .ensure_matches(tools::ADVERTISED_TOOLS)
            .map_err(|e| anyhow!(e))
            .context("Failed to build operation table")?;

        Ok(Self {
            context: Arc::new(ServerContext { registry, executor }),
            operations: Arc::new(operations),
            info: Arc::new(ServerInfo::default()),
        })
    }

    pub fn with_info(mut self, info: ServerInfo) -> Self {
        self.info = Arc::new(info);
        self
    }

    pub fn context(&self) -> &ServerContext {
        &self.context
    }

    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.operations.definitions()
    }

    /// Serve one connection until the input closes.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> anyhow::Result<()>
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        dispatcher::serve(self.clone(), reader, writer).await
    }

    /// Result of the `initialize` request.
    pub fn initialize_result(&self, params: &Value) -> Value {
        let requested = params.get("protocolVersion").and_then(Value::as_str);
        let version = match requested {
            Some(v) if PROTOCOL_VERSIONS.contains(&v) => v,
            _ => PROTOCOL_VERSIONS[0],
        };

        json!({
            "protocolVersion": version,
            "capabilities": {
                "tools": { "listChanged": false }
            },
            "serverInfo": {
                "name": self.info.name,
                "version": self.info.version,
            },
            "instructions": self.info.instructions,
        })
    }

    /// Route a request once the handshake is complete.
    pub async fn handle(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            "tools/list" => Ok(json!({ "tools": self.operations.definitions() })),
            "tools/call" => {
                let call: ToolCall = operations::parse_params(params)?;
                let operation = self
                    .operations
                    .get(&call.name)
                    .ok_or_else(|| RpcError::method_not_found(&call.name))?;
                operation.call(&self.context, call.arguments).await.map(text_result)
            }
            other => match self.operations.get(other) {
                Some(operation) => operation.call(&self.context, params).await.map(text_result),
                None => Err(RpcError::method_not_found(other)),
            },
        }
    }
}

impl std::fmt::Debug for ScriptServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptServer")
            .field("registry", &self.context.registry)
            .field("operations", &self.operations)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jsonrpc::codes;
    use scriptrun_kernel::{ScriptSpec, Snapshot};

    fn server() -> ScriptServer {
        let snapshot = Snapshot::from_specs(
            [ScriptSpec::new("hello", "/tmp/hello.sh").with_description("says hi")],
            "/tmp",
        );
        ScriptServer::new(Arc::new(Registry::from_snapshot(snapshot)), Executor::new())
            .expect("standard table")
    }

    #[test]
    fn initialize_echoes_supported_version() {
        let result = server().initialize_result(&json!({"protocolVersion": "2024-11-05"}));
        assert_eq!(result["protocolVersion"], "2024-11-05");
        assert_eq!(result["capabilities"]["tools"]["listChanged"], false);
        assert_eq!(result["serverInfo"]["name"], "scriptrun-mcp");
    }

    #[test]
    fn initialize_falls_back_to_latest_version() {
        let result = server().initialize_result(&json!({"protocolVersion": "1999-01-01"}));
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSIONS[0]);

        let result = server().initialize_result(&Value::Null);
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSIONS[0]);
    }

    #[tokio::test]
    async fn tools_list_advertises_six_tools() {
        let result = server().handle("tools/list", Value::Null).await.expect("list");
        let names: Vec<&str> = result["tools"]
            .as_array()
            .expect("array")
            .iter()
            .filter_map(|t| t["name"].as_str())
            .collect();
        assert_eq!(names, tools::ADVERTISED_TOOLS);
    }

    #[tokio::test]
    async fn tools_call_and_direct_method_agree() {
        let server = server();
        let via_call = server
            .handle("tools/call", json!({"name": "list_scripts", "arguments": {}}))
            .await
            .expect("tools/call");
        let direct = server.handle("list_scripts", Value::Null).await.expect("direct");
        assert_eq!(via_call, direct);
        assert!(
            direct["content"][0]["text"]
                .as_str()
                .expect("text")
                .contains("Name: hello")
        );
    }

    #[tokio::test]
    async fn unknown_tool_is_method_not_found() {
        let err = server()
            .handle("tools/call", json!({"name": "rm_rf"}))
            .await
            .expect_err("unknown tool");
        assert_eq!(err.code, codes::METHOD_NOT_FOUND);
        assert!(err.message.contains("rm_rf"), "{}", err.message);
    }

    #[tokio::test]
    async fn unknown_method_is_not_found() {
        let err = server()
            .handle("resources/list", Value::Null)
            .await
            .expect_err("unknown method");
        assert_eq!(err.code, codes::METHOD_NOT_FOUND);
    }

    #[test]
    fn incomplete_table_is_rejected() {
        let registry = Arc::new(Registry::from_snapshot(Snapshot::from_specs([], "/tmp")));
        let err = ScriptServer::with_operations(registry, Executor::new(), OperationTable::new())
            .expect_err("empty table");
        assert!(format!("{err:#}").contains("run_script"));
    }
}
