//! The six script tools.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use scriptrun_kernel::ScriptSpec;

use super::ServerContext;
use super::operations::{Operation, OperationTable, ToolDefinition, parse_params, required};
use crate::jsonrpc::RpcError;

/// Tool names, in the order `tools/list` reports them.
pub const ADVERTISED_TOOLS: &[&str] = &[
    "run_script",
    "list_scripts",
    "get_script_info",
    "get_working_directory",
    "set_working_directory",
    "reload_config",
];

/// A table holding every advertised tool.
pub fn standard_table() -> OperationTable {
    let mut table = OperationTable::new();
    table.register(RunScript);
    table.register(ListScripts);
    table.register(GetScriptInfo);
    table.register(GetWorkingDirectory);
    table.register(SetWorkingDirectory);
    table.register(ReloadConfig);
    table
}

fn no_params() -> Value {
    json!({ "type": "object", "properties": {} })
}

#[derive(Debug, Default, Deserialize)]
struct ScriptNameParams {
    script_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RunScriptParams {
    script_name: Option<String>,
    arguments: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct PathParams {
    path: Option<String>,
}

fn not_found(name: &str) -> String {
    format!("Script not found: {name}")
}

// ============================================================================
// run_script
// ============================================================================

pub struct RunScript;

#[async_trait]
impl Operation for RunScript {
    fn name(&self) -> &'static str {
        "run_script"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name(),
            description: "Execute a configured script",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "script_name": {
                        "type": "string",
                        "description": "Name of the script to execute"
                    },
                    "arguments": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Arguments to pass to the script"
                    }
                },
                "required": ["script_name"]
            }),
        }
    }

    async fn call(&self, ctx: &ServerContext, params: Value) -> Result<String, RpcError> {
        let params: RunScriptParams = parse_params(params)?;
        let name = required("script_name", params.script_name)?;
        let arguments = params.arguments.unwrap_or_default();

        // Spec and interpreter come from the same snapshot.
        let snapshot = ctx.registry.snapshot();
        let Some(spec) = snapshot.get(&name) else {
            tracing::info!(script = %name, "run requested for unknown script");
            return Ok(not_found(&name));
        };
        let cwd = ctx.registry.default_working_directory();

        let result = ctx
            .executor
            .execute(&spec, &arguments, &cwd, Some(snapshot.interpreter()))
            .await;
        Ok(result.report())
    }
}

// ============================================================================
// list_scripts / get_script_info
// ============================================================================

pub struct ListScripts;

#[async_trait]
impl Operation for ListScripts {
    fn name(&self) -> &'static str {
        "list_scripts"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name(),
            description: "List all available scripts",
            input_schema: no_params(),
        }
    }

    async fn call(&self, ctx: &ServerContext, _params: Value) -> Result<String, RpcError> {
        Ok(format_catalog(&ctx.registry.list()))
    }
}

/// Render the catalog as `list_scripts` reports it.
pub fn format_catalog(specs: &[Arc<ScriptSpec>]) -> String {
    if specs.is_empty() {
        return "No scripts configured".to_string();
    }

    let mut lines = vec!["Available Scripts:".to_string(), String::new()];
    for spec in specs {
        lines.extend(summary_lines(spec));
        lines.push(String::new());
    }
    lines.join("\n")
}

fn summary_lines(spec: &ScriptSpec) -> [String; 5] {
    [
        format!("Name: {}", spec.name()),
        format!("Description: {}", spec.description),
        format!("Path: {}", spec.path.display()),
        format!("Arguments: {}", spec.arguments_display()),
        format!("Timeout: {}s", spec.timeout_seconds),
    ]
}

pub struct GetScriptInfo;

#[async_trait]
impl Operation for GetScriptInfo {
    fn name(&self) -> &'static str {
        "get_script_info"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name(),
            description: "Get detailed information about a specific script",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "script_name": {
                        "type": "string",
                        "description": "Name of the script to get info for"
                    }
                },
                "required": ["script_name"]
            }),
        }
    }

    async fn call(&self, ctx: &ServerContext, params: Value) -> Result<String, RpcError> {
        let params: ScriptNameParams = parse_params(params)?;
        let name = required("script_name", params.script_name)?;

        let Some(spec) = ctx.registry.lookup(&name) else {
            return Ok(not_found(&name));
        };

        let working_directory = spec
            .working_directory
            .as_deref()
            .map(|dir| dir.display().to_string())
            .unwrap_or_else(|| "Default".to_string());

        let mut lines = vec![format!("Script Information: {name}"), String::new()];
        lines.extend(summary_lines(&spec));
        lines.push(format!("Working Directory: {working_directory}"));
        Ok(lines.join("\n"))
    }
}

// ============================================================================
// Working directory
// ============================================================================

pub struct GetWorkingDirectory;

#[async_trait]
impl Operation for GetWorkingDirectory {
    fn name(&self) -> &'static str {
        "get_working_directory"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name(),
            description: "Get the current working directory",
            input_schema: no_params(),
        }
    }

    async fn call(&self, ctx: &ServerContext, _params: Value) -> Result<String, RpcError> {
        let dir = ctx.registry.default_working_directory();
        Ok(format!("Current working directory: {}", dir.display()))
    }
}

pub struct SetWorkingDirectory;

#[async_trait]
impl Operation for SetWorkingDirectory {
    fn name(&self) -> &'static str {
        "set_working_directory"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name(),
            description: "Set the working directory for script execution",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Path to set as working directory"
                    }
                },
                "required": ["path"]
            }),
        }
    }

    async fn call(&self, ctx: &ServerContext, params: Value) -> Result<String, RpcError> {
        let params: PathParams = parse_params(params)?;
        let path = required("path", params.path)?;

        match ctx.registry.set_working_directory(Path::new(&path)) {
            Ok(resolved) => Ok(format!("Working directory set to: {}", resolved.display())),
            Err(e) => {
                tracing::debug!(path = %path, error = %e, "rejected working directory");
                Ok(format!("Error: Directory does not exist: {path}"))
            }
        }
    }
}

// ============================================================================
// reload_config
// ============================================================================

pub struct ReloadConfig;

#[async_trait]
impl Operation for ReloadConfig {
    fn name(&self) -> &'static str {
        "reload_config"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name(),
            description: "Reload configuration from file",
            input_schema: no_params(),
        }
    }

    async fn call(&self, ctx: &ServerContext, _params: Value) -> Result<String, RpcError> {
        match ctx.registry.reload() {
            Ok(count) => {
                let noun = if count == 1 { "script" } else { "scripts" };
                Ok(format!("Configuration reloaded successfully ({count} {noun})"))
            }
            Err(e) => {
                tracing::warn!(error = %e, "config reload failed");
                Ok(format!("Error reloading configuration: {e}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jsonrpc::codes;
    use scriptrun_kernel::{Executor, Registry, Snapshot};
    use tempfile::TempDir;

    fn context(specs: Vec<ScriptSpec>, cwd: &Path) -> ServerContext {
        ServerContext {
            registry: Arc::new(Registry::from_snapshot(Snapshot::from_specs(specs, cwd))),
            executor: Executor::new(),
        }
    }

    fn script(dir: &TempDir, name: &str, body: &str) -> ScriptSpec {
        let path = dir.path().join(format!("{name}.sh"));
        std::fs::write(&path, format!("#!/bin/bash\n{body}\n")).expect("write script");
        ScriptSpec::new(name, path)
    }

    #[test]
    fn standard_table_matches_advertised_tools() {
        let table = standard_table();
        assert_eq!(table.names(), ADVERTISED_TOOLS);
        assert!(table.ensure_matches(ADVERTISED_TOOLS).is_ok());
    }

    #[tokio::test]
    async fn run_script_reports_result() {
        let dir = TempDir::new().expect("tempdir");
        let ctx = context(vec![script(&dir, "greet", r#"echo "hi $1""#)], dir.path());

        let text = RunScript
            .call(&ctx, json!({"script_name": "greet", "arguments": ["bob"]}))
            .await
            .expect("call");

        assert!(text.starts_with("Script: greet\nExit Code: 0\n"), "{text}");
        assert!(text.contains("Success: true"));
        assert!(text.contains("STDOUT:\nhi bob\n"));
    }

    #[tokio::test]
    async fn run_script_unknown_name_is_normal_text() {
        let ctx = context(vec![], Path::new("/tmp"));
        let text = RunScript
            .call(&ctx, json!({"script_name": "nope"}))
            .await
            .expect("domain failure is not an rpc error");
        assert_eq!(text, "Script not found: nope");
    }

    #[rstest::rstest]
    #[case(json!({}))]
    #[case(json!({"script_name": ""}))]
    #[case(Value::Null)]
    #[tokio::test]
    async fn run_script_requires_name(#[case] params: Value) {
        let ctx = context(vec![], Path::new("/tmp"));
        let err = RunScript.call(&ctx, params).await.expect_err("missing name");
        assert_eq!(err.code, codes::INVALID_PARAMS);
        assert!(err.message.contains("script_name is required"));
    }

    #[tokio::test]
    async fn run_script_rejects_non_string_arguments() {
        let ctx = context(vec![], Path::new("/tmp"));
        let err = RunScript
            .call(&ctx, json!({"script_name": "x", "arguments": [1, 2]}))
            .await
            .expect_err("bad arguments");
        assert_eq!(err.code, codes::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn list_scripts_empty_and_populated() {
        let empty = context(vec![], Path::new("/tmp"));
        assert_eq!(
            ListScripts.call(&empty, Value::Null).await.expect("list"),
            "No scripts configured"
        );

        let ctx = context(
            vec![
                ScriptSpec::new("b", "/s/b.sh").with_arguments(["x", "y"]),
                ScriptSpec::new("a", "/s/a.sh").with_description("first").with_timeout(30),
            ],
            Path::new("/tmp"),
        );
        let text = ListScripts.call(&ctx, Value::Null).await.expect("list");
        assert!(text.starts_with("Available Scripts:\n\nName: a\nDescription: first\n"));
        assert!(text.contains("Path: /s/a.sh\nArguments: None\nTimeout: 30s\n\nName: b"));
        assert!(text.contains("Arguments: x, y"));
        assert_eq!(text.matches("Name: ").count(), 2);
    }

    #[tokio::test]
    async fn script_info_shows_working_directory() {
        let ctx = context(
            vec![
                ScriptSpec::new("plain", "/s/plain.sh"),
                ScriptSpec::new("pinned", "/s/pinned.sh").with_working_directory("/var/tmp"),
            ],
            Path::new("/tmp"),
        );

        let plain = GetScriptInfo
            .call(&ctx, json!({"script_name": "plain"}))
            .await
            .expect("info");
        assert!(plain.starts_with("Script Information: plain\n\nName: plain\n"));
        assert!(plain.ends_with("Working Directory: Default"));

        let pinned = GetScriptInfo
            .call(&ctx, json!({"script_name": "pinned"}))
            .await
            .expect("info");
        assert!(pinned.ends_with("Working Directory: /var/tmp"));

        let missing = GetScriptInfo
            .call(&ctx, json!({"script_name": "ghost"}))
            .await
            .expect("info");
        assert_eq!(missing, "Script not found: ghost");
    }

    #[tokio::test]
    async fn working_directory_round_trip() {
        let dir = TempDir::new().expect("tempdir");
        let ctx = context(vec![], Path::new("/tmp"));
        let canonical = std::fs::canonicalize(dir.path()).expect("canonicalize");

        let set = SetWorkingDirectory
            .call(&ctx, json!({"path": dir.path()}))
            .await
            .expect("set");
        assert_eq!(set, format!("Working directory set to: {}", canonical.display()));

        let get = GetWorkingDirectory.call(&ctx, Value::Null).await.expect("get");
        assert_eq!(get, format!("Current working directory: {}", canonical.display()));
    }

    #[tokio::test]
    async fn set_working_directory_rejects_missing_path() {
        let ctx = context(vec![], Path::new("/tmp"));

        let text = SetWorkingDirectory
            .call(&ctx, json!({"path": "/no/such/place"}))
            .await
            .expect("domain failure");
        assert_eq!(text, "Error: Directory does not exist: /no/such/place");

        let err = SetWorkingDirectory
            .call(&ctx, json!({}))
            .await
            .expect_err("missing path");
        assert!(err.message.contains("path is required"));

        let get = GetWorkingDirectory.call(&ctx, Value::Null).await.expect("get");
        assert_eq!(get, "Current working directory: /tmp");
    }

    #[tokio::test]
    async fn reload_reports_count() {
        let ctx = context(vec![ScriptSpec::new("a", "/s/a.sh")], Path::new("/tmp"));
        let text = ReloadConfig.call(&ctx, Value::Null).await.expect("reload");
        assert_eq!(text, "Configuration reloaded successfully (1 script)");
    }
}
