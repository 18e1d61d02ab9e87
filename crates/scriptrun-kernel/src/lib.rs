//! scriptrun-kernel: the script catalog and execution engine.
//!
//! This crate provides:
//!
//! - **Config**: the JSON catalog file and its validation
//! - **Registry**: named [`ScriptSpec`]s behind an atomically swappable snapshot
//! - **Executor**: spawns a script, enforces its timeout, captures its output
//! - **ExecutionResult**: the outcome of one run, failures included
//!
//! Transport and protocol concerns live in `scriptrun-mcp`.

pub mod config;
pub mod executor;
pub mod registry;
pub mod result;
pub mod script;

pub use config::{ConfigError, ConfigFile, RunnerConfig, DEFAULT_CONFIG_FILE};
pub use executor::Executor;
pub use registry::{Registry, ScriptSource, Snapshot};
pub use result::ExecutionResult;
pub use script::ScriptSpec;
