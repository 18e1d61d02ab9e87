//! Command-line interface.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use scriptrun_kernel::{ConfigFile, DEFAULT_CONFIG_FILE, Executor, ScriptSource};

use crate::server::tools::format_catalog;

#[derive(Debug, Parser)]
#[command(
    name = "scriptrun-mcp",
    version,
    about = "Expose a catalog of pre-configured scripts as MCP tools over stdio"
)]
pub struct Cli {
    /// Catalog config file.
    #[arg(long, short, env = "SCRIPTRUN_CONFIG", default_value = DEFAULT_CONFIG_FILE, global = true)]
    pub config: PathBuf,

    /// Run every script with this interpreter, ignoring the config.
    #[arg(long, global = true)]
    pub interpreter: Option<String>,

    /// Milliseconds between SIGTERM and SIGKILL when a script times out.
    #[arg(long, global = true)]
    pub kill_grace_ms: Option<u64>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Serve MCP on stdin/stdout (the default).
    Serve,

    /// Validate the config and print the catalog.
    Check,

    /// Write a starter config file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }

    pub fn config_file(&self) -> ConfigFile {
        ConfigFile::new(&self.config)
    }

    /// Executor with the command-line overrides applied.
    pub fn executor(&self) -> Executor {
        let mut executor = Executor::new();
        if let Some(interpreter) = &self.interpreter {
            executor = executor.with_interpreter(interpreter.clone());
        }
        if let Some(ms) = self.kill_grace_ms {
            executor = executor.with_kill_grace(Duration::from_millis(ms));
        }
        executor
    }
}

/// Load and validate the config, then print the catalog to `out`.
pub fn run_check(cli: &Cli, out: &mut impl Write) -> anyhow::Result<()> {
    let config = cli.config_file();
    let snapshot = config
        .load()
        .with_context(|| format!("Invalid config {}", config.path().display()))?;

    writeln!(out, "Config: {}", config.path().display())?;
    writeln!(out, "Interpreter: {}", cli.interpreter.as_deref().unwrap_or(snapshot.interpreter()))?;
    writeln!(
        out,
        "Working Directory: {}",
        snapshot.default_working_directory().display()
    )?;
    writeln!(out)?;
    writeln!(out, "{}", format_catalog(&snapshot.specs()))?;
    Ok(())
}

/// Write a starter config.
pub fn run_init(cli: &Cli, force: bool, out: &mut impl Write) -> anyhow::Result<()> {
    let config = cli.config_file();
    config
        .write_starter(force)
        .with_context(|| format!("Failed to write {}", config.path().display()))?;
    writeln!(out, "Wrote starter config to {}", config.path().display())?;
    Ok(())
}
