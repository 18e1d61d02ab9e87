//! scriptrun-mcp: MCP server binary exposing configured scripts as tools.
//!
//! # Transport: stdio only
//!
//! Protocol frames go to stdout; logs go to stderr. The server never binds a
//! socket: the host that launches it owns the pipe and therefore decides who
//! may run scripts.
//!
//! # Usage
//!
//! ```bash
//! scriptrun-mcp --config .mcp-config.json          # serve
//! scriptrun-mcp --config .mcp-config.json check    # validate and list
//! scriptrun-mcp init                               # write a starter config
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::Resource;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use scriptrun_kernel::Registry;
use scriptrun_mcp::ScriptServer;
use scriptrun_mcp::cli::{self, Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command() {
        Command::Check => return cli::run_check(&cli, &mut std::io::stdout().lock()),
        Command::Init { force } => return cli::run_init(&cli, force, &mut std::io::stdout().lock()),
        Command::Serve => {}
    }

    // If OTEL_EXPORTER_OTLP_ENDPOINT is set, export spans via OTLP.
    // Otherwise, just use the fmt layer.
    let provider = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .build()
            .context("Failed to build OTLP exporter")?;
        let resource = Resource::builder()
            .with_attributes([
                KeyValue::new("service.name", "scriptrun-mcp"),
                KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
            ])
            .build();
        let provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
            .with_resource(resource)
            .with_batch_exporter(exporter)
            .build();
        opentelemetry::global::set_tracer_provider(provider.clone());
        Some(provider)
    } else {
        None
    };

    let otel_layer = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("scriptrun-mcp")));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(otel_layer)
        .with(
            EnvFilter::from_default_env()
                .add_directive("scriptrun_mcp=info".parse()?)
                .add_directive("scriptrun_kernel=info".parse()?),
        )
        .init();

    tracing::info!(config = %cli.config.display(), "Starting scriptrun MCP server");

    let registry = Registry::load(cli.config_file()).context("Failed to load configuration")?;
    let server = ScriptServer::new(Arc::new(registry), cli.executor())
        .context("Failed to create server")?;

    tracing::info!("Serving on stdio");

    let served = server
        .serve(tokio::io::stdin(), tokio::io::stdout())
        .await
        .context("MCP session failed");

    tracing::info!("Server shutdown complete");

    if let Some(provider) = provider {
        // Explicitly ignored: shutdown errors are non-fatal at process exit
        let _ = provider.shutdown();
    }

    served
}
