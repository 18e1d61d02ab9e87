//! scriptrun-mcp: serve a script catalog as MCP tools over stdio.
//!
//! - [`jsonrpc`]: JSON-RPC 2.0 messages and newline-delimited framing
//! - [`server`]: handshake, dispatch, and the six script tools
//! - [`cli`]: the `scriptrun-mcp` command line

pub mod cli;
pub mod jsonrpc;
pub mod server;

pub use server::{ScriptServer, ServerContext, ServerInfo};
