//! CLI module for one-shot registrar queries.
//!
//! Each command builds the same service the MCP server uses, runs one
//! query against the portal and prints the result as text or JSON.

mod commands;
mod output;

pub use commands::*;
