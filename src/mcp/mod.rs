//! MCP server module for the registrar.

mod server;
mod tools;
mod transport;

pub use server::*;
pub use tools::*;
pub use transport::*;
