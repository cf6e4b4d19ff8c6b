//! MCP surface: a fixed tool set plus prompts and documentation resources,
//! served over a JSON-RPC 2.0 Streamable HTTP dispatcher.

pub mod handlers;
pub mod prompts;
pub mod resources;
pub mod server;
pub mod tools;

pub use server::McpServer;
