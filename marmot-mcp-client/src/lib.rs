//! marmot-mcp-client - MCP-backed remote skills for Marmot
//!
//! Connects to MCP tool servers (stdio subprocess, SSE, or streamable HTTP)
//! and adapts them to `marmot-core`'s `SkillManager` contract.

mod connection;
mod error;
mod manager;

pub use connection::{McpConnection, ToolCallOutcome};
pub use error::McpError;
pub use manager::RemoteSkillManager;
