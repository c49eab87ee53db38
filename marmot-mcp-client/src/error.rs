//! MCP client errors

/// Errors from the MCP connection layer
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    /// Could not establish the connection (spawn, handshake)
    #[error("failed to connect to MCP server: {reason}")]
    ConnectionFailed { reason: String },

    /// The server violated the protocol (e.g. tools/list failed)
    #[error("MCP protocol error: {message}")]
    ProtocolError { message: String },

    /// The server rejected or failed a tool invocation
    #[error("tool call '{tool}' failed: {reason}")]
    ToolCallFailed { tool: String, reason: String },

    /// The transport itself broke mid-session
    #[error("MCP transport failure: {reason}")]
    TransportFailed { reason: String },

    /// A configured header name or value is invalid
    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },
}

impl McpError {
    /// Transport-class failures are fatal to the run; everything else is
    /// absorbed as an error-text tool result.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. } | Self::TransportFailed { .. }
        )
    }
}
