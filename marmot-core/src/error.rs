//! Run engine errors
//!
//! Two tiers, mirroring the recovery policy: `SkillError` covers one skill
//! manager (tool-level failures are absorbed into the transcript, transport
//! failures are fatal), `RunError` covers the run (setup, transport, and
//! storage failures unwind; everything else lands in a terminal checkpoint).

/// Error raised by a skill manager.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SkillError {
    /// `init()` was called again after a successful initialization
    #[error("skill manager is already initialized")]
    AlreadyInitialized,

    /// `tool_definitions()` or `call_tool()` was called before `init()`
    #[error("skill manager is not initialized")]
    NotInitialized,

    /// Initialization failed (handshake, spawn, or tool listing)
    #[error("skill manager initialization failed: {reason}")]
    InitFailed { reason: String },

    /// The provider rejected or failed the tool invocation.
    ///
    /// Absorbed: the router turns this into an error-text result so the
    /// model can react; it never aborts the run.
    #[error("tool '{name}' failed: {reason}")]
    Tool { name: String, reason: String },

    /// The transport itself broke (subprocess died, connection dropped).
    /// Fatal to the run.
    #[error("skill transport failure: {reason}")]
    Transport { reason: String },

    /// The manager was closed and can no longer serve calls
    #[error("skill manager is closed")]
    Closed,
}

impl SkillError {
    /// Whether this failure must abort the run rather than being folded
    /// into a tool result.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Tool { .. })
    }
}

/// Errors that unwind a run.
///
/// Every normal stop condition (completion, pause, step limit, exhausted
/// retries) is a terminal checkpoint, not an error; only setup, transport,
/// and storage failures surface here.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("expert not found: {key}")]
    ExpertNotFound { key: String },

    #[error("expert '{expert}' references unresolved delegate '{delegate}'")]
    DelegateNotResolved { expert: String, delegate: String },

    #[error("no skill manager advertises tool '{name}'")]
    ToolNotFound { name: String },

    #[error("answer targets unknown pending tool call '{tool_call_id}'")]
    PendingToolCallNotFound { tool_call_id: String },

    #[error("resuming a paused run requires a tool answer input")]
    MissingToolAnswer,

    #[error("invalid run input: {0}")]
    InvalidInput(String),

    #[error("invalid state transition: {from} on {event}")]
    InvalidTransition { from: String, event: String },

    #[error("skill error: {0}")]
    Skill(#[from] SkillError),

    #[error("storage error: {0}")]
    Store(String),
}

/// Build a `RunError::Store` from any displayable backend error.
pub fn store_error(err: impl std::fmt::Display) -> RunError {
    RunError::Store(err.to_string())
}
