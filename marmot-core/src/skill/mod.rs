//! Skill managers
//!
//! A skill manager owns the connection to one tool provider and exposes a
//! uniform surface over three very different kinds of provider: remote MCP
//! tool servers, synthesized delegate tools, and statically declared
//! interactive tools. The classifier and executor treat all three uniformly
//! until execution must actually fan out.

mod delegate;
mod gate;
mod interactive;

pub use delegate::DelegateSkillManager;
pub use gate::InitGate;
pub use interactive::InteractiveSkillManager;

use crate::error::SkillError;
use crate::expert::ExpertIdentity;
use crate::types::{ContentPart, ToolDef};
use async_trait::async_trait;
use serde_json::Value;

/// Which kind of provider a skill manager fronts
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillKind {
    /// A remote tool server; calls actually execute
    Remote,
    /// Delegation to another expert; calls are pause signals
    Delegate,
    /// Human/external channel; calls are pause signals
    Interactive,
}

/// Content returned by one tool invocation
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub parts: Vec<ContentPart>,
    /// Whether the provider flagged the invocation as failed
    pub is_error: bool,
}

impl ToolOutput {
    /// Empty output, used by signal-only variants
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![ContentPart::text(text)],
            is_error: false,
        }
    }

    /// A provider-side failure translated into a single text part
    pub fn error_text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![ContentPart::text(text)],
            is_error: true,
        }
    }
}

/// Lifecycle and call surface of one tool provider.
///
/// Owned exclusively by the run that created it; nothing else may call it
/// concurrently with that run.
///
/// Init contract (all variants): concurrent `init()` calls while
/// initialization is in flight share the first call's outcome; a second
/// `init()` after success fails with `AlreadyInitialized`;
/// `tool_definitions()` blocks until an in-flight init settles and fails
/// with `NotInitialized` when init was never started.
#[async_trait]
pub trait SkillManager: Send + Sync {
    fn kind(&self) -> SkillKind;

    /// The skill's configured name (for logging and routing diagnostics)
    fn name(&self) -> &str;

    async fn init(&self) -> Result<(), SkillError>;

    async fn tool_definitions(&self) -> Result<Vec<ToolDef>, SkillError>;

    /// Invoke a tool.
    ///
    /// Remote variants forward to the provider and translate provider-side
    /// failures into an error-text output rather than an `Err`; only
    /// transport breakage returns `Err`. Delegate and interactive variants
    /// return empty output — invocation is a signal consumed by the
    /// classifier, not a side effect.
    async fn call_tool(&self, name: &str, args: &Value) -> Result<ToolOutput, SkillError>;

    async fn close(&self) -> Result<(), SkillError>;

    /// For delegate variants: the expert this skill delegates to
    fn delegate_target(&self) -> Option<&ExpertIdentity> {
        None
    }
}
