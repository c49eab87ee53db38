//! Resumable run snapshots
//!
//! A checkpoint captures everything needed to resume a run at a step
//! boundary, including partially resolved tool batches across a
//! delegation/interactive pause. Checkpoints are append-only: every state
//! transition that changes status or step number produces a new checkpoint
//! under a fresh id, and stored checkpoints are never rewritten.

use crate::expert::ExpertIdentity;
use crate::types::{CheckpointId, JobId, Message, RunId, ToolCall, ToolCallResult};
use crate::usage::Usage;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Freshly dispatched, nothing executed yet
    Init,
    /// Actively stepping
    Running,
    /// Finished with a final answer
    Completed,
    /// Paused waiting for a delegate expert's result
    StoppedByDelegate,
    /// Paused waiting for an interactive tool's answer
    StoppedByInteractiveTool,
    /// Step-count ceiling reached
    StoppedByExceededMaxSteps,
    /// Model failures exhausted the retry budget
    StoppedByError,
}

impl RunStatus {
    /// Whether a run in this status has finished stepping.
    ///
    /// Paused statuses are terminal for this run instance; resuming spins up
    /// a new executor on the stored checkpoint.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Init | Self::Running)
    }

    /// Whether this status waits on an external answer
    pub fn is_paused(&self) -> bool {
        matches!(self, Self::StoppedByDelegate | Self::StoppedByInteractiveTool)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Init => "init",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::StoppedByDelegate => "stopped_by_delegate",
            Self::StoppedByInteractiveTool => "stopped_by_interactive_tool",
            Self::StoppedByExceededMaxSteps => "stopped_by_exceeded_max_steps",
            Self::StoppedByError => "stopped_by_error",
        };
        write!(f, "{s}")
    }
}

/// Forward pointer set while a run is paused on a delegation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DelegateTo {
    /// Identity of the expert the sub-task goes to
    pub expert: ExpertIdentity,
    /// The originating tool call's id
    pub tool_call_id: String,
    /// The originating tool call's name
    pub tool_call_name: String,
    /// The query handed to the delegate
    pub query: String,
}

/// Reverse pointer set on a run that is itself a delegate of another run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DelegatedBy {
    pub job_id: JobId,
    pub run_id: RunId,
    pub tool_call_id: String,
}

/// A persisted, resumable snapshot of one run at a step boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Checkpoint {
    pub id: CheckpointId,
    pub run_id: RunId,
    pub status: RunStatus,
    pub step_number: u32,
    /// Full ordered conversation history
    pub messages: Vec<Message>,
    /// Identity of the expert executing this run
    pub expert: ExpertIdentity,
    /// Present only while status is `StoppedByDelegate`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegate_to: Option<DelegateTo>,
    /// Present when this run is a delegate of another run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegated_by: Option<DelegatedBy>,
    /// Cumulative usage across all model calls of this run
    #[serde(default)]
    pub usage: Usage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window_usage: Option<f64>,
    /// Tool calls requested but not yet resolved (across a pause)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_tool_calls: Vec<ToolCall>,
    /// Results already collected for calls in the same batch
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub partial_tool_results: Vec<ToolCallResult>,
}

impl Checkpoint {
    /// The initial checkpoint of a fresh run
    pub fn init(run_id: RunId, expert: ExpertIdentity) -> Self {
        Self {
            id: CheckpointId::new(),
            run_id,
            status: RunStatus::Init,
            step_number: 0,
            messages: Vec::new(),
            expert,
            delegate_to: None,
            delegated_by: None,
            usage: Usage::ZERO,
            context_window_size: None,
            context_window_usage: None,
            pending_tool_calls: Vec::new(),
            partial_tool_results: Vec::new(),
        }
    }

    /// Derive the next checkpoint: a clone under a fresh id.
    ///
    /// Every transition goes through here so the append-only invariant has a
    /// single enforcement point.
    pub fn next(&self) -> Self {
        Self {
            id: CheckpointId::new(),
            ..self.clone()
        }
    }

    /// Text of the last assistant message, if any
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.messages.iter().rev().find_map(|m| match m {
            Message::Assistant { content, .. } if !content.is_empty() => Some(content.as_str()),
            _ => None,
        })
    }
}
