//! Run events
//!
//! A `RunEvent` records one completed state transition. Each variant carries
//! the checkpoint (and step deltas) it produced, so the same record serves
//! as the audit log entry and as the state machine's input for the next
//! transition — the event is the side effect.

use crate::checkpoint::{Checkpoint, DelegateTo};
use crate::types::{EventId, JobId, RunId, ToolCall, ToolCallResult};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// One completed state transition of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// The run started (or continued with a follow-up input)
    StartRun { checkpoint: Checkpoint },

    /// The model requested tool calls
    CallTools {
        checkpoint: Checkpoint,
        tool_calls: Vec<ToolCall>,
    },

    /// All calls in the batch resolved
    ResolveToolResults {
        checkpoint: Checkpoint,
        results: Vec<ToolCallResult>,
    },

    /// A delegate call was selected; remote partials are stored
    CallDelegate {
        checkpoint: Checkpoint,
        delegate_to: DelegateTo,
    },

    /// The run paused waiting for a delegate expert
    StopRunByDelegate { checkpoint: Checkpoint },

    /// An interactive call was selected; remote partials are stored
    CallInteractiveTool {
        checkpoint: Checkpoint,
        tool_call: ToolCall,
    },

    /// The run paused waiting for an external answer
    StopRunByInteractiveTool { checkpoint: Checkpoint },

    /// A paused run resumed with its answer merged into partial results
    ResumeToolCalls { checkpoint: Checkpoint },

    /// Tool results were folded into the conversation history
    FinishToolCall { checkpoint: Checkpoint },

    /// The step finished below the step ceiling
    ContinueToNextStep { checkpoint: Checkpoint },

    /// The step ceiling was exceeded
    StopRunByExceededMaxSteps { checkpoint: Checkpoint },

    /// The run finished with a final answer
    CompleteRun { checkpoint: Checkpoint },

    /// A transient model failure was absorbed; generation will be retried
    Retry {
        checkpoint: Checkpoint,
        attempt: u32,
        error: String,
    },

    /// Model failures exhausted the retry budget
    StopRunByError {
        checkpoint: Checkpoint,
        error: String,
    },
}

impl RunEvent {
    /// The checkpoint this event carries
    pub fn checkpoint(&self) -> &Checkpoint {
        match self {
            Self::StartRun { checkpoint }
            | Self::CallTools { checkpoint, .. }
            | Self::ResolveToolResults { checkpoint, .. }
            | Self::CallDelegate { checkpoint, .. }
            | Self::StopRunByDelegate { checkpoint }
            | Self::CallInteractiveTool { checkpoint, .. }
            | Self::StopRunByInteractiveTool { checkpoint }
            | Self::ResumeToolCalls { checkpoint }
            | Self::FinishToolCall { checkpoint }
            | Self::ContinueToNextStep { checkpoint }
            | Self::StopRunByExceededMaxSteps { checkpoint }
            | Self::CompleteRun { checkpoint }
            | Self::Retry { checkpoint, .. }
            | Self::StopRunByError { checkpoint, .. } => checkpoint,
        }
    }

    /// Stable kind tag, matching the serialized `type` field
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StartRun { .. } => "start_run",
            Self::CallTools { .. } => "call_tools",
            Self::ResolveToolResults { .. } => "resolve_tool_results",
            Self::CallDelegate { .. } => "call_delegate",
            Self::StopRunByDelegate { .. } => "stop_run_by_delegate",
            Self::CallInteractiveTool { .. } => "call_interactive_tool",
            Self::StopRunByInteractiveTool { .. } => "stop_run_by_interactive_tool",
            Self::ResumeToolCalls { .. } => "resume_tool_calls",
            Self::FinishToolCall { .. } => "finish_tool_call",
            Self::ContinueToNextStep { .. } => "continue_to_next_step",
            Self::StopRunByExceededMaxSteps { .. } => "stop_run_by_exceeded_max_steps",
            Self::CompleteRun { .. } => "complete_run",
            Self::Retry { .. } => "retry",
            Self::StopRunByError { .. } => "stop_run_by_error",
        }
    }
}

/// The persisted and emitted record of a `RunEvent`.
///
/// Identity and timestamp are assigned at emit time; whatever the caller set
/// is overwritten, so emission order is authoritative even when retries
/// resubmit a logically similar event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EventEnvelope {
    pub id: EventId,
    pub job_id: JobId,
    pub run_id: RunId,
    pub occurred_at: SystemTime,
    #[serde(flatten)]
    pub event: RunEvent,
}

impl EventEnvelope {
    pub fn new(job_id: JobId, run_id: RunId, event: RunEvent) -> Self {
        Self {
            id: EventId::new(),
            job_id,
            run_id,
            occurred_at: SystemTime::now(),
            event,
        }
    }
}
