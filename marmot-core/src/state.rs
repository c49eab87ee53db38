//! State machine for the run loop
//!
//! Defines the run states and the pure `(state, event) -> next state`
//! transition table. The executor computes one event per state, feeds it
//! through this table, and repeats until `Stopped`.

use crate::error::RunError;
use crate::event::RunEvent;
use serde::{Deserialize, Serialize};

/// States of the run execution loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Seeding or resuming history from the checkpoint
    Init,
    /// First model call of the run
    GeneratingStep,
    /// Executing the remote subset of a tool batch
    CallingTools,
    /// Building the delegation pause
    CallingDelegate,
    /// Building the interactive pause
    CallingInteractiveTool,
    /// Folding resolved results into history
    ResolvingToolResults,
    /// Step accounting and the step-count limit check
    FinishingStep,
    /// Post-tool model call (produces the final answer unless more tools
    /// are requested)
    GeneratingRunResult,
    /// Terminal state
    Stopped,
}

impl RunState {
    /// Check if this is the terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped)
    }

    /// Whether this state's logic calls the model
    pub fn is_generating(&self) -> bool {
        matches!(self, Self::GeneratingStep | Self::GeneratingRunResult)
    }

    /// Compute the next state for an event produced in this state.
    ///
    /// Pure: the only payload inspected is the resume checkpoint's pending
    /// calls, which decide whether a resume re-enters tool execution or goes
    /// straight to result folding.
    pub fn next(&self, event: &RunEvent) -> Result<RunState, RunError> {
        use RunState::*;

        let next = match (self, event) {
            // From Init
            (Init, RunEvent::StartRun { .. }) => GeneratingStep,
            (Init, RunEvent::ResumeToolCalls { checkpoint }) => {
                if checkpoint.pending_tool_calls.is_empty() {
                    ResolvingToolResults
                } else {
                    CallingTools
                }
            }

            // From the generating states
            (GeneratingStep | GeneratingRunResult, RunEvent::CallTools { .. }) => CallingTools,
            (GeneratingStep | GeneratingRunResult, RunEvent::CompleteRun { .. }) => Stopped,
            (GeneratingStep, RunEvent::Retry { .. }) => GeneratingStep,
            (GeneratingRunResult, RunEvent::Retry { .. }) => GeneratingRunResult,
            (GeneratingStep | GeneratingRunResult, RunEvent::StopRunByError { .. }) => Stopped,

            // From CallingTools
            (CallingTools, RunEvent::ResolveToolResults { .. }) => ResolvingToolResults,
            (CallingTools, RunEvent::CallDelegate { .. }) => CallingDelegate,
            (CallingTools, RunEvent::CallInteractiveTool { .. }) => CallingInteractiveTool,

            // Pauses
            (CallingDelegate, RunEvent::StopRunByDelegate { .. }) => Stopped,
            (CallingInteractiveTool, RunEvent::StopRunByInteractiveTool { .. }) => Stopped,

            // Result folding and step accounting
            (ResolvingToolResults, RunEvent::FinishToolCall { .. }) => FinishingStep,
            (FinishingStep, RunEvent::ContinueToNextStep { .. }) => GeneratingRunResult,
            (FinishingStep, RunEvent::StopRunByExceededMaxSteps { .. }) => Stopped,

            // No other transitions allowed
            (state, event) => {
                return Err(RunError::InvalidTransition {
                    from: format!("{state}"),
                    event: event.kind().to_string(),
                });
            }
        };

        Ok(next)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Init => "init",
            Self::GeneratingStep => "generating_step",
            Self::CallingTools => "calling_tools",
            Self::CallingDelegate => "calling_delegate",
            Self::CallingInteractiveTool => "calling_interactive_tool",
            Self::ResolvingToolResults => "resolving_tool_results",
            Self::FinishingStep => "finishing_step",
            Self::GeneratingRunResult => "generating_run_result",
            Self::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}
