//! Message and checkpoint composition
//!
//! Pure transformations that turn model output, tool results, and the
//! triggering input into conversation history and derived checkpoints. All
//! checkpoint derivation funnels through here so the append-only invariant
//! (fresh id per transition) has one home.

use crate::checkpoint::Checkpoint;
use crate::error::RunError;
use crate::expert::Expert;
use crate::setting::RunInput;
use crate::types::{ContentPart, Message, ToolCall, ToolCallResult};
use crate::usage::{context_window_usage, Usage};

/// Seed history for a fresh run: the expert's instruction plus the user's
/// triggering text.
pub fn seed_messages(expert: &Expert, input: &RunInput) -> Result<Vec<Message>, RunError> {
    let RunInput::Text { text } = input else {
        return Err(RunError::InvalidInput(
            "a fresh run takes text input, not a tool answer".to_string(),
        ));
    };
    Ok(vec![
        Message::System {
            content: expert.instruction.clone(),
        },
        Message::User {
            content: text.clone(),
        },
    ])
}

/// A plain follow-up user message for continuing an already-finished run
pub fn follow_up_message(input: &RunInput) -> Result<Message, RunError> {
    let RunInput::Text { text } = input else {
        return Err(RunError::InvalidInput(
            "continuing a finished run takes text input, not a tool answer".to_string(),
        ));
    };
    Ok(Message::User {
        content: text.clone(),
    })
}

/// Merge an externally supplied answer into a paused checkpoint.
///
/// The answered call moves from `pending_tool_calls` into
/// `partial_tool_results`; the pause pointers clear. Results stay in the
/// original call order so the eventual tool-results message reads the way
/// the model requested it.
pub fn merge_tool_answer(
    checkpoint: &Checkpoint,
    tool_call_id: &str,
    parts: Vec<ContentPart>,
) -> Result<Checkpoint, RunError> {
    let position = checkpoint
        .pending_tool_calls
        .iter()
        .position(|call| call.id == tool_call_id)
        .ok_or_else(|| RunError::PendingToolCallNotFound {
            tool_call_id: tool_call_id.to_string(),
        })?;

    let mut next = checkpoint.next();
    let call = next.pending_tool_calls.remove(position);
    next.partial_tool_results.push(ToolCallResult {
        tool_call_id: call.id,
        tool_name: call.name,
        parts,
        is_error: false,
    });
    next.delegate_to = None;
    Ok(next)
}

/// The assistant message recording one model output
pub fn assistant_message(text: String, tool_calls: Vec<ToolCall>) -> Message {
    Message::Assistant {
        content: text,
        tool_calls,
    }
}

/// The tool-results message synthesized once a batch fully resolves.
///
/// Results are reordered to match the requesting calls so pauses and
/// parallel completion order never change what the model sees.
pub fn tool_results_message(calls: &[ToolCall], mut results: Vec<ToolCallResult>) -> Message {
    results.sort_by_key(|result| {
        calls
            .iter()
            .position(|call| call.id == result.tool_call_id)
            .unwrap_or(usize::MAX)
    });
    Message::ToolResults { results }
}

/// Fold a model call's usage into a checkpoint and refresh the
/// context-window saturation.
pub fn fold_usage(checkpoint: &mut Checkpoint, usage: &Usage, window: Option<u64>) {
    checkpoint.usage.add(usage);
    if let Some(window) = window {
        checkpoint.context_window_size = Some(window);
    }
    if let Some(window) = checkpoint.context_window_size {
        checkpoint.context_window_usage =
            Some(context_window_usage(checkpoint.usage.total_tokens, window));
    }
}

/// A short transcript note describing a failed generation attempt, appended
/// before retrying so the next attempt has context about the prior failure.
pub fn retry_note(attempt: u32, error: &str) -> Message {
    Message::System {
        content: format!("The previous model call failed (attempt {attempt}): {error}. Retrying."),
    }
}

/// The most recent batch of tool calls requested by the model.
///
/// Used to restore request order when folding results, including after a
/// resume where the step scratch is gone.
pub fn last_tool_batch(messages: &[Message]) -> Vec<ToolCall> {
    messages
        .iter()
        .rev()
        .find_map(|message| match message {
            Message::Assistant { tool_calls, .. } if !tool_calls.is_empty() => {
                Some(tool_calls.clone())
            }
            _ => None,
        })
        .unwrap_or_default()
}
