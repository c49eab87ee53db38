//! Per-tick scratch context
//!
//! A `Step` holds the ephemeral working set of one model/tool interaction:
//! the calls under consideration, their results once resolved, and
//! step-scoped usage. It is folded into the next checkpoint at each
//! transition and never persisted on its own.

use crate::types::{Message, ToolCall, ToolCallResult};
use crate::usage::Usage;
use std::time::SystemTime;

#[derive(Debug, Clone)]
pub struct Step {
    pub number: u32,
    /// Tool calls requested this step
    pub tool_calls: Vec<ToolCall>,
    /// Results resolved so far this step
    pub tool_results: Vec<ToolCallResult>,
    /// Messages produced this step, in order
    pub new_messages: Vec<Message>,
    /// Usage attributable to this step's model calls
    pub usage: Usage,
    /// Generation retries consumed this step
    pub retries: u32,
    pub started_at: SystemTime,
    pub finished_at: Option<SystemTime>,
}

impl Step {
    pub fn new(number: u32) -> Self {
        Self {
            number,
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
            new_messages: Vec::new(),
            usage: Usage::ZERO,
            retries: 0,
            started_at: SystemTime::now(),
            finished_at: None,
        }
    }

    /// Mark the step finished
    pub fn finish(&mut self) {
        self.finished_at = Some(SystemTime::now());
    }
}
