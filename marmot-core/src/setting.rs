//! Immutable per-run configuration
//!
//! A `RunSetting` is created once at dispatch time and never mutated during
//! execution. It carries everything the engine needs that is not part of the
//! resumable checkpoint itself.

use crate::expert::Expert;
use crate::types::{ContentPart, JobId, RunId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Configuration for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RunSetting {
    pub job_id: JobId,
    pub run_id: RunId,
    /// Key of the expert to execute
    pub expert_key: String,
    /// Every resolvable expert for this run, including transitive delegates
    pub experts: IndexMap<String, Expert>,
    /// Model identifier passed through to the model client
    pub model: String,
    /// Provider-specific configuration, opaque to the engine
    #[serde(default)]
    pub provider_config: Value,
    pub temperature: Option<f32>,
    /// Step-count ceiling; exceeding it is a normal terminal status
    pub max_steps: u32,
    /// Retry ceiling for transient model failures, per step
    pub max_retries: u32,
    /// Deadline applied to each individual model call
    pub timeout: Duration,
    /// The input that triggered this run (or resume)
    pub input: RunInput,
}

impl RunSetting {
    /// The target expert, if present in the map
    pub fn expert(&self) -> Option<&Expert> {
        self.experts.get(&self.expert_key)
    }
}

/// The triggering input of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunInput {
    /// Free text from the user (fresh run or follow-up)
    Text { text: String },
    /// The answer to a pending interactive or delegate tool call
    ToolAnswer {
        tool_call_id: String,
        parts: Vec<ContentPart>,
    },
}

impl RunInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn tool_answer(tool_call_id: impl Into<String>, parts: Vec<ContentPart>) -> Self {
        Self::ToolAnswer {
            tool_call_id: tool_call_id.into(),
            parts,
        }
    }
}
