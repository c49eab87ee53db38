//! Tool classification and parallel execution
//!
//! Groups a model's requested tool calls by the kind of skill manager that
//! owns them and executes the safely-parallelizable subset. Remote calls in
//! a batch run concurrently and all settle before the step advances;
//! delegate and interactive calls are never attempted — they pause the run,
//! with already-collected remote results preserved for the resume.

use crate::checkpoint::DelegateTo;
use crate::error::RunError;
use crate::skill::{SkillKind, SkillManager};
use crate::types::{ToolCall, ToolCallResult, ToolDef};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A tool call tagged with its owning manager's kind
#[derive(Clone)]
pub struct RoutedCall {
    pub call: ToolCall,
    pub kind: SkillKind,
    manager: Arc<dyn SkillManager>,
}

impl std::fmt::Debug for RoutedCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutedCall")
            .field("call", &self.call)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Why a batch paused instead of completing
#[derive(Debug, Clone)]
pub enum Pause {
    /// The first delegate call in the batch
    Delegate { delegate_to: DelegateTo },
    /// The first interactive call (no delegates present)
    Interactive { tool_call: ToolCall },
}

/// Outcome of executing one batch of tool calls
#[derive(Debug, Clone)]
pub enum BatchOutcome {
    /// Purely-remote batch; every call has a result
    Completed { results: Vec<ToolCallResult> },
    /// The batch contained delegate/interactive calls
    Paused {
        /// Results of the remote calls that did run
        partial_results: Vec<ToolCallResult>,
        /// The unresolved calls, in the model's order
        pending_calls: Vec<ToolCall>,
        pause: Pause,
    },
}

/// Routes tool calls to their owning skill managers
pub struct ToolRouter {
    index: HashMap<String, Arc<dyn SkillManager>>,
    tool_defs: Vec<ToolDef>,
}

impl ToolRouter {
    /// Build the routing table from initialized managers.
    ///
    /// On a name collision the first advertiser wins, matching the order the
    /// expert declared its skills.
    pub async fn build(managers: &[Arc<dyn SkillManager>]) -> Result<Self, RunError> {
        let mut index: HashMap<String, Arc<dyn SkillManager>> = HashMap::new();
        let mut tool_defs = Vec::new();
        for manager in managers {
            let defs = manager.tool_definitions().await?;
            for def in defs {
                if index.contains_key(&def.name) {
                    tracing::warn!(
                        tool = %def.name,
                        skill = manager.name(),
                        "duplicate tool name; keeping the first advertiser"
                    );
                    continue;
                }
                index.insert(def.name.clone(), Arc::clone(manager));
                tool_defs.push(def);
            }
        }
        Ok(Self { index, tool_defs })
    }

    /// Every tool definition advertised to the model, in declaration order
    pub fn tool_definitions(&self) -> &[ToolDef] {
        &self.tool_defs
    }

    /// Resolve each call's owning manager.
    ///
    /// A name no manager advertises is a wiring bug, not a tool failure:
    /// the model only sees tools this router assembled.
    pub fn classify(&self, calls: &[ToolCall]) -> Result<Vec<RoutedCall>, RunError> {
        calls
            .iter()
            .map(|call| {
                let manager =
                    self.index
                        .get(&call.name)
                        .ok_or_else(|| RunError::ToolNotFound {
                            name: call.name.clone(),
                        })?;
                Ok(RoutedCall {
                    call: call.clone(),
                    kind: manager.kind(),
                    manager: Arc::clone(manager),
                })
            })
            .collect()
    }

    /// Execute one batch per the pause-over-execute policy.
    ///
    /// All remote calls run concurrently and every one settles — a sibling's
    /// failure cancels nothing. Tool-level failures become error-text
    /// results; only transport breakage aborts.
    pub async fn execute(&self, calls: &[ToolCall]) -> Result<BatchOutcome, RunError> {
        let routed = self.classify(calls)?;

        let mut remote = Vec::new();
        let mut pending = Vec::new();
        for rc in routed {
            match rc.kind {
                SkillKind::Remote => remote.push(rc),
                SkillKind::Delegate | SkillKind::Interactive => pending.push(rc),
            }
        }

        let dispatch_futures: Vec<_> = remote
            .into_iter()
            .map(|rc| async move {
                match rc.manager.call_tool(&rc.call.name, &rc.call.args).await {
                    Ok(output) => Ok(ToolCallResult {
                        tool_call_id: rc.call.id.clone(),
                        tool_name: rc.call.name.clone(),
                        parts: output.parts,
                        is_error: output.is_error,
                    }),
                    Err(err) if err.is_fatal() => Err(RunError::Skill(err)),
                    Err(err) => {
                        tracing::warn!(
                            tool = %rc.call.name,
                            error = %err,
                            "tool call failed; folding error into result"
                        );
                        Ok(ToolCallResult::error_text(&rc.call, err.to_string()))
                    }
                }
            })
            .collect();

        let results: Vec<ToolCallResult> = futures::future::join_all(dispatch_futures)
            .await
            .into_iter()
            .collect::<Result<_, _>>()?;

        if pending.is_empty() {
            return Ok(BatchOutcome::Completed { results });
        }

        let pause = self.select_pause(&pending)?;
        Ok(BatchOutcome::Paused {
            partial_results: results,
            pending_calls: pending.into_iter().map(|rc| rc.call).collect(),
            pause,
        })
    }

    /// Re-derive the pause for a set of unresolved calls.
    ///
    /// Used when resuming: the stored pending calls deterministically yield
    /// the same pause the original batch produced.
    pub fn pause_for(&self, calls: &[ToolCall]) -> Result<Pause, RunError> {
        let routed = self.classify(calls)?;
        let pending: Vec<RoutedCall> = routed
            .into_iter()
            .filter(|rc| rc.kind != SkillKind::Remote)
            .collect();
        if pending.is_empty() {
            return Err(RunError::InvalidInput(
                "no unresolved delegate or interactive call to pause on".to_string(),
            ));
        }
        self.select_pause(&pending)
    }

    /// At most one pause per step: the first delegate call wins; with no
    /// delegates, the first interactive call does.
    fn select_pause(&self, pending: &[RoutedCall]) -> Result<Pause, RunError> {
        if let Some(rc) = pending.iter().find(|rc| rc.kind == SkillKind::Delegate) {
            let target =
                rc.manager
                    .delegate_target()
                    .ok_or_else(|| RunError::InvalidInput(format!(
                        "delegate skill '{}' has no target expert",
                        rc.manager.name()
                    )))?;
            let query = rc
                .call
                .args
                .get("query")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| rc.call.args.to_string());
            return Ok(Pause::Delegate {
                delegate_to: DelegateTo {
                    expert: target.clone(),
                    tool_call_id: rc.call.id.clone(),
                    tool_call_name: rc.call.name.clone(),
                    query,
                },
            });
        }

        let rc = &pending[0];
        Ok(Pause::Interactive {
            tool_call: rc.call.clone(),
        })
    }
}
