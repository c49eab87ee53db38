//! Run executor
//!
//! The tick loop that drives one run: compute the current state's event,
//! persist the checkpoint it carries, emit it, feed it back into the
//! transition table, and repeat until `Stopped`. Skill managers are owned by
//! the executor and closed when the run ends, on success or failure.

use crate::checkpoint::{Checkpoint, RunStatus};
use crate::client::{GenerateTextRequest, ModelClient, ModelError};
use crate::compose::{
    assistant_message, fold_usage, follow_up_message, last_tool_batch, merge_tool_answer,
    retry_note, seed_messages, tool_results_message,
};
use crate::emit::{EventEmitter, RunEventListener};
use crate::error::{RunError, SkillError};
use crate::event::{EventEnvelope, RunEvent};
use crate::expert::{resolve_experts, Expert, ExpertIdentity, SkillConfig};
use crate::route::{BatchOutcome, Pause, ToolRouter};
use crate::setting::{RunInput, RunSetting};
use crate::skill::{DelegateSkillManager, InteractiveSkillManager, SkillManager};
use crate::state::RunState;
use crate::step::Step;
use crate::store::RunStore;
use std::sync::Arc;

/// Cooperative cancellation point, checked once per completed step.
///
/// Returning `false` stops the run early with its current checkpoint; a tool
/// call already in flight is never interrupted.
pub type ContinuationPredicate =
    Box<dyn Fn(&RunSetting, &Checkpoint, &Step) -> bool + Send + Sync>;

/// Builds an [`Executor`].
///
/// Remote skill managers (e.g. MCP-backed) are supplied by the caller;
/// delegate and interactive managers are synthesized from the expert's
/// configuration at build time.
pub struct ExecutorBuilder {
    setting: RunSetting,
    client: Arc<dyn ModelClient>,
    store: Arc<dyn RunStore>,
    managers: Vec<Arc<dyn SkillManager>>,
    listeners: Vec<Arc<dyn RunEventListener>>,
    continuation: Option<ContinuationPredicate>,
}

impl ExecutorBuilder {
    /// Attach a remote skill manager
    pub fn skill_manager(mut self, manager: Arc<dyn SkillManager>) -> Self {
        self.managers.push(manager);
        self
    }

    /// Subscribe a listener to the run's event stream
    pub fn listener(mut self, listener: Arc<dyn RunEventListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Install the cooperative continuation predicate
    pub fn continuation<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&RunSetting, &Checkpoint, &Step) -> bool + Send + Sync + 'static,
    {
        self.continuation = Some(Box::new(predicate));
        self
    }

    /// Validate the setting and assemble the executor.
    ///
    /// Fails fast on setup errors (missing expert, unresolved delegate)
    /// before any checkpoint exists.
    pub fn build(self) -> Result<Executor, RunError> {
        let mut managers = self.managers;
        let expert = {
            let target = resolve_experts(&self.setting)?;

            for key in target.delegate_keys() {
                // resolve_experts proved every delegate key is present
                let Some(delegate) = self.setting.experts.get(key) else {
                    continue;
                };
                managers.push(Arc::new(DelegateSkillManager::new(
                    key.to_string(),
                    ExpertIdentity::from(delegate),
                )));
            }
            for (skill_name, config) in &target.skills {
                if let SkillConfig::Interactive { tools } = config {
                    managers.push(Arc::new(InteractiveSkillManager::new(
                        skill_name.clone(),
                        tools.clone(),
                    )));
                }
            }
            target.clone()
        };

        let mut emitter = EventEmitter::new();
        for listener in self.listeners {
            emitter.subscribe(listener);
        }

        Ok(Executor {
            setting: self.setting,
            expert,
            client: self.client,
            store: self.store,
            managers,
            emitter,
            continuation: self.continuation,
        })
    }
}

/// Drives one run from a checkpoint to a terminal checkpoint
pub struct Executor {
    setting: RunSetting,
    expert: Expert,
    client: Arc<dyn ModelClient>,
    store: Arc<dyn RunStore>,
    managers: Vec<Arc<dyn SkillManager>>,
    emitter: EventEmitter,
    continuation: Option<ContinuationPredicate>,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("setting", &self.setting)
            .field("expert", &self.expert)
            .field("managers", &self.managers.len())
            .finish_non_exhaustive()
    }
}

impl Executor {
    pub fn builder(
        setting: RunSetting,
        client: Arc<dyn ModelClient>,
        store: Arc<dyn RunStore>,
    ) -> ExecutorBuilder {
        ExecutorBuilder {
            setting,
            client,
            store,
            managers: Vec::new(),
            listeners: Vec::new(),
            continuation: None,
        }
    }

    pub fn setting(&self) -> &RunSetting {
        &self.setting
    }

    /// Run from `checkpoint` (or a fresh init checkpoint) to a terminal
    /// checkpoint.
    ///
    /// Every terminal status — completed, paused, step-limited, or
    /// error-stopped — comes back as `Ok`; only setup, transport, and
    /// storage failures return `Err`. Skill managers are closed on every
    /// exit path.
    pub async fn run(&self, checkpoint: Option<Checkpoint>) -> Result<Checkpoint, RunError> {
        for manager in &self.managers {
            match manager.init().await {
                Ok(()) | Err(SkillError::AlreadyInitialized) => {}
                Err(err) => {
                    self.close_managers().await;
                    return Err(err.into());
                }
            }
        }

        let router = match ToolRouter::build(&self.managers).await {
            Ok(router) => router,
            Err(err) => {
                self.close_managers().await;
                return Err(err);
            }
        };

        let result = self.drive(checkpoint, &router).await;
        self.close_managers().await;
        result
    }

    async fn drive(
        &self,
        initial: Option<Checkpoint>,
        router: &ToolRouter,
    ) -> Result<Checkpoint, RunError> {
        let mut checkpoint = initial.unwrap_or_else(|| {
            Checkpoint::init(self.setting.run_id.clone(), ExpertIdentity::from(&self.expert))
        });
        let mut state = RunState::Init;
        let mut step = Step::new(checkpoint.step_number.max(1));

        tracing::info!(
            run_id = %self.setting.run_id,
            expert = %self.expert.key,
            status = %checkpoint.status,
            "run starting"
        );

        loop {
            let event = self
                .compute_event(state, &checkpoint, &mut step, router)
                .await?;

            self.store
                .store_checkpoint(&self.setting.job_id, event.checkpoint())
                .await?;

            checkpoint = event.checkpoint().clone();

            let mut envelope = EventEnvelope::new(
                self.setting.job_id.clone(),
                self.setting.run_id.clone(),
                event,
            );
            if let Err(err) = self.emitter.emit(&mut envelope).await {
                // Listener failures are observability problems, not run
                // failures; the checkpoint is already durable.
                tracing::warn!(error = %err, "event listeners failed");
            }
            self.store.store_event(&envelope).await?;

            state = state.next(&envelope.event)?;

            let step_completed = matches!(envelope.event, RunEvent::ContinueToNextStep { .. });
            match &envelope.event {
                RunEvent::ContinueToNextStep { checkpoint: next } => {
                    step.finish();
                    step = Step::new(next.step_number);
                }
                RunEvent::ResumeToolCalls { checkpoint: next } => {
                    step = Step::new(next.step_number.max(1));
                    step.tool_results = next.partial_tool_results.clone();
                }
                _ => {}
            }

            if state.is_terminal() {
                tracing::info!(
                    run_id = %self.setting.run_id,
                    status = %checkpoint.status,
                    step = checkpoint.step_number,
                    "run stopped"
                );
                return Ok(checkpoint);
            }

            if step_completed {
                if let Some(predicate) = &self.continuation {
                    if !predicate(&self.setting, &checkpoint, &step) {
                        tracing::info!(
                            run_id = %self.setting.run_id,
                            step = checkpoint.step_number,
                            "continuation predicate declined; stopping early"
                        );
                        return Ok(checkpoint);
                    }
                }
            }
        }
    }

    async fn compute_event(
        &self,
        state: RunState,
        checkpoint: &Checkpoint,
        step: &mut Step,
        router: &ToolRouter,
    ) -> Result<RunEvent, RunError> {
        match state {
            RunState::Init => self.on_init(checkpoint),
            RunState::GeneratingStep | RunState::GeneratingRunResult => {
                self.on_generate(checkpoint, step, router).await
            }
            RunState::CallingTools => self.on_call_tools(checkpoint, step, router).await,
            RunState::CallingDelegate => self.on_call_delegate(checkpoint, router),
            RunState::CallingInteractiveTool => self.on_call_interactive(checkpoint, router),
            RunState::ResolvingToolResults => self.on_resolve_results(checkpoint, step),
            RunState::FinishingStep => Ok(self.on_finish_step(checkpoint)),
            RunState::Stopped => Err(RunError::InvalidTransition {
                from: "stopped".to_string(),
                event: "tick".to_string(),
            }),
        }
    }

    /// Seed or resume history according to the checkpoint's status
    fn on_init(&self, checkpoint: &Checkpoint) -> Result<RunEvent, RunError> {
        match checkpoint.status {
            RunStatus::Init => {
                let mut next = checkpoint.next();
                next.messages = seed_messages(&self.expert, &self.setting.input)?;
                next.status = RunStatus::Running;
                next.step_number = 1;
                Ok(RunEvent::StartRun { checkpoint: next })
            }
            status if status.is_paused() => {
                let RunInput::ToolAnswer {
                    tool_call_id,
                    parts,
                } = &self.setting.input
                else {
                    return Err(RunError::MissingToolAnswer);
                };
                let mut next = merge_tool_answer(checkpoint, tool_call_id, parts.clone())?;
                next.status = RunStatus::Running;
                tracing::info!(
                    run_id = %self.setting.run_id,
                    tool_call_id = %tool_call_id,
                    remaining = next.pending_tool_calls.len(),
                    "resuming paused run"
                );
                Ok(RunEvent::ResumeToolCalls { checkpoint: next })
            }
            _ => {
                // Continuing an already-finished run: the input is a plain
                // follow-up user message.
                let mut next = checkpoint.next();
                next.messages.push(follow_up_message(&self.setting.input)?);
                next.status = RunStatus::Running;
                Ok(RunEvent::StartRun { checkpoint: next })
            }
        }
    }

    /// Call the model, bounded by the per-call deadline
    async fn on_generate(
        &self,
        checkpoint: &Checkpoint,
        step: &mut Step,
        router: &ToolRouter,
    ) -> Result<RunEvent, RunError> {
        let request = GenerateTextRequest {
            model: self.setting.model.clone(),
            messages: checkpoint.messages.clone(),
            tools: router.tool_definitions().to_vec(),
            temperature: self.setting.temperature,
            max_retries: self.setting.max_retries,
            provider_config: self.setting.provider_config.clone(),
        };

        let outcome = match tokio::time::timeout(
            self.setting.timeout,
            self.client.generate_text(&request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ModelError::Timeout(self.setting.timeout)),
        };

        match outcome {
            Ok(generated) => {
                let usage = generated.usage.normalized();
                step.usage.add(&usage);

                let mut next = checkpoint.next();
                fold_usage(&mut next, &usage, generated.context_window_size);

                if generated.tool_calls.is_empty() {
                    next.messages.push(assistant_message(generated.text, vec![]));
                    next.status = RunStatus::Completed;
                    Ok(RunEvent::CompleteRun { checkpoint: next })
                } else {
                    step.tool_calls = generated.tool_calls.clone();
                    next.messages.push(assistant_message(
                        generated.text,
                        generated.tool_calls.clone(),
                    ));
                    Ok(RunEvent::CallTools {
                        checkpoint: next,
                        tool_calls: generated.tool_calls,
                    })
                }
            }
            Err(err) if err.is_retryable() && step.retries < self.setting.max_retries => {
                step.retries += 1;
                tracing::warn!(
                    run_id = %self.setting.run_id,
                    attempt = step.retries,
                    error = %err,
                    "model call failed; retrying"
                );
                let mut next = checkpoint.next();
                next.messages.push(retry_note(step.retries, &err.to_string()));
                Ok(RunEvent::Retry {
                    checkpoint: next,
                    attempt: step.retries,
                    error: err.to_string(),
                })
            }
            Err(err) => {
                tracing::warn!(
                    run_id = %self.setting.run_id,
                    retries = step.retries,
                    error = %err,
                    "model call failed terminally"
                );
                let mut next = checkpoint.next();
                next.status = RunStatus::StoppedByError;
                Ok(RunEvent::StopRunByError {
                    checkpoint: next,
                    error: err.to_string(),
                })
            }
        }
    }

    /// Execute the step's batch: fresh calls from this step, or the stored
    /// pending calls when resuming
    async fn on_call_tools(
        &self,
        checkpoint: &Checkpoint,
        step: &mut Step,
        router: &ToolRouter,
    ) -> Result<RunEvent, RunError> {
        let calls = if step.tool_calls.is_empty() {
            checkpoint.pending_tool_calls.clone()
        } else {
            step.tool_calls.clone()
        };

        match router.execute(&calls).await? {
            BatchOutcome::Completed { results } => {
                let mut next = checkpoint.next();
                next.partial_tool_results.extend(results.clone());
                next.pending_tool_calls.clear();
                step.tool_results = next.partial_tool_results.clone();
                Ok(RunEvent::ResolveToolResults {
                    checkpoint: next,
                    results,
                })
            }
            BatchOutcome::Paused {
                partial_results,
                pending_calls,
                pause,
            } => {
                let mut next = checkpoint.next();
                next.partial_tool_results.extend(partial_results);
                next.pending_tool_calls = pending_calls;
                match pause {
                    Pause::Delegate { delegate_to } => Ok(RunEvent::CallDelegate {
                        checkpoint: next,
                        delegate_to,
                    }),
                    Pause::Interactive { tool_call } => Ok(RunEvent::CallInteractiveTool {
                        checkpoint: next,
                        tool_call,
                    }),
                }
            }
        }
    }

    /// Build the delegation pause checkpoint
    fn on_call_delegate(
        &self,
        checkpoint: &Checkpoint,
        router: &ToolRouter,
    ) -> Result<RunEvent, RunError> {
        let Pause::Delegate { delegate_to } = router.pause_for(&checkpoint.pending_tool_calls)?
        else {
            return Err(RunError::InvalidInput(
                "no pending delegate call to pause on".to_string(),
            ));
        };
        tracing::info!(
            run_id = %self.setting.run_id,
            delegate = %delegate_to.expert.key,
            tool_call_id = %delegate_to.tool_call_id,
            "pausing for delegate"
        );
        let mut next = checkpoint.next();
        next.status = RunStatus::StoppedByDelegate;
        next.delegate_to = Some(delegate_to);
        Ok(RunEvent::StopRunByDelegate { checkpoint: next })
    }

    /// Build the interactive pause checkpoint
    fn on_call_interactive(
        &self,
        checkpoint: &Checkpoint,
        router: &ToolRouter,
    ) -> Result<RunEvent, RunError> {
        let Pause::Interactive { tool_call } = router.pause_for(&checkpoint.pending_tool_calls)?
        else {
            return Err(RunError::InvalidInput(
                "no pending interactive call to pause on".to_string(),
            ));
        };
        tracing::info!(
            run_id = %self.setting.run_id,
            tool = %tool_call.name,
            tool_call_id = %tool_call.id,
            "pausing for interactive tool"
        );
        let mut next = checkpoint.next();
        next.status = RunStatus::StoppedByInteractiveTool;
        next.delegate_to = None;
        Ok(RunEvent::StopRunByInteractiveTool { checkpoint: next })
    }

    /// Fold the batch's results into history and clear the partial state
    fn on_resolve_results(
        &self,
        checkpoint: &Checkpoint,
        step: &mut Step,
    ) -> Result<RunEvent, RunError> {
        let calls = last_tool_batch(&checkpoint.messages);
        let results = checkpoint.partial_tool_results.clone();
        step.tool_results = results.clone();

        let mut next = checkpoint.next();
        next.messages.push(tool_results_message(&calls, results));
        next.partial_tool_results.clear();
        next.pending_tool_calls.clear();
        Ok(RunEvent::FinishToolCall { checkpoint: next })
    }

    /// Step accounting: either advance or stop at the ceiling
    fn on_finish_step(&self, checkpoint: &Checkpoint) -> RunEvent {
        let next_step = checkpoint.step_number + 1;
        let mut next = checkpoint.next();
        next.step_number = next_step;
        if next_step > self.setting.max_steps {
            next.status = RunStatus::StoppedByExceededMaxSteps;
            RunEvent::StopRunByExceededMaxSteps { checkpoint: next }
        } else {
            RunEvent::ContinueToNextStep { checkpoint: next }
        }
    }

    async fn close_managers(&self) {
        for manager in &self.managers {
            if let Err(err) = manager.close().await {
                tracing::debug!(
                    skill = manager.name(),
                    error = %err,
                    "error closing skill manager"
                );
            }
        }
    }
}
