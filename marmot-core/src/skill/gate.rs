//! Idempotency gate for skill manager initialization
//!
//! Enforces the shared init contract: one initialization runs at a time,
//! concurrent callers share its outcome, and re-initializing after success
//! is an error. A failed initialization leaves the gate retryable.

use crate::error::SkillError;
use std::future::Future;
use tokio::sync::{watch, Mutex};

type InitOutcome = Option<Result<(), String>>;

enum GateState {
    Idle,
    Pending(watch::Receiver<InitOutcome>),
    Ready,
    Failed(String),
}

enum Role {
    Leader(watch::Sender<InitOutcome>),
    Follower(watch::Receiver<InitOutcome>),
}

pub struct InitGate {
    state: Mutex<GateState>,
}

impl InitGate {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GateState::Idle),
        }
    }

    /// Run `init` exactly once.
    ///
    /// The first caller executes the future; callers arriving while it is in
    /// flight await the same outcome. A caller arriving after a successful
    /// init gets `AlreadyInitialized`. After a failure the gate resets, so a
    /// later call may retry.
    pub async fn run_init<F, Fut>(&self, init: F) -> Result<(), SkillError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), SkillError>>,
    {
        let role = {
            let mut state = self.state.lock().await;
            match &*state {
                GateState::Ready => return Err(SkillError::AlreadyInitialized),
                GateState::Pending(rx) => Role::Follower(rx.clone()),
                GateState::Idle | GateState::Failed(_) => {
                    let (tx, rx) = watch::channel(None);
                    *state = GateState::Pending(rx);
                    Role::Leader(tx)
                }
            }
        };

        match role {
            Role::Follower(rx) => await_outcome(rx).await,
            Role::Leader(tx) => {
                let result = init().await;
                let outcome = result
                    .as_ref()
                    .map(|_| ())
                    .map_err(std::string::ToString::to_string);
                {
                    let mut state = self.state.lock().await;
                    *state = match &outcome {
                        Ok(()) => GateState::Ready,
                        Err(reason) => GateState::Failed(reason.clone()),
                    };
                }
                let _ = tx.send(Some(outcome));
                result
            }
        }
    }

    /// Wait until the gate is ready.
    ///
    /// Blocks on an in-flight init; fails with `NotInitialized` when init was
    /// never started, or with the recorded failure when init failed.
    pub async fn wait_ready(&self) -> Result<(), SkillError> {
        let rx = {
            let state = self.state.lock().await;
            match &*state {
                GateState::Ready => return Ok(()),
                GateState::Idle => return Err(SkillError::NotInitialized),
                GateState::Failed(reason) => {
                    return Err(SkillError::InitFailed {
                        reason: reason.clone(),
                    });
                }
                GateState::Pending(rx) => rx.clone(),
            }
        };
        await_outcome(rx).await
    }

    /// Whether a successful init has completed
    pub async fn is_ready(&self) -> bool {
        matches!(&*self.state.lock().await, GateState::Ready)
    }
}

impl Default for InitGate {
    fn default() -> Self {
        Self::new()
    }
}

async fn await_outcome(mut rx: watch::Receiver<InitOutcome>) -> Result<(), SkillError> {
    let outcome = match rx.wait_for(Option::is_some).await {
        Ok(guard) => guard.clone(),
        Err(_) => None,
    };
    match outcome {
        Some(Ok(())) => Ok(()),
        Some(Err(reason)) => Err(SkillError::InitFailed { reason }),
        None => Err(SkillError::InitFailed {
            reason: "initialization was interrupted".to_string(),
        }),
    }
}
