//! Storage boundary
//!
//! The engine assumes checkpoints and events are durable before a tick
//! returns; everything else about the backend (flat files, embedded KV, a
//! database) is the implementation's business, as long as
//! `(job id, run id, step number)` ordering is preserved.

use crate::checkpoint::Checkpoint;
use crate::error::RunError;
use crate::event::EventEnvelope;
use crate::types::{CheckpointId, JobId};
use async_trait::async_trait;

/// Abstraction over checkpoint/event persistence backends
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Persist a checkpoint. Checkpoints are append-only; an id is written
    /// at most once.
    async fn store_checkpoint(
        &self,
        job_id: &JobId,
        checkpoint: &Checkpoint,
    ) -> Result<(), RunError>;

    /// Fetch a checkpoint by id for point-in-time resume
    async fn retrieve_checkpoint(
        &self,
        job_id: &JobId,
        checkpoint_id: &CheckpointId,
    ) -> Result<Option<Checkpoint>, RunError>;

    /// Persist an event envelope in emission order
    async fn store_event(&self, envelope: &EventEnvelope) -> Result<(), RunError>;
}
