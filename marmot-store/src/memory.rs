//! In-memory run store (for testing)

use crate::StoreError;
use async_trait::async_trait;
use marmot_core::error::store_error;
use marmot_core::{Checkpoint, CheckpointId, EventEnvelope, JobId, RunError, RunId, RunStore};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory run store
#[derive(Default)]
pub struct MemoryRunStore {
    checkpoints: RwLock<HashMap<(JobId, CheckpointId), Checkpoint>>,
    events: RwLock<Vec<EventEnvelope>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored events for a run, in emission order
    pub async fn events_for(&self, job_id: &JobId, run_id: &RunId) -> Vec<EventEnvelope> {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| &e.job_id == job_id && &e.run_id == run_id)
            .cloned()
            .collect()
    }

    /// The run's most recent checkpoint by `(step, id)` order
    pub async fn latest_checkpoint(
        &self,
        job_id: &JobId,
        run_id: &RunId,
    ) -> Result<Option<Checkpoint>, StoreError> {
        let checkpoints = self.checkpoints.read().await;
        let latest = checkpoints
            .iter()
            .filter(|((job, _), cp)| job == job_id && &cp.run_id == run_id)
            .map(|(_, cp)| cp)
            .max_by_key(|cp| (cp.step_number, cp.id.to_string()));
        Ok(latest.cloned())
    }

    pub async fn checkpoint_count(&self) -> usize {
        self.checkpoints.read().await.len()
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn store_checkpoint(
        &self,
        job_id: &JobId,
        checkpoint: &Checkpoint,
    ) -> Result<(), RunError> {
        let mut checkpoints = self.checkpoints.write().await;
        let key = (job_id.clone(), checkpoint.id.clone());
        if checkpoints.contains_key(&key) {
            return Err(store_error(format!(
                "checkpoint {} already stored",
                checkpoint.id
            )));
        }
        checkpoints.insert(key, checkpoint.clone());
        Ok(())
    }

    async fn retrieve_checkpoint(
        &self,
        job_id: &JobId,
        checkpoint_id: &CheckpointId,
    ) -> Result<Option<Checkpoint>, RunError> {
        let checkpoints = self.checkpoints.read().await;
        Ok(checkpoints
            .get(&(job_id.clone(), checkpoint_id.clone()))
            .cloned())
    }

    async fn store_event(&self, envelope: &EventEnvelope) -> Result<(), RunError> {
        self.events.write().await.push(envelope.clone());
        Ok(())
    }
}
