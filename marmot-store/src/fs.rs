//! Append-only filesystem store
//!
//! Layout:
//!
//! ```text
//! <root>/<job_id>/<run_id>/checkpoints/<step:06>-<checkpoint_id>.json
//! <root>/<job_id>/<run_id>/events/<seq:08>-<event_id>.json
//! ```
//!
//! Filenames sort by `(step, id)` / `(seq, id)`, preserving the
//! `(job, run, step)` ordering resumability depends on. Files are written
//! atomically (temp + rename) and never rewritten. Writers for different
//! runs never collide; within one run the tick loop is sequential, so the
//! per-run event counter needs no cross-process coordination.

use crate::StoreError;
use async_trait::async_trait;
use marmot_core::error::store_error;
use marmot_core::{Checkpoint, CheckpointId, EventEnvelope, JobId, RunError, RunId, RunStore};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// File-based run store
pub struct FsRunStore {
    root: PathBuf,
    /// Next event sequence number per run, lazily seeded from disk
    event_seqs: Mutex<HashMap<(JobId, RunId), u64>>,
}

impl FsRunStore {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            event_seqs: Mutex::new(HashMap::new()),
        }
    }

    fn run_dir(&self, job_id: &JobId, run_id: &RunId) -> PathBuf {
        self.root.join(job_id.to_string()).join(run_id.to_string())
    }

    /// Persist a checkpoint under its `(step, id)` filename
    pub async fn save_checkpoint(
        &self,
        job_id: &JobId,
        checkpoint: &Checkpoint,
    ) -> Result<(), StoreError> {
        let dir = self.run_dir(job_id, &checkpoint.run_id).join("checkpoints");
        fs::create_dir_all(&dir).await?;
        let path = dir.join(format!(
            "{:06}-{}.json",
            checkpoint.step_number, checkpoint.id
        ));
        let json = serde_json::to_string_pretty(checkpoint)?;
        write_atomic(&path, json.as_bytes()).await?;
        Ok(())
    }

    /// Fetch a checkpoint by id, scanning the job's runs
    pub async fn load_checkpoint(
        &self,
        job_id: &JobId,
        checkpoint_id: &CheckpointId,
    ) -> Result<Option<Checkpoint>, StoreError> {
        let job_dir = self.root.join(job_id.to_string());
        let suffix = format!("-{checkpoint_id}.json");

        let mut runs = match fs::read_dir(&job_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        while let Some(run) = runs.next_entry().await? {
            let dir = run.path().join("checkpoints");
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name();
                let Some(name) = name.to_str() else { continue };
                if name.ends_with(&suffix) {
                    return Ok(Some(read_json(&entry.path()).await?));
                }
            }
        }
        Ok(None)
    }

    /// The run's most recent checkpoint, by `(step, id)` filename order
    pub async fn latest_checkpoint(
        &self,
        job_id: &JobId,
        run_id: &RunId,
    ) -> Result<Option<Checkpoint>, StoreError> {
        let dir = self.run_dir(job_id, run_id).join("checkpoints");
        let Some(name) = last_filename(&dir).await? else {
            return Ok(None);
        };
        Ok(Some(read_json(&dir.join(name)).await?))
    }

    /// Persist an event under the next per-run sequence number
    pub async fn save_event(&self, envelope: &EventEnvelope) -> Result<(), StoreError> {
        let dir = self.run_dir(&envelope.job_id, &envelope.run_id).join("events");
        fs::create_dir_all(&dir).await?;

        let seq = self.next_seq(&envelope.job_id, &envelope.run_id, &dir).await?;
        let path = dir.join(format!("{:08}-{}.json", seq, envelope.id));
        let json = serde_json::to_string_pretty(envelope)?;
        write_atomic(&path, json.as_bytes()).await?;
        Ok(())
    }

    /// All events of a run, in emission order
    pub async fn list_events(
        &self,
        job_id: &JobId,
        run_id: &RunId,
    ) -> Result<Vec<EventEnvelope>, StoreError> {
        let dir = self.run_dir(job_id, run_id).join("events");
        let mut names = Vec::new();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();

        let mut events = Vec::with_capacity(names.len());
        for name in names {
            events.push(read_json(&dir.join(name)).await?);
        }
        Ok(events)
    }

    async fn next_seq(
        &self,
        job_id: &JobId,
        run_id: &RunId,
        events_dir: &Path,
    ) -> Result<u64, StoreError> {
        let mut seqs = self.event_seqs.lock().await;
        let key = (job_id.clone(), run_id.clone());
        let next = match seqs.get(&key) {
            Some(seq) => *seq,
            None => seeded_seq(events_dir).await?,
        };
        seqs.insert(key, next + 1);
        Ok(next)
    }
}

/// First unused sequence number, from the highest existing filename
async fn seeded_seq(dir: &Path) -> Result<u64, StoreError> {
    let Some(name) = last_filename(dir).await? else {
        return Ok(0);
    };
    let seq = name
        .split('-')
        .next()
        .and_then(|prefix| prefix.parse::<u64>().ok())
        .unwrap_or(0);
    Ok(seq + 1)
}

async fn last_filename(dir: &Path) -> Result<Option<String>, StoreError> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut last: Option<String> = None;
    while let Some(entry) = entries.next_entry().await? {
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if !name.ends_with(".json") {
            continue;
        }
        if last.as_deref().is_none_or(|l| name.as_str() > l) {
            last = Some(name);
        }
    }
    Ok(last)
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let contents = fs::read_to_string(path).await?;
    serde_json::from_str(&contents).map_err(|_| StoreError::Corrupted {
        path: path.display().to_string(),
    })
}

/// Write to a temp file, sync, then rename into place
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let temp = path.with_extension("json.tmp");
    let mut file = fs::File::create(&temp).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(&temp, path).await?;
    Ok(())
}

#[async_trait]
impl RunStore for FsRunStore {
    async fn store_checkpoint(
        &self,
        job_id: &JobId,
        checkpoint: &Checkpoint,
    ) -> Result<(), RunError> {
        self.save_checkpoint(job_id, checkpoint)
            .await
            .map_err(store_error)
    }

    async fn retrieve_checkpoint(
        &self,
        job_id: &JobId,
        checkpoint_id: &CheckpointId,
    ) -> Result<Option<Checkpoint>, RunError> {
        self.load_checkpoint(job_id, checkpoint_id)
            .await
            .map_err(store_error)
    }

    async fn store_event(&self, envelope: &EventEnvelope) -> Result<(), RunError> {
        self.save_event(envelope).await.map_err(store_error)
    }
}
