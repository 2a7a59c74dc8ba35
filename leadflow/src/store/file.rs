//! File-backed state store: one JSON document per unit.

use super::{apply_transition, Mutation, StateStore};
use crate::core::{
    AttemptRecord, ProcessingRecord, RecordStatus, StageKind, StageOutcome, UnitId, UnitOfWork,
};
use crate::errors::StoreError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

/// Durable state store keeping each record in `<root>/<hex(unit id)>.json`.
///
/// Writes go to a temporary file that is renamed over the document. A
/// per-unit async lock serializes read-modify-write cycles within this
/// process; cross-process exclusivity is out of scope for this backend.
#[derive(Debug)]
pub struct FileStateStore {
    root: PathBuf,
    locks: DashMap<UnitId, Arc<Mutex<()>>>,
}

impl FileStateStore {
    /// Opens (and creates if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        debug!(root = %root.display(), "Opened file state store");
        Ok(Self {
            root,
            locks: DashMap::new(),
        })
    }

    /// Returns the store directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the document path for a unit.
    #[must_use]
    pub fn record_path(&self, unit_id: &UnitId) -> PathBuf {
        self.root
            .join(format!("{}.json", hex::encode(unit_id.as_str().as_bytes())))
    }

    fn lock_for(&self, unit_id: &UnitId) -> Arc<Mutex<()>> {
        self.locks.entry(unit_id.clone()).or_default().value().clone()
    }

    /// Drops the entry for `unit_id` once no other task holds its lock.
    fn release_lock(&self, unit_id: &UnitId, lock: Arc<Mutex<()>>) {
        drop(lock);
        self.locks
            .remove_if(unit_id, |_, held| Arc::strong_count(held) == 1);
    }

    #[cfg(test)]
    fn lock_count(&self) -> usize {
        self.locks.len()
    }

    async fn read_path(path: &Path) -> Result<Option<ProcessingRecord>, StoreError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(record) => Ok(Some(record)),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Unreadable processing record treated as absent");
                    Ok(None)
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, record: &ProcessingRecord) -> Result<(), StoreError> {
        let path = self.record_path(&record.unit_id);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(record)?;
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn mutate(&self, unit_id: &UnitId, mutation: Mutation) -> Result<(), StoreError> {
        let lock = self.lock_for(unit_id);
        let result = {
            let _guard = lock.lock().await;
            self.mutate_locked(unit_id, mutation).await
        };
        self.release_lock(unit_id, lock);
        result
    }

    async fn mutate_locked(&self, unit_id: &UnitId, mutation: Mutation) -> Result<(), StoreError> {
        let mut record = Self::read_path(&self.record_path(unit_id))
            .await?
            .ok_or_else(|| StoreError::NotFound(unit_id.clone()))?;
        mutation.apply(&mut record)?;
        self.write(&record).await
    }

    async fn create_locked(&self, unit: &UnitOfWork) -> Result<ProcessingRecord, StoreError> {
        if let Some(existing) = Self::read_path(&self.record_path(unit.id())).await? {
            return Ok(existing);
        }
        let record = ProcessingRecord::pending(unit);
        self.write(&record).await?;
        Ok(record)
    }

    async fn transition_locked(
        &self,
        unit_id: &UnitId,
        expected: RecordStatus,
        new: RecordStatus,
        run_id: Option<Uuid>,
    ) -> Result<ProcessingRecord, StoreError> {
        let mut record = Self::read_path(&self.record_path(unit_id))
            .await?
            .ok_or_else(|| StoreError::NotFound(unit_id.clone()))?;
        apply_transition(&mut record, expected, new, run_id)?;
        self.write(&record).await?;
        Ok(record)
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn get_record(&self, unit_id: &UnitId) -> Result<Option<ProcessingRecord>, StoreError> {
        Self::read_path(&self.record_path(unit_id)).await
    }

    async fn create_if_absent(&self, unit: &UnitOfWork) -> Result<ProcessingRecord, StoreError> {
        let lock = self.lock_for(unit.id());
        let result = {
            let _guard = lock.lock().await;
            self.create_locked(unit).await
        };
        self.release_lock(unit.id(), lock);
        result
    }

    async fn compare_and_set_status(
        &self,
        unit_id: &UnitId,
        expected: RecordStatus,
        new: RecordStatus,
        run_id: Option<Uuid>,
    ) -> Result<ProcessingRecord, StoreError> {
        let lock = self.lock_for(unit_id);
        let result = {
            let _guard = lock.lock().await;
            self.transition_locked(unit_id, expected, new, run_id).await
        };
        self.release_lock(unit_id, lock);
        result
    }

    async fn set_current_stage(&self, unit_id: &UnitId, stage: StageKind) -> Result<(), StoreError> {
        self.mutate(unit_id, Mutation::CurrentStage(stage)).await
    }

    async fn append_outcome(&self, unit_id: &UnitId, outcome: StageOutcome) -> Result<(), StoreError> {
        self.mutate(unit_id, Mutation::Outcome(outcome)).await
    }

    async fn append_attempt(&self, unit_id: &UnitId, attempt: AttemptRecord) -> Result<(), StoreError> {
        self.mutate(unit_id, Mutation::Attempt(attempt)).await
    }

    async fn list_records(&self) -> Result<Vec<ProcessingRecord>, StoreError> {
        let mut records = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(record) = Self::read_path(&path).await? {
                records.push(record);
            }
        }
        records.sort_by(|a, b| a.unit_id.cmp(&b.unit_id));
        Ok(records)
    }
}
