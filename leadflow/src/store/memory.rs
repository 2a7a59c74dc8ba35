//! In-memory state store backed by a concurrent map.

use super::{apply_transition, Mutation, StateStore};
use crate::core::{
    AttemptRecord, ProcessingRecord, RecordStatus, StageKind, StageOutcome, UnitId, UnitOfWork,
};
use crate::errors::StoreError;
use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

/// In-memory state store.
///
/// Each record sits behind its map shard's lock, so a compare-and-set is a
/// single locked read-modify-write.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    records: DashMap<UnitId, ProcessingRecord>,
}

impl InMemoryStateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Replaces a record wholesale. Intended for seeding tests and imports.
    pub fn insert(&self, record: ProcessingRecord) {
        self.records.insert(record.unit_id.clone(), record);
    }

    fn mutate(&self, unit_id: &UnitId, mutation: Mutation) -> Result<(), StoreError> {
        let mut entry = self
            .records
            .get_mut(unit_id)
            .ok_or_else(|| StoreError::NotFound(unit_id.clone()))?;
        mutation.apply(entry.value_mut())
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get_record(&self, unit_id: &UnitId) -> Result<Option<ProcessingRecord>, StoreError> {
        Ok(self.records.get(unit_id).map(|r| r.value().clone()))
    }

    async fn create_if_absent(&self, unit: &UnitOfWork) -> Result<ProcessingRecord, StoreError> {
        let entry = self
            .records
            .entry(unit.id().clone())
            .or_insert_with(|| ProcessingRecord::pending(unit));
        Ok(entry.value().clone())
    }

    async fn compare_and_set_status(
        &self,
        unit_id: &UnitId,
        expected: RecordStatus,
        new: RecordStatus,
        run_id: Option<Uuid>,
    ) -> Result<ProcessingRecord, StoreError> {
        let mut entry = self
            .records
            .get_mut(unit_id)
            .ok_or_else(|| StoreError::NotFound(unit_id.clone()))?;
        apply_transition(entry.value_mut(), expected, new, run_id)?;
        Ok(entry.value().clone())
    }

    async fn set_current_stage(&self, unit_id: &UnitId, stage: StageKind) -> Result<(), StoreError> {
        self.mutate(unit_id, Mutation::CurrentStage(stage))
    }

    async fn append_outcome(&self, unit_id: &UnitId, outcome: StageOutcome) -> Result<(), StoreError> {
        self.mutate(unit_id, Mutation::Outcome(outcome))
    }

    async fn append_attempt(&self, unit_id: &UnitId, attempt: AttemptRecord) -> Result<(), StoreError> {
        self.mutate(unit_id, Mutation::Attempt(attempt))
    }

    async fn list_records(&self) -> Result<Vec<ProcessingRecord>, StoreError> {
        let mut records: Vec<_> = self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by(|a, b| a.unit_id.cmp(&b.unit_id));
        Ok(records)
    }
}
