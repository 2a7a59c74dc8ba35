//! State store: the durable mapping from unit identifier to processing record.
//!
//! Every mutation is a single-record operation keyed by unit identifier.
//! Status changes go through [`StateStore::compare_and_set_status`], which is
//! what gives exactly one run ownership of a unit. Terminal records reject
//! every further mutation.

mod file;
mod memory;

pub use file::FileStateStore;
pub use memory::InMemoryStateStore;

use crate::core::{
    AttemptRecord, ProcessingRecord, RecordStatus, StageKind, StageOutcome, UnitId, UnitOfWork,
};
use crate::errors::StoreError;
use async_trait::async_trait;
use chrono::Utc;
use std::fmt::Debug;
use std::sync::Arc;
use uuid::Uuid;

/// Shared handle to a state store.
pub type SharedStateStore = Arc<dyn StateStore>;

/// Storage collaborator contract.
#[async_trait]
pub trait StateStore: Send + Sync + Debug {
    /// Reads a record. Missing and unreadable records both yield `None`.
    async fn get_record(&self, unit_id: &UnitId) -> Result<Option<ProcessingRecord>, StoreError>;

    /// Inserts a `pending` record on first sighting and returns the stored record.
    async fn create_if_absent(&self, unit: &UnitOfWork) -> Result<ProcessingRecord, StoreError>;

    /// Atomically moves a record from `expected` to `new`.
    ///
    /// When `run_id` is given it is stored with the transition.
    ///
    /// # Errors
    ///
    /// [`StoreError::StatusConflict`] if the stored status is not `expected`.
    async fn compare_and_set_status(
        &self,
        unit_id: &UnitId,
        expected: RecordStatus,
        new: RecordStatus,
        run_id: Option<Uuid>,
    ) -> Result<ProcessingRecord, StoreError>;

    /// Records the stage a run is about to execute.
    async fn set_current_stage(&self, unit_id: &UnitId, stage: StageKind) -> Result<(), StoreError>;

    /// Appends a stage outcome.
    async fn append_outcome(&self, unit_id: &UnitId, outcome: StageOutcome) -> Result<(), StoreError>;

    /// Appends a collaborator attempt to the audit log.
    async fn append_attempt(&self, unit_id: &UnitId, attempt: AttemptRecord) -> Result<(), StoreError>;

    /// Returns every readable record.
    async fn list_records(&self) -> Result<Vec<ProcessingRecord>, StoreError>;

    /// Idempotency ledger lookup: the last successful outcome of `stage`.
    async fn successful_outcome(
        &self,
        unit_id: &UnitId,
        stage: StageKind,
    ) -> Result<Option<StageOutcome>, StoreError> {
        Ok(self
            .get_record(unit_id)
            .await?
            .and_then(|record| record.successful_outcome(stage).cloned()))
    }
}

/// Applies a compare-and-set to a record held under the backend's lock.
fn apply_transition(
    record: &mut ProcessingRecord,
    expected: RecordStatus,
    new: RecordStatus,
    run_id: Option<Uuid>,
) -> Result<(), StoreError> {
    if record.status != expected {
        return Err(StoreError::StatusConflict {
            unit_id: record.unit_id.clone(),
            expected,
            actual: record.status,
        });
    }
    ensure_mutable(record)?;
    record.status = new;
    if run_id.is_some() {
        record.run_id = run_id;
    }
    record.updated_at = Utc::now();
    Ok(())
}

/// Rejects mutation of a terminal record.
fn ensure_mutable(record: &ProcessingRecord) -> Result<(), StoreError> {
    if record.is_terminal() {
        return Err(StoreError::RecordTerminal(record.unit_id.clone()));
    }
    Ok(())
}

/// A record mutation applied by [`StateStore`] backends.
#[derive(Debug)]
enum Mutation {
    CurrentStage(StageKind),
    Outcome(StageOutcome),
    Attempt(AttemptRecord),
}

impl Mutation {
    fn apply(self, record: &mut ProcessingRecord) -> Result<(), StoreError> {
        ensure_mutable(record)?;
        match self {
            Self::CurrentStage(stage) => record.current_stage = Some(stage),
            Self::Outcome(outcome) => record.outcomes.push(outcome),
            Self::Attempt(attempt) => record.audit.push(attempt),
        }
        record.updated_at = Utc::now();
        Ok(())
    }
}
