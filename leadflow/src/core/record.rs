//! Durable per-unit processing records.

use super::{AttemptRecord, OutcomeStatus, RecordStatus, StageKind, StageOutcome, UnitId, UnitOfWork};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a completed unit got through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "path", content = "stage")]
pub enum CompletionPath {
    /// Every stage ran.
    Full,
    /// A gate bypassed the named stage (the first one bypassed).
    StageSkipped(StageKind),
}

/// One record per unit identifier, owned by the state store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingRecord {
    /// The unit this record tracks.
    pub unit_id: UnitId,
    /// Lifecycle status.
    pub status: RecordStatus,
    /// The stage most recently started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<StageKind>,
    /// Append-only stage outcomes in execution order.
    #[serde(default)]
    pub outcomes: Vec<StageOutcome>,
    /// Append-only collaborator attempt log.
    #[serde(default)]
    pub audit: Vec<AttemptRecord>,
    /// The run that last claimed the record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
    /// When the unit was first observed.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl ProcessingRecord {
    /// Creates the `pending` record for a newly observed unit.
    #[must_use]
    pub fn pending(unit: &UnitOfWork) -> Self {
        let now = Utc::now();
        Self {
            unit_id: unit.id().clone(),
            status: RecordStatus::Pending,
            current_stage: None,
            outcomes: Vec::new(),
            audit: Vec::new(),
            run_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if the record can no longer change.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Returns the last successful outcome of a stage.
    #[must_use]
    pub fn successful_outcome(&self, stage: StageKind) -> Option<&StageOutcome> {
        self.outcomes
            .iter()
            .rev()
            .find(|o| o.stage == stage && o.is_success())
    }

    /// Returns the outcome that settled a stage (succeeded or skipped).
    #[must_use]
    pub fn settled_outcome(&self, stage: StageKind) -> Option<&StageOutcome> {
        self.outcomes
            .iter()
            .rev()
            .find(|o| o.stage == stage && o.status.is_settled())
    }

    /// Returns the first non-finalization stage that failed.
    #[must_use]
    pub fn failed_stage(&self) -> Option<StageKind> {
        self.outcomes
            .iter()
            .find(|o| o.is_failure() && o.stage != StageKind::Finalization)
            .map(|o| o.stage)
    }

    /// Returns the first stage a gate bypassed.
    #[must_use]
    pub fn skipped_stage(&self) -> Option<StageKind> {
        self.outcomes
            .iter()
            .find(|o| o.status == OutcomeStatus::Skipped)
            .map(|o| o.stage)
    }

    /// Number of finalization outcomes recorded.
    #[must_use]
    pub fn finalization_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.stage == StageKind::Finalization)
            .count()
    }

    /// Distinguishes "completed via full pipeline" from "completed, stage skipped".
    ///
    /// Returns `None` unless the record is `completed`.
    #[must_use]
    pub fn completion_path(&self) -> Option<CompletionPath> {
        if self.status != RecordStatus::Completed {
            return None;
        }
        Some(
            self.skipped_stage()
                .map_or(CompletionPath::Full, CompletionPath::StageSkipped),
        )
    }

    /// Returns true if a scheduling outcome succeeded.
    #[must_use]
    pub fn scheduled(&self) -> bool {
        self.successful_outcome(StageKind::Scheduling).is_some()
    }
}
