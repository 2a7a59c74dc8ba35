//! Per-unit dispositions and batch-level aggregation.

use crate::collaborators::Classification;
use crate::core::{ProcessingRecord, RecordStatus, StageKind, UnitId};
use serde::{Deserialize, Serialize};

/// What happened to one listed unit during a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "disposition", rename_all = "snake_case")]
pub enum UnitDisposition {
    /// The run reached `completed`.
    Completed {
        /// Whether a booking was made.
        scheduled: bool,
        /// The first stage a gate bypassed, if any.
        skipped_stage: Option<StageKind>,
    },
    /// The run reached `failed`.
    Failed {
        /// The stage that failed.
        stage: Option<StageKind>,
    },
    /// A gate filtered the unit out.
    Skipped {
        /// The stage whose gate rejected the unit.
        stage: Option<StageKind>,
    },
    /// Cancellation stopped the unit before it reached a terminal status.
    Cancelled,
    /// Another run owns the unit.
    ClaimConflict,
    /// The unit was already terminal when listed.
    AlreadyTerminal,
    /// The state store failed while driving the unit.
    Errored {
        /// The store error message.
        message: String,
    },
}

impl UnitDisposition {
    /// Derives the disposition from the record a pipeline run returned.
    #[must_use]
    pub fn from_record(record: &ProcessingRecord) -> Self {
        match record.status {
            RecordStatus::Completed => Self::Completed {
                scheduled: record.scheduled(),
                skipped_stage: record.skipped_stage(),
            },
            RecordStatus::Failed => Self::Failed {
                stage: record.failed_stage(),
            },
            RecordStatus::Skipped => Self::Skipped {
                stage: record.skipped_stage(),
            },
            RecordStatus::Pending => Self::Cancelled,
            RecordStatus::InProgress => Self::Errored {
                message: "run returned without a terminal status".to_string(),
            },
        }
    }

    /// Returns true if a pipeline run drove the unit to a terminal status.
    #[must_use]
    pub fn is_processed(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Failed { .. } | Self::Skipped { .. }
        )
    }
}

/// One unit's line in a batch summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitReport {
    /// The unit.
    pub unit_id: UnitId,
    /// What happened to it.
    pub disposition: UnitDisposition,
    /// Whether its classification qualified it as a lead.
    pub qualified: bool,
    /// Whether its classification came from the fallback.
    pub fallback_used: bool,
}

impl UnitReport {
    /// Builds a report, reading the classification from `record` when the
    /// unit was processed.
    #[must_use]
    pub fn new(unit_id: UnitId, disposition: UnitDisposition, record: Option<&ProcessingRecord>) -> Self {
        let classification = record
            .filter(|_| disposition.is_processed())
            .and_then(|r| r.successful_outcome(StageKind::Classification))
            .and_then(|o| o.payload_as::<Classification>());
        Self {
            unit_id,
            disposition,
            qualified: classification.as_ref().is_some_and(|c| c.qualifies),
            fallback_used: classification.as_ref().is_some_and(|c| c.fallback_used),
        }
    }
}

/// Aggregate of one orchestrator batch.
///
/// Informational only; the state store's records are authoritative.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Units the source listed.
    pub listed: usize,
    /// Units that reached `completed`.
    pub completed: usize,
    /// Completed units where a gate bypassed a stage.
    pub completed_with_skip: usize,
    /// Units that got a booking.
    pub scheduled: usize,
    /// Units that reached `failed`.
    pub failed: usize,
    /// Units filtered out by a gate.
    pub skipped: usize,
    /// Units owned by another run.
    pub claim_conflicts: usize,
    /// Units already terminal when listed.
    pub already_terminal: usize,
    /// Units left pending by cancellation.
    pub cancelled: usize,
    /// Units whose run hit a store error.
    pub errored: usize,
    /// Processed units classified as qualified leads.
    pub qualified_leads: usize,
    /// Processed units classified by the fallback.
    pub fallback_classifications: usize,
    /// Per-unit lines, in completion order.
    pub units: Vec<UnitReport>,
}

impl BatchSummary {
    /// Creates an empty summary for a listing of `listed` units.
    #[must_use]
    pub fn new(listed: usize) -> Self {
        Self {
            listed,
            ..Self::default()
        }
    }

    /// Folds one unit's report into the counts.
    pub fn record(&mut self, report: UnitReport) {
        match &report.disposition {
            UnitDisposition::Completed {
                scheduled,
                skipped_stage,
            } => {
                self.completed += 1;
                if *scheduled {
                    self.scheduled += 1;
                }
                if skipped_stage.is_some() {
                    self.completed_with_skip += 1;
                }
            }
            UnitDisposition::Failed { .. } => self.failed += 1,
            UnitDisposition::Skipped { .. } => self.skipped += 1,
            UnitDisposition::Cancelled => self.cancelled += 1,
            UnitDisposition::ClaimConflict => self.claim_conflicts += 1,
            UnitDisposition::AlreadyTerminal => self.already_terminal += 1,
            UnitDisposition::Errored { .. } => self.errored += 1,
        }
        if report.qualified {
            self.qualified_leads += 1;
        }
        if report.fallback_used {
            self.fallback_classifications += 1;
        }
        self.units.push(report);
    }

    /// Units this batch drove to a terminal status.
    #[must_use]
    pub fn processed(&self) -> usize {
        self.completed + self.failed + self.skipped
    }

    /// Share of processed units that completed.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        ratio(self.completed, self.processed())
    }

    /// Share of processed units that qualified as leads.
    #[must_use]
    pub fn qualified_lead_rate(&self) -> f64 {
        ratio(self.qualified_leads, self.processed())
    }

    /// Share of qualified leads that got a booking.
    #[must_use]
    pub fn meeting_conversion_rate(&self) -> f64 {
        ratio(self.scheduled, self.qualified_leads)
    }

    /// Looks up one unit's report.
    #[must_use]
    pub fn report(&self, unit_id: &str) -> Option<&UnitReport> {
        self.units.iter().find(|r| r.unit_id.as_str() == unit_id)
    }
}

#[allow(clippy::cast_precision_loss)]
fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// Per-status record counts read from the state store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStatus {
    /// Records awaiting a run.
    pub pending: usize,
    /// Records owned by a run.
    pub in_progress: usize,
    /// Completed records.
    pub completed: usize,
    /// Failed records.
    pub failed: usize,
    /// Skipped records.
    pub skipped: usize,
}

impl WorkflowStatus {
    /// Counts `records` by status.
    #[must_use]
    pub fn from_records(records: &[ProcessingRecord]) -> Self {
        records.iter().fold(Self::default(), |mut acc, r| {
            match r.status {
                RecordStatus::Pending => acc.pending += 1,
                RecordStatus::InProgress => acc.in_progress += 1,
                RecordStatus::Completed => acc.completed += 1,
                RecordStatus::Failed => acc.failed += 1,
                RecordStatus::Skipped => acc.skipped += 1,
            }
            acc
        })
    }

    /// All records.
    #[must_use]
    pub fn total(&self) -> usize {
        self.pending + self.in_progress + self.completed + self.failed + self.skipped
    }
}
