//! Execution context handed to a stage.

use crate::core::{AttemptRecord, RecordStatus, StageKind, StageOutcome, UnitOfWork};
use parking_lot::Mutex;
use std::time::Duration;

/// Read-only view of one unit's run plus an attempt journal.
///
/// The pipeline drains the journal into the audit log after the stage
/// returns.
#[derive(Debug)]
pub struct StageContext<'a> {
    unit: &'a UnitOfWork,
    outcomes: &'a [StageOutcome],
    deadline: Duration,
    resolution: RecordStatus,
    journal: Mutex<Vec<AttemptRecord>>,
}

impl<'a> StageContext<'a> {
    /// Creates a context over the outcomes recorded so far.
    #[must_use]
    pub fn new(unit: &'a UnitOfWork, outcomes: &'a [StageOutcome], deadline: Duration) -> Self {
        Self {
            unit,
            outcomes,
            deadline,
            resolution: RecordStatus::Completed,
            journal: Mutex::new(Vec::new()),
        }
    }

    /// Sets the terminal status the run is heading for.
    #[must_use]
    pub fn with_resolution(mut self, status: RecordStatus) -> Self {
        self.resolution = status;
        self
    }

    /// The unit being processed.
    #[must_use]
    pub fn unit(&self) -> &'a UnitOfWork {
        self.unit
    }

    /// Outcomes from earlier stages, in execution order.
    #[must_use]
    pub fn outcomes(&self) -> &'a [StageOutcome] {
        self.outcomes
    }

    /// Latest successful outcome of an earlier stage.
    #[must_use]
    pub fn prior(&self, stage: StageKind) -> Option<&'a StageOutcome> {
        self.outcomes
            .iter()
            .rev()
            .find(|o| o.stage == stage && o.is_success())
    }

    /// Per-attempt deadline for collaborator calls.
    #[must_use]
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Terminal status the run will reach if this stage succeeds.
    #[must_use]
    pub fn resolution(&self) -> RecordStatus {
        self.resolution
    }

    /// Adds attempt records to the journal.
    pub fn record_attempts(&self, attempts: impl IntoIterator<Item = AttemptRecord>) {
        self.journal.lock().extend(attempts);
    }

    /// Drains the journal.
    pub fn take_attempts(&self) -> Vec<AttemptRecord> {
        std::mem::take(&mut *self.journal.lock())
    }
}
