//! Record status, stage kind and outcome status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The lifecycle status of a unit's processing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Observed but not yet claimed.
    Pending,
    /// Claimed by exactly one pipeline run.
    InProgress,
    /// Finished; every admitted stage succeeded.
    Completed,
    /// Finished; a stage failed terminally.
    Failed,
    /// Finished; the unit was filtered out by a gate.
    Skipped,
}

impl Default for RecordStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

impl RecordStatus {
    /// Returns true if no further transitions are allowed.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }

    /// Returns true if a run currently owns the record.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::InProgress)
    }
}

/// The closed set of stages a pipeline can be built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Records that the source collaborator produced the unit.
    Retrieval,
    /// Produces a structured verdict for the unit.
    Classification,
    /// Books a meeting for the unit.
    Scheduling,
    /// Marks the unit processed and notifies.
    Finalization,
}

impl StageKind {
    /// All stage kinds in canonical pipeline order.
    pub const ALL: [Self; 4] = [
        Self::Retrieval,
        Self::Classification,
        Self::Scheduling,
        Self::Finalization,
    ];

    /// Returns the stage name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Retrieval => "retrieval",
            Self::Classification => "classification",
            Self::Scheduling => "scheduling",
            Self::Finalization => "finalization",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The result status of one stage execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// The stage did its work.
    Succeeded,
    /// The stage failed after the retry policy gave up.
    Failed,
    /// A decision gate bypassed the stage.
    Skipped,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

impl OutcomeStatus {
    /// Returns true if the stage needs no further execution in this unit's life.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Skipped)
    }
}
