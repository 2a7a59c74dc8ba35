//! Lifecycle events emitted by the pipeline and orchestrator.
//!
//! Sinks are injected at construction; there is no process-wide sink.
//! Emitting an event never affects a unit's outcome.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, SharedEventSink};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleEvent {
    /// A unit was listed by the source.
    #[serde(rename = "unit.observed")]
    UnitObserved,
    /// A run claimed a unit.
    #[serde(rename = "unit.claimed")]
    UnitClaimed,
    /// Another run already owns the unit.
    #[serde(rename = "unit.claim_conflict")]
    UnitClaimConflict,
    /// A stage is about to execute.
    #[serde(rename = "stage.started")]
    StageStarted,
    /// A stage succeeded.
    #[serde(rename = "stage.completed")]
    StageCompleted,
    /// A stage failed.
    #[serde(rename = "stage.failed")]
    StageFailed,
    /// A gate bypassed a stage.
    #[serde(rename = "stage.skipped")]
    StageSkipped,
    /// A unit reached a terminal status.
    #[serde(rename = "unit.finished")]
    UnitFinished,
    /// A run released its claim after cancellation.
    #[serde(rename = "unit.cancelled")]
    UnitCancelled,
    /// A batch finished.
    #[serde(rename = "batch.finished")]
    BatchFinished,
}

impl LifecycleEvent {
    /// Dotted event name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnitObserved => "unit.observed",
            Self::UnitClaimed => "unit.claimed",
            Self::UnitClaimConflict => "unit.claim_conflict",
            Self::StageStarted => "stage.started",
            Self::StageCompleted => "stage.completed",
            Self::StageFailed => "stage.failed",
            Self::StageSkipped => "stage.skipped",
            Self::UnitFinished => "unit.finished",
            Self::UnitCancelled => "unit.cancelled",
            Self::BatchFinished => "batch.finished",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_match_serde() {
        for event in [
            LifecycleEvent::UnitObserved,
            LifecycleEvent::StageSkipped,
            LifecycleEvent::BatchFinished,
        ] {
            let json = serde_json::to_value(event).unwrap();
            assert_eq!(json, serde_json::Value::String(event.as_str().to_string()));
        }
    }
}
