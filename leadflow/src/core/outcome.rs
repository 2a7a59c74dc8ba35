//! Stage outcomes and per-attempt audit entries.

use super::{OutcomeStatus, StageKind};
use crate::errors::{CollaboratorError, ErrorClass};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The classified error carried by a failed outcome or attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeError {
    /// Retryable or terminal.
    pub class: ErrorClass,
    /// Description from the collaborator or the pipeline.
    pub message: String,
}

impl OutcomeError {
    /// Creates a terminal outcome error.
    #[must_use]
    pub fn terminal(message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::Terminal,
            message: message.into(),
        }
    }
}

impl From<CollaboratorError> for OutcomeError {
    fn from(err: CollaboratorError) -> Self {
        Self {
            class: err.class,
            message: err.message,
        }
    }
}

impl From<&CollaboratorError> for OutcomeError {
    fn from(err: &CollaboratorError) -> Self {
        Self {
            class: err.class,
            message: err.message.clone(),
        }
    }
}

/// Result of one stage execution.
///
/// Appended to a processing record and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutcome {
    /// The stage that produced this outcome.
    pub stage: StageKind,
    /// Succeeded, failed or skipped.
    pub status: OutcomeStatus,
    /// Structured result (classification, booking reference, summary...).
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Error classification when failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OutcomeError>,
    /// Number of collaborator attempts behind this outcome.
    #[serde(default)]
    pub attempts: u32,
    /// Wall time spent in the stage.
    #[serde(default)]
    pub duration_ms: u64,
    /// When the outcome was produced.
    pub recorded_at: DateTime<Utc>,
}

impl StageOutcome {
    fn base(stage: StageKind, status: OutcomeStatus) -> Self {
        Self {
            stage,
            status,
            payload: serde_json::Value::Null,
            error: None,
            attempts: 0,
            duration_ms: 0,
            recorded_at: Utc::now(),
        }
    }

    /// Creates a successful outcome.
    #[must_use]
    pub fn succeeded(stage: StageKind, payload: serde_json::Value) -> Self {
        Self {
            payload,
            ..Self::base(stage, OutcomeStatus::Succeeded)
        }
    }

    /// Creates a failed outcome.
    #[must_use]
    pub fn failed(stage: StageKind, error: impl Into<OutcomeError>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::base(stage, OutcomeStatus::Failed)
        }
    }

    /// Creates the outcome recorded when a gate bypasses a stage.
    #[must_use]
    pub fn skipped(stage: StageKind, reason: impl Into<String>) -> Self {
        Self {
            payload: serde_json::json!({ "reason": reason.into() }),
            ..Self::base(stage, OutcomeStatus::Skipped)
        }
    }

    /// Sets the attempt count.
    #[must_use]
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Sets the duration.
    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Returns true if the stage succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Succeeded
    }

    /// Returns true if the stage failed.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.status == OutcomeStatus::Failed
    }

    /// Returns true if a gate bypassed the stage.
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        self.status == OutcomeStatus::Skipped
    }

    /// Decodes the payload into a typed value.
    #[must_use]
    pub fn payload_as<T: DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_value(self.payload.clone()).ok()
    }
}

/// Audit entry for one collaborator attempt inside a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// The stage that made the attempt.
    pub stage: StageKind,
    /// The collaborator operation attempted (e.g. `classify`).
    pub operation: String,
    /// 1-based attempt number within the operation.
    pub attempt: u32,
    /// Whether the attempt succeeded.
    pub succeeded: bool,
    /// The classified error if it failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OutcomeError>,
    /// Wall time of the attempt.
    pub duration_ms: u64,
    /// When the attempt finished.
    pub at: DateTime<Utc>,
}
