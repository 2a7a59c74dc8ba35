//! Collaborator contracts consumed by the orchestrator core.
//!
//! Each trait is implemented by an adapter outside this crate (mailbox,
//! calendar, language model, notification service). The core only sees
//! typed results and classified [`CollaboratorError`]s. Handles are passed
//! in explicitly through [`Collaborators`].

mod keyword;

pub use keyword::{sender_domain, KeywordClassifier};

use crate::core::{UnitId, UnitOfWork};
use crate::errors::CollaboratorError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::{self, Debug};
use std::sync::Arc;

/// Structured verdict produced by the classification collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Whether the unit qualifies as a hot lead.
    pub qualifies: bool,
    /// Whether the unit asks for a meeting.
    pub meeting_requested: bool,
    /// Confidence score, 0..=100.
    pub score: u8,
    /// Signals that drove the verdict.
    #[serde(default)]
    pub signals: BTreeSet<String>,
    /// True when the verdict came from the declared fallback.
    #[serde(default)]
    pub fallback_used: bool,
}

impl Classification {
    /// Creates a classification, clamping the score to 100.
    #[must_use]
    pub fn new(qualifies: bool, meeting_requested: bool, score: u8) -> Self {
        Self {
            qualifies,
            meeting_requested,
            score: score.min(100),
            signals: BTreeSet::new(),
            fallback_used: false,
        }
    }

    /// Adds a signal.
    #[must_use]
    pub fn with_signal(mut self, signal: impl Into<String>) -> Self {
        self.signals.insert(signal.into());
        self
    }

    /// Marks the verdict as a fallback value.
    #[must_use]
    pub fn as_fallback(mut self) -> Self {
        self.fallback_used = true;
        self
    }
}

/// A candidate meeting slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Slot start.
    pub start: DateTime<Utc>,
    /// Slot end.
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Creates a window of `minutes` starting at `start`.
    #[must_use]
    pub fn starting_at(start: DateTime<Utc>, minutes: i64) -> Self {
        Self {
            start,
            end: start + Duration::minutes(minutes),
        }
    }
}

/// Reference to a created booking.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookingReference(pub String);

impl fmt::Display for BookingReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source of units of work (mailbox, lead search).
#[async_trait]
pub trait SourceCollaborator: Send + Sync + Debug {
    /// Lists at most `max_batch` units awaiting processing.
    async fn list_pending(&self, max_batch: usize) -> Result<Vec<UnitOfWork>, CollaboratorError>;

    /// Marks a unit processed (e.g. mark the message read).
    async fn mark_done(&self, unit_id: &UnitId) -> Result<(), CollaboratorError>;
}

/// Analysis service producing a [`Classification`].
#[async_trait]
pub trait ClassificationCollaborator: Send + Sync + Debug {
    /// Classifies a unit.
    async fn classify(&self, unit: &UnitOfWork) -> Result<Classification, CollaboratorError>;

    /// Deterministic verdict used when the service cannot be reached.
    ///
    /// Defaults to [`KeywordClassifier`] with its default thresholds.
    fn fallback(&self, unit: &UnitOfWork) -> Classification {
        KeywordClassifier::default().classify(unit)
    }
}

/// Calendar access.
///
/// Both operations must be idempotent for the same caller-supplied key.
#[async_trait]
pub trait SchedulingCollaborator: Send + Sync + Debug {
    /// Returns true if the window is free.
    async fn check_availability(&self, window: &TimeWindow) -> Result<bool, CollaboratorError>;

    /// Books the window for the unit. Repeated calls with the same
    /// `idempotency_key` return the first booking.
    async fn create_booking(
        &self,
        unit: &UnitOfWork,
        window: &TimeWindow,
        idempotency_key: &str,
    ) -> Result<BookingReference, CollaboratorError>;
}

/// Notification delivery. Best effort.
#[async_trait]
pub trait NotificationCollaborator: Send + Sync + Debug {
    /// Sends a summary for the unit.
    async fn notify(&self, unit_id: &UnitId, summary: &serde_json::Value) -> Result<(), CollaboratorError>;
}

/// Explicit bundle of collaborator handles injected into the orchestrator.
#[derive(Debug, Clone)]
pub struct Collaborators {
    /// Unit source.
    pub source: Arc<dyn SourceCollaborator>,
    /// Analysis service.
    pub classifier: Arc<dyn ClassificationCollaborator>,
    /// Calendar.
    pub scheduler: Arc<dyn SchedulingCollaborator>,
    /// Notification delivery.
    pub notifier: Arc<dyn NotificationCollaborator>,
}

impl Collaborators {
    /// Bundles collaborator handles.
    #[must_use]
    pub fn new(
        source: Arc<dyn SourceCollaborator>,
        classifier: Arc<dyn ClassificationCollaborator>,
        scheduler: Arc<dyn SchedulingCollaborator>,
        notifier: Arc<dyn NotificationCollaborator>,
    ) -> Self {
        Self {
            source,
            classifier,
            scheduler,
            notifier,
        }
    }
}
