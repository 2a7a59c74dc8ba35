//! Finalization: processed marker plus best-effort notification.

use super::{Stage, StageContext};
use crate::collaborators::{Classification, NotificationCollaborator, SourceCollaborator};
use crate::core::{AttemptRecord, OutcomeError, RecordStatus, StageKind, StageOutcome, UnitId};
use crate::errors::CollaboratorError;
use crate::pipeline::RetryPolicy;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Terminal summary of one unit, recorded by finalization and sent as the
/// notification body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSummary {
    /// The unit.
    pub unit_id: UnitId,
    /// Terminal status the run resolves to.
    pub status: RecordStatus,
    /// Whether a meeting was booked.
    pub scheduled: bool,
    /// First stage a gate bypassed.
    pub skipped_stage: Option<StageKind>,
    /// Gate's reason for the bypass.
    pub skip_reason: Option<String>,
    /// First stage that failed.
    pub failed_stage: Option<StageKind>,
    /// Classification verdict, if one was recorded.
    pub qualifies: Option<bool>,
    /// Meeting request flag, if a verdict was recorded.
    pub meeting_requested: Option<bool>,
    /// Classification score, if a verdict was recorded.
    pub score: Option<u8>,
    /// Whether the verdict came from the fallback classifier.
    pub fallback_used: bool,
    /// Booking reference when scheduled.
    pub booking_reference: Option<String>,
}

impl UnitSummary {
    /// Summarizes the outcomes recorded for a unit.
    #[must_use]
    pub fn from_outcomes(unit_id: &UnitId, status: RecordStatus, outcomes: &[StageOutcome]) -> Self {
        let latest_success = |stage: StageKind| {
            outcomes
                .iter()
                .rev()
                .find(|o| o.stage == stage && o.is_success())
        };
        let skipped = outcomes.iter().find(|o| o.is_skipped());
        let classification = latest_success(StageKind::Classification)
            .and_then(StageOutcome::payload_as::<Classification>);
        let booking = latest_success(StageKind::Scheduling);

        Self {
            unit_id: unit_id.clone(),
            status,
            scheduled: booking.is_some(),
            skipped_stage: skipped.map(|o| o.stage),
            skip_reason: skipped
                .and_then(|o| o.payload.get("reason"))
                .and_then(|r| r.as_str())
                .map(str::to_string),
            failed_stage: outcomes
                .iter()
                .find(|o| o.is_failure() && o.stage != StageKind::Finalization)
                .map(|o| o.stage),
            qualifies: classification.as_ref().map(|c| c.qualifies),
            meeting_requested: classification.as_ref().map(|c| c.meeting_requested),
            score: classification.as_ref().map(|c| c.score),
            fallback_used: classification.as_ref().is_some_and(|c| c.fallback_used),
            booking_reference: booking
                .and_then(|o| o.payload.get("booking_reference"))
                .and_then(|r| r.as_str())
                .map(str::to_string),
        }
    }
}

/// Marks the unit processed at the source and sends a notification.
///
/// A `mark_done` failure fails the stage, and with it the unit. A
/// notification failure or timeout is logged and recorded but never changes
/// the outcome.
#[derive(Debug, Clone)]
pub struct FinalizationStage {
    source: Arc<dyn SourceCollaborator>,
    notifier: Arc<dyn NotificationCollaborator>,
    retry: RetryPolicy,
    notify_deadline: Duration,
}

impl FinalizationStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(
        source: Arc<dyn SourceCollaborator>,
        notifier: Arc<dyn NotificationCollaborator>,
        retry: RetryPolicy,
        notify_deadline: Duration,
    ) -> Self {
        Self {
            source,
            notifier,
            retry,
            notify_deadline,
        }
    }

    async fn notify(&self, unit_id: &UnitId, summary: &serde_json::Value) -> AttemptRecord {
        let started = Instant::now();
        let result = match tokio::time::timeout(self.notify_deadline, self.notifier.notify(unit_id, summary)).await {
            Ok(result) => result,
            Err(_) => Err(CollaboratorError::timeout(self.notify_deadline.as_millis())),
        };
        if let Err(e) = &result {
            warn!(unit_id = %unit_id, error = %e, "Notification failed");
        }
        AttemptRecord {
            stage: StageKind::Finalization,
            operation: "notify".to_string(),
            attempt: 1,
            succeeded: result.is_ok(),
            error: result.as_ref().err().map(OutcomeError::from),
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            at: Utc::now(),
        }
    }
}

#[async_trait]
impl Stage for FinalizationStage {
    fn kind(&self) -> StageKind {
        StageKind::Finalization
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> StageOutcome {
        let started = Instant::now();
        let unit_id = ctx.unit().id();
        let summary = UnitSummary::from_outcomes(unit_id, ctx.resolution(), ctx.outcomes());
        let mut payload = match serde_json::to_value(&summary) {
            Ok(payload) => payload,
            Err(e) => {
                return StageOutcome::failed(
                    StageKind::Finalization,
                    OutcomeError::terminal(format!("unencodable summary: {e}")),
                )
            }
        };

        let source = self.source.as_ref();
        let marked = self
            .retry
            .run(StageKind::Finalization, "mark_done", ctx.deadline(), move || {
                source.mark_done(unit_id)
            })
            .await;
        let attempts = marked.attempt_count();
        ctx.record_attempts(marked.attempts);

        if let Err(error) = marked.result {
            warn!(unit_id = %unit_id, error = %error, "Could not mark unit processed");
            let mut failed = StageOutcome::failed(StageKind::Finalization, error)
                .with_attempts(attempts)
                .with_duration(started.elapsed());
            payload["status"] = serde_json::Value::String(RecordStatus::Failed.to_string());
            failed.payload = payload;
            return failed;
        }

        let notified = self.notify(unit_id, &payload).await;
        payload["notified"] = serde_json::Value::Bool(notified.succeeded);
        ctx.record_attempts([notified]);

        info!(
            unit_id = %unit_id,
            status = %summary.status,
            scheduled = summary.scheduled,
            "Unit finalized"
        );
        StageOutcome::succeeded(StageKind::Finalization, payload)
            .with_attempts(attempts + 1)
            .with_duration(started.elapsed())
    }
}
