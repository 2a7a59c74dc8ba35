//! Classification: asks the analysis service for a verdict, falling back
//! to the collaborator's declared deterministic classifier.

use super::{encode, Stage, StageContext};
use crate::collaborators::ClassificationCollaborator;
use crate::core::{StageKind, StageOutcome};
use crate::pipeline::RetryPolicy;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Produces a [`Classification`](crate::collaborators::Classification) payload.
///
/// A service failure, whether terminal or retries exhausted, yields the
/// fallback verdict with `fallback_used = true` and a `fallback_reason`
/// field. It never fails the stage.
#[derive(Debug, Clone)]
pub struct ClassificationStage {
    classifier: Arc<dyn ClassificationCollaborator>,
    retry: RetryPolicy,
}

impl ClassificationStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(classifier: Arc<dyn ClassificationCollaborator>, retry: RetryPolicy) -> Self {
        Self { classifier, retry }
    }
}

#[async_trait]
impl Stage for ClassificationStage {
    fn kind(&self) -> StageKind {
        StageKind::Classification
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> StageOutcome {
        let started = Instant::now();
        let unit = ctx.unit();
        let classifier = self.classifier.as_ref();

        let outcome = self
            .retry
            .run(StageKind::Classification, "classify", ctx.deadline(), move || {
                classifier.classify(unit)
            })
            .await;
        let attempts = outcome.attempt_count();
        ctx.record_attempts(outcome.attempts);

        let payload = match outcome.result {
            Ok(classification) => {
                info!(
                    unit_id = %unit.id(),
                    qualifies = classification.qualifies,
                    meeting_requested = classification.meeting_requested,
                    score = classification.score,
                    "Unit classified"
                );
                encode(StageKind::Classification, &classification)
            }
            Err(error) => {
                let fallback = classifier.fallback(unit).as_fallback();
                warn!(
                    unit_id = %unit.id(),
                    error = %error,
                    qualifies = fallback.qualifies,
                    "Classification service unavailable, using fallback"
                );
                encode(StageKind::Classification, &fallback).map(|mut payload| {
                    payload["fallback_reason"] = serde_json::Value::String(error.message);
                    payload
                })
            }
        };

        match payload {
            Ok(payload) => StageOutcome::succeeded(StageKind::Classification, payload)
                .with_attempts(attempts)
                .with_duration(started.elapsed()),
            Err(failed) => failed.with_attempts(attempts),
        }
    }
}
