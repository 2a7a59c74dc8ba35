//! Per-unit state machine.

use super::StageSpec;
use crate::cancellation::CancellationToken;
use crate::config::TimeoutConfig;
use crate::core::{ProcessingRecord, RecordStatus, StageKind, StageOutcome, UnitOfWork};
use crate::errors::StoreError;
use crate::events::{LifecycleEvent, SharedEventSink};
use crate::gates::RejectEffect;
use crate::stages::{RetrievalStage, Stage, StageContext, StageVariant};
use crate::store::SharedStateStore;
use serde_json::json;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// A validated, ordered set of stages ending in finalization.
///
/// Built by [`PipelineBuilder`](super::PipelineBuilder).
#[derive(Debug, Clone)]
pub struct Pipeline {
    body: Vec<StageSpec>,
    finalization: StageSpec,
    store: SharedStateStore,
    timeouts: TimeoutConfig,
    events: SharedEventSink,
}

impl Pipeline {
    pub(super) fn new(
        body: Vec<StageSpec>,
        finalization: StageSpec,
        store: SharedStateStore,
        timeouts: TimeoutConfig,
        events: SharedEventSink,
    ) -> Self {
        Self {
            body,
            finalization,
            store,
            timeouts,
            events,
        }
    }

    /// Stage names in execution order.
    #[must_use]
    pub fn stage_kinds(&self) -> Vec<StageKind> {
        self.body
            .iter()
            .chain(std::iter::once(&self.finalization))
            .map(StageSpec::kind)
            .collect()
    }

    /// The retrieval stage, if declared.
    #[must_use]
    pub fn retrieval(&self) -> Option<&RetrievalStage> {
        self.body.iter().find_map(|spec| match &spec.stage {
            StageVariant::Retrieval(stage) => Some(stage),
            _ => None,
        })
    }

    /// The state store records are committed to.
    #[must_use]
    pub fn store(&self) -> &SharedStateStore {
        &self.store
    }

    /// The event sink.
    #[must_use]
    pub fn events(&self) -> &SharedEventSink {
        &self.events
    }

    /// Per-stage deadlines.
    #[must_use]
    pub fn timeouts(&self) -> &TimeoutConfig {
        &self.timeouts
    }

    /// Drives a claimed unit to a terminal status.
    ///
    /// The record must be `in_progress` (claimed by the caller). Stages that
    /// already have a settled outcome are not re-run, and an existing
    /// finalization outcome is never duplicated, so a run may resume a
    /// record left behind by an interrupted one.
    ///
    /// Returns the stored record: terminal normally, `pending` again if the
    /// run was cancelled before finalization.
    ///
    /// # Errors
    ///
    /// Store failures are returned; the record then stays `in_progress`
    /// until recovered.
    #[instrument(skip_all, fields(unit_id = %unit.id(), %run_id))]
    pub async fn run(
        &self,
        unit: &UnitOfWork,
        run_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<ProcessingRecord, StoreError> {
        let id = unit.id();
        let mut working = self
            .store
            .get_record(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        if working.status != RecordStatus::InProgress {
            return Err(StoreError::StatusConflict {
                unit_id: id.clone(),
                expected: RecordStatus::InProgress,
                actual: working.status,
            });
        }

        let mut resolution = if working.failed_stage().is_some() {
            RecordStatus::Failed
        } else {
            RecordStatus::Completed
        };
        let mut bypass: Option<String> = None;

        for spec in &self.body {
            if resolution == RecordStatus::Failed {
                break;
            }
            let stage = spec.kind();

            if let Some(reason) = &bypass {
                if working.settled_outcome(stage).is_none() {
                    self.commit_skip(&mut working, stage, reason.clone()).await?;
                }
                continue;
            }

            if let Some(settled) = working.settled_outcome(stage) {
                if settled.is_skipped() {
                    if spec.on_reject == RejectEffect::SkipUnit {
                        resolution = RecordStatus::Skipped;
                    }
                    let reason = settled
                        .payload
                        .get("reason")
                        .and_then(|r| r.as_str())
                        .unwrap_or("bypassed")
                        .to_string();
                    bypass = Some(reason);
                }
                debug!(%stage, "Stage already settled, not re-running");
                continue;
            }

            if cancel.is_cancelled() {
                return self.release(unit, cancel).await;
            }

            let decision = spec.gate.evaluate(stage, unit, &working.outcomes);
            if !decision.admitted {
                info!(%stage, gate = spec.gate.name(), reason = %decision.reason, "Gate skipped stage");
                if spec.on_reject == RejectEffect::SkipUnit {
                    resolution = RecordStatus::Skipped;
                }
                self.commit_skip(&mut working, stage, decision.reason.clone()).await?;
                bypass = Some(decision.reason);
                continue;
            }

            let outcome = self.execute(&mut working, unit, spec, resolution).await?;
            if outcome.is_failure() {
                resolution = RecordStatus::Failed;
            }
        }

        let finalized = working
            .outcomes
            .iter()
            .rev()
            .find(|o| o.stage == StageKind::Finalization)
            .cloned();
        let final_outcome = match finalized {
            Some(existing) => {
                debug!("Finalization already recorded, not re-running");
                existing
            }
            None => {
                if cancel.is_cancelled() {
                    return self.release(unit, cancel).await;
                }
                self.execute(&mut working, unit, &self.finalization, resolution)
                    .await?
            }
        };
        if final_outcome.is_failure() {
            resolution = RecordStatus::Failed;
        }

        let record = self
            .store
            .compare_and_set_status(id, RecordStatus::InProgress, resolution, None)
            .await?;
        info!(status = %record.status, scheduled = record.scheduled(), "Unit finished");
        self.events
            .emit(
                LifecycleEvent::UnitFinished,
                json!({
                    "unit_id": id,
                    "status": record.status,
                    "scheduled": record.scheduled(),
                    "skipped_stage": record.skipped_stage(),
                    "failed_stage": record.failed_stage(),
                }),
            )
            .await;
        Ok(record)
    }

    async fn execute(
        &self,
        working: &mut ProcessingRecord,
        unit: &UnitOfWork,
        spec: &StageSpec,
        resolution: RecordStatus,
    ) -> Result<StageOutcome, StoreError> {
        let id = unit.id();
        let stage = spec.kind();

        self.store.set_current_stage(id, stage).await?;
        working.current_stage = Some(stage);
        self.events
            .emit(LifecycleEvent::StageStarted, json!({"unit_id": id, "stage": stage}))
            .await;

        let ctx = StageContext::new(unit, &working.outcomes, self.timeouts.for_stage(stage))
            .with_resolution(resolution);
        let outcome = spec.stage.execute(&ctx).await;
        let attempts = ctx.take_attempts();
        drop(ctx);

        for attempt in attempts {
            self.store.append_attempt(id, attempt.clone()).await?;
            working.audit.push(attempt);
        }
        self.commit(working, outcome.clone()).await?;

        if outcome.is_failure() {
            let error = outcome.error.as_ref().map(|e| e.message.as_str()).unwrap_or_default();
            warn!(%stage, attempts = outcome.attempts, error, "Stage failed");
            self.events
                .emit(
                    LifecycleEvent::StageFailed,
                    json!({"unit_id": id, "stage": stage, "error": outcome.error}),
                )
                .await;
        } else {
            debug!(%stage, attempts = outcome.attempts, duration_ms = outcome.duration_ms, "Stage completed");
            self.events
                .emit(
                    LifecycleEvent::StageCompleted,
                    json!({"unit_id": id, "stage": stage, "duration_ms": outcome.duration_ms}),
                )
                .await;
        }
        Ok(outcome)
    }

    async fn commit(&self, working: &mut ProcessingRecord, outcome: StageOutcome) -> Result<(), StoreError> {
        // A stage replaying a ledger entry hands back an outcome already on record.
        if working.outcomes.contains(&outcome) {
            return Ok(());
        }
        let id = working.unit_id.clone();
        self.store.append_outcome(&id, outcome.clone()).await?;
        working.outcomes.push(outcome);
        Ok(())
    }

    async fn commit_skip(
        &self,
        working: &mut ProcessingRecord,
        stage: StageKind,
        reason: String,
    ) -> Result<(), StoreError> {
        let data = json!({"unit_id": working.unit_id, "stage": stage, "reason": reason});
        self.commit(working, StageOutcome::skipped(stage, reason)).await?;
        self.events.emit(LifecycleEvent::StageSkipped, data).await;
        Ok(())
    }

    async fn release(&self, unit: &UnitOfWork, cancel: &CancellationToken) -> Result<ProcessingRecord, StoreError> {
        let record = self
            .store
            .compare_and_set_status(unit.id(), RecordStatus::InProgress, RecordStatus::Pending, None)
            .await?;
        let reason = cancel.reason().unwrap_or_default();
        info!(reason = %reason, "Run cancelled, claim released");
        self.events
            .emit(
                LifecycleEvent::UnitCancelled,
                json!({"unit_id": unit.id(), "reason": reason}),
            )
            .await;
        Ok(record)
    }
}
