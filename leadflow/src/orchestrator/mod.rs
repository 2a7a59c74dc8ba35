//! Batch orchestration over the pipeline.
//!
//! The orchestrator lists pending units through the retrieval stage's
//! source, claims each one with a compare-and-set on the state store, and
//! drives claimed units through the pipeline with a bounded number of
//! concurrent runs. Units already owned by another run, or already
//! terminal, are never re-admitted.

mod summary;

#[cfg(test)]
mod integration_tests;

pub use summary::{BatchSummary, UnitDisposition, UnitReport, WorkflowStatus};

use crate::cancellation::CancellationToken;
use crate::collaborators::Collaborators;
use crate::config::{LeadflowConfig, OrchestratorConfig};
use crate::core::{ProcessingRecord, RecordStatus, StageKind, UnitId, UnitOfWork};
use crate::errors::{LeadflowError, PipelineValidationError, StoreError};
use crate::events::{LifecycleEvent, SharedEventSink};
use crate::pipeline::{Pipeline, PipelineBuilder};
use crate::stages::RetrievalStage;
use crate::store::SharedStateStore;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Drives batches of units through a pipeline.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    pipeline: Arc<Pipeline>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Creates an orchestrator over a built pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline has no retrieval stage to list
    /// units from.
    pub fn new(pipeline: Pipeline, config: OrchestratorConfig) -> Result<Self, LeadflowError> {
        if pipeline.retrieval().is_none() {
            return Err(PipelineValidationError::new(
                "Orchestrator requires a pipeline with a retrieval stage",
            )
            .with_stages(pipeline.stage_kinds().iter().map(ToString::to_string).collect())
            .into());
        }
        Ok(Self {
            pipeline: Arc::new(pipeline),
            config,
        })
    }

    /// Builds the standard pipeline from configuration and wraps it.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn from_config(
        collaborators: &Collaborators,
        store: SharedStateStore,
        events: SharedEventSink,
        config: &LeadflowConfig,
    ) -> Result<Self, LeadflowError> {
        config.validate()?;
        let pipeline = PipelineBuilder::standard(collaborators, store, config)
            .with_events(events)
            .build()?;
        Self::new(pipeline, config.orchestrator.clone())
    }

    /// The pipeline units are driven through.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Lists pending units and drives each one to a terminal status.
    ///
    /// Per-unit failures are reported in the summary and never abort the
    /// rest of the batch.
    ///
    /// # Errors
    ///
    /// Returns an error only if the source cannot be listed.
    #[instrument(skip_all, fields(batch_id = %Uuid::new_v4()))]
    pub async fn run_batch(&self, cancel: &CancellationToken) -> Result<BatchSummary, LeadflowError> {
        let fetched = self
            .retrieval()?
            .fetch_batch(
                self.config.max_batch,
                self.pipeline.timeouts().for_stage(StageKind::Retrieval),
            )
            .await;
        let attempts = fetched.attempt_count();
        let units = fetched.result?;
        info!(listed = units.len(), attempts, "Listed pending units");

        let reports: Vec<UnitReport> = stream::iter(units.iter())
            .map(|unit| self.process_unit(unit, cancel))
            .buffer_unordered(self.config.worker_count.max(1))
            .collect()
            .await;

        let mut summary = BatchSummary::new(units.len());
        for report in reports {
            summary.record(report);
        }

        info!(
            listed = summary.listed,
            completed = summary.completed,
            failed = summary.failed,
            skipped = summary.skipped,
            claim_conflicts = summary.claim_conflicts,
            "Batch finished"
        );
        self.pipeline
            .events()
            .emit(
                LifecycleEvent::BatchFinished,
                json!({
                    "listed": summary.listed,
                    "completed": summary.completed,
                    "failed": summary.failed,
                    "skipped": summary.skipped,
                    "scheduled": summary.scheduled,
                    "claim_conflicts": summary.claim_conflicts,
                    "already_terminal": summary.already_terminal,
                    "cancelled": summary.cancelled,
                    "errored": summary.errored,
                }),
            )
            .await;
        Ok(summary)
    }

    /// Per-status record counts from the state store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be listed.
    pub async fn workflow_status(&self) -> Result<WorkflowStatus, LeadflowError> {
        let records = self.pipeline.store().list_records().await?;
        Ok(WorkflowStatus::from_records(&records))
    }

    /// A unit's processing record.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn record(&self, unit_id: &UnitId) -> Result<Option<ProcessingRecord>, LeadflowError> {
        Ok(self.pipeline.store().get_record(unit_id).await?)
    }

    /// Moves `in_progress` records not updated for `older_than` back to
    /// `pending` so a later batch resumes them.
    ///
    /// Returns the released unit identifiers.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails for a reason other than a lost
    /// compare-and-set.
    #[instrument(skip(self))]
    pub async fn recover_stale(&self, older_than: Duration) -> Result<Vec<UnitId>, LeadflowError> {
        let store = self.pipeline.store();
        let now = Utc::now();
        let mut released = Vec::new();

        for record in store.list_records().await? {
            if record.status != RecordStatus::InProgress {
                continue;
            }
            let stale = (now - record.updated_at)
                .to_std()
                .is_ok_and(|age| age >= older_than);
            if !stale {
                continue;
            }
            match store
                .compare_and_set_status(&record.unit_id, RecordStatus::InProgress, RecordStatus::Pending, None)
                .await
            {
                Ok(_) => {
                    info!(unit_id = %record.unit_id, run_id = ?record.run_id, "Released stale claim");
                    released.push(record.unit_id);
                }
                Err(err) if err.is_conflict() => {
                    debug!(unit_id = %record.unit_id, "Stale claim moved on before release");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(released)
    }

    /// Releases claims older than the configured `stale_claim_after_secs`.
    ///
    /// # Errors
    ///
    /// See [`Orchestrator::recover_stale`].
    pub async fn recover_stale_claims(&self) -> Result<Vec<UnitId>, LeadflowError> {
        self.recover_stale(Duration::from_secs(self.config.stale_claim_after_secs))
            .await
    }

    fn retrieval(&self) -> Result<&RetrievalStage, LeadflowError> {
        self.pipeline.retrieval().ok_or_else(|| {
            PipelineValidationError::new("Orchestrator requires a pipeline with a retrieval stage")
                .into()
        })
    }

    async fn process_unit(&self, unit: &UnitOfWork, cancel: &CancellationToken) -> UnitReport {
        match self.drive(unit, cancel).await {
            Ok((disposition, record)) => {
                UnitReport::new(unit.id().clone(), disposition, record.as_ref())
            }
            Err(err) => {
                warn!(unit_id = %unit.id(), error = %err, "Unit run hit a store error");
                UnitReport::new(
                    unit.id().clone(),
                    UnitDisposition::Errored {
                        message: err.to_string(),
                    },
                    None,
                )
            }
        }
    }

    async fn drive(
        &self,
        unit: &UnitOfWork,
        cancel: &CancellationToken,
    ) -> Result<(UnitDisposition, Option<ProcessingRecord>), StoreError> {
        let store = self.pipeline.store();
        let events = self.pipeline.events();
        let id = unit.id();

        let record = store.create_if_absent(unit).await?;
        events
            .emit(
                LifecycleEvent::UnitObserved,
                json!({"unit_id": id, "status": record.status}),
            )
            .await;

        if record.is_terminal() {
            debug!(unit_id = %id, status = %record.status, "Unit already terminal");
            self.remark_done(id).await;
            return Ok((UnitDisposition::AlreadyTerminal, None));
        }
        if record.status == RecordStatus::InProgress {
            self.claim_conflict(id, record.run_id).await;
            return Ok((UnitDisposition::ClaimConflict, None));
        }
        if cancel.is_cancelled() {
            return Ok((UnitDisposition::Cancelled, None));
        }

        let run_id = Uuid::new_v4();
        match store
            .compare_and_set_status(id, RecordStatus::Pending, RecordStatus::InProgress, Some(run_id))
            .await
        {
            Ok(_) => {}
            Err(err) if err.is_conflict() => {
                self.claim_conflict(id, None).await;
                return Ok((UnitDisposition::ClaimConflict, None));
            }
            Err(err) => return Err(err),
        }
        info!(unit_id = %id, %run_id, "Claimed unit");
        events
            .emit(LifecycleEvent::UnitClaimed, json!({"unit_id": id, "run_id": run_id}))
            .await;

        let record = self.pipeline.run(unit, run_id, cancel).await?;
        Ok((UnitDisposition::from_record(&record), Some(record)))
    }

    async fn claim_conflict(&self, unit_id: &UnitId, owner: Option<Uuid>) {
        debug!(%unit_id, owner = ?owner, "Unit owned by another run");
        self.pipeline
            .events()
            .emit(
                LifecycleEvent::UnitClaimConflict,
                json!({"unit_id": unit_id, "owner": owner}),
            )
            .await;
    }

    /// The source re-listed a finished unit, so its processed marker was
    /// probably lost. Re-issue it once, best effort.
    async fn remark_done(&self, unit_id: &UnitId) {
        let Some(retrieval) = self.pipeline.retrieval() else {
            return;
        };
        let deadline = self.pipeline.timeouts().for_stage(StageKind::Finalization);
        match tokio::time::timeout(deadline, retrieval.source().mark_done(unit_id)).await {
            Ok(Ok(())) => debug!(%unit_id, "Re-marked terminal unit as done"),
            Ok(Err(err)) => warn!(%unit_id, error = %err, "Could not re-mark terminal unit"),
            Err(_) => warn!(%unit_id, "Re-marking terminal unit timed out"),
        }
    }
}
