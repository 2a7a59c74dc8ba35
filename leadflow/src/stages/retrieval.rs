//! Retrieval: fetches candidate units from the source collaborator.

use super::{Stage, StageContext};
use crate::collaborators::SourceCollaborator;
use crate::core::{StageKind, StageOutcome, UnitOfWork};
use crate::pipeline::{RetryOutcome, RetryPolicy};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Lists pending units, and records per unit how it was observed.
#[derive(Debug, Clone)]
pub struct RetrievalStage {
    source: Arc<dyn SourceCollaborator>,
    retry: RetryPolicy,
}

impl RetrievalStage {
    /// Creates the stage over a source.
    #[must_use]
    pub fn new(source: Arc<dyn SourceCollaborator>, retry: RetryPolicy) -> Self {
        Self { source, retry }
    }

    /// The wrapped source, also used for processed markers.
    #[must_use]
    pub fn source(&self) -> &Arc<dyn SourceCollaborator> {
        &self.source
    }

    /// Fetches at most `max_batch` pending units under the retry policy.
    pub async fn fetch_batch(&self, max_batch: usize, deadline: Duration) -> RetryOutcome<Vec<UnitOfWork>> {
        let source = self.source.as_ref();
        let outcome = self
            .retry
            .run(StageKind::Retrieval, "list_pending", deadline, move || {
                source.list_pending(max_batch)
            })
            .await;
        if let Ok(units) = &outcome.result {
            debug!(count = units.len(), max_batch, "Fetched pending units");
        }
        outcome
    }
}

#[async_trait]
impl Stage for RetrievalStage {
    fn kind(&self) -> StageKind {
        StageKind::Retrieval
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> StageOutcome {
        let unit = ctx.unit();
        StageOutcome::succeeded(
            StageKind::Retrieval,
            json!({
                "kind": unit.kind(),
                "arrived_at": unit.arrived_at(),
            }),
        )
    }
}
