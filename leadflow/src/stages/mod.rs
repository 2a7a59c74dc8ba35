//! Stage contract and the closed set of stage variants.
//!
//! A stage wraps one collaborator and turns every call result into a
//! [`StageOutcome`]. Stages never return errors: collaborator failures are
//! classified by the retry policy and reported as failed outcomes.

mod classification;
mod context;
mod finalization;
mod retrieval;
mod scheduling;

pub use classification::ClassificationStage;
pub use context::StageContext;
pub use finalization::{FinalizationStage, UnitSummary};
pub use retrieval::RetrievalStage;
pub use scheduling::{candidate_windows, BookingDetails, SchedulingStage};

use crate::core::{OutcomeError, StageKind, StageOutcome};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt::Debug;

/// Trait for pipeline stages.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// The stage's name.
    fn kind(&self) -> StageKind;

    /// Executes the stage for one unit.
    ///
    /// Must be safe to re-invoke for the same unit.
    async fn execute(&self, ctx: &StageContext<'_>) -> StageOutcome;
}

/// The stages a pipeline may be built from.
#[derive(Debug, Clone)]
pub enum StageVariant {
    /// Source bookkeeping.
    Retrieval(RetrievalStage),
    /// Hot-lead and meeting-request verdict.
    Classification(ClassificationStage),
    /// Calendar booking.
    Scheduling(SchedulingStage),
    /// Processed marker and notification.
    Finalization(FinalizationStage),
}

#[async_trait]
impl Stage for StageVariant {
    fn kind(&self) -> StageKind {
        match self {
            Self::Retrieval(_) => StageKind::Retrieval,
            Self::Classification(_) => StageKind::Classification,
            Self::Scheduling(_) => StageKind::Scheduling,
            Self::Finalization(_) => StageKind::Finalization,
        }
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> StageOutcome {
        match self {
            Self::Retrieval(stage) => stage.execute(ctx).await,
            Self::Classification(stage) => stage.execute(ctx).await,
            Self::Scheduling(stage) => stage.execute(ctx).await,
            Self::Finalization(stage) => stage.execute(ctx).await,
        }
    }
}

impl From<RetrievalStage> for StageVariant {
    fn from(stage: RetrievalStage) -> Self {
        Self::Retrieval(stage)
    }
}

impl From<ClassificationStage> for StageVariant {
    fn from(stage: ClassificationStage) -> Self {
        Self::Classification(stage)
    }
}

impl From<SchedulingStage> for StageVariant {
    fn from(stage: SchedulingStage) -> Self {
        Self::Scheduling(stage)
    }
}

impl From<FinalizationStage> for StageVariant {
    fn from(stage: FinalizationStage) -> Self {
        Self::Finalization(stage)
    }
}

/// Serializes a stage result, or produces the failed outcome to return instead.
fn encode<T: Serialize>(stage: StageKind, value: &T) -> Result<serde_json::Value, StageOutcome> {
    serde_json::to_value(value).map_err(|e| {
        StageOutcome::failed(stage, OutcomeError::terminal(format!("unencodable result: {e}")))
    })
}
