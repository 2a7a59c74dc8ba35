//! Pipeline builder with validation.

use super::{Pipeline, RetryPolicy, StageSpec};
use crate::collaborators::Collaborators;
use crate::config::{LeadflowConfig, TimeoutConfig};
use crate::core::StageKind;
use crate::errors::PipelineValidationError;
use crate::events::{NoOpEventSink, SharedEventSink};
use crate::gates::{DecisionGate, RejectEffect};
use crate::stages::{
    ClassificationStage, FinalizationStage, RetrievalStage, SchedulingStage, StageVariant,
};
use crate::store::SharedStateStore;
use std::collections::HashSet;
use std::sync::Arc;

/// Builder for validated pipelines.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    store: SharedStateStore,
    stages: Vec<StageSpec>,
    timeouts: TimeoutConfig,
    events: SharedEventSink,
}

impl PipelineBuilder {
    /// Creates an empty builder over a state store.
    #[must_use]
    pub fn new(store: SharedStateStore) -> Self {
        Self {
            store,
            stages: Vec::new(),
            timeouts: TimeoutConfig::default(),
            events: Arc::new(NoOpEventSink),
        }
    }

    /// The standard lead pipeline:
    /// retrieval, classification behind the business-sender gate
    /// (rejects skip the unit), scheduling behind the qualified
    /// meeting-request gate (rejects bypass scheduling), finalization.
    #[must_use]
    pub fn standard(collaborators: &Collaborators, store: SharedStateStore, config: &LeadflowConfig) -> Self {
        let retry = RetryPolicy::new(config.retry.clone());

        Self::new(store.clone())
            .with_timeouts(config.timeouts.clone())
            .stage(RetrievalStage::new(collaborators.source.clone(), retry.clone()))
            .gated_stage(
                ClassificationStage::new(collaborators.classifier.clone(), retry.clone()),
                DecisionGate::BusinessSender(config.sender_filter.clone()),
                RejectEffect::SkipUnit,
            )
            .gated_stage(
                SchedulingStage::new(
                    collaborators.scheduler.clone(),
                    store,
                    retry.clone(),
                    config.scheduling.clone(),
                ),
                DecisionGate::QualifiedMeetingRequest,
                RejectEffect::Bypass,
            )
            .stage(FinalizationStage::new(
                collaborators.source.clone(),
                collaborators.notifier.clone(),
                retry,
                config.timeouts.notification(),
            ))
    }

    /// Appends an ungated stage.
    #[must_use]
    pub fn stage(mut self, stage: impl Into<StageVariant>) -> Self {
        self.stages.push(StageSpec::new(stage));
        self
    }

    /// Appends a stage behind a gate.
    #[must_use]
    pub fn gated_stage(mut self, stage: impl Into<StageVariant>, gate: DecisionGate, on_reject: RejectEffect) -> Self {
        self.stages.push(StageSpec::new(stage).with_gate(gate, on_reject));
        self
    }

    /// Sets per-stage deadlines.
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_events(mut self, events: SharedEventSink) -> Self {
        self.events = events;
        self
    }

    /// Validates the stage order and builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline is empty, repeats a stage, puts
    /// retrieval anywhere but first, lacks a final finalization stage, or
    /// schedules without classifying first.
    pub fn build(self) -> Result<Pipeline, PipelineValidationError> {
        self.validate()?;
        let mut body = self.stages;
        let Some(finalization) = body.pop() else {
            return Err(PipelineValidationError::new("Pipeline must contain at least one stage"));
        };
        Ok(Pipeline::new(body, finalization, self.store, self.timeouts, self.events))
    }

    fn validate(&self) -> Result<(), PipelineValidationError> {
        let kinds: Vec<StageKind> = self.stages.iter().map(StageSpec::kind).collect();
        let names = |ks: &[StageKind]| ks.iter().map(ToString::to_string).collect::<Vec<_>>();

        if kinds.is_empty() {
            return Err(PipelineValidationError::new("Pipeline must contain at least one stage"));
        }

        let mut seen = HashSet::new();
        for kind in &kinds {
            if !seen.insert(*kind) {
                return Err(
                    PipelineValidationError::new(format!("Stage '{kind}' is declared more than once"))
                        .with_stages(vec![kind.to_string()]),
                );
            }
        }

        if let Some(pos) = kinds.iter().position(|k| *k == StageKind::Retrieval) {
            if pos != 0 {
                return Err(
                    PipelineValidationError::new("Retrieval must be the first stage")
                        .with_stages(names(&kinds)),
                );
            }
        }

        if kinds.last() != Some(&StageKind::Finalization) {
            return Err(
                PipelineValidationError::new("Finalization must be the last stage")
                    .with_stages(names(&kinds)),
            );
        }

        if let Some(pos) = kinds.iter().position(|k| *k == StageKind::Scheduling) {
            if !kinds[..pos].contains(&StageKind::Classification) {
                return Err(PipelineValidationError::new(
                    "Scheduling requires a classification stage before it",
                )
                .with_stages(vec![
                    StageKind::Classification.to_string(),
                    StageKind::Scheduling.to_string(),
                ]));
            }
        }

        let finalization_gated = self
            .stages
            .last()
            .is_some_and(|spec| spec.gate != DecisionGate::Always);
        if finalization_gated {
            return Err(
                PipelineValidationError::new("Finalization always runs and cannot be gated")
                    .with_stages(vec![StageKind::Finalization.to_string()]),
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStateStore;
    use crate::testing::FakeCollaborators;

    fn builder() -> (PipelineBuilder, Collaborators) {
        let collaborators = FakeCollaborators::new().bundle();
        (PipelineBuilder::new(Arc::new(InMemoryStateStore::new())), collaborators)
    }

    fn finalization(c: &Collaborators) -> FinalizationStage {
        FinalizationStage::new(
            c.source.clone(),
            c.notifier.clone(),
            RetryPolicy::default(),
            std::time::Duration::from_secs(1),
        )
    }

    #[test]
    fn test_standard_pipeline_is_valid() {
        let store: SharedStateStore = Arc::new(InMemoryStateStore::new());
        let collaborators = FakeCollaborators::new().bundle();
        let pipeline = PipelineBuilder::standard(&collaborators, store, &LeadflowConfig::default())
            .build()
            .unwrap();

        assert_eq!(pipeline.stage_kinds(), StageKind::ALL.to_vec());
        assert!(pipeline.retrieval().is_some());
    }

    #[test]
    fn test_empty_pipeline_rejected() {
        let (builder, _) = builder();
        assert!(builder.build().is_err());
    }

    #[test]
    fn test_missing_finalization_rejected() {
        let (builder, c) = builder();
        let err = builder
            .stage(ClassificationStage::new(c.classifier.clone(), RetryPolicy::default()))
            .build()
            .unwrap_err();
        assert!(err.message.contains("Finalization"));
    }

    #[test]
    fn test_duplicate_stage_rejected() {
        let (builder, c) = builder();
        let err = builder
            .stage(ClassificationStage::new(c.classifier.clone(), RetryPolicy::default()))
            .stage(ClassificationStage::new(c.classifier.clone(), RetryPolicy::default()))
            .stage(finalization(&c))
            .build()
            .unwrap_err();
        assert_eq!(err.stages, vec!["classification".to_string()]);
    }

    #[test]
    fn test_scheduling_without_classification_rejected() {
        let (builder, c) = builder();
        let store: SharedStateStore = Arc::new(InMemoryStateStore::new());
        let err = builder
            .stage(SchedulingStage::new(
                c.scheduler.clone(),
                store,
                RetryPolicy::default(),
                crate::config::SchedulingConfig::default(),
            ))
            .stage(finalization(&c))
            .build()
            .unwrap_err();
        assert!(err.message.contains("classification"));
    }

    #[test]
    fn test_retrieval_must_come_first() {
        let (builder, c) = builder();
        let err = builder
            .stage(ClassificationStage::new(c.classifier.clone(), RetryPolicy::default()))
            .stage(RetrievalStage::new(c.source.clone(), RetryPolicy::default()))
            .stage(finalization(&c))
            .build()
            .unwrap_err();
        assert!(err.message.contains("Retrieval"));
    }

    #[test]
    fn test_gated_finalization_rejected() {
        let (builder, c) = builder();
        let err = builder
            .gated_stage(finalization(&c), DecisionGate::QualifiedMeetingRequest, RejectEffect::Bypass)
            .build()
            .unwrap_err();
        assert!(err.message.contains("cannot be gated"));
    }

    #[test]
    fn test_minimal_pipeline_without_retrieval() {
        let (builder, c) = builder();
        let pipeline = builder.stage(finalization(&c)).build().unwrap();
        assert!(pipeline.retrieval().is_none());
    }
}
