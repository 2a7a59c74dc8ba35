//! End-to-end batch scenarios against in-memory collaborators.

#[cfg(test)]
mod tests {
    use crate::cancellation::CancellationToken;
    use crate::collaborators::Classification;
    use crate::config::LeadflowConfig;
    use crate::core::{OutcomeStatus, RecordStatus, StageKind, UnitId, UnitOfWork};
    use crate::errors::{CollaboratorError, LeadflowError};
    use crate::events::{CollectingEventSink, LifecycleEvent};
    use crate::orchestrator::{Orchestrator, UnitDisposition};
    use crate::pipeline::{JitterStrategy, PipelineBuilder, RetryConfig, RetryPolicy};
    use crate::stages::{ClassificationStage, FinalizationStage, SchedulingStage, Stage, StageContext};
    use crate::store::{InMemoryStateStore, StateStore};
    use crate::testing::{
        assert_finalized_once, assert_record_status, assert_stage_status, email_unit,
        hot_meeting_request, hot_without_meeting, FakeCollaborators,
    };
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;
    use uuid::Uuid;

    struct Harness {
        fakes: FakeCollaborators,
        store: Arc<InMemoryStateStore>,
        events: Arc<CollectingEventSink>,
        orchestrator: Orchestrator,
    }

    fn fast_config() -> LeadflowConfig {
        LeadflowConfig::default().with_retry(
            RetryConfig::default()
                .with_base_delay_ms(1)
                .with_max_delay_ms(2)
                .with_jitter(JitterStrategy::None),
        )
    }

    fn orchestrator_over(fakes: &FakeCollaborators, store: Arc<InMemoryStateStore>) -> (Orchestrator, Arc<CollectingEventSink>) {
        let events = Arc::new(CollectingEventSink::new());
        let orchestrator =
            Orchestrator::from_config(&fakes.bundle(), store, events.clone(), &fast_config()).unwrap();
        (orchestrator, events)
    }

    fn harness(units: Vec<UnitOfWork>) -> Harness {
        let fakes = FakeCollaborators::with_units(units);
        let store = Arc::new(InMemoryStateStore::new());
        let (orchestrator, events) = orchestrator_over(&fakes, store.clone());
        Harness {
            fakes,
            store,
            events,
            orchestrator,
        }
    }

    fn business_email(id: &str) -> UnitOfWork {
        email_unit(id, "ceo@acme.io", "Partnership", "Can we schedule a call next week?")
    }

    async fn record(store: &InMemoryStateStore, id: &str) -> crate::core::ProcessingRecord {
        store.get_record(&UnitId::new(id)).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_lead_scenarios() {
        let h = harness(vec![
            business_email("msg_1"),
            business_email("msg_2"),
            email_unit(
                "msg_3",
                "cto@startup.io",
                "Urgent: pricing",
                "We are interested in a demo. Can we schedule a meeting call?",
            ),
        ]);
        h.fakes.classifier.set("msg_1", Ok(hot_meeting_request()));
        h.fakes.classifier.set("msg_2", Ok(hot_without_meeting()));
        h.fakes.classifier.set(
            "msg_3",
            Err(CollaboratorError::retryable("analysis service unreachable")),
        );

        let summary = h
            .orchestrator
            .run_batch(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.listed, 3);
        assert_eq!(summary.completed, 3);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.fallback_classifications, 1);

        let msg_1 = record(&h.store, "msg_1").await;
        assert_record_status(&msg_1, RecordStatus::Completed);
        assert!(msg_1.scheduled());
        assert_finalized_once(&msg_1);
        assert_eq!(
            summary.report("msg_1").unwrap().disposition,
            UnitDisposition::Completed {
                scheduled: true,
                skipped_stage: None
            }
        );

        let msg_2 = record(&h.store, "msg_2").await;
        assert_record_status(&msg_2, RecordStatus::Completed);
        assert!(!msg_2.scheduled());
        assert_eq!(msg_2.skipped_stage(), Some(StageKind::Scheduling));
        assert_finalized_once(&msg_2);
        let final_payload = &msg_2.successful_outcome(StageKind::Finalization).unwrap().payload;
        assert_eq!(final_payload["scheduled"], false);
        assert_eq!(final_payload["skipped_stage"], "scheduling");

        let msg_3 = record(&h.store, "msg_3").await;
        assert_ne!(msg_3.status, RecordStatus::Failed);
        let verdict: Classification = msg_3
            .successful_outcome(StageKind::Classification)
            .unwrap()
            .payload_as()
            .unwrap();
        assert!(verdict.fallback_used);
        assert_finalized_once(&msg_3);

        assert_eq!(h.events.count(LifecycleEvent::UnitObserved), 3);
        assert_eq!(h.events.count(LifecycleEvent::UnitClaimed), 3);
        assert_eq!(h.events.count(LifecycleEvent::BatchFinished), 1);
    }

    #[tokio::test]
    async fn test_retry_ceiling_is_exact() {
        let h = harness(vec![business_email("msg_1")]);
        h.fakes.classifier.set(
            "msg_1",
            Err(CollaboratorError::retryable("analysis service unreachable")),
        );

        h.orchestrator
            .run_batch(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(h.fakes.classifier.calls(), 3);
        let rec = record(&h.store, "msg_1").await;
        let classify_attempts: Vec<_> = rec
            .audit
            .iter()
            .filter(|a| a.stage == StageKind::Classification)
            .collect();
        assert_eq!(classify_attempts.len(), 3);
        assert!(classify_attempts.iter().all(|a| !a.succeeded));
        assert_eq!(
            rec.successful_outcome(StageKind::Classification)
                .unwrap()
                .attempts,
            3
        );
    }

    #[tokio::test]
    async fn test_terminal_units_are_not_readmitted() {
        let fakes = FakeCollaborators::with_units(vec![business_email("msg_1")]);
        fakes.classifier.set("msg_1", Ok(hot_meeting_request()));
        let store = Arc::new(InMemoryStateStore::new());
        let (first, _) = orchestrator_over(&fakes, store.clone());
        first.run_batch(&CancellationToken::new()).await.unwrap();

        // A fresh source that lost its processed marker lists the unit again.
        let relisting = FakeCollaborators::with_units(vec![business_email("msg_1")]);
        relisting.classifier.set("msg_1", Ok(hot_meeting_request()));
        let (second, _) = orchestrator_over(&relisting, store.clone());
        let summary = second.run_batch(&CancellationToken::new()).await.unwrap();

        assert_eq!(summary.already_terminal, 1);
        assert_eq!(summary.completed, 0);
        assert_eq!(relisting.classifier.calls(), 0);
        assert_eq!(relisting.scheduler.booking_count(), 0);
        assert_eq!(relisting.source.marked(), vec![UnitId::new("msg_1")]);
        assert_finalized_once(&record(&store, "msg_1").await);
        assert_eq!(fakes.scheduler.booking_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_orchestrators_process_each_unit_once() {
        let units: Vec<UnitOfWork> = (0..8).map(|i| business_email(&format!("msg_{i}"))).collect();
        let fakes = FakeCollaborators::with_units(units);
        let classifier = Arc::new(crate::testing::FakeClassifier::returning(hot_meeting_request()));
        let fakes = FakeCollaborators {
            classifier,
            ..fakes
        };
        let store = Arc::new(InMemoryStateStore::new());
        let (a, _) = orchestrator_over(&fakes, store.clone());
        let (b, _) = orchestrator_over(&fakes, store.clone());

        let cancel = CancellationToken::new();
        let (left, right) = tokio::join!(a.run_batch(&cancel), b.run_batch(&cancel));
        let (left, right) = (left.unwrap(), right.unwrap());

        assert_eq!(left.completed + right.completed, 8);
        assert_eq!(fakes.scheduler.booking_count(), 8);
        for i in 0..8 {
            let rec = record(&store, &format!("msg_{i}")).await;
            assert_record_status(&rec, RecordStatus::Completed);
            assert_finalized_once(&rec);
        }
        let status = a.workflow_status().await.unwrap();
        assert_eq!(status.completed, 8);
        assert_eq!(status.total(), 8);
    }

    #[tokio::test]
    async fn test_claimed_unit_is_a_conflict() {
        let unit = business_email("msg_1");
        let h = harness(vec![unit.clone()]);
        h.store.create_if_absent(&unit).await.unwrap();
        h.store
            .compare_and_set_status(unit.id(), RecordStatus::Pending, RecordStatus::InProgress, Some(Uuid::new_v4()))
            .await
            .unwrap();

        let summary = h
            .orchestrator
            .run_batch(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.claim_conflicts, 1);
        assert_eq!(h.events.count(LifecycleEvent::UnitClaimConflict), 1);
        assert_eq!(h.fakes.classifier.calls(), 0);
        assert_record_status(&record(&h.store, "msg_1").await, RecordStatus::InProgress);
    }

    #[tokio::test]
    async fn test_stale_claim_is_recovered_and_resumed() {
        let unit = business_email("msg_1");
        let h = harness(vec![unit.clone()]);
        h.fakes.classifier.set("msg_1", Ok(hot_without_meeting()));
        h.store.create_if_absent(&unit).await.unwrap();
        h.store
            .compare_and_set_status(unit.id(), RecordStatus::Pending, RecordStatus::InProgress, Some(Uuid::new_v4()))
            .await
            .unwrap();

        assert!(h
            .orchestrator
            .recover_stale(Duration::from_secs(3600))
            .await
            .unwrap()
            .is_empty());
        let released = h.orchestrator.recover_stale(Duration::ZERO).await.unwrap();
        assert_eq!(released, vec![UnitId::new("msg_1")]);

        let summary = h
            .orchestrator
            .run_batch(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.completed, 1);
        assert_finalized_once(&record(&h.store, "msg_1").await);
    }

    #[tokio::test]
    async fn test_cancelled_batch_leaves_units_pending() {
        let h = harness(vec![business_email("msg_1"), business_email("msg_2")]);
        let cancel = CancellationToken::new();
        cancel.cancel("shutdown");

        let summary = h.orchestrator.run_batch(&cancel).await.unwrap();
        assert_eq!(summary.cancelled, 2);
        assert_eq!(h.orchestrator.workflow_status().await.unwrap().pending, 2);

        let summary = h
            .orchestrator
            .run_batch(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.processed(), 2);
        assert_eq!(h.orchestrator.workflow_status().await.unwrap().pending, 0);
    }

    #[tokio::test]
    async fn test_unit_failure_does_not_abort_batch() {
        let h = harness(vec![business_email("msg_1"), business_email("msg_2")]);
        h.fakes.classifier.set("msg_1", Ok(hot_meeting_request()));
        h.fakes.classifier.set("msg_2", Ok(hot_without_meeting()));
        h.fakes.scheduler.set_available(false);

        let summary = h
            .orchestrator
            .run_batch(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.completed, 1);
        assert_eq!(
            summary.report("msg_1").unwrap().disposition,
            UnitDisposition::Failed {
                stage: Some(StageKind::Scheduling)
            }
        );
        let failed = record(&h.store, "msg_1").await;
        assert_stage_status(&failed, StageKind::Scheduling, OutcomeStatus::Failed);
        assert_finalized_once(&failed);
    }

    #[tokio::test]
    async fn test_listing_retries_then_fails_batch() {
        let h = harness(vec![business_email("msg_1")]);
        h.fakes.source.fail_listing_times(2);
        let summary = h
            .orchestrator
            .run_batch(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.listed, 1);

        h.fakes
            .source
            .fail_listing(CollaboratorError::terminal("mailbox credentials revoked"));
        let err = h
            .orchestrator
            .run_batch(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LeadflowError::Collaborator(_)));
    }

    #[tokio::test]
    async fn test_rerun_scheduling_returns_recorded_booking() {
        let h = harness(vec![business_email("msg_1")]);
        h.fakes.classifier.set("msg_1", Ok(hot_meeting_request()));
        h.orchestrator
            .run_batch(&CancellationToken::new())
            .await
            .unwrap();
        let calls_before = h.fakes.scheduler.booking_calls();
        let recorded = record(&h.store, "msg_1")
            .await
            .successful_outcome(StageKind::Scheduling)
            .cloned()
            .unwrap();

        // Simulates a crash-and-retry where the run lost its working copy.
        let config = fast_config();
        let stage = SchedulingStage::new(
            h.fakes.scheduler.clone(),
            h.store.clone(),
            RetryPolicy::new(config.retry.clone()),
            config.scheduling,
        );
        let unit = business_email("msg_1");
        let ctx = StageContext::new(&unit, &[], Duration::from_secs(5));
        let outcome = stage.execute(&ctx).await;

        assert_eq!(outcome, recorded);
        assert_eq!(h.fakes.scheduler.booking_calls(), calls_before);
        assert_eq!(h.fakes.scheduler.booking_count(), 1);
    }

    #[tokio::test]
    async fn test_pipeline_without_retrieval_is_rejected() {
        let fakes = FakeCollaborators::new();
        let retry = RetryPolicy::default();
        let pipeline = PipelineBuilder::new(Arc::new(InMemoryStateStore::new()))
            .stage(ClassificationStage::new(fakes.classifier.clone(), retry.clone()))
            .stage(FinalizationStage::new(
                fakes.source.clone(),
                fakes.notifier.clone(),
                retry,
                Duration::from_secs(1),
            ))
            .build()
            .unwrap();

        let err = Orchestrator::new(pipeline, fast_config().orchestrator).unwrap_err();
        assert!(matches!(err, LeadflowError::Validation(_)));
    }

    #[tokio::test]
    async fn test_record_lookup() {
        let h = harness(vec![business_email("msg_1")]);
        h.orchestrator
            .run_batch(&CancellationToken::new())
            .await
            .unwrap();

        assert!(h
            .orchestrator
            .record(&UnitId::new("msg_1"))
            .await
            .unwrap()
            .is_some());
        assert!(h
            .orchestrator
            .record(&UnitId::new("unknown"))
            .await
            .unwrap()
            .is_none());
    }
}
