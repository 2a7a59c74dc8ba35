//! Integration tests for per-unit pipeline runs.

#[cfg(test)]
mod tests {
    use crate::cancellation::CancellationToken;
    use crate::collaborators::Classification;
    use crate::config::LeadflowConfig;
    use crate::core::{
        CompletionPath, OutcomeStatus, RecordStatus, StageKind, StageOutcome, UnitOfWork,
    };
    use crate::errors::{CollaboratorError, StoreError};
    use crate::events::{CollectingEventSink, LifecycleEvent};
    use crate::pipeline::{JitterStrategy, Pipeline, PipelineBuilder, RetryConfig};
    use crate::store::{InMemoryStateStore, StateStore};
    use crate::testing::{
        assert_finalized_once, assert_record_status, assert_stage_order, assert_stage_status,
        email_unit, hot_meeting_request, hot_without_meeting, FakeClassifier, FakeCollaborators,
    };
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use uuid::Uuid;

    const ALL_STAGES: [StageKind; 4] = StageKind::ALL;

    struct Harness {
        fakes: FakeCollaborators,
        store: Arc<InMemoryStateStore>,
        events: Arc<CollectingEventSink>,
        pipeline: Pipeline,
    }

    fn fast_config() -> LeadflowConfig {
        LeadflowConfig::default().with_retry(
            RetryConfig::default()
                .with_base_delay_ms(1)
                .with_max_delay_ms(2)
                .with_jitter(JitterStrategy::None),
        )
    }

    fn harness(fakes: FakeCollaborators) -> Harness {
        let store = Arc::new(InMemoryStateStore::new());
        let events = Arc::new(CollectingEventSink::new());
        let pipeline = PipelineBuilder::standard(&fakes.bundle(), store.clone(), &fast_config())
            .with_events(events.clone())
            .build()
            .unwrap();
        Harness {
            fakes,
            store,
            events,
            pipeline,
        }
    }

    fn with_classifier(classifier: FakeClassifier) -> FakeCollaborators {
        FakeCollaborators {
            classifier: Arc::new(classifier),
            ..FakeCollaborators::new()
        }
    }

    async fn claim(store: &InMemoryStateStore, unit: &UnitOfWork) -> Uuid {
        store.create_if_absent(unit).await.unwrap();
        let run_id = Uuid::new_v4();
        store
            .compare_and_set_status(unit.id(), RecordStatus::Pending, RecordStatus::InProgress, Some(run_id))
            .await
            .unwrap();
        run_id
    }

    fn business_email(id: &str) -> UnitOfWork {
        email_unit(id, "ceo@acme.io", "Partnership", "Can we schedule a call next week?")
    }

    #[tokio::test]
    async fn test_meeting_request_is_scheduled() {
        let h = harness(with_classifier(FakeClassifier::returning(hot_meeting_request())));
        let unit = business_email("msg_1");
        let run_id = claim(&h.store, &unit).await;

        let record = h
            .pipeline
            .run(&unit, run_id, &CancellationToken::new())
            .await
            .unwrap();

        assert_record_status(&record, RecordStatus::Completed);
        assert_stage_order(&record, &ALL_STAGES);
        assert_finalized_once(&record);
        assert!(record.scheduled());
        assert_eq!(record.completion_path(), Some(CompletionPath::Full));
        assert_eq!(h.fakes.scheduler.booking_count(), 1);
        assert_eq!(h.fakes.source.marked(), vec![unit.id().clone()]);
        assert_eq!(h.fakes.notifier.sent().len(), 1);
        assert_eq!(h.events.count(LifecycleEvent::UnitFinished), 1);
    }

    #[tokio::test]
    async fn test_automated_sender_skips_unit() {
        let h = harness(with_classifier(FakeClassifier::returning(hot_meeting_request())));
        let unit = email_unit("msg_2", "noreply@service.com", "Your invoice", "");
        let run_id = claim(&h.store, &unit).await;

        let record = h
            .pipeline
            .run(&unit, run_id, &CancellationToken::new())
            .await
            .unwrap();

        assert_record_status(&record, RecordStatus::Skipped);
        assert_stage_status(&record, StageKind::Classification, OutcomeStatus::Skipped);
        assert_stage_status(&record, StageKind::Scheduling, OutcomeStatus::Skipped);
        assert_stage_status(&record, StageKind::Finalization, OutcomeStatus::Succeeded);
        assert_finalized_once(&record);
        assert_eq!(record.skipped_stage(), Some(StageKind::Classification));
        assert_eq!(h.fakes.classifier.calls(), 0);
        assert_eq!(h.fakes.scheduler.booking_count(), 0);
        assert_eq!(h.events.count(LifecycleEvent::StageSkipped), 2);
        assert_eq!(h.fakes.source.marked().len(), 1);
    }

    #[tokio::test]
    async fn test_no_meeting_request_bypasses_scheduling() {
        let h = harness(with_classifier(FakeClassifier::returning(hot_without_meeting())));
        let unit = business_email("msg_3");
        let run_id = claim(&h.store, &unit).await;

        let record = h
            .pipeline
            .run(&unit, run_id, &CancellationToken::new())
            .await
            .unwrap();

        assert_record_status(&record, RecordStatus::Completed);
        assert_stage_status(&record, StageKind::Scheduling, OutcomeStatus::Skipped);
        assert_eq!(
            record.completion_path(),
            Some(CompletionPath::StageSkipped(StageKind::Scheduling))
        );
        assert!(!record.scheduled());
        assert_eq!(h.fakes.scheduler.booking_count(), 0);
        assert_finalized_once(&record);
    }

    #[tokio::test]
    async fn test_failed_stage_still_finalizes() {
        let h = harness(with_classifier(FakeClassifier::returning(hot_meeting_request())));
        h.fakes.scheduler.set_available(false);
        let unit = business_email("msg_4");
        let run_id = claim(&h.store, &unit).await;

        let record = h
            .pipeline
            .run(&unit, run_id, &CancellationToken::new())
            .await
            .unwrap();

        assert_record_status(&record, RecordStatus::Failed);
        assert_eq!(record.failed_stage(), Some(StageKind::Scheduling));
        assert_stage_status(&record, StageKind::Finalization, OutcomeStatus::Succeeded);
        assert_finalized_once(&record);
        assert_eq!(h.fakes.source.marked(), vec![unit.id().clone()]);

        let sent = h.fakes.notifier.sent();
        assert_eq!(sent[0].1["status"], "failed");
    }

    #[tokio::test]
    async fn test_finalization_failure_fails_unit() {
        let h = harness(with_classifier(FakeClassifier::returning(hot_without_meeting())));
        h.fakes
            .source
            .fail_marking(CollaboratorError::terminal("mailbox rejected label"));
        let unit = business_email("msg_5");
        let run_id = claim(&h.store, &unit).await;

        let record = h
            .pipeline
            .run(&unit, run_id, &CancellationToken::new())
            .await
            .unwrap();

        assert_record_status(&record, RecordStatus::Failed);
        assert_stage_status(&record, StageKind::Finalization, OutcomeStatus::Failed);
        assert_finalized_once(&record);

        let finalization = record
            .outcomes
            .iter()
            .find(|o| o.stage == StageKind::Finalization)
            .unwrap();
        assert_eq!(finalization.payload["status"], "failed");
        assert_eq!(finalization.payload["status"], record.status.to_string());
    }

    #[tokio::test]
    async fn test_cancelled_run_releases_claim() {
        let h = harness(with_classifier(FakeClassifier::returning(hot_meeting_request())));
        let unit = business_email("msg_6");
        let run_id = claim(&h.store, &unit).await;
        let cancel = CancellationToken::new();
        cancel.cancel("shutdown");

        let record = h.pipeline.run(&unit, run_id, &cancel).await.unwrap();

        assert_record_status(&record, RecordStatus::Pending);
        assert!(record.outcomes.is_empty());
        assert!(h.fakes.source.marked().is_empty());
        assert_eq!(h.events.count(LifecycleEvent::UnitCancelled), 1);
        assert_eq!(h.events.count(LifecycleEvent::UnitFinished), 0);
    }

    #[tokio::test]
    async fn test_resumed_run_skips_settled_stages() {
        let h = harness(with_classifier(FakeClassifier::failing(
            CollaboratorError::terminal("must not be called"),
        )));
        let unit = business_email("msg_7");
        let run_id = claim(&h.store, &unit).await;
        let verdict = serde_json::to_value(hot_meeting_request()).unwrap();
        h.store
            .append_outcome(unit.id(), StageOutcome::succeeded(StageKind::Retrieval, serde_json::Value::Null))
            .await
            .unwrap();
        h.store
            .append_outcome(unit.id(), StageOutcome::succeeded(StageKind::Classification, verdict))
            .await
            .unwrap();

        let record = h
            .pipeline
            .run(&unit, run_id, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(h.fakes.classifier.calls(), 0);
        assert_record_status(&record, RecordStatus::Completed);
        assert_stage_order(&record, &ALL_STAGES);
        assert!(record.scheduled());
    }

    #[tokio::test]
    async fn test_recorded_booking_is_not_repeated() {
        let h = harness(with_classifier(FakeClassifier::returning(hot_meeting_request())));
        let unit = business_email("msg_8");
        let run_id = claim(&h.store, &unit).await;
        let verdict = serde_json::to_value(Classification::new(true, true, 90)).unwrap();
        let booking = serde_json::json!({
            "booking_reference": "evt-existing",
            "idempotency_key": "book:existing",
        });
        for outcome in [
            StageOutcome::succeeded(StageKind::Retrieval, serde_json::Value::Null),
            StageOutcome::succeeded(StageKind::Classification, verdict),
            StageOutcome::succeeded(StageKind::Scheduling, booking),
        ] {
            h.store.append_outcome(unit.id(), outcome).await.unwrap();
        }

        let record = h
            .pipeline
            .run(&unit, run_id, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(h.fakes.scheduler.booking_calls(), 0);
        assert!(record.scheduled());
        assert_eq!(
            record
                .outcomes
                .iter()
                .filter(|o| o.stage == StageKind::Scheduling)
                .count(),
            1
        );
        assert_finalized_once(&record);
    }

    #[tokio::test]
    async fn test_recorded_finalization_is_not_repeated() {
        let h = harness(with_classifier(FakeClassifier::returning(hot_without_meeting())));
        let unit = business_email("msg_9");
        let run_id = claim(&h.store, &unit).await;
        let verdict = serde_json::to_value(hot_without_meeting()).unwrap();
        for outcome in [
            StageOutcome::succeeded(StageKind::Retrieval, serde_json::Value::Null),
            StageOutcome::succeeded(StageKind::Classification, verdict),
            StageOutcome::skipped(StageKind::Scheduling, "no meeting requested"),
            StageOutcome::succeeded(StageKind::Finalization, serde_json::json!({"notified": true})),
        ] {
            h.store.append_outcome(unit.id(), outcome).await.unwrap();
        }

        let record = h
            .pipeline
            .run(&unit, run_id, &CancellationToken::new())
            .await
            .unwrap();

        assert_record_status(&record, RecordStatus::Completed);
        assert_finalized_once(&record);
        assert!(h.fakes.source.marked().is_empty());
        assert!(h.fakes.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_unclaimed_record_is_rejected() {
        let h = harness(FakeCollaborators::new());
        let unit = business_email("msg_10");
        h.store.create_if_absent(&unit).await.unwrap();

        let err = h
            .pipeline
            .run(&unit, Uuid::new_v4(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            StoreError::StatusConflict {
                actual: RecordStatus::Pending,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_stage_attempts_land_in_audit() {
        let h = harness(with_classifier(FakeClassifier::returning(hot_without_meeting())));
        let unit = business_email("msg_11");
        let run_id = claim(&h.store, &unit).await;

        let record = h
            .pipeline
            .run(&unit, run_id, &CancellationToken::new())
            .await
            .unwrap();

        assert!(record
            .audit
            .iter()
            .any(|a| a.stage == StageKind::Classification && a.succeeded));
        assert!(record
            .audit
            .iter()
            .any(|a| a.stage == StageKind::Finalization && a.operation == "notify"));
    }
}
