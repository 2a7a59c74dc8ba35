//! Scheduling: finds a free window and books it, at most once per unit.

use super::{encode, Stage, StageContext};
use crate::collaborators::{BookingReference, Classification, SchedulingCollaborator, TimeWindow};
use crate::config::SchedulingConfig;
use crate::core::{OutcomeError, StageKind, StageOutcome};
use crate::pipeline::{booking_key, RetryPolicy};
use crate::store::SharedStateStore;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Payload of a successful scheduling outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingDetails {
    /// Reference returned by the calendar.
    pub booking_reference: BookingReference,
    /// The booked window.
    pub window: TimeWindow,
    /// Key the booking was created under.
    pub idempotency_key: String,
}

/// Candidate meeting windows after `after`, earliest first.
///
/// Windows start on whole hours, begin no earlier than the first whole hour
/// after `after`, lie inside business hours and, if configured, skip
/// weekends. At most `max_windows_checked` windows are returned.
#[must_use]
pub fn candidate_windows(config: &SchedulingConfig, after: DateTime<Utc>) -> Vec<TimeWindow> {
    let duration = i64::from(config.meeting_duration_minutes);
    let day_end = i64::from(config.business_hours_end) * 60;
    let horizon = after + Duration::days(i64::from(config.availability_days));

    let Some(hour_floor) = after.date_naive().and_hms_opt(after.hour(), 0, 0) else {
        return Vec::new();
    };
    let mut start = Utc.from_utc_datetime(&hour_floor) + Duration::hours(1);

    let mut windows = Vec::new();
    while start < horizon && windows.len() < config.max_windows_checked {
        let weekend = matches!(start.weekday(), Weekday::Sat | Weekday::Sun);
        let start_minute = i64::from(start.hour()) * 60;
        if !(config.skip_weekends && weekend)
            && start.hour() >= config.business_hours_start
            && start_minute + duration <= day_end
        {
            windows.push(TimeWindow::starting_at(start, duration));
        }
        start += Duration::hours(1);
    }
    windows
}

/// Books the first available window for a qualified meeting request.
///
/// Before touching the calendar the stage consults the idempotency ledger:
/// a prior successful scheduling outcome for the unit is returned
/// unchanged. Bookings are created under a per-unit key, so a retried
/// call cannot double-book either.
#[derive(Debug, Clone)]
pub struct SchedulingStage {
    scheduler: Arc<dyn SchedulingCollaborator>,
    store: SharedStateStore,
    retry: RetryPolicy,
    config: SchedulingConfig,
}

impl SchedulingStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(
        scheduler: Arc<dyn SchedulingCollaborator>,
        store: SharedStateStore,
        retry: RetryPolicy,
        config: SchedulingConfig,
    ) -> Self {
        Self {
            scheduler,
            store,
            retry,
            config,
        }
    }

    async fn prior_booking(&self, ctx: &StageContext<'_>) -> Result<Option<StageOutcome>, StageOutcome> {
        if let Some(prior) = ctx.prior(StageKind::Scheduling) {
            return Ok(Some(prior.clone()));
        }
        self.store
            .successful_outcome(ctx.unit().id(), StageKind::Scheduling)
            .await
            .map_err(|e| {
                StageOutcome::failed(
                    StageKind::Scheduling,
                    OutcomeError::terminal(format!("idempotency ledger unavailable: {e}")),
                )
            })
    }
}

#[async_trait]
impl Stage for SchedulingStage {
    fn kind(&self) -> StageKind {
        StageKind::Scheduling
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> StageOutcome {
        let started = Instant::now();
        let unit = ctx.unit();

        match self.prior_booking(ctx).await {
            Ok(Some(prior)) => {
                info!(unit_id = %unit.id(), "Booking already recorded, reusing it");
                return prior;
            }
            Ok(None) => {}
            Err(failed) => return failed,
        }

        let Some(classification) = ctx
            .prior(StageKind::Classification)
            .and_then(StageOutcome::payload_as::<Classification>)
        else {
            return StageOutcome::failed(
                StageKind::Scheduling,
                OutcomeError::terminal("scheduling requires a classification outcome"),
            );
        };
        debug!(unit_id = %unit.id(), score = classification.score, "Searching meeting windows");

        let key = booking_key(unit.id());
        let scheduler = self.scheduler.as_ref();
        let mut attempts = 0u32;

        for window in candidate_windows(&self.config, unit.arrived_at()) {
            let window_ref = &window;
            let availability = self
                .retry
                .run(StageKind::Scheduling, "check_availability", ctx.deadline(), move || {
                    scheduler.check_availability(window_ref)
                })
                .await;
            attempts += availability.attempt_count();
            ctx.record_attempts(availability.attempts);

            match availability.result {
                Ok(false) => continue,
                Ok(true) => {}
                Err(error) => {
                    return StageOutcome::failed(StageKind::Scheduling, error)
                        .with_attempts(attempts)
                        .with_duration(started.elapsed());
                }
            }

            let key_ref = key.as_str();
            let booking = self
                .retry
                .run(StageKind::Scheduling, "create_booking", ctx.deadline(), move || {
                    scheduler.create_booking(unit, window_ref, key_ref)
                })
                .await;
            attempts += booking.attempt_count();
            ctx.record_attempts(booking.attempts);

            return match booking.result {
                Ok(booking_reference) => {
                    info!(unit_id = %unit.id(), booking = %booking_reference, start = %window.start, "Meeting booked");
                    let details = BookingDetails {
                        booking_reference,
                        window,
                        idempotency_key: key.clone(),
                    };
                    match encode(StageKind::Scheduling, &details) {
                        Ok(payload) => StageOutcome::succeeded(StageKind::Scheduling, payload),
                        Err(failed) => failed,
                    }
                }
                Err(error) => StageOutcome::failed(StageKind::Scheduling, error),
            }
            .with_attempts(attempts)
            .with_duration(started.elapsed());
        }

        warn!(unit_id = %unit.id(), days = self.config.availability_days, "No available meeting window");
        StageOutcome::failed(
            StageKind::Scheduling,
            OutcomeError::terminal(format!(
                "no available window in the next {} days",
                self.config.availability_days
            )),
        )
        .with_attempts(attempts)
        .with_duration(started.elapsed())
    }
}
