//! In-memory collaborator doubles.

use crate::collaborators::{
    BookingReference, Classification, ClassificationCollaborator, Collaborators,
    NotificationCollaborator, SchedulingCollaborator, SourceCollaborator, TimeWindow,
};
use crate::core::{UnitId, UnitOfWork};
use crate::errors::CollaboratorError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// A mailbox-like source. Marked units stop being listed.
#[derive(Debug, Default)]
pub struct FakeSource {
    units: Mutex<Vec<UnitOfWork>>,
    marked: Mutex<Vec<UnitId>>,
    listing_failures: AtomicU32,
    listing_error: Mutex<Option<CollaboratorError>>,
    marking_error: Mutex<Option<CollaboratorError>>,
}

impl FakeSource {
    /// Creates a source holding `units`.
    #[must_use]
    pub fn with_units(units: Vec<UnitOfWork>) -> Self {
        Self {
            units: Mutex::new(units),
            ..Self::default()
        }
    }

    /// Adds a unit.
    pub fn push(&self, unit: UnitOfWork) {
        self.units.lock().push(unit);
    }

    /// Makes the next `times` listings fail with a retryable error.
    pub fn fail_listing_times(&self, times: u32) {
        self.listing_failures.store(times, Ordering::SeqCst);
    }

    /// Makes every listing fail with `error`.
    pub fn fail_listing(&self, error: CollaboratorError) {
        *self.listing_error.lock() = Some(error);
    }

    /// Makes every `mark_done` fail with `error`.
    pub fn fail_marking(&self, error: CollaboratorError) {
        *self.marking_error.lock() = Some(error);
    }

    /// Units marked done, in call order (repeats included).
    #[must_use]
    pub fn marked(&self) -> Vec<UnitId> {
        self.marked.lock().clone()
    }
}

#[async_trait]
impl SourceCollaborator for FakeSource {
    async fn list_pending(&self, max_batch: usize) -> Result<Vec<UnitOfWork>, CollaboratorError> {
        if let Some(error) = self.listing_error.lock().clone() {
            return Err(error);
        }
        let remaining = self.listing_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.listing_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(CollaboratorError::retryable("mailbox temporarily unavailable"));
        }
        let marked = self.marked.lock().clone();
        Ok(self
            .units
            .lock()
            .iter()
            .filter(|u| !marked.contains(u.id()))
            .take(max_batch)
            .cloned()
            .collect())
    }

    async fn mark_done(&self, unit_id: &UnitId) -> Result<(), CollaboratorError> {
        if let Some(error) = self.marking_error.lock().clone() {
            return Err(error);
        }
        self.marked.lock().push(unit_id.clone());
        Ok(())
    }
}

/// An analysis service returning scripted verdicts.
#[derive(Debug)]
pub struct FakeClassifier {
    default: Mutex<Result<Classification, CollaboratorError>>,
    per_unit: Mutex<HashMap<UnitId, Result<Classification, CollaboratorError>>>,
    calls: AtomicU32,
}

impl Default for FakeClassifier {
    fn default() -> Self {
        Self::returning(Classification::new(false, false, 0))
    }
}

impl FakeClassifier {
    /// Returns `classification` for every unit.
    #[must_use]
    pub fn returning(classification: Classification) -> Self {
        Self {
            default: Mutex::new(Ok(classification)),
            per_unit: Mutex::new(HashMap::new()),
            calls: AtomicU32::new(0),
        }
    }

    /// Fails every call with `error`.
    #[must_use]
    pub fn failing(error: CollaboratorError) -> Self {
        Self {
            default: Mutex::new(Err(error)),
            per_unit: Mutex::new(HashMap::new()),
            calls: AtomicU32::new(0),
        }
    }

    /// Scripts the result for one unit.
    pub fn set(&self, unit_id: impl Into<UnitId>, result: Result<Classification, CollaboratorError>) {
        self.per_unit.lock().insert(unit_id.into(), result);
    }

    /// Number of `classify` calls.
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClassificationCollaborator for FakeClassifier {
    async fn classify(&self, unit: &UnitOfWork) -> Result<Classification, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(result) = self.per_unit.lock().get(unit.id()) {
            return result.clone();
        }
        self.default.lock().clone()
    }
}

/// A calendar that honours idempotency keys.
#[derive(Debug)]
pub struct FakeScheduler {
    available: AtomicBool,
    bookings: Mutex<HashMap<String, (UnitId, TimeWindow, BookingReference)>>,
    booking_calls: AtomicU32,
    booking_error: Mutex<Option<CollaboratorError>>,
}

impl Default for FakeScheduler {
    fn default() -> Self {
        Self {
            available: AtomicBool::new(true),
            bookings: Mutex::new(HashMap::new()),
            booking_calls: AtomicU32::new(0),
            booking_error: Mutex::new(None),
        }
    }
}

impl FakeScheduler {
    /// Sets whether every window is free.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Makes every `create_booking` fail with `error`.
    pub fn fail_booking(&self, error: CollaboratorError) {
        *self.booking_error.lock() = Some(error);
    }

    /// Number of distinct bookings held.
    #[must_use]
    pub fn booking_count(&self) -> usize {
        self.bookings.lock().len()
    }

    /// Bookings held for one unit.
    #[must_use]
    pub fn bookings_for(&self, unit_id: &UnitId) -> Vec<BookingReference> {
        self.bookings
            .lock()
            .values()
            .filter(|(id, _, _)| id == unit_id)
            .map(|(_, _, reference)| reference.clone())
            .collect()
    }

    /// Number of `create_booking` calls, repeats included.
    #[must_use]
    pub fn booking_calls(&self) -> u32 {
        self.booking_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SchedulingCollaborator for FakeScheduler {
    async fn check_availability(&self, _window: &TimeWindow) -> Result<bool, CollaboratorError> {
        Ok(self.available.load(Ordering::SeqCst))
    }

    async fn create_booking(
        &self,
        unit: &UnitOfWork,
        window: &TimeWindow,
        idempotency_key: &str,
    ) -> Result<BookingReference, CollaboratorError> {
        self.booking_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.booking_error.lock().clone() {
            return Err(error);
        }
        let mut bookings = self.bookings.lock();
        let next = bookings.len() + 1;
        let (_, _, reference) = bookings
            .entry(idempotency_key.to_string())
            .or_insert_with(|| (unit.id().clone(), *window, BookingReference(format!("evt-{next}"))));
        Ok(reference.clone())
    }
}

/// A notifier that records what it was asked to send.
#[derive(Debug, Default)]
pub struct FakeNotifier {
    sent: Mutex<Vec<(UnitId, serde_json::Value)>>,
    fail: AtomicBool,
}

impl FakeNotifier {
    /// A notifier whose every delivery fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: AtomicBool::new(true),
        }
    }

    /// Delivered notifications.
    #[must_use]
    pub fn sent(&self) -> Vec<(UnitId, serde_json::Value)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl NotificationCollaborator for FakeNotifier {
    async fn notify(&self, unit_id: &UnitId, summary: &serde_json::Value) -> Result<(), CollaboratorError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CollaboratorError::retryable("notification service unreachable"));
        }
        self.sent.lock().push((unit_id.clone(), summary.clone()));
        Ok(())
    }
}

/// Concrete handles to a full set of fakes.
#[derive(Debug, Clone, Default)]
pub struct FakeCollaborators {
    /// Source.
    pub source: Arc<FakeSource>,
    /// Analysis service.
    pub classifier: Arc<FakeClassifier>,
    /// Calendar.
    pub scheduler: Arc<FakeScheduler>,
    /// Notifier.
    pub notifier: Arc<FakeNotifier>,
}

impl FakeCollaborators {
    /// Creates default fakes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates fakes whose source holds `units`.
    #[must_use]
    pub fn with_units(units: Vec<UnitOfWork>) -> Self {
        Self {
            source: Arc::new(FakeSource::with_units(units)),
            ..Self::default()
        }
    }

    /// Type-erased bundle for the orchestrator.
    #[must_use]
    pub fn bundle(&self) -> Collaborators {
        Collaborators::new(
            self.source.clone(),
            self.classifier.clone(),
            self.scheduler.clone(),
            self.notifier.clone(),
        )
    }
}
