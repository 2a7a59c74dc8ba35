//! Assertions over processing records.

use crate::core::{OutcomeStatus, ProcessingRecord, RecordStatus, StageKind};

/// Asserts the record's status.
pub fn assert_record_status(record: &ProcessingRecord, expected: RecordStatus) {
    assert_eq!(
        record.status, expected,
        "Expected unit '{}' to be {}, got {}",
        record.unit_id, expected, record.status
    );
}

/// Asserts a terminal record carries exactly one finalization outcome.
pub fn assert_finalized_once(record: &ProcessingRecord) {
    assert!(
        record.is_terminal(),
        "Expected unit '{}' to be terminal, got {}",
        record.unit_id,
        record.status
    );
    assert_eq!(
        record.finalization_count(),
        1,
        "Expected exactly one finalization outcome for '{}'",
        record.unit_id
    );
}

/// Asserts the status of the latest outcome of `stage`.
pub fn assert_stage_status(record: &ProcessingRecord, stage: StageKind, expected: OutcomeStatus) {
    let actual = record
        .outcomes
        .iter()
        .rev()
        .find(|o| o.stage == stage)
        .map(|o| o.status);
    assert_eq!(
        actual,
        Some(expected),
        "Expected {} of '{}' to be {}, got {:?}",
        stage,
        record.unit_id,
        expected,
        actual
    );
}

/// Asserts outcomes follow the given stage order.
pub fn assert_stage_order(record: &ProcessingRecord, expected: &[StageKind]) {
    let actual: Vec<StageKind> = record.outcomes.iter().map(|o| o.stage).collect();
    assert_eq!(actual, expected, "Unexpected stage order for '{}'", record.unit_id);
}
