//! Core domain model types for leadflow.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Units of work and their identifiers
//! - Record, stage and outcome status enums
//! - Stage outcomes, attempt audit entries and processing records

mod outcome;
mod record;
mod status;
mod unit;

pub use outcome::{AttemptRecord, OutcomeError, StageOutcome};
pub use record::{CompletionPath, ProcessingRecord};
pub use status::{OutcomeStatus, RecordStatus, StageKind};
pub use unit::{UnitId, UnitKind, UnitOfWork};
