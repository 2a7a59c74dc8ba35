//! Testing utilities for leadflow pipelines.
//!
//! This module provides:
//! - In-memory fakes for every collaborator
//! - Unit-of-work and classification fixtures
//! - Assertions over processing records

mod assertions;
mod fakes;
mod fixtures;

pub use assertions::{
    assert_finalized_once, assert_record_status, assert_stage_order, assert_stage_status,
};
pub use fakes::{FakeClassifier, FakeCollaborators, FakeNotifier, FakeScheduler, FakeSource};
pub use fixtures::{
    cold, email_unit, email_unit_at, hot_meeting_request, hot_without_meeting, lead_unit,
    weekday_morning,
};
