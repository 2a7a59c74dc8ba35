//! Pipeline building and execution.
//!
//! This module provides:
//! - Stage specifications (a stage plus its gate)
//! - Pipeline builder with validation
//! - The per-unit runner
//! - Retry policy and idempotency keys for collaborator calls

mod builder;
mod idempotency;
mod retry;
mod runner;
mod spec;

#[cfg(test)]
mod integration_tests;

pub use builder::PipelineBuilder;
pub use idempotency::{booking_key, idempotency_key};
pub use retry::{BackoffStrategy, JitterStrategy, RetryConfig, RetryOutcome, RetryPolicy};
pub use runner::Pipeline;
pub use spec::StageSpec;
