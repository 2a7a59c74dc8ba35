//! # Leadflow
//!
//! A workflow orchestrator that drives inbound messages and discovered
//! business leads through a fixed sequence of stages: retrieval,
//! classification, scheduling and finalization.
//!
//! Leadflow provides:
//!
//! - **Durable per-unit state**: one processing record per unit, advanced by
//!   compare-and-set so concurrent orchestrators never double-process a unit
//! - **Declarative gates**: predicates in front of stages decide whether a
//!   stage runs, and rejects are recorded as skipped outcomes
//! - **Classified retries**: collaborator failures are retried with backoff
//!   up to a ceiling, and terminal failures stop immediately
//! - **Guaranteed finalization**: every terminal record carries exactly one
//!   finalization outcome
//! - **Injected collaborators**: source, analysis, calendar and notification
//!   services are traits handed in at construction
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use leadflow::prelude::*;
//! use std::sync::Arc;
//!
//! let config = LeadflowConfig::load(Some("leadflow.toml".as_ref()))?;
//! let orchestrator = Orchestrator::from_config(
//!     &collaborators,
//!     Arc::new(InMemoryStateStore::new()),
//!     Arc::new(LoggingEventSink::default()),
//!     &config,
//! )?;
//!
//! let summary = orchestrator.run_batch(&CancellationToken::new()).await?;
//! println!("completed {} of {}", summary.completed, summary.listed);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod collaborators;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod gates;
pub mod observability;
pub mod orchestrator;
pub mod pipeline;
pub mod stages;
pub mod store;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::collaborators::{
        BookingReference, Classification, ClassificationCollaborator, Collaborators,
        KeywordClassifier, NotificationCollaborator, SchedulingCollaborator, SourceCollaborator,
        TimeWindow,
    };
    pub use crate::config::LeadflowConfig;
    pub use crate::core::{
        CompletionPath, OutcomeStatus, ProcessingRecord, RecordStatus, StageKind, StageOutcome,
        UnitId, UnitKind, UnitOfWork,
    };
    pub use crate::errors::{
        CollaboratorError, ErrorClass, LeadflowError, PipelineValidationError, StoreError,
    };
    pub use crate::events::{EventSink, LifecycleEvent, LoggingEventSink, NoOpEventSink};
    pub use crate::gates::{DecisionGate, RejectEffect, SenderFilter};
    pub use crate::observability::{init_logging, LogFormat};
    pub use crate::orchestrator::{BatchSummary, Orchestrator, UnitDisposition, WorkflowStatus};
    pub use crate::pipeline::{Pipeline, PipelineBuilder, RetryConfig, RetryPolicy};
    pub use crate::stages::{Stage, StageVariant};
    pub use crate::store::{FileStateStore, InMemoryStateStore, StateStore};
}
