//! Error types for the leadflow orchestrator.
//!
//! Collaborator failures are classified by the adapter that raised them
//! (`ErrorClass`), never guessed by the core. Store failures and pipeline
//! configuration problems have their own types so callers can match on them.

use crate::core::{RecordStatus, UnitId};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The main error type for leadflow operations.
#[derive(Debug, Error)]
pub enum LeadflowError {
    /// The pipeline configuration is invalid.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// The state store failed.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// A collaborator failed outside of any unit's pipeline (e.g. retrieval).
    #[error("{0}")]
    Collaborator(#[from] CollaboratorError),

    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<config::ConfigError> for LeadflowError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Whether a collaborator failure may succeed if attempted again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Transient: network, rate limit, timeout.
    Retryable,
    /// Permanent for this attempt: bad input, auth failure, not found.
    Terminal,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retryable => write!(f, "retryable"),
            Self::Terminal => write!(f, "terminal"),
        }
    }
}

/// A failure raised by an external collaborator adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{class} collaborator error: {message}")]
pub struct CollaboratorError {
    /// The adapter-supplied classification.
    pub class: ErrorClass,
    /// Human-readable description.
    pub message: String,
}

impl CollaboratorError {
    /// Creates a retryable (transient) error.
    #[must_use]
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::Retryable,
            message: message.into(),
        }
    }

    /// Creates a terminal (permanent) error.
    #[must_use]
    pub fn terminal(message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::Terminal,
            message: message.into(),
        }
    }

    /// Creates the error used when an attempt exceeds its deadline.
    #[must_use]
    pub fn timeout(deadline_ms: u128) -> Self {
        Self::retryable(format!("deadline of {deadline_ms}ms exceeded"))
    }

    /// Returns true if the failure may be retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.class == ErrorClass::Retryable
    }
}

/// Errors raised by a state store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A compare-and-set found a different status than expected.
    #[error("Status conflict for unit '{unit_id}': expected {expected}, found {actual}")]
    StatusConflict {
        /// The unit whose record was targeted.
        unit_id: UnitId,
        /// The status the caller expected.
        expected: RecordStatus,
        /// The status actually stored.
        actual: RecordStatus,
    },

    /// No record exists for the unit.
    #[error("No processing record for unit '{0}'")]
    NotFound(UnitId),

    /// The record is terminal and can no longer be mutated.
    #[error("Processing record for unit '{0}' is terminal")]
    RecordTerminal(UnitId),

    /// IO error in a durable backend.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true if this is a lost compare-and-set.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::StatusConflict { .. })
    }
}

/// Error raised when a pipeline configuration is invalid.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }
}
