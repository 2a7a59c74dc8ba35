//! Orchestrator configuration.
//!
//! Loaded from an optional TOML file layered under `LEADFLOW__SECTION__KEY`
//! environment variables, e.g. `LEADFLOW__ORCHESTRATOR__WORKER_COUNT=8`.

use crate::core::StageKind;
use crate::errors::LeadflowError;
use crate::gates::SenderFilter;
use crate::pipeline::RetryConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "LEADFLOW";

/// Batch driver settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Maximum concurrent unit runs.
    pub worker_count: usize,
    /// Maximum units requested from the source per batch.
    pub max_batch: usize,
    /// Age after which an `in_progress` claim is considered abandoned.
    pub stale_claim_after_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            max_batch: 25,
            stale_claim_after_secs: 900,
        }
    }
}

/// Per-attempt deadlines, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Source listing.
    pub retrieval_ms: u64,
    /// Analysis service call.
    pub classification_ms: u64,
    /// Each calendar call.
    pub scheduling_ms: u64,
    /// Processed-marker call.
    pub finalization_ms: u64,
    /// Notification delivery.
    pub notification_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            retrieval_ms: 30_000,
            classification_ms: 30_000,
            scheduling_ms: 15_000,
            finalization_ms: 15_000,
            notification_ms: 5_000,
        }
    }
}

impl TimeoutConfig {
    /// Deadline for one collaborator attempt inside `stage`.
    #[must_use]
    pub fn for_stage(&self, stage: StageKind) -> Duration {
        let ms = match stage {
            StageKind::Retrieval => self.retrieval_ms,
            StageKind::Classification => self.classification_ms,
            StageKind::Scheduling => self.scheduling_ms,
            StageKind::Finalization => self.finalization_ms,
        };
        Duration::from_millis(ms)
    }

    /// Deadline for notification delivery.
    #[must_use]
    pub fn notification(&self) -> Duration {
        Duration::from_millis(self.notification_ms)
    }
}

/// Meeting window search settings. Hours are UTC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingConfig {
    /// First hour a meeting may start.
    pub business_hours_start: u32,
    /// Hour by which a meeting must end.
    pub business_hours_end: u32,
    /// Meeting length.
    pub meeting_duration_minutes: u32,
    /// How many days ahead to search.
    pub availability_days: u32,
    /// Upper bound on availability checks per unit.
    pub max_windows_checked: usize,
    /// Skip Saturdays and Sundays.
    pub skip_weekends: bool,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            business_hours_start: 9,
            business_hours_end: 18,
            meeting_duration_minutes: 60,
            availability_days: 7,
            max_windows_checked: 24,
            skip_weekends: true,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LeadflowConfig {
    /// Batch driver.
    pub orchestrator: OrchestratorConfig,
    /// Collaborator retry policy.
    pub retry: RetryConfig,
    /// Per-stage deadlines.
    pub timeouts: TimeoutConfig,
    /// Meeting window search.
    pub scheduling: SchedulingConfig,
    /// Business-sender gate.
    pub sender_filter: SenderFilter,
}

impl LeadflowConfig {
    /// Loads configuration from an optional TOML file plus the environment.
    ///
    /// # Errors
    ///
    /// Returns [`LeadflowError::Config`] if a source cannot be read or the
    /// result fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self, LeadflowError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            debug!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let config: Self = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates a TOML document, without consulting the environment.
    ///
    /// # Errors
    ///
    /// Returns [`LeadflowError::Config`] on parse or validation failure.
    pub fn from_toml_str(toml: &str) -> Result<Self, LeadflowError> {
        let config: Self = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`LeadflowError::Config`] naming the first violated constraint.
    pub fn validate(&self) -> Result<(), LeadflowError> {
        let invalid = |msg: &str| Err(LeadflowError::Config(msg.to_string()));

        if self.orchestrator.worker_count == 0 {
            return invalid("orchestrator.worker_count must be at least 1");
        }
        if self.orchestrator.max_batch == 0 {
            return invalid("orchestrator.max_batch must be at least 1");
        }
        if self.retry.max_attempts == 0 {
            return invalid("retry.max_attempts must be at least 1");
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return invalid("retry.base_delay_ms must not exceed retry.max_delay_ms");
        }

        let s = &self.scheduling;
        if s.business_hours_end > 24 || s.business_hours_start >= s.business_hours_end {
            return invalid("scheduling business hours must satisfy start < end <= 24");
        }
        if s.meeting_duration_minutes == 0
            || s.meeting_duration_minutes > (s.business_hours_end - s.business_hours_start) * 60
        {
            return invalid("scheduling.meeting_duration_minutes must fit inside business hours");
        }
        Ok(())
    }

    /// Sets the worker count.
    #[must_use]
    pub fn with_worker_count(mut self, workers: usize) -> Self {
        self.orchestrator.worker_count = workers;
        self
    }

    /// Sets the batch size.
    #[must_use]
    pub fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.orchestrator.max_batch = max_batch;
        self
    }

    /// Replaces the retry configuration.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Replaces the timeouts.
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Replaces the scheduling settings.
    #[must_use]
    pub fn with_scheduling(mut self, scheduling: SchedulingConfig) -> Self {
        self.scheduling = scheduling;
        self
    }

    /// Replaces the sender filter.
    #[must_use]
    pub fn with_sender_filter(mut self, filter: SenderFilter) -> Self {
        self.sender_filter = filter;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::BackoffStrategy;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_defaults_are_valid() {
        let config = LeadflowConfig::default();
        assert_ok!(config.validate());
        assert_eq!(config.orchestrator.worker_count, 4);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.timeouts.for_stage(StageKind::Scheduling), Duration::from_secs(15));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = LeadflowConfig::from_toml_str(
            r#"
            [orchestrator]
            worker_count = 8

            [retry]
            max_attempts = 5
            backoff_strategy = "linear"
            "#,
        )
        .unwrap();

        assert_eq!(config.orchestrator.worker_count, 8);
        assert_eq!(config.orchestrator.max_batch, 25);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.backoff_strategy, BackoffStrategy::Linear);
        assert_eq!(config.scheduling, SchedulingConfig::default());
    }

    #[test]
    fn test_validation_rejects_zero_workers() {
        let err = LeadflowConfig::default().with_worker_count(0).validate().unwrap_err();
        assert!(err.to_string().contains("worker_count"));
    }

    #[test]
    fn test_validation_rejects_inverted_hours() {
        let scheduling = SchedulingConfig {
            business_hours_start: 18,
            business_hours_end: 9,
            ..SchedulingConfig::default()
        };
        assert_err!(LeadflowConfig::default().with_scheduling(scheduling).validate());
    }

    #[test]
    fn test_validation_rejects_oversized_meeting() {
        let scheduling = SchedulingConfig {
            business_hours_start: 9,
            business_hours_end: 10,
            meeting_duration_minutes: 90,
            ..SchedulingConfig::default()
        };
        assert_err!(LeadflowConfig::default().with_scheduling(scheduling).validate());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[sender_filter]\nblocked_senders = [\"robot@\"]\nblocked_subjects = []").unwrap();

        let config = LeadflowConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.sender_filter.blocked_senders, vec!["robot@".to_string()]);
        assert!(config.sender_filter.blocked_subjects.is_empty());
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = LeadflowConfig::from_toml_str("[orchestrator]\nworker_count = \"many\"").unwrap_err();
        assert!(matches!(err, LeadflowError::Config(_)));
    }
}
