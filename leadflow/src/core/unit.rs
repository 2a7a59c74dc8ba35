//! Units of work: the items the orchestrator drives to completion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique external identifier of a unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(String);

impl UnitId {
    /// Creates a new identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UnitId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Where a unit of work came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    /// An inbound email message.
    Email,
    /// A business lead found by a place search.
    Lead,
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Email => write!(f, "email"),
            Self::Lead => write!(f, "lead"),
        }
    }
}

/// One item being processed. Immutable once created.
///
/// The payload is opaque to the core; collaborator adapters agree on its
/// shape. The sender filter and the keyword classifier read the
/// conventional `sender_email`, `subject` and `body` string fields when
/// present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitOfWork {
    id: UnitId,
    kind: UnitKind,
    arrived_at: DateTime<Utc>,
    payload: serde_json::Value,
}

impl UnitOfWork {
    /// Creates a unit of work.
    #[must_use]
    pub fn new(
        id: impl Into<UnitId>,
        kind: UnitKind,
        arrived_at: DateTime<Utc>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            arrived_at,
            payload,
        }
    }

    /// Returns the unit identifier.
    #[must_use]
    pub fn id(&self) -> &UnitId {
        &self.id
    }

    /// Returns the unit kind.
    #[must_use]
    pub fn kind(&self) -> UnitKind {
        self.kind
    }

    /// Returns when the unit arrived at the source.
    #[must_use]
    pub fn arrived_at(&self) -> DateTime<Utc> {
        self.arrived_at
    }

    /// Returns the opaque payload.
    #[must_use]
    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    /// Reads a string field from the payload.
    #[must_use]
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(serde_json::Value::as_str)
    }
}

impl From<String> for UnitId {
    fn from(value: String) -> Self {
        Self(value)
    }
}
