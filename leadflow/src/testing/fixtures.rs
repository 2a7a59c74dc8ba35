//! Unit-of-work fixtures.

use crate::collaborators::Classification;
use crate::core::{UnitKind, UnitOfWork};
use chrono::{DateTime, TimeZone, Utc};

/// A fixed Wednesday mid-morning arrival time.
#[must_use]
pub fn weekday_morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 15, 10, 20, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// An inbound email arriving on [`weekday_morning`].
#[must_use]
pub fn email_unit(id: &str, sender: &str, subject: &str, body: &str) -> UnitOfWork {
    UnitOfWork::new(
        id,
        UnitKind::Email,
        weekday_morning(),
        serde_json::json!({
            "sender_email": sender,
            "subject": subject,
            "body": body,
        }),
    )
}

/// A business email arriving at `arrived_at`.
#[must_use]
pub fn email_unit_at(id: &str, arrived_at: DateTime<Utc>) -> UnitOfWork {
    UnitOfWork::new(
        id,
        UnitKind::Email,
        arrived_at,
        serde_json::json!({
            "sender_email": "founder@acme.io",
            "subject": "Partnership",
            "body": "Could we meet next week?",
        }),
    )
}

/// A discovered business lead.
#[must_use]
pub fn lead_unit(id: &str, name: &str) -> UnitOfWork {
    UnitOfWork::new(
        id,
        UnitKind::Lead,
        weekday_morning(),
        serde_json::json!({ "name": name, "category": "restaurant" }),
    )
}

/// A hot lead asking for a meeting.
#[must_use]
pub fn hot_meeting_request() -> Classification {
    Classification::new(true, true, 85).with_signal("meeting request")
}

/// A hot lead that does not ask for a meeting.
#[must_use]
pub fn hot_without_meeting() -> Classification {
    Classification::new(true, false, 75).with_signal("pricing inquiry")
}

/// A cold unit.
#[must_use]
pub fn cold() -> Classification {
    Classification::new(false, false, 10)
}
