//! Idempotency keys handed to side-effecting collaborators.

use crate::core::{StageKind, UnitId};
use sha2::{Digest, Sha256};

/// Derives a stable key from components joined with `:`.
#[must_use]
pub fn idempotency_key(prefix: &str, components: &[&str]) -> String {
    let combined = components.join(":");
    let mut hasher = Sha256::new();
    hasher.update(combined.as_bytes());
    let result = hasher.finalize();
    format!("{prefix}:{}", hex::encode(&result[..16]))
}

/// Key under which a unit's booking is created. Identical across runs.
#[must_use]
pub fn booking_key(unit_id: &UnitId) -> String {
    idempotency_key("book", &[unit_id.as_str(), StageKind::Scheduling.as_str()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_booking_key_is_stable() {
        let id = UnitId::new("msg_1");
        assert_eq!(booking_key(&id), booking_key(&UnitId::new("msg_1")));
        assert_ne!(booking_key(&id), booking_key(&UnitId::new("msg_2")));
    }

    #[test]
    fn test_booking_key_format() {
        let key = booking_key(&UnitId::new("msg_1"));
        let hash = key.strip_prefix("book:").unwrap();
        assert_eq!(hash.len(), 32);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_prefix_is_not_hashed() {
        let a = idempotency_key("a", &["x"]);
        let b = idempotency_key("b", &["x"]);
        assert_eq!(a[2..], b[2..]);
        assert_eq!(idempotency_key("k", &["a", "b"]), idempotency_key("k", &["a:b"]));
    }
}
