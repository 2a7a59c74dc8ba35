//! Business-sender filter.

use crate::collaborators::sender_domain;
use crate::core::UnitOfWork;
use serde::{Deserialize, Serialize};

const BLOCKED_SENDERS: &[&str] = &[
    "noreply@",
    "no-reply@",
    "notification@",
    "admin@",
    "cloudplatform-noreply@google.com",
    "analytics-noreply@google.com",
    "accounts-noreply@google.com",
    "support@",
    "bounce@",
    "mail-noreply@",
    "news@",
    "marketing@",
    "updates@",
];

const BLOCKED_SUBJECTS: &[&str] = &[
    "verify your account",
    "account verification",
    "payment required",
    "billing notification",
    "system maintenance",
    "security alert",
    "password reset",
    "two-factor authentication",
    "spam warning",
    "virus detected",
];

/// Rejects automated and administrative messages.
///
/// Matching is case-insensitive. Units without a `sender_email` or
/// `subject` field are admitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderFilter {
    /// Fragments that mark an automated sender address.
    pub blocked_senders: Vec<String>,
    /// Sender domains rejected outright (exact or subdomain match).
    pub blocked_domains: Vec<String>,
    /// Subject phrases that mark administrative mail.
    pub blocked_subjects: Vec<String>,
}

impl Default for SenderFilter {
    fn default() -> Self {
        Self {
            blocked_senders: BLOCKED_SENDERS.iter().map(|s| (*s).to_string()).collect(),
            blocked_domains: Vec::new(),
            blocked_subjects: BLOCKED_SUBJECTS.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

impl SenderFilter {
    /// A filter that rejects nothing.
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            blocked_senders: Vec::new(),
            blocked_domains: Vec::new(),
            blocked_subjects: Vec::new(),
        }
    }

    /// Adds a blocked sender domain.
    #[must_use]
    pub fn with_blocked_domain(mut self, domain: impl Into<String>) -> Self {
        self.blocked_domains.push(domain.into().to_lowercase());
        self
    }

    /// Returns the rejection reason, or `None` if the unit looks like business mail.
    #[must_use]
    pub fn rejection(&self, unit: &UnitOfWork) -> Option<String> {
        if let Some(sender) = unit.payload_str("sender_email") {
            let sender = sender.to_lowercase();
            if let Some(fragment) = self.blocked_senders.iter().find(|f| sender.contains(f.as_str())) {
                return Some(format!("automated sender ({fragment})"));
            }
            if let Some(domain) = sender_domain(&sender) {
                let blocked = self.blocked_domains.iter().find(|d| {
                    domain == **d || domain.ends_with(&format!(".{d}"))
                });
                if let Some(d) = blocked {
                    return Some(format!("blocked domain ({d})"));
                }
            }
        }

        if let Some(subject) = unit.payload_str("subject") {
            let subject = subject.to_lowercase();
            if let Some(phrase) = self.blocked_subjects.iter().find(|p| subject.contains(p.as_str())) {
                return Some(format!("administrative subject ({phrase})"));
            }
        }

        None
    }
}
