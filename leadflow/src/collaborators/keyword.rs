//! Deterministic keyword classifier used as the declared fallback when the
//! analysis service is unreachable.

use super::Classification;
use crate::core::UnitOfWork;
use regex::Regex;
use std::sync::OnceLock;

const HOT_LEAD_KEYWORDS: &[&str] = &[
    "interested", "partnership", "collaboration", "services", "discuss",
    "meeting", "demo", "consultation", "opportunity", "proposal",
    "quotation", "pricing", "solution", "implementation", "project",
    "contract", "business", "company", "help", "support", "assistance",
    "consulting", "development", "design", "marketing", "sales",
];

const URGENCY_KEYWORDS: &[&str] = &[
    "urgent", "asap", "immediately", "soon", "rapid", "quick",
    "priority", "important", "deadline", "timeline", "schedule",
];

const MEETING_KEYWORDS: &[&str] = &[
    "meet", "meeting", "schedule", "call", "appointment", "session",
    "discuss", "talk", "chat", "conversation", "demo", "presentation",
];

const PERSONAL_DOMAINS: &[&str] = &["gmail", "yahoo", "hotmail", "outlook"];

fn sender_domain_regex() -> &'static Regex {
    static SENDER_DOMAIN_RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)]
    SENDER_DOMAIN_RE.get_or_init(|| {
        Regex::new(r"@([a-z0-9][a-z0-9.-]*)").expect("sender domain regex should compile")
    })
}

/// Extracts the lowercased domain of an email address.
#[must_use]
pub fn sender_domain(sender: &str) -> Option<String> {
    let lowered = sender.to_lowercase();
    sender_domain_regex()
        .captures(&lowered)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Scores a unit by keyword presence.
///
/// Points: +2 per hot-lead keyword, +3 per urgency keyword, +5 when the
/// sender's domain is not a personal-mail domain. A unit qualifies at
/// `qualify_threshold` points; the 0..=100 score is `points * 4`, capped.
/// A meeting is requested when `min_meeting_keywords` distinct meeting
/// keywords occur.
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    /// Points needed to qualify.
    pub qualify_threshold: u32,
    /// Distinct meeting keywords needed to count as a meeting request.
    pub min_meeting_keywords: usize,
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self {
            qualify_threshold: 10,
            min_meeting_keywords: 2,
        }
    }
}

impl KeywordClassifier {
    /// Creates a classifier with the default thresholds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifies a unit from its `subject`, `body` and `sender_email` fields.
    #[must_use]
    pub fn classify(&self, unit: &UnitOfWork) -> Classification {
        let subject = unit.payload_str("subject").unwrap_or_default();
        let body = unit.payload_str("body").unwrap_or_default();
        let text = format!("{subject} {body}").to_lowercase();

        let mut points = 0u32;
        let mut signals = Vec::new();

        for keyword in HOT_LEAD_KEYWORDS.iter().filter(|k| text.contains(*k)) {
            points += 2;
            signals.push(format!("mentions '{keyword}'"));
        }
        for keyword in URGENCY_KEYWORDS.iter().filter(|k| text.contains(*k)) {
            points += 3;
            signals.push(format!("urgency: {keyword}"));
        }

        if let Some(domain) = unit.payload_str("sender_email").and_then(sender_domain) {
            if !PERSONAL_DOMAINS.iter().any(|p| domain.contains(p)) {
                points += 5;
                signals.push("professional email domain".to_string());
            }
        }

        let meeting_hits = MEETING_KEYWORDS.iter().filter(|k| text.contains(*k)).count();
        let score = u8::try_from((points * 4).min(100)).unwrap_or(100);

        let mut classification = Classification::new(
            points >= self.qualify_threshold,
            meeting_hits >= self.min_meeting_keywords,
            score,
        )
        .as_fallback();
        classification.signals.extend(signals);
        classification
    }
}
