//! Decision gates evaluated between stage executions.
//!
//! A gate is a pure predicate over the unit and the outcomes recorded so far.
//! It never calls a collaborator, so identical inputs always produce the
//! same [`GateDecision`].

mod sender;

pub use sender::SenderFilter;

use crate::collaborators::Classification;
use crate::core::{StageKind, StageOutcome, UnitOfWork};
use serde::{Deserialize, Serialize};

/// Admit/skip verdict for one stage. Derived, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateDecision {
    /// The stage the decision is about.
    pub stage: StageKind,
    /// Whether the stage may run.
    pub admitted: bool,
    /// Why the stage was skipped; empty when admitted.
    pub reason: String,
}

impl GateDecision {
    /// Admits the stage.
    #[must_use]
    pub fn admit(stage: StageKind) -> Self {
        Self {
            stage,
            admitted: true,
            reason: String::new(),
        }
    }

    /// Skips the stage.
    #[must_use]
    pub fn skip(stage: StageKind, reason: impl Into<String>) -> Self {
        Self {
            stage,
            admitted: false,
            reason: reason.into(),
        }
    }
}

/// What a rejected gate does to the rest of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectEffect {
    /// Skip to finalization; the unit still completes.
    #[default]
    Bypass,
    /// Skip to finalization; the unit's terminal status is `skipped`.
    SkipUnit,
}

/// Closed set of gates.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DecisionGate {
    /// Always admits.
    #[default]
    Always,
    /// Admits units that do not look like automated mail.
    BusinessSender(SenderFilter),
    /// Admits only when the latest classification qualifies AND requests a meeting.
    QualifiedMeetingRequest,
}

impl DecisionGate {
    /// Short name used in logs and events.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::BusinessSender(_) => "business_sender",
            Self::QualifiedMeetingRequest => "qualified_meeting_request",
        }
    }

    /// Evaluates the gate in front of `stage`.
    #[must_use]
    pub fn evaluate(&self, stage: StageKind, unit: &UnitOfWork, outcomes: &[StageOutcome]) -> GateDecision {
        match self {
            Self::Always => GateDecision::admit(stage),
            Self::BusinessSender(filter) => match filter.rejection(unit) {
                Some(reason) => GateDecision::skip(stage, reason),
                None => GateDecision::admit(stage),
            },
            Self::QualifiedMeetingRequest => {
                let classification = outcomes
                    .iter()
                    .rev()
                    .find(|o| o.stage == StageKind::Classification && o.is_success())
                    .and_then(StageOutcome::payload_as::<Classification>);

                match classification {
                    None => GateDecision::skip(stage, "no classification available"),
                    Some(c) if !c.qualifies => GateDecision::skip(stage, "not a qualified lead"),
                    Some(c) if !c.meeting_requested => GateDecision::skip(stage, "no meeting requested"),
                    Some(_) => GateDecision::admit(stage),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::UnitKind;
    use chrono::Utc;

    fn unit() -> UnitOfWork {
        UnitOfWork::new("msg_1", UnitKind::Email, Utc::now(), serde_json::json!({}))
    }

    fn classified(qualifies: bool, meeting: bool) -> Vec<StageOutcome> {
        let c = Classification::new(qualifies, meeting, 70);
        vec![StageOutcome::succeeded(
            StageKind::Classification,
            serde_json::to_value(c).unwrap(),
        )]
    }

    #[test]
    fn test_always_admits() {
        let d = DecisionGate::Always.evaluate(StageKind::Classification, &unit(), &[]);
        assert!(d.admitted);
        assert_eq!(d.stage, StageKind::Classification);
    }

    #[test]
    fn test_meeting_gate_admits_qualified_meeting() {
        let d = DecisionGate::QualifiedMeetingRequest.evaluate(
            StageKind::Scheduling,
            &unit(),
            &classified(true, true),
        );
        assert_eq!(d, GateDecision::admit(StageKind::Scheduling));
    }

    #[test]
    fn test_meeting_gate_skips() {
        let gate = DecisionGate::QualifiedMeetingRequest;

        let d = gate.evaluate(StageKind::Scheduling, &unit(), &classified(true, false));
        assert!(!d.admitted);
        assert_eq!(d.reason, "no meeting requested");

        let d = gate.evaluate(StageKind::Scheduling, &unit(), &classified(false, true));
        assert_eq!(d.reason, "not a qualified lead");

        let d = gate.evaluate(StageKind::Scheduling, &unit(), &[]);
        assert!(!d.admitted);
    }

    #[test]
    fn test_meeting_gate_ignores_failed_classification() {
        let outcomes = vec![StageOutcome::failed(
            StageKind::Classification,
            crate::core::OutcomeError::terminal("boom"),
        )];
        let d = DecisionGate::QualifiedMeetingRequest.evaluate(StageKind::Scheduling, &unit(), &outcomes);
        assert!(!d.admitted);
    }

    #[test]
    fn test_gate_is_deterministic() {
        let outcomes = classified(true, true);
        let gate = DecisionGate::QualifiedMeetingRequest;
        let first = gate.evaluate(StageKind::Scheduling, &unit(), &outcomes);
        for _ in 0..10 {
            assert_eq!(gate.evaluate(StageKind::Scheduling, &unit(), &outcomes), first);
        }
    }

    #[test]
    fn test_business_sender_gate() {
        let gate = DecisionGate::BusinessSender(SenderFilter::default());
        let automated = UnitOfWork::new(
            "msg_9",
            UnitKind::Email,
            Utc::now(),
            serde_json::json!({"sender_email": "no-reply@bank.com", "subject": "Statement"}),
        );
        let d = gate.evaluate(StageKind::Classification, &automated, &[]);
        assert!(!d.admitted);
        assert!(d.reason.starts_with("automated sender"));
        assert_eq!(gate.name(), "business_sender");
    }
}
