//! Stage specifications: a stage plus the gate in front of it.

use crate::core::StageKind;
use crate::gates::{DecisionGate, RejectEffect};
use crate::stages::{Stage, StageVariant};

/// One declared pipeline step.
#[derive(Debug, Clone)]
pub struct StageSpec {
    /// The stage implementation.
    pub stage: StageVariant,
    /// Gate evaluated before the stage runs.
    pub gate: DecisionGate,
    /// Effect of a rejected gate.
    pub on_reject: RejectEffect,
}

impl StageSpec {
    /// Creates an ungated specification.
    #[must_use]
    pub fn new(stage: impl Into<StageVariant>) -> Self {
        Self {
            stage: stage.into(),
            gate: DecisionGate::Always,
            on_reject: RejectEffect::Bypass,
        }
    }

    /// Puts a gate in front of the stage.
    #[must_use]
    pub fn with_gate(mut self, gate: DecisionGate, on_reject: RejectEffect) -> Self {
        self.gate = gate;
        self.on_reject = on_reject;
        self
    }

    /// The stage's name.
    #[must_use]
    pub fn kind(&self) -> StageKind {
        self.stage.kind()
    }
}
