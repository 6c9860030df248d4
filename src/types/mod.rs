//! Core data model for the intake dialogue and the bounded plan that
//! follows it.
//!
//! Everything here is serializable: `GateState` and `BoundedPlanState` are
//! the two session-owned aggregates persisted by the state store after
//! every mutation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-gate result captured from one or more turns.
///
/// A gate is "answered" iff `classified` is non-null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateValue {
    /// Verbatim user-attributable text the value was derived from.
    pub raw: Option<String>,
    /// Normalized category from the gate's expected set.
    pub classified: Option<String>,
    /// Extraction confidence in `[0.0, 1.0]`. Direct matches carry `1.0`.
    pub confidence: f64,
}

impl GateValue {
    /// Whether this gate holds a usable classified answer.
    pub fn is_answered(&self) -> bool {
        self.classified.is_some()
    }
}

/// Dialogue resolution status carried inside [`GateState`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GateStatus {
    /// Whether the dialogue is informationally complete (or terminated).
    pub pass: bool,
    /// Key of the next required unanswered gate, when one exists.
    pub next_gate: Option<String>,
    /// Question text for `next_gate`, pre-resolved for the caller.
    pub next_question: Option<String>,
}

/// Where the dialogue currently sits in its lifecycle.
///
/// `Terminated` and `HandedOff` are terminal; no transition leaves them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialoguePhase {
    /// No turn has been processed yet.
    #[default]
    Empty,
    /// Collecting gate answers.
    Gathering,
    /// All required gates answered; waiting for the user's confirmation.
    AwaitingConfirmation,
    /// Confirmed and handed off to the bounded plan engine.
    HandedOff,
    /// A limiting value ended the dialogue early.
    Terminated,
}

impl DialoguePhase {
    /// Whether this phase admits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::HandedOff | Self::Terminated)
    }
}

/// The mutable aggregate for one dialogue session.
///
/// Created empty on the first turn, mutated exactly once per turn by the
/// merge step, persisted after every mutation. Exclusively owned by one
/// session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GateState {
    /// Collected values keyed by gate key. A key, once introduced, is
    /// never dropped.
    pub values: BTreeMap<String, GateValue>,
    /// Resolution status.
    pub status: GateStatus,
    /// Lifecycle phase.
    pub phase: DialoguePhase,
    /// Whether the user invoked the edit path from the confirmation
    /// review. While set, merges may overwrite answered gates.
    pub edit_mode: bool,
    /// Last mutation time.
    pub updated_at: Option<DateTime<Utc>>,
}

impl GateState {
    /// Look up the value for a gate key.
    pub fn value(&self, key: &str) -> Option<&GateValue> {
        self.values.get(key)
    }

    /// Whether the gate holds a classified answer.
    pub fn is_answered(&self, key: &str) -> bool {
        self.values.get(key).is_some_and(GateValue::is_answered)
    }
}

/// Classification of a processed turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Decision {
    /// Required gates remain unanswered; ask `next_gate` next.
    FailRequiredMissing {
        /// Key of the gate to ask.
        next_gate: String,
        /// Question text for that gate.
        next_question: String,
    },
    /// All required gates answered; the user has not yet confirmed.
    PassAwaitingConfirmation,
    /// The user confirmed the collected answers; ready for handoff.
    PassConfirmed,
    /// A disqualifying answer terminated the dialogue.
    StopLimitingValue {
        /// Gate whose limiting value fired.
        gate: String,
        /// Message to show the user.
        stop_message: String,
    },
    /// No usable value could be derived from the turn's input.
    ExtractionFailed,
}

/// How the turn's input originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOrigin {
    /// Free-form typed text.
    FreeText,
    /// A discrete choice (button click); pre-classified by the surface.
    Choice,
}

/// One inbound dialogue turn.
#[derive(Debug, Clone)]
pub struct TurnInput {
    /// Raw user text (or the choice label for [`TurnOrigin::Choice`]).
    pub text: String,
    /// Input origin, selecting the matching path.
    pub origin: TurnOrigin,
}

impl TurnInput {
    /// Free-text turn.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            origin: TurnOrigin::FreeText,
        }
    }

    /// Pre-classified choice turn.
    pub fn choice(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            origin: TurnOrigin::Choice,
        }
    }
}

/// Result of processing one dialogue turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Turn classification.
    pub decision: Decision,
    /// Phase after the turn.
    pub phase: DialoguePhase,
    /// User-facing reply: the next question, the confirmation summary,
    /// the stop message, or a clarification request.
    pub reply: String,
}

// ---------------------------------------------------------------------------
// Bounded plan aggregates
// ---------------------------------------------------------------------------

/// An unresolved requirement preventing a plan from being compiled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blocker {
    /// Blocker category (e.g. `"missing_field"`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Field names this blocker resolves when satisfied.
    #[serde(default)]
    pub writes_to: Vec<String>,
    /// Human-readable description surfaced to the user.
    #[serde(default)]
    pub description: String,
}

/// A single step of a proposed plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Step number (1-indexed).
    pub step: usize,
    /// Action identifier.
    pub action: String,
    /// Action arguments.
    #[serde(default)]
    pub args: serde_json::Value,
}

/// A model-proposed structured plan candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSpec {
    /// Ordered plan steps.
    #[serde(default)]
    pub steps: Vec<PlanStep>,
    /// Outstanding blockers reported by the planner.
    #[serde(default)]
    pub blockers: Vec<Blocker>,
    /// The planner's own readiness hint. Advisory only: readiness is
    /// re-derived from `blockers`.
    #[serde(default)]
    pub readiness_hint: Option<String>,
}

/// Whether the plan is ready for compilation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanReadiness {
    /// At least one blocker remains; more input is needed.
    #[default]
    NeedsInput,
    /// No blockers remain.
    ReadyForCompilation,
}

/// Session aggregate for the bounded plan loop.
///
/// Created only after the dialogue reaches a confirmed pass; destroyed
/// only with the owning session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundedPlanState {
    /// Field names already resolved.
    pub known_fields: Vec<String>,
    /// Resolved field values. Grows monotonically except on explicit
    /// correction.
    pub known_context: BTreeMap<String, serde_json::Value>,
    /// Outstanding blockers, ordered.
    pub blockers: Vec<Blocker>,
    /// Derived readiness.
    pub readiness: PlanReadiness,
    /// Most recent model-proposed plan.
    pub last_plan: Option<PlanSpec>,
    /// Number of `advance` iterations run so far. Exposed so a caller
    /// can impose a maximum.
    pub iterations: u64,
    /// Last mutation time.
    pub updated_at: Option<DateTime<Utc>>,
}

impl BoundedPlanState {
    /// Record a resolved field, keeping `known_fields` deduplicated.
    pub fn record_field(&mut self, name: &str, value: serde_json::Value) {
        if !self.known_fields.iter().any(|f| f == name) {
            self.known_fields.push(name.to_owned());
        }
        self.known_context.insert(name.to_owned(), value);
    }
}
