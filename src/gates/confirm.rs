//! Confirmation / edit sub-dialogue.
//!
//! Entered precisely when the dialogue is informationally complete and
//! the user has not yet confirmed. The next turn's raw text resolves to
//! one of two intents: **confirm** (affirmative language) or **edit**
//! (everything else — edit is the default, so an ambiguous reply never
//! silently confirms).

use crate::config::strategy::GateConfig;
use crate::config::EditResumePolicy;
use crate::types::GateState;

use super::selector::next_required_gate;

/// Intent detected from the user's reply to the confirmation summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmIntent {
    /// Affirmative: proceed to handoff.
    Confirm,
    /// Anything else: reopen the dialogue for edits.
    Edit,
}

const AFFIRMATIVE_WORDS: &[&str] = &[
    "yes", "yep", "yeah", "correct", "confirm", "confirmed", "proceed", "ok", "okay", "sure",
    "right", "good", "perfect",
];

const NEGATIVE_WORDS: &[&str] = &[
    "no", "not", "nope", "wrong", "incorrect", "change", "edit", "fix", "redo", "actually",
];

/// Detect confirm/edit intent from raw text.
///
/// Negative markers dominate: "no, that's not correct" contains
/// "correct" but must never confirm.
pub fn detect_intent(text: &str) -> ConfirmIntent {
    let lower = text.trim().to_lowercase();
    if lower.contains("n't") {
        return ConfirmIntent::Edit;
    }

    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    if words.iter().any(|w| NEGATIVE_WORDS.contains(w)) {
        return ConfirmIntent::Edit;
    }
    if words.iter().any(|w| AFFIRMATIVE_WORDS.contains(w)) {
        return ConfirmIntent::Confirm;
    }
    ConfirmIntent::Edit
}

/// Pick the gate the edit path reopens.
///
/// Under [`EditResumePolicy::ResumeLastGap`]: reuse the last known
/// `status.next_gate` when set; otherwise the first required gate
/// missing a classified value; otherwise the first gate in order.
/// Under [`EditResumePolicy::RestartFromTop`]: always the first gate.
///
/// Returns `(gate_key, question)`.
pub fn resume_gate(
    state: &GateState,
    config: &GateConfig,
    policy: EditResumePolicy,
) -> Option<(String, String)> {
    match policy {
        EditResumePolicy::RestartFromTop => first_gate(config),
        EditResumePolicy::ResumeLastGap => {
            if let Some(key) = &state.status.next_gate {
                if let Some(definition) = config.gate(key) {
                    return Some((key.clone(), definition.question.clone()));
                }
            }
            if let Some((key, definition)) = next_required_gate(state, config) {
                return Some((key.to_owned(), definition.question.clone()));
            }
            first_gate(config)
        }
    }
}

fn first_gate(config: &GateConfig) -> Option<(String, String)> {
    config
        .first_gate()
        .map(|(key, definition)| (key.to_owned(), definition.question.clone()))
}
