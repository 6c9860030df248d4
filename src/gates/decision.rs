//! Completion / decision engine and the direct-match paths.
//!
//! Classifies a merged state into a [`Decision`]. Priority when multiple
//! conditions could apply:
//! 1. a just-answered gate hit one of its limiting values — terminate,
//!    short-circuiting gate selection entirely
//! 2. a required gate is still unanswered — ask it
//! 3. all required gates answered — await confirmation
//!
//! `PassConfirmed` is never produced here; only the confirmation
//! sub-dialogue emits it.

use crate::config::strategy::{GateConfig, GateDefinition};
use crate::types::{Decision, GateState};

use super::selector::next_required_gate;

/// Outcome of matching raw input against a gate's expected categories.
///
/// Exhaustive by construction: every direct-match branch produces either
/// a category or an explicit `NoMatch` that the caller must route, so no
/// path can fall through with an unset result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectMatch {
    /// Input matched an expected category (canonical casing).
    Matched(String),
    /// Input matched nothing; route to the model-assisted path.
    NoMatch,
}

/// Match input against a gate's expected categories.
///
/// Case-insensitive after trimming and stripping enclosing punctuation:
/// `"no."` matches `"No"`, `"  YES "` matches `"Yes"`.
pub fn direct_match(input: &str, definition: &GateDefinition) -> DirectMatch {
    let normalized = normalize(input);
    if normalized.is_empty() {
        return DirectMatch::NoMatch;
    }

    for category in &definition.expected_categories {
        if normalize(category) == normalized {
            return DirectMatch::Matched(category.clone());
        }
    }
    DirectMatch::NoMatch
}

fn normalize(text: &str) -> String {
    text.trim()
        .trim_matches(|c: char| c.is_ascii_punctuation())
        .trim()
        .to_lowercase()
}

/// Classify a merged state into a decision.
///
/// `answered_now` names the gates the current turn just wrote; only
/// those are checked against limiting values (earlier turns already had
/// their check).
pub fn classify(state: &GateState, config: &GateConfig, answered_now: &[String]) -> Decision {
    // Limiting values short-circuit selection.
    for key in answered_now {
        let Some(definition) = config.gate(key) else {
            continue;
        };
        let Some(classified) = state.value(key).and_then(|v| v.classified.as_deref()) else {
            continue;
        };
        if definition.is_limiting(classified) {
            return Decision::StopLimitingValue {
                gate: key.clone(),
                stop_message: definition
                    .stop_message
                    .clone()
                    .unwrap_or_else(|| "We can't continue with that answer.".to_owned()),
            };
        }
    }

    match next_required_gate(state, config) {
        Some((key, definition)) => Decision::FailRequiredMissing {
            next_gate: key.to_owned(),
            next_question: definition.question.clone(),
        },
        None => Decision::PassAwaitingConfirmation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::strategy::{StrategyProvider, TomlStrategyProvider};
    use crate::types::GateValue;
    use std::sync::Arc;

    fn config() -> Arc<GateConfig> {
        let doc = r#"
[strategy.test]
gate_order = ["availability", "history"]

[strategy.test.gates.availability]
question = "Available?"
expected_categories = ["Yes", "No"]
limiting_values = ["No"]
stop_message = "Thanks, we can't proceed without availability."

[strategy.test.gates.history]
question = "Seen before?"
expected_categories = ["Yes", "No"]
"#;
        TomlStrategyProvider::from_toml(doc)
            .expect("should parse")
            .load_gate_config("test")
            .expect("should resolve")
    }

    fn answer(state: &mut GateState, key: &str, category: &str) {
        state.values.insert(
            key.to_owned(),
            GateValue {
                raw: Some(category.to_lowercase()),
                classified: Some(category.to_owned()),
                confidence: 1.0,
            },
        );
    }

    // -- direct_match --

    #[test]
    fn direct_match_exact() {
        let cfg = config();
        let gate = cfg.gate("availability").expect("should exist");
        assert_eq!(direct_match("Yes", gate), DirectMatch::Matched("Yes".to_owned()));
        assert_eq!(direct_match("No", gate), DirectMatch::Matched("No".to_owned()));
    }

    #[test]
    fn direct_match_is_case_insensitive_and_trims() {
        let cfg = config();
        let gate = cfg.gate("availability").expect("should exist");
        assert_eq!(
            direct_match("  yes ", gate),
            DirectMatch::Matched("Yes".to_owned())
        );
        assert_eq!(
            direct_match("NO.", gate),
            DirectMatch::Matched("No".to_owned())
        );
        assert_eq!(
            direct_match("\"no\"", gate),
            DirectMatch::Matched("No".to_owned())
        );
    }

    #[test]
    fn direct_match_rejects_everything_else() {
        let cfg = config();
        let gate = cfg.gate("availability").expect("should exist");
        assert_eq!(direct_match("maybe", gate), DirectMatch::NoMatch);
        assert_eq!(direct_match("yes please, after 5", gate), DirectMatch::NoMatch);
        assert_eq!(direct_match("", gate), DirectMatch::NoMatch);
        assert_eq!(direct_match("...", gate), DirectMatch::NoMatch);
    }

    // -- classify --

    #[test]
    fn limiting_value_short_circuits_selection() {
        let cfg = config();
        let mut state = GateState::default();
        answer(&mut state, "availability", "No");

        let decision = classify(&state, &cfg, &["availability".to_owned()]);
        match decision {
            Decision::StopLimitingValue { gate, stop_message } => {
                assert_eq!(gate, "availability");
                assert_eq!(
                    stop_message,
                    "Thanks, we can't proceed without availability."
                );
            }
            other => panic!("expected StopLimitingValue, got {other:?}"),
        }
    }

    #[test]
    fn limiting_value_wins_regardless_of_other_gates() {
        let cfg = config();
        let mut state = GateState::default();
        answer(&mut state, "availability", "No");
        answer(&mut state, "history", "Yes");

        let decision = classify(&state, &cfg, &["availability".to_owned()]);
        assert!(matches!(decision, Decision::StopLimitingValue { .. }));
    }

    #[test]
    fn old_limiting_answer_does_not_refire() {
        // "No" on availability was answered on an earlier turn (already
        // terminated then); a classify for a different gate must not
        // re-check it.
        let cfg = config();
        let mut state = GateState::default();
        answer(&mut state, "availability", "Yes");

        let decision = classify(&state, &cfg, &["history".to_owned()]);
        assert!(matches!(decision, Decision::FailRequiredMissing { .. }));
    }

    #[test]
    fn missing_required_gate_is_asked_next() {
        let cfg = config();
        let mut state = GateState::default();
        answer(&mut state, "availability", "Yes");

        let decision = classify(&state, &cfg, &["availability".to_owned()]);
        match decision {
            Decision::FailRequiredMissing {
                next_gate,
                next_question,
            } => {
                assert_eq!(next_gate, "history");
                assert_eq!(next_question, "Seen before?");
            }
            other => panic!("expected FailRequiredMissing, got {other:?}"),
        }
    }

    #[test]
    fn all_answered_awaits_confirmation() {
        let cfg = config();
        let mut state = GateState::default();
        answer(&mut state, "availability", "Yes");
        answer(&mut state, "history", "No");

        let decision = classify(&state, &cfg, &["history".to_owned()]);
        assert_eq!(decision, Decision::PassAwaitingConfirmation);
    }

    #[test]
    fn non_limiting_answer_on_limiting_gate_proceeds() {
        let cfg = config();
        let mut state = GateState::default();
        answer(&mut state, "availability", "Yes");

        let decision = classify(&state, &cfg, &["availability".to_owned()]);
        assert!(matches!(decision, Decision::FailRequiredMissing { .. }));
    }
}
