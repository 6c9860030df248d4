//! Gate selector.
//!
//! A single linear, order-preserving scan of `gate_order` is the sole
//! source of truth for "what's next" — the fast path and the model path
//! both consult it, so their behavior cannot diverge.

use crate::config::strategy::{GateConfig, GateDefinition};
use crate::types::GateState;

/// Return the first required gate in `gate_order` whose value is still
/// unanswered, or `None` when all required gates are answered.
///
/// Pure function of its inputs; deterministic for identical state.
pub fn next_required_gate<'c>(
    state: &GateState,
    config: &'c GateConfig,
) -> Option<(&'c str, &'c GateDefinition)> {
    config
        .ordered_gates()
        .find(|(key, definition)| definition.required && !state.is_answered(key))
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
gate_order = ["availability", "preference", "history"]

[strategy.test.gates.availability]
question = "Available?"
expected_categories = ["Yes", "No"]

[strategy.test.gates.preference]
question = "Morning or afternoon?"
expected_categories = ["Morning", "Afternoon"]
required = false

[strategy.test.gates.history]
question = "Seen before?"
expected_categories = ["Yes", "No"]
"#;
        TomlStrategyProvider::from_toml(doc)
            .expect("should parse")
            .load_gate_config("test")
            .expect("should resolve")
    }

    fn answer(state: &mut GateState, key: &str) {
        state.values.insert(
            key.to_owned(),
            GateValue {
                raw: Some("yes".to_owned()),
                classified: Some("Yes".to_owned()),
                confidence: 1.0,
            },
        );
    }

    #[test]
    fn empty_state_selects_first_required_gate() {
        let state = GateState::default();
        let cfg = config();
        let (key, definition) = next_required_gate(&state, &cfg).expect("should select");
        assert_eq!(key, "availability");
        assert_eq!(definition.question, "Available?");
    }

    #[test]
    fn optional_gates_are_skipped() {
        let mut state = GateState::default();
        answer(&mut state, "availability");

        let cfg = config();
        let (key, _) = next_required_gate(&state, &cfg).expect("should select");
        assert_eq!(key, "history", "optional 'preference' must be skipped");
    }

    #[test]
    fn all_required_answered_selects_none() {
        let mut state = GateState::default();
        answer(&mut state, "availability");
        answer(&mut state, "history");

        let cfg = config();
        assert!(next_required_gate(&state, &cfg).is_none());
    }

    #[test]
    fn unanswered_null_value_still_selected() {
        let mut state = GateState::default();
        state.values.insert(
            "availability".to_owned(),
            GateValue {
                raw: Some("maybe".to_owned()),
                classified: None,
                confidence: 0.3,
            },
        );

        let cfg = config();
        let (key, _) = next_required_gate(&state, &cfg).expect("should select");
        assert_eq!(key, "availability", "a null classified value is unanswered");
    }

    #[test]
    fn selection_is_deterministic() {
        let mut state = GateState::default();
        answer(&mut state, "availability");
        let cfg = config();

        let first = next_required_gate(&state, &cfg).map(|(k, _)| k);
        let second = next_required_gate(&state, &cfg).map(|(k, _)| k);
        assert_eq!(first, second);
    }
}
