//! Canonicalizing parser for model extraction output.
//!
//! The extraction model is asked for a JSON payload of the shape:
//!
//! ```json
//! { "gates": { "<gate_key>": { "value": "...", "category": "...", "confidence": 0.9 } } }
//! ```
//!
//! Models wrap payloads in prose or code fences; [`locate_json_payload`]
//! tolerates both. Parsing is a pure function of (raw text, gate config):
//! it validates the shape, trims strings, converts empty strings to null,
//! canonicalizes categories against the gate's expected set, and rejects
//! gate keys that are not configured.

use std::collections::BTreeMap;

use serde::Deserialize;
use thiserror::Error;

use crate::config::strategy::GateConfig;
use crate::types::GateValue;

/// A validated state fragment: per-gate values extracted from one turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    /// Extracted values keyed by gate key.
    pub gates: BTreeMap<String, GateValue>,
}

impl Fragment {
    /// A fragment holding a single gate value.
    pub fn single(key: impl Into<String>, value: GateValue) -> Self {
        let mut gates = BTreeMap::new();
        gates.insert(key.into(), value);
        Self { gates }
    }

    /// Whether the fragment carries no usable classified value.
    pub fn is_empty(&self) -> bool {
        !self.gates.values().any(GateValue::is_answered)
    }
}

/// Reasons extraction output could not be canonicalized.
#[derive(Debug, Error)]
pub enum ParseFailure {
    /// No JSON payload could be located in the text.
    #[error("no JSON payload found in extraction output")]
    NoPayload,
    /// A payload was found but did not match the expected shape.
    #[error("invalid extraction payload: {0}")]
    InvalidPayload(String),
    /// The payload names a gate key outside the configured gate set.
    #[error("extraction payload references unknown gate key: {0}")]
    UnknownGateKey(String),
}

#[derive(Debug, Deserialize)]
struct RawPayload {
    gates: BTreeMap<String, RawGateValue>,
}

#[derive(Debug, Deserialize)]
struct RawGateValue {
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Parse and canonicalize extraction output into a state fragment.
///
/// Pure function of `(raw, config)`; never mutates global state.
///
/// # Errors
///
/// Returns [`ParseFailure`] when no payload is found, the payload shape
/// is wrong, or a gate key is not in the configured set.
pub fn parse_fragment(raw: &str, config: &GateConfig) -> Result<Fragment, ParseFailure> {
    let payload = locate_json_payload(raw).ok_or(ParseFailure::NoPayload)?;

    let parsed: RawPayload = serde_json::from_str(payload)
        .map_err(|e| ParseFailure::InvalidPayload(e.to_string()))?;

    let mut gates = BTreeMap::new();
    for (key, raw_value) in parsed.gates {
        let definition = config
            .gate(&key)
            .ok_or_else(|| ParseFailure::UnknownGateKey(key.clone()))?;

        let value = normalize_string(raw_value.value);
        let classified = normalize_string(raw_value.category)
            .and_then(|c| canonical_category(&c, &definition.expected_categories));
        let confidence = raw_value.confidence.unwrap_or(0.0).clamp(0.0, 1.0);

        gates.insert(
            key,
            GateValue {
                raw: value,
                classified,
                confidence,
            },
        );
    }

    Ok(Fragment { gates })
}

/// Trim a string field; empty becomes null.
fn normalize_string(value: Option<String>) -> Option<String> {
    let trimmed = value?.trim().to_owned();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

/// Map a category onto the configured casing, case-insensitively.
///
/// Returns `None` for categories outside the expected set — a
/// hallucinated category is no answer at all.
fn canonical_category(candidate: &str, expected: &[String]) -> Option<String> {
    expected
        .iter()
        .find(|c| c.eq_ignore_ascii_case(candidate))
        .cloned()
}

/// Locate a JSON object inside surrounding prose or a code fence.
///
/// Tries, in order: the whole trimmed text, the contents of the first
/// code fence, and the span from the first `{` to the last `}`.
pub fn locate_json_payload(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Some(trimmed);
    }

    if let Some(block) = extract_fenced_block(trimmed) {
        if block.starts_with('{') {
            return Some(block);
        }
    }

    // Narrative wrapper: take the outermost brace span.
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end > start {
        return trimmed.get(start..=end);
    }
    None
}

/// Extract the contents of a markdown code fence.
///
/// Supports both ```` ```json ```` and bare ```` ``` ```` fences.
fn extract_fenced_block(text: &str) -> Option<&str> {
    let start_marker_json = "```json";
    let start_marker_plain = "```";
    let end_marker = "```";

    let content_start = if let Some(pos) = text.find(start_marker_json) {
        pos.checked_add(start_marker_json.len())?
    } else if let Some(pos) = text.find(start_marker_plain) {
        pos.checked_add(start_marker_plain.len())?
    } else {
        return None;
    };

    let rest = text.get(content_start..)?;
    let rest = rest.strip_prefix('\n').unwrap_or(rest);
    let end_pos = rest.find(end_marker)?;
    Some(rest.get(..end_pos)?.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::strategy::{StrategyProvider, TomlStrategyProvider};
    use std::sync::Arc;

    fn config() -> Arc<GateConfig> {
        let doc = r#"
[strategy.test]
gate_order = ["availability", "history"]

[strategy.test.gates.availability]
question = "Available?"
expected_categories = ["Yes", "No"]
limiting_values = ["No"]
stop_message = "Stopping."

[strategy.test.gates.history]
question = "Seen before?"
expected_categories = ["Yes", "No"]
"#;
        TomlStrategyProvider::from_toml(doc)
            .expect("should parse")
            .load_gate_config("test")
            .expect("should resolve")
    }

    #[test]
    fn parses_bare_json_payload() {
        let raw = r#"{"gates": {"availability": {"value": "yes I am", "category": "Yes", "confidence": 0.92}}}"#;
        let fragment = parse_fragment(raw, &config()).expect("should parse");

        let value = fragment.gates.get("availability").expect("should exist");
        assert_eq!(value.raw.as_deref(), Some("yes I am"));
        assert_eq!(value.classified.as_deref(), Some("Yes"));
        assert!((value.confidence - 0.92).abs() < f64::EPSILON);
    }

    #[test]
    fn parses_payload_inside_code_fence() {
        let raw = "Here is the extraction:\n```json\n{\"gates\": {\"history\": {\"value\": \"no\", \"category\": \"No\", \"confidence\": 0.8}}}\n```\nDone.";
        let fragment = parse_fragment(raw, &config()).expect("should parse");
        assert_eq!(
            fragment
                .gates
                .get("history")
                .and_then(|v| v.classified.as_deref()),
            Some("No")
        );
    }

    #[test]
    fn parses_payload_inside_narrative() {
        let raw = "I believe the answer is {\"gates\": {\"availability\": {\"category\": \"Yes\", \"confidence\": 0.7}}} based on the text.";
        let fragment = parse_fragment(raw, &config()).expect("should parse");
        assert!(fragment.gates.contains_key("availability"));
    }

    #[test]
    fn trims_strings_and_nulls_empties() {
        let raw = r#"{"gates": {"availability": {"value": "  yes  ", "category": "", "confidence": 0.5}}}"#;
        let fragment = parse_fragment(raw, &config()).expect("should parse");
        let value = fragment.gates.get("availability").expect("should exist");
        assert_eq!(value.raw.as_deref(), Some("yes"));
        assert!(value.classified.is_none(), "empty category becomes null");
    }

    #[test]
    fn canonicalizes_category_casing() {
        let raw = r#"{"gates": {"availability": {"category": "yes", "confidence": 0.9}}}"#;
        let fragment = parse_fragment(raw, &config()).expect("should parse");
        assert_eq!(
            fragment
                .gates
                .get("availability")
                .and_then(|v| v.classified.as_deref()),
            Some("Yes"),
            "category should adopt configured casing"
        );
    }

    #[test]
    fn rejects_unexpected_category_as_unanswered() {
        let raw = r#"{"gates": {"availability": {"category": "Perhaps", "confidence": 0.9}}}"#;
        let fragment = parse_fragment(raw, &config()).expect("should parse");
        assert!(
            fragment
                .gates
                .get("availability")
                .is_some_and(|v| v.classified.is_none()),
            "a category outside the expected set is no answer"
        );
        assert!(fragment.is_empty());
    }

    #[test]
    fn rejects_unknown_gate_key() {
        let raw = r#"{"gates": {"shoe_size": {"category": "Yes", "confidence": 1.0}}}"#;
        let err = parse_fragment(raw, &config()).expect_err("should fail");
        match err {
            ParseFailure::UnknownGateKey(key) => assert_eq!(key, "shoe_size"),
            other => panic!("expected UnknownGateKey, got {other:?}"),
        }
    }

    #[test]
    fn missing_payload_fails() {
        let err = parse_fragment("I couldn't find anything useful.", &config())
            .expect_err("should fail");
        assert!(matches!(err, ParseFailure::NoPayload));
    }

    #[test]
    fn malformed_payload_fails() {
        let err = parse_fragment(r#"{"not_gates": true}"#, &config()).expect_err("should fail");
        assert!(matches!(err, ParseFailure::InvalidPayload(_)));
    }

    #[test]
    fn confidence_is_clamped() {
        let raw = r#"{"gates": {"availability": {"category": "Yes", "confidence": 3.5}}}"#;
        let fragment = parse_fragment(raw, &config()).expect("should parse");
        let value = fragment.gates.get("availability").expect("should exist");
        assert!((value.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn parsing_is_pure_and_repeatable() {
        let raw = r#"{"gates": {"availability": {"category": "Yes", "confidence": 0.9}}}"#;
        let cfg = config();
        let first = parse_fragment(raw, &cfg).expect("should parse");
        let second = parse_fragment(raw, &cfg).expect("should parse");
        assert_eq!(first, second);
    }

    #[test]
    fn locate_payload_prefers_whole_text() {
        assert_eq!(locate_json_payload(r#"{"a": 1}"#), Some(r#"{"a": 1}"#));
        assert!(locate_json_payload("   ").is_none());
        assert!(locate_json_payload("no braces here").is_none());
    }
}
