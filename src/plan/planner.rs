//! Model-assisted planner.
//!
//! Given the resolved fields so far, the planner model proposes a
//! structured plan candidate with any outstanding blockers. Its output
//! shares the extraction model's failure modes (prose wrappers, code
//! fences, malformed JSON) and goes through the same payload location
//! before decoding. The candidate's own readiness hint is decoded but
//! never trusted; the plan engine re-derives readiness from the blocker
//! list.

use std::sync::Arc;

use tracing::debug;

use crate::gates::parser::locate_json_payload;
use crate::providers::{CompletionClient, CompletionRequest, ProviderError};
use crate::types::{BoundedPlanState, PlanSpec};

/// System prompt for the planner model.
const PLANNER_PROMPT: &str = "\
You are a planner. Given the fields already resolved for a session,
propose a structured execution plan. Respond with JSON only:

{ \"steps\": [ { \"step\": 1, \"action\": \"<action_id>\", \"args\": { } } ],
  \"blockers\": [ { \"type\": \"missing_field\", \"writes_to\": [\"<field>\"], \
\"description\": \"<what is missing>\" } ],
  \"readiness_hint\": \"needs_input\" | \"ready_for_compilation\" }

List a blocker for every binding the plan still needs. An empty blocker
list means the plan is complete.";

/// Reasons a plan proposal could not be obtained.
#[derive(Debug, thiserror::Error)]
pub enum PlanFailure {
    /// The model call failed (transport, status, timeout).
    #[error("planner model call failed: {0}")]
    Model(#[from] ProviderError),
    /// No JSON payload could be located in the model output.
    #[error("no JSON payload found in planner output")]
    NoPayload,
    /// A payload was found but did not decode as a plan.
    #[error("invalid plan payload: {0}")]
    InvalidPayload(String),
}

/// Wraps the completion client with plan-shaped prompting and decoding.
pub struct Planner {
    model: Arc<dyn CompletionClient>,
}

impl Planner {
    /// Create a planner over a completion client.
    pub fn new(model: Arc<dyn CompletionClient>) -> Self {
        Self { model }
    }

    /// Ask the model for an updated plan candidate.
    ///
    /// # Errors
    ///
    /// Returns [`PlanFailure`] on transport failure or undecodable
    /// output; the caller recovers by keeping its previous candidate.
    pub async fn propose(&self, state: &BoundedPlanState) -> Result<PlanSpec, PlanFailure> {
        let request = CompletionRequest::new(compose_prompt(state)).with_system(PLANNER_PROMPT);
        let raw = self.model.complete(request).await?;
        let spec = parse_plan(&raw)?;
        debug!(
            steps = spec.steps.len(),
            blockers = spec.blockers.len(),
            "plan candidate decoded"
        );
        Ok(spec)
    }
}

/// Render the resolved fields into the planner's user prompt.
fn compose_prompt(state: &BoundedPlanState) -> String {
    let mut prompt = String::from("Resolved fields:\n");
    if state.known_context.is_empty() {
        prompt.push_str("(none yet)\n");
    }
    for (field, value) in &state.known_context {
        prompt.push_str(&format!("- {field}: {value}\n"));
    }
    if let Some(last) = &state.last_plan {
        prompt.push_str(&format!(
            "\nPrevious candidate had {} step(s) and {} blocker(s). Refine it.\n",
            last.steps.len(),
            last.blockers.len()
        ));
    }
    prompt.push_str("\nPropose the updated plan.");
    prompt
}

/// Decode planner output into a [`PlanSpec`].
///
/// # Errors
///
/// Returns [`PlanFailure::NoPayload`] when no JSON object is present and
/// [`PlanFailure::InvalidPayload`] when it does not decode.
pub fn parse_plan(raw: &str) -> Result<PlanSpec, PlanFailure> {
    let payload = locate_json_payload(raw).ok_or(PlanFailure::NoPayload)?;
    serde_json::from_str(payload).map_err(|e| PlanFailure::InvalidPayload(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_plan_payload() {
        let raw = r#"{
            "steps": [{"step": 1, "action": "book_appointment", "args": {"slot": "am"}}],
            "blockers": [{"type": "missing_field", "writes_to": ["patient_name"], "description": "need the patient's name"}],
            "readiness_hint": "needs_input"
        }"#;
        let spec = parse_plan(raw).expect("should parse");
        assert_eq!(spec.steps.len(), 1);
        assert_eq!(spec.steps[0].action, "book_appointment");
        assert_eq!(spec.blockers[0].writes_to, vec!["patient_name"]);
        assert_eq!(spec.readiness_hint.as_deref(), Some("needs_input"));
    }

    #[test]
    fn parses_fenced_plan_payload() {
        let raw = "Plan follows.\n```json\n{\"steps\": [], \"blockers\": []}\n```";
        let spec = parse_plan(raw).expect("should parse");
        assert!(spec.steps.is_empty());
        assert!(spec.blockers.is_empty());
    }

    #[test]
    fn missing_sections_default_to_empty() {
        let spec = parse_plan("{}").expect("should parse");
        assert!(spec.steps.is_empty());
        assert!(spec.blockers.is_empty());
        assert!(spec.readiness_hint.is_none());
    }

    #[test]
    fn prose_without_payload_fails() {
        assert!(matches!(
            parse_plan("I cannot produce a plan right now."),
            Err(PlanFailure::NoPayload)
        ));
    }

    #[test]
    fn malformed_payload_fails() {
        assert!(matches!(
            parse_plan(r#"{"steps": "not a list"}"#),
            Err(PlanFailure::InvalidPayload(_))
        ));
    }

    #[test]
    fn prompt_lists_resolved_fields() {
        let mut state = BoundedPlanState::default();
        state.record_field("patient_name", serde_json::json!("Ada Lovelace"));

        let prompt = compose_prompt(&state);
        assert!(prompt.contains("patient_name"));
        assert!(prompt.contains("Ada Lovelace"));
    }
}
