//! Gate engine — orchestrates one dialogue turn end to end.
//!
//! Load prior state → pick the matching path (direct match for choice
//! input and the first gate, model-assisted extraction otherwise) →
//! canonicalize → merge → classify → commit. State is read before any
//! suspension point and written only after the decision is fully
//! computed, so a crash mid-call leaves the previous snapshot
//! authoritative.
//!
//! Turns for one session are strictly serialized through a per-session
//! lock; sessions are otherwise fully independent.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::strategy::{ConfigError, GateConfig};
use crate::config::EditResumePolicy;
use crate::providers::{CompletionClient, CompletionRequest};
use crate::session::SessionLocks;
use crate::store::{StateStore, StoreError};
use crate::types::{
    Decision, DialoguePhase, GateState, GateValue, TurnInput, TurnOrigin, TurnOutcome,
};

use super::confirm::{self, ConfirmIntent};
use super::decision::{classify, direct_match, DirectMatch};
use super::merge::merge;
use super::parser::{parse_fragment, Fragment};
use super::selector::next_required_gate;

/// Fatal engine errors. Extraction and transport failures are not here:
/// they resolve to [`Decision::ExtractionFailed`] and the turn recovers
/// locally.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Gate configuration is missing or invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The state store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// System prompt for the extraction model.
const EXTRACTOR_PROMPT: &str = "\
You extract structured answers from a user's message in an intake dialogue.
You receive the gate schema (key, question, expected categories) and the
user's message. Respond with JSON only:

{ \"gates\": { \"<gate_key>\": { \"value\": \"<verbatim supporting text>\", \
\"category\": \"<one expected category or null>\", \"confidence\": <0.0-1.0> } } }

Only include gates the message actually answers. Never invent categories
outside the expected set.";

/// Single commit point for a turn's state write.
///
/// Both the fast path and the model path route their save through here;
/// the flag makes a double write within one turn impossible.
struct CommitPoint<'a> {
    store: &'a dyn StateStore,
    session_id: &'a str,
    committed: bool,
}

impl<'a> CommitPoint<'a> {
    fn new(store: &'a dyn StateStore, session_id: &'a str) -> Self {
        Self {
            store,
            session_id,
            committed: false,
        }
    }

    async fn commit(&mut self, state: &GateState) -> Result<(), StoreError> {
        if self.committed {
            warn!(session_id = %self.session_id, "duplicate state commit suppressed");
            return Ok(());
        }
        self.store.save(self.session_id, state).await?;
        self.committed = true;
        Ok(())
    }
}

/// Drives the gate collection state machine for any number of sessions.
pub struct GateEngine {
    config: Arc<GateConfig>,
    store: Arc<dyn StateStore>,
    model: Arc<dyn CompletionClient>,
    edit_policy: EditResumePolicy,
    locks: SessionLocks,
}

impl GateEngine {
    /// Create an engine for one gate strategy.
    pub fn new(
        config: Arc<GateConfig>,
        store: Arc<dyn StateStore>,
        model: Arc<dyn CompletionClient>,
        edit_policy: EditResumePolicy,
    ) -> Self {
        Self {
            config,
            store,
            model,
            edit_policy,
            locks: SessionLocks::default(),
        }
    }

    /// The strategy this engine runs.
    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// The question that opens a fresh dialogue.
    pub fn opening_question(&self) -> Option<&str> {
        self.config
            .first_gate()
            .map(|(_, definition)| definition.question.as_str())
    }

    /// Process one dialogue turn for a session.
    ///
    /// At most one state save occurs per turn, and only after the
    /// decision is fully computed. Extraction failure leaves the stored
    /// state untouched.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] on store failure; extraction and
    /// transport failures resolve to [`Decision::ExtractionFailed`]
    /// instead.
    pub async fn process_turn(
        &self,
        session_id: &str,
        input: TurnInput,
    ) -> Result<TurnOutcome, EngineError> {
        let lock = self.locks.for_session(session_id);
        let _guard = lock.lock().await;

        let turn_id = Uuid::new_v4();
        let prev = self.store.load(session_id).await?;
        let mut commit = CommitPoint::new(self.store.as_ref(), session_id);

        if let Some(state) = &prev {
            if state.phase == DialoguePhase::Terminated {
                debug!(session_id, %turn_id, "turn on terminated dialogue ignored");
                return Ok(self.terminated_outcome(state));
            }
            if state.phase == DialoguePhase::HandedOff {
                debug!(session_id, %turn_id, "turn on handed-off dialogue; plan engine owns it");
                return Ok(TurnOutcome {
                    decision: Decision::PassConfirmed,
                    phase: DialoguePhase::HandedOff,
                    reply: "Your answers are confirmed — working on the plan.".to_owned(),
                });
            }
            if state.phase == DialoguePhase::AwaitingConfirmation {
                return self
                    .handle_confirmation_turn(session_id, turn_id, state, &input, &mut commit)
                    .await;
            }
        }

        self.handle_gathering_turn(session_id, turn_id, prev.as_ref(), &input, &mut commit)
            .await
    }

    /// Confirmation sub-dialogue: confirm hands off, anything else
    /// reopens the dialogue for edits.
    async fn handle_confirmation_turn(
        &self,
        session_id: &str,
        turn_id: Uuid,
        prev: &GateState,
        input: &TurnInput,
        commit: &mut CommitPoint<'_>,
    ) -> Result<TurnOutcome, EngineError> {
        match confirm::detect_intent(&input.text) {
            ConfirmIntent::Confirm => {
                let mut state = prev.clone();
                state.status.pass = true;
                state.status.next_gate = None;
                state.status.next_question = None;
                state.edit_mode = false;
                state.phase = DialoguePhase::HandedOff;
                state.updated_at = Some(chrono::Utc::now());
                commit.commit(&state).await?;

                info!(session_id, %turn_id, decision = "pass_confirmed", "dialogue handed off");
                Ok(TurnOutcome {
                    decision: Decision::PassConfirmed,
                    phase: DialoguePhase::HandedOff,
                    reply: "Confirmed — working on the plan.".to_owned(),
                })
            }
            ConfirmIntent::Edit => {
                let mut state = prev.clone();
                state.status.pass = false;
                state.edit_mode = true;
                state.phase = DialoguePhase::Gathering;

                let (next_gate, next_question) =
                    match confirm::resume_gate(&state, &self.config, self.edit_policy) {
                        Some(resume) => resume,
                        None => {
                            // Unreachable with a validated config; fail
                            // the turn rather than guess.
                            warn!(session_id, %turn_id, "edit resume found no gate");
                            return Ok(TurnOutcome {
                                decision: Decision::ExtractionFailed,
                                phase: prev.phase,
                                reply: "Sorry, I couldn't reopen the form. Please try again."
                                    .to_owned(),
                            });
                        }
                    };

                state.status.next_gate = Some(next_gate.clone());
                state.status.next_question = Some(next_question.clone());
                state.updated_at = Some(chrono::Utc::now());
                commit.commit(&state).await?;

                info!(session_id, %turn_id, decision = "edit", gate = %next_gate, "dialogue reopened");
                Ok(TurnOutcome {
                    decision: Decision::FailRequiredMissing {
                        next_gate,
                        next_question: next_question.clone(),
                    },
                    phase: DialoguePhase::Gathering,
                    reply: format!("Sure, let's update that. {next_question}"),
                })
            }
        }
    }

    /// Gathering turn: direct-match fast path, model fallback, merge,
    /// classify, single commit.
    async fn handle_gathering_turn(
        &self,
        session_id: &str,
        turn_id: Uuid,
        prev: Option<&GateState>,
        input: &TurnInput,
        commit: &mut CommitPoint<'_>,
    ) -> Result<TurnOutcome, EngineError> {
        let fallback = GateState::default();
        let base = prev.unwrap_or(&fallback);

        let target_key = self.target_gate(base);
        let Some(target_key) = target_key else {
            warn!(session_id, %turn_id, "strategy has no gates to ask");
            return Ok(self.extraction_failed_outcome(base, None));
        };

        // The fast path: pre-classified choices, and the opening gate
        // (its question was just asked verbatim, so a category echo is
        // the common case).
        let first_gate_key = self.config.first_gate().map(|(key, _)| key);
        let try_direct =
            input.origin == TurnOrigin::Choice || Some(target_key.as_str()) == first_gate_key;

        let mut path = "model";
        let fragment = if try_direct {
            match self
                .config
                .gate(&target_key)
                .map(|definition| direct_match(&input.text, definition))
            {
                Some(DirectMatch::Matched(category)) => {
                    path = "direct";
                    Some(Fragment::single(
                        target_key.clone(),
                        GateValue {
                            raw: Some(input.text.clone()),
                            classified: Some(category),
                            confidence: 1.0,
                        },
                    ))
                }
                // A choice that matches nothing is not dropped; the
                // model path gets a look at the raw text.
                Some(DirectMatch::NoMatch) | None => {
                    debug!(session_id, %turn_id, gate = %target_key, "no direct match, using model path");
                    None
                }
            }
        } else {
            None
        };

        let fragment = match fragment {
            Some(fragment) => fragment,
            None => match self.extract_fragment(session_id, turn_id, base, &input.text).await {
                Some(fragment) => fragment,
                None => return Ok(self.extraction_failed_outcome(base, Some(&target_key))),
            },
        };

        let answered_now: Vec<String> = fragment
            .gates
            .iter()
            .filter(|(_, value)| value.is_answered())
            .map(|(key, _)| key.clone())
            .collect();

        let mut state = merge(prev, &fragment, &input.text, base.edit_mode);
        let decision = classify(&state, &self.config, &answered_now);

        let reply = match &decision {
            Decision::StopLimitingValue { gate, stop_message } => {
                state.phase = DialoguePhase::Terminated;
                state.status.pass = true;
                state.status.next_gate = None;
                state.status.next_question = None;
                state.edit_mode = false;
                info!(session_id, %turn_id, path, gate = %gate, decision = "stop_limiting_value", "dialogue terminated");
                stop_message.clone()
            }
            Decision::FailRequiredMissing {
                next_gate,
                next_question,
            } => {
                state.phase = DialoguePhase::Gathering;
                state.status.pass = false;
                state.status.next_gate = Some(next_gate.clone());
                state.status.next_question = Some(next_question.clone());
                info!(session_id, %turn_id, path, next_gate = %next_gate, decision = "fail_required_missing", "asking next gate");
                next_question.clone()
            }
            Decision::PassAwaitingConfirmation => {
                state.phase = DialoguePhase::AwaitingConfirmation;
                state.status.pass = true;
                state.status.next_gate = None;
                state.status.next_question = None;
                state.edit_mode = false;
                info!(session_id, %turn_id, path, decision = "pass_awaiting_confirmation", "summary presented");
                render_summary(&state, &self.config)
            }
            Decision::PassConfirmed | Decision::ExtractionFailed => {
                // classify never produces these.
                warn!(session_id, %turn_id, ?decision, "unexpected decision from classify");
                return Ok(self.extraction_failed_outcome(base, Some(&target_key)));
            }
        };

        commit.commit(&state).await?;
        Ok(TurnOutcome {
            decision,
            phase: state.phase,
            reply,
        })
    }

    /// The gate this turn is answering: the remembered gap, else the
    /// first required unanswered gate, else the first gate in order.
    fn target_gate(&self, state: &GateState) -> Option<String> {
        if let Some(key) = &state.status.next_gate {
            if self.config.has_gate(key) {
                return Some(key.clone());
            }
        }
        if let Some((key, _)) = next_required_gate(state, &self.config) {
            return Some(key.to_owned());
        }
        self.config.first_gate().map(|(key, _)| key.to_owned())
    }

    /// Model-assisted extraction. Any failure (transport, parse, empty
    /// fragment) returns `None`; the caller resolves the turn as
    /// `ExtractionFailed` without touching stored state.
    async fn extract_fragment(
        &self,
        session_id: &str,
        turn_id: Uuid,
        state: &GateState,
        text: &str,
    ) -> Option<Fragment> {
        let request =
            CompletionRequest::new(self.extraction_prompt(state, text)).with_system(EXTRACTOR_PROMPT);

        let raw = match self.model.complete(request).await {
            Ok(raw) => raw,
            Err(error) => {
                warn!(session_id, %turn_id, %error, "extraction call failed");
                return None;
            }
        };

        let fragment = match parse_fragment(&raw, &self.config) {
            Ok(fragment) => fragment,
            Err(error) => {
                warn!(session_id, %turn_id, %error, "extraction output rejected");
                return None;
            }
        };

        if fragment.is_empty() {
            debug!(session_id, %turn_id, "extraction produced no usable value");
            return None;
        }
        Some(fragment)
    }

    fn extraction_prompt(&self, state: &GateState, text: &str) -> String {
        let mut prompt = String::from("Gate schema:\n");
        for (key, definition) in self.config.ordered_gates() {
            let answered = if state.is_answered(key) {
                " (already answered)"
            } else {
                ""
            };
            prompt.push_str(&format!(
                "- {key}: \"{}\" expects one of [{}]{answered}\n",
                definition.question,
                definition.expected_categories.join(", "),
            ));
        }
        prompt.push_str("\nUser message:\n");
        prompt.push_str(text);
        prompt
    }

    /// Turn outcome for extraction failure: previous state untouched,
    /// the pending question repeated as a clarification.
    fn extraction_failed_outcome(&self, prev: &GateState, target_key: Option<&str>) -> TurnOutcome {
        let question = target_key
            .and_then(|key| self.config.gate(key))
            .map(|definition| definition.question.as_str())
            .unwrap_or("Could you rephrase that?");
        TurnOutcome {
            decision: Decision::ExtractionFailed,
            phase: prev.phase,
            reply: format!("Sorry, I didn't catch that. {question}"),
        }
    }

    /// Replay outcome for a terminated dialogue: repeat the stop message,
    /// never write.
    fn terminated_outcome(&self, state: &GateState) -> TurnOutcome {
        let (gate, stop_message) = self
            .config
            .ordered_gates()
            .find_map(|(key, definition)| {
                let classified = state.value(key)?.classified.as_deref()?;
                definition.is_limiting(classified).then(|| {
                    (
                        key.to_owned(),
                        definition.stop_message.clone().unwrap_or_else(|| {
                            "We can't continue with that answer.".to_owned()
                        }),
                    )
                })
            })
            .unwrap_or_else(|| ("unknown".to_owned(), "This conversation has ended.".to_owned()));

        TurnOutcome {
            decision: Decision::StopLimitingValue {
                gate,
                stop_message: stop_message.clone(),
            },
            phase: DialoguePhase::Terminated,
            reply: stop_message,
        }
    }
}

/// Render the confirmation summary from collected answers, in gate
/// order. Unanswered optional gates are skipped.
fn render_summary(state: &GateState, config: &GateConfig) -> String {
    let mut summary = String::from("Here's what I have:\n");
    for (key, definition) in config.ordered_gates() {
        if let Some(classified) = state.value(key).and_then(|v| v.classified.as_deref()) {
            summary.push_str(&format!("- {}: {classified}\n", definition.question));
        }
    }
    summary.push_str("Reply \"yes\" to confirm, or tell me what to change.");
    summary
}
