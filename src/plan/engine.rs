//! Bounded plan resolution loop.
//!
//! Entered only after the gate dialogue hands off. Each user turn tries,
//! in order: direct satisfaction of the most recent outstanding blocker,
//! external profile enrichment when the input names an entity, and a
//! fresh planner proposal. Readiness is re-derived from the candidate's
//! blocker list on every iteration; the planner's own hint is never
//! copied. The loop carries no fixed iteration cap, but the iteration
//! counter is persisted and surfaced so a caller can impose one.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::providers::CompletionClient;
use crate::session::SessionLocks;
use crate::store::{StateStore, StoreError};
use crate::types::{BoundedPlanState, PlanReadiness};

use super::enrichment::{self, ProfileClient, PROFILE_VIEWS};
use super::planner::Planner;

/// Fatal plan-engine errors. Planner and enrichment failures recover
/// locally and are not represented here.
#[derive(Debug, thiserror::Error)]
pub enum PlanEngineError {
    /// The state store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of one plan iteration.
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    /// Readiness after the iteration.
    pub readiness: PlanReadiness,
    /// User-facing reply: the next input request, or the ready notice.
    pub reply: String,
    /// Iterations run so far for this session.
    pub iterations: u64,
}

/// Drives blocker resolution for handed-off sessions.
pub struct BoundedPlanEngine {
    store: Arc<dyn StateStore>,
    planner: Planner,
    profiles: Arc<dyn ProfileClient>,
    locks: SessionLocks,
}

impl BoundedPlanEngine {
    /// Create a plan engine.
    pub fn new(
        store: Arc<dyn StateStore>,
        model: Arc<dyn CompletionClient>,
        profiles: Arc<dyn ProfileClient>,
    ) -> Self {
        Self {
            store,
            planner: Planner::new(model),
            profiles,
            locks: SessionLocks::default(),
        }
    }

    /// Run one plan iteration for a session.
    ///
    /// Iterations for one session are strictly serialized, same as gate
    /// turns. The aggregate is mutated exactly once per turn and
    /// persisted after every mutation, planner failure included: field
    /// bindings and enrichment results gathered before the failure
    /// survive it.
    ///
    /// # Errors
    ///
    /// Returns [`PlanEngineError`] on store failure only.
    pub async fn advance(
        &self,
        session_id: &str,
        input: &str,
    ) -> Result<PlanOutcome, PlanEngineError> {
        let lock = self.locks.for_session(session_id);
        let _guard = lock.lock().await;

        let turn_id = Uuid::new_v4();
        let mut state = self
            .store
            .load_plan(session_id)
            .await?
            .unwrap_or_default();

        let bound_field = satisfy_blocker_directly(&mut state, input);
        if let Some(field) = &bound_field {
            info!(session_id, %turn_id, field = %field, "blocker satisfied from user input");
        }

        // Name-like input also unlocks external profile data, whether or
        // not it just bound a field.
        if enrichment::looks_like_entity_reference(input.trim()) {
            let views = enrichment::gather_views(self.profiles.as_ref(), input.trim(), PROFILE_VIEWS)
                .await;
            info!(session_id, %turn_id, views = views.len(), "profile views resolved");
            enrichment::merge_views(&mut state, &views);
        }

        match self.planner.propose(&state).await {
            Ok(spec) => {
                state.blockers = spec.blockers.clone();
                state.last_plan = Some(spec);
            }
            Err(error) => {
                // Keep the previous candidate; this turn's bindings are
                // still worth persisting.
                warn!(session_id, %turn_id, %error, "planner proposal failed; keeping previous candidate");
            }
        }

        state.readiness = if state.blockers.is_empty() {
            PlanReadiness::ReadyForCompilation
        } else {
            PlanReadiness::NeedsInput
        };
        state.iterations = state.iterations.saturating_add(1);
        state.updated_at = Some(Utc::now());
        self.store.save_plan(session_id, &state).await?;

        info!(
            session_id,
            %turn_id,
            readiness = ?state.readiness,
            blockers = state.blockers.len(),
            iterations = state.iterations,
            "plan iteration complete"
        );

        Ok(PlanOutcome {
            readiness: state.readiness,
            reply: render_reply(&state),
            iterations: state.iterations,
        })
    }
}

/// Satisfy the most recent outstanding blocker from raw input.
///
/// Applies only when the blocker names exactly one field; multi-field
/// blockers need the planner to decompose them. Returns the bound field
/// name.
fn satisfy_blocker_directly(state: &mut BoundedPlanState, input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    let position = state
        .blockers
        .iter()
        .rposition(|blocker| blocker.writes_to.len() == 1)?;
    let blocker = state.blockers.remove(position);
    let field = blocker.writes_to.into_iter().next()?;

    state.record_field(&field, serde_json::Value::String(trimmed.to_owned()));
    Some(field)
}

fn render_reply(state: &BoundedPlanState) -> String {
    match state.readiness {
        PlanReadiness::ReadyForCompilation => {
            "The plan is complete and ready to run.".to_owned()
        }
        PlanReadiness::NeedsInput => match state.blockers.last() {
            Some(blocker) if !blocker.description.is_empty() => blocker.description.clone(),
            Some(blocker) => format!("I still need: {}.", blocker.writes_to.join(", ")),
            None => "I need a bit more information to finish the plan.".to_owned(),
        },
    }
}
