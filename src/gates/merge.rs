//! State merger.
//!
//! All "did the user already answer this" logic lives here so selection
//! and completion stay pure functions of the merged result.
//!
//! Merge rule, per gate key present in the fragment:
//! - previous `classified` is null: adopt the fragment's value
//! - previous `classified` is non-null: keep it, unless the session is
//!   in explicit edit mode, in which case overwrite
//!
//! Gates absent from the fragment are carried over unchanged, and a key
//! once introduced is never dropped.

use chrono::Utc;

use super::parser::Fragment;
use crate::types::{GateState, GateValue};

/// Merge a fragment into the previous state, producing the new state.
///
/// `raw_text` is the turn's verbatim user text; it backfills `raw` on
/// adopted values whose extraction did not carry one. `edit_mode` is
/// the only condition under which an answered gate is overwritten.
///
/// Idempotent: merging the same fragment twice yields the same state
/// (up to `updated_at`).
pub fn merge(
    prev: Option<&GateState>,
    fragment: &Fragment,
    raw_text: &str,
    edit_mode: bool,
) -> GateState {
    let mut state = prev.cloned().unwrap_or_default();

    for (key, incoming) in &fragment.gates {
        let adopted = GateValue {
            raw: incoming.raw.clone().or_else(|| Some(raw_text.to_owned())),
            classified: incoming.classified.clone(),
            confidence: incoming.confidence,
        };

        match state.values.get(key) {
            Some(existing) if existing.is_answered() && !edit_mode => {
                // Answered gates are never regressed by later turns.
            }
            Some(existing) if existing.is_answered() && edit_mode => {
                if incoming.is_answered() {
                    state.values.insert(key.clone(), adopted);
                }
            }
            _ => {
                state.values.insert(key.clone(), adopted);
            }
        }
    }

    state.updated_at = Some(Utc::now());
    state
}
