//! Gate collection state machine.
//!
//! The dialogue walks an ordered list of gates (questions with expected
//! categorical answers), accumulating answers across turns until every
//! required gate is satisfied, a limiting value terminates the dialogue
//! early, or the user confirms the collected set and the session hands
//! off to the plan engine.
//!
//! Submodules follow the turn pipeline: [`parser`] canonicalizes model
//! extraction output, [`merge`] folds a fragment into prior state,
//! [`selector`] picks the next gate, [`decision`] classifies the merged
//! state, [`confirm`] runs the confirmation sub-dialogue, and [`engine`]
//! orchestrates a whole turn.

pub mod confirm;
pub mod decision;
pub mod engine;
pub mod merge;
pub mod parser;
pub mod selector;

pub use engine::{EngineError, GateEngine};
pub use parser::Fragment;
