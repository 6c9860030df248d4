//! Intake — a gate-driven conversational intake engine.
//!
//! A dialogue walks a user through an ordered list of structured
//! questions ("gates"), merging partial answers turn by turn until the
//! set is complete, a disqualifying answer ends it early, or the user
//! confirms the collected answers. A confirmed dialogue hands off to a
//! bounded plan engine that iteratively resolves a plan's missing
//! bindings ("blockers") against a model-assisted planner and an
//! external profile-lookup service.
//!
//! See `DESIGN.md` for architecture notes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod gates;
pub mod logging;
pub mod plan;
pub mod providers;
mod session;
pub mod store;
pub mod types;
