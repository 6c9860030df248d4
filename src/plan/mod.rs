//! Bounded plan resolution.
//!
//! After a confirmed handoff, the session's remaining work is resolving
//! a plan's missing bindings. [`planner`] talks to the model for plan
//! candidates, [`enrichment`] pulls external profile views, and
//! [`engine`] runs the blocker-driven convergence loop over both.

pub mod engine;
pub mod enrichment;
pub mod planner;

pub use engine::{BoundedPlanEngine, PlanEngineError, PlanOutcome};
pub use enrichment::{HttpProfileClient, ProfileClient, StaticProfileClient};
pub use planner::Planner;
