//! The multi-model consensus engine, split into the same
//! three concerns the budget subsystem uses: static [`schema`] data,
//! pure [`rules`] merge functions, the [`temperature`] descent curve,
//! and the [`engine`] that drives a round (possibly several, via
//! refinement) to a single [`crate::action::Decision`].

pub mod engine;
pub mod rules;
pub mod schema;
pub mod temperature;

pub use engine::ConsensusEngine;
pub use schema::{validate_registry, ActionSchema, ConsensusRule, ParamType};
