//! The hierarchical budget subsystem.
//!
//! Three concerns, kept in separate submodules: [`schema`] (pure data +
//! serialization), [`tracker`] (derived queries against cost records), and
//! [`enforcer`] (the action-permission decision). The closest prior art for
//! this shape is a *token* budget (max_tokens / schema_overhead /
//! calibration, allocated vs. spent vs. headroom, a status enum with a
//! warning threshold); this module borrows that shape and retargets it at
//! dollars and escrow instead of tokens.

pub mod enforcer;
pub mod schema;
pub mod tracker;

pub use enforcer::{check_action, ActionClass, EnforcementDecision};
pub use schema::{BudgetData, BudgetMode};
pub use tracker::{BudgetStatus, Tracker};
