//! Pure budget data and serialization.
//!
//! `BudgetData` intentionally carries no behavior beyond the invariant-
//! preserving constructors and mutators
//! (`new_root`, `new_allocated`, `new_na`, `add_committed`,
//! `release_committed`). Derived queries (`spent`, `available`, status)
//! live in [`super::tracker`], which needs access to the cost-record store
//! that this module deliberately does not know about.

use serde::{Deserialize, Serialize};

/// `mode ∈ {root, allocated, na}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetMode {
    /// The task root agent with an explicit `budget_limit`.
    Root,
    /// A child agent spawned with an explicit allocation.
    Allocated,
    /// No budget tracking at all: every action is permitted.
    Na,
}

/// `{allocated, committed, mode}`.
///
/// `allocated = None` means "unlimited" and only ever pairs with
/// `mode = Na`. `committed` is the portion of `allocated`
/// currently earmarked for live children (escrow) and must never go
/// negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BudgetData {
    pub allocated: Option<f64>,
    pub committed: f64,
    pub mode: BudgetMode,
}

impl BudgetData {
    /// A task's root agent with an explicit dollar budget limit.
    pub fn new_root(budget_limit: f64) -> Self {
        Self {
            allocated: Some(budget_limit),
            committed: 0.0,
            mode: BudgetMode::Root,
        }
    }

    /// A child agent spawned with allocation `amount`.
    pub fn new_allocated(amount: f64) -> Self {
        Self {
            allocated: Some(amount),
            committed: 0.0,
            mode: BudgetMode::Allocated,
        }
    }

    /// No budget limit at all — every action is permitted.
    pub fn new_na() -> Self {
        Self {
            allocated: None,
            committed: 0.0,
            mode: BudgetMode::Na,
        }
    }

    /// Spawning a child with allocation `amount` increases `committed` by
    /// that amount. Never decreases on its own — release
    /// happens exactly once via [`release_committed`] when the child
    /// terminates.
    pub fn add_committed(&mut self, amount: f64) {
        self.committed += amount;
    }

    /// Release `amount` from escrow, clamping at zero rather than going
    /// negative. Idempotent release (calling this twice
    /// for the same child termination) must be prevented by the caller —
    /// see [`crate::agent::core::Agent::handle_child_terminated`], which
    /// tracks which children have already had their allocation released.
    pub fn release_committed(&mut self, amount: f64) {
        self.committed = (self.committed - amount).max(0.0);
    }

    /// Replace `allocated` with a new ceiling, e.g. from `adjust_budget`.
    /// Callers must check [`super::tracker::Tracker::validate_budget_decrease`]
    /// first; this setter does not re-validate.
    pub fn set_allocated(&mut self, new_allocated: f64) {
        self.allocated = Some(new_allocated);
    }

    pub fn serialize(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn deserialize(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
