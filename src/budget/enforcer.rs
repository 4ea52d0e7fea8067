//! The enforcer: `check_action(kind, params, budget, spent) → allowed |
//! {blocked, over_budget}`.
//!
//! This is the single choke point the Dispatcher calls before running any
//! executor: if the action is costly and the budget is already over
//! budget, it returns `budget_exceeded` without ever invoking an executor.
//! Kept as a pure function of `(kind, params, budget, spent)` so its
//! classification and enforcement decisions are easy to property-test in
//! isolation from the rest of the dispatch pipeline.

use crate::action::{is_costly, ActionKind, Params};
use crate::budget::schema::BudgetData;
use crate::budget::tracker::{BudgetStatus, Tracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionClass {
    Costly,
    Free,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnforcementDecision {
    Allowed,
    BlockedOverBudget,
}

/// Classify `(kind, params)`. Unknown kinds default to
/// free — this function only ever sees the closed [`ActionKind`] set, so
/// "unknown kind" in practice means a caller outside this crate; kept here
/// as the deliberate fail-open default.
pub fn classify(kind: ActionKind, params: &Params) -> ActionClass {
    if is_costly(kind, params) {
        ActionClass::Costly
    } else {
        ActionClass::Free
    }
}

/// The Enforcer's permission decision. Free actions are always allowed;
/// costly actions are blocked exactly when the budget's status is
/// `over_budget` (available ≤ 0).
pub fn check_action(
    kind: ActionKind,
    params: &Params,
    budget: &BudgetData,
    spent: f64,
) -> EnforcementDecision {
    if classify(kind, params) == ActionClass::Free {
        return EnforcementDecision::Allowed;
    }
    match Tracker::get_status(budget, spent) {
        BudgetStatus::OverBudget => EnforcementDecision::BlockedOverBudget,
        _ => EnforcementDecision::Allowed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_actions_always_allowed_even_over_budget() {
        let mut budget = BudgetData::new_root(10.0);
        budget.add_committed(0.0);
        let decision = check_action(ActionKind::Todo, &Params::new(), &budget, 1000.0);
        assert_eq!(decision, EnforcementDecision::Allowed);
    }

    #[test]
    fn costly_action_blocked_when_over_budget() {
        let budget = BudgetData::new_root(100.0);
        let decision = check_action(ActionKind::SpawnChild, &Params::new(), &budget, 150.0);
        assert_eq!(decision, EnforcementDecision::BlockedOverBudget);
    }

    #[test]
    fn costly_action_allowed_within_budget() {
        let budget = BudgetData::new_root(100.0);
        let decision = check_action(ActionKind::CallApi, &Params::new(), &budget, 10.0);
        assert_eq!(decision, EnforcementDecision::Allowed);
    }

    #[test]
    fn scenario_2_second_spawn_blocked_after_overspend() {
        // root 100, spawn 30 (committed), record_cost 75: escrow plus spend overruns.
        let mut budget = BudgetData::new_root(100.0);
        budget.add_committed(30.0);
        let spent = 75.0;
        assert_eq!(Tracker::calculate_available(&budget, spent), Some(-5.0));
        let decision = check_action(ActionKind::SpawnChild, &Params::new(), &budget, spent);
        assert_eq!(decision, EnforcementDecision::BlockedOverBudget);
    }
}
