//! `spawn_child`: costly, not self-contained.
//! The executor only validates the requested allocation against the
//! caller's own budget snapshot and mints a fresh child id — it never
//! constructs the child's [`crate::agent::state::AgentState`] itself,
//! since only the owning [`crate::agent::core::Agent`] (which already
//! holds the full parent state: models, profile, accumulated
//! `downstream_constraints`) is in a position to build and spawn it.
//! The id and requested allocation travel back in `metadata` for that
//! fold step.

use std::collections::HashMap;

use crate::action::Params;
use crate::agent::stimulus::ActionOutcome;
use crate::budget::tracker::Tracker;
use crate::dispatcher::actions::{optional_f64, optional_str, require_str};
use crate::dispatcher::{ok_with_metadata, DispatchScope};
use crate::error::{CoreError, ErrorKind};

pub async fn run(params: Params, scope: &DispatchScope) -> Result<ActionOutcome, CoreError> {
    let profile = require_str(&params, "profile")?.to_string();
    let budget = optional_f64(&params, "budget");
    let initial_message = optional_str(&params, "initial_message").map(str::to_string);

    if let Some(requested) = budget {
        if !Tracker::has_available(&scope.budget_data, scope.spent, requested) {
            return Err(CoreError::new(ErrorKind::InsufficientBudget));
        }
    }

    let child_id = format!("agent-{}", uuid::Uuid::new_v4());

    let mut metadata = HashMap::new();
    metadata.insert("child_id".to_string(), serde_json::json!(child_id));
    metadata.insert("profile".to_string(), serde_json::json!(profile));
    if let Some(b) = budget {
        metadata.insert("budget".to_string(), serde_json::json!(b));
    }
    if let Some(msg) = initial_message {
        metadata.insert("initial_message".to_string(), serde_json::json!(msg));
    }

    Ok(ok_with_metadata(format!("spawned child {child_id}"), metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::schema::BudgetData;
    use crate::config::{Environment, RuntimeConfig};
    use crate::dispatcher::{NoopScrubber, NoopSecretResolver};
    use crate::event::EventBus;
    use crate::persistence::memory_store::MemoryStore;
    use crate::registry::AgentRegistry;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn test_env() -> Arc<Environment> {
        Arc::new(Environment {
            event_bus: Arc::new(EventBus::new()),
            store: Arc::new(MemoryStore::new()),
            registry: Arc::new(AgentRegistry::new()),
            models: HashMap::new(),
            secret_resolver: Arc::new(NoopSecretResolver),
            scrubber: Arc::new(NoopScrubber),
            external_actions: None,
            config: RuntimeConfig::default(),
        })
    }

    fn test_scope(env: Arc<Environment>, budget: BudgetData, spent: f64) -> DispatchScope {
        DispatchScope {
            agent_id: "a1".into(),
            task_id: "t1".into(),
            parent_id: None,
            capability_groups: HashSet::new(),
            budget_data: budget,
            spent,
            action_id: "act-1".into(),
            env,
        }
    }

    #[tokio::test]
    async fn spawns_within_available_budget() {
        let scope = test_scope(test_env(), BudgetData::new_root(100.0), 10.0);
        let mut params = Params::new();
        params.insert("profile".into(), serde_json::json!("default"));
        params.insert("budget".into(), serde_json::json!(50.0));
        let outcome = run(params, &scope).await.unwrap();
        assert!(outcome.success);
        assert!(outcome.metadata.contains_key("child_id"));
    }

    #[tokio::test]
    async fn rejects_allocation_beyond_available() {
        let scope = test_scope(test_env(), BudgetData::new_root(100.0), 90.0);
        let mut params = Params::new();
        params.insert("profile".into(), serde_json::json!("default"));
        params.insert("budget".into(), serde_json::json!(50.0));
        let err = run(params, &scope).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InsufficientBudget);
    }
}
