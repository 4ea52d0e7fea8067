//! `adjust_budget`: self-contained from the
//! *caller's* point of view — it validates against the child's
//! persisted snapshot and returns — but the actual mutation happens on
//! the child's own process, since single-writer-per-state forbids
//! anyone else from touching the child's
//! [`crate::agent::state::AgentState`] directly. The executor messages
//! the child a [`crate::agent::stimulus::Stimulus::BudgetAdjusted`]; the
//! owning [`crate::agent::core::Agent`] folds the resulting delta into
//! its own `committed` figure.

use std::collections::HashMap;

use crate::action::Params;
use crate::agent::stimulus::{ActionOutcome, Stimulus};
use crate::budget::tracker::Tracker;
use crate::dispatcher::actions::{require_f64, require_str};
use crate::dispatcher::{ok_with_metadata, DispatchScope};
use crate::error::{CoreError, ErrorKind};

pub async fn run(params: Params, scope: &DispatchScope) -> Result<ActionOutcome, CoreError> {
    let child_id = require_str(&params, "child_id")?;
    let new_budget = require_f64(&params, "new_budget")?;

    let entry = scope
        .env
        .registry
        .get(child_id)
        .ok_or_else(|| CoreError::new(ErrorKind::NotFound).with_context(format!("no live agent {child_id}")))?;
    if entry.parent_id.as_deref() != Some(scope.agent_id.as_str()) {
        return Err(
            CoreError::new(ErrorKind::InvalidParam("child_id".to_string())).with_context("not a direct child")
        );
    }

    let child_state = scope
        .env
        .store
        .load_agent(child_id)
        .await?
        .ok_or_else(|| CoreError::new(ErrorKind::NotFound).with_context(format!("no persisted state for {child_id}")))?;
    let child_spent = scope.env.store.sum_cost_by_agent(child_id).await?;
    Tracker::validate_budget_decrease(&child_state.budget_data, child_spent, new_budget)?;

    let old_allocated = child_state.budget_data.allocated.unwrap_or(0.0);
    let delta = new_budget - old_allocated;

    entry
        .mailbox
        .send(Stimulus::BudgetAdjusted { new_allocated: new_budget })
        .await
        .map_err(|e| CoreError::new(ErrorKind::ActionCrashed(e.to_string())))?;

    let mut metadata = HashMap::new();
    metadata.insert("child_id".to_string(), serde_json::json!(child_id));
    metadata.insert("new_budget".to_string(), serde_json::json!(new_budget));
    metadata.insert("delta".to_string(), serde_json::json!(delta));
    Ok(ok_with_metadata(format!("adjusted {child_id} budget to {new_budget}"), metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::state::AgentState;
    use crate::budget::schema::BudgetData;
    use crate::config::{Environment, RuntimeConfig};
    use crate::dispatcher::{NoopScrubber, NoopSecretResolver};
    use crate::event::EventBus;
    use crate::persistence::memory_store::MemoryStore;
    use crate::registry::{AgentRegistry, RegistryEntry};
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

    fn test_scope(env: Arc<Environment>) -> DispatchScope {
        DispatchScope {
            agent_id: "parent".into(),
            task_id: "t1".into(),
            parent_id: None,
            capability_groups: HashSet::new(),
            budget_data: BudgetData::new_root(100.0),
            spent: 0.0,
            action_id: "act-1".into(),
            env,
        }
    }

    #[tokio::test]
    async fn raises_child_allocation_and_notifies_it() {
        let env = test_env();
        let (tx, mut rx) = tokio::sync::mpsc::channel(4);
        env.registry.register(RegistryEntry {
            agent_id: "child".into(),
            task_id: "t1".into(),
            parent_id: Some("parent".into()),
            mailbox: tx,
            metadata: HashMap::new(),
            done: Arc::new(tokio::sync::Notify::new()),
        });
        let mut child_state = AgentState::new_root("child", "t1", vec![], HashSet::new(), "default", BudgetData::new_allocated(50.0));
        child_state.parent_id = Some("parent".into());
        env.store.upsert_agent_state("child", child_state).await.unwrap();

        let mut params = Params::new();
        params.insert("child_id".into(), serde_json::json!("child"));
        params.insert("new_budget".into(), serde_json::json!(80.0));
        let scope = test_scope(env);
        let outcome = run(params, &scope).await.unwrap();
        assert!(outcome.success);
        match rx.recv().await.unwrap() {
            Stimulus::BudgetAdjusted { new_allocated } => assert_eq!(new_allocated, 80.0),
            other => panic!("unexpected stimulus: {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejects_decrease_below_spent_plus_committed() {
        let env = test_env();
        let (tx, _rx) = tokio::sync::mpsc::channel(4);
        env.registry.register(RegistryEntry {
            agent_id: "child".into(),
            task_id: "t1".into(),
            parent_id: Some("parent".into()),
            mailbox: tx,
            metadata: HashMap::new(),
            done: Arc::new(tokio::sync::Notify::new()),
        });
        let mut child_state = AgentState::new_root("child", "t1", vec![], HashSet::new(), "default", BudgetData::new_allocated(50.0));
        child_state.parent_id = Some("parent".into());
        child_state.budget_data.add_committed(40.0);
        env.store.upsert_agent_state("child", child_state).await.unwrap();

        let mut params = Params::new();
        params.insert("child_id".into(), serde_json::json!("child"));
        params.insert("new_budget".into(), serde_json::json!(10.0));
        let scope = test_scope(env);
        let err = run(params, &scope).await.unwrap_err();
        matches!(err.kind, ErrorKind::WouldViolateEscrow(_));
    }

    #[tokio::test]
    async fn rejects_non_child_target() {
        let env = test_env();
        let (tx, _rx) = tokio::sync::mpsc::channel(4);
        env.registry.register(RegistryEntry {
            agent_id: "stranger".into(),
            task_id: "t1".into(),
            parent_id: None,
            mailbox: tx,
            metadata: HashMap::new(),
            done: Arc::new(tokio::sync::Notify::new()),
        });
        let mut params = Params::new();
        params.insert("child_id".into(), serde_json::json!("stranger"));
        params.insert("new_budget".into(), serde_json::json!(10.0));
        let scope = test_scope(env);
        let err = run(params, &scope).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidParam("child_id".to_string()));
    }
}
