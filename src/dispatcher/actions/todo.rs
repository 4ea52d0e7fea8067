//! `todo`: self-contained. Returns the full replacement
//! todo list in `metadata` for the owning agent to fold into
//! `AgentState.todos` (a `{content, state}` pair per item).

use std::collections::HashMap;

use crate::action::Params;
use crate::agent::stimulus::ActionOutcome;
use crate::dispatcher::{ok_with_metadata, DispatchScope};
use crate::error::{CoreError, ErrorKind};

pub async fn run(params: Params, _scope: &DispatchScope) -> Result<ActionOutcome, CoreError> {
    let items = params
        .get("items")
        .and_then(|v| v.as_array())
        .ok_or_else(|| CoreError::new(ErrorKind::MissingRequiredParam("items".to_string())))?;

    let mut metadata = HashMap::new();
    metadata.insert("todos".to_string(), serde_json::json!(items));
    Ok(ok_with_metadata(format!("updated {} todos", items.len()), metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Environment, RuntimeConfig};
    use crate::dispatcher::{NoopScrubber, NoopSecretResolver};
    use crate::event::EventBus;
    use crate::persistence::memory_store::MemoryStore;
    use crate::registry::AgentRegistry;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn test_scope() -> DispatchScope {
        let env = Arc::new(Environment {
            event_bus: Arc::new(EventBus::new()),
            store: Arc::new(MemoryStore::new()),
            registry: Arc::new(AgentRegistry::new()),
            models: HashMap::new(),
            secret_resolver: Arc::new(NoopSecretResolver),
            scrubber: Arc::new(NoopScrubber),
            external_actions: None,
            config: RuntimeConfig::default(),
        });
        DispatchScope {
            agent_id: "a1".into(),
            task_id: "t1".into(),
            parent_id: None,
            capability_groups: HashSet::new(),
            budget_data: crate::budget::schema::BudgetData::new_na(),
            spent: 0.0,
            action_id: "act-1".into(),
            env,
        }
    }

    #[tokio::test]
    async fn replaces_todo_list_from_items_param() {
        let mut params = Params::new();
        params.insert(
            "items".into(),
            serde_json::json!([{"content": "write tests", "state": "todo"}]),
        );
        let outcome = run(params, &test_scope()).await.unwrap();
        assert!(outcome.success);
        assert!(outcome.metadata.contains_key("todos"));
    }

    #[tokio::test]
    async fn missing_items_is_missing_required_param() {
        let err = run(Params::new(), &test_scope()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::MissingRequiredParam("items".to_string()));
    }
}
