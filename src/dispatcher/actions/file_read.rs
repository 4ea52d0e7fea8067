//! `file_read`: self-contained, real local filesystem
//! access via `tokio::fs` — unlike the network/process adapters, this
//! one needs nothing beyond the standard async runtime already in the
//! dependency stack.

use crate::action::Params;
use crate::agent::stimulus::ActionOutcome;
use crate::dispatcher::actions::require_str;
use crate::dispatcher::{ok, DispatchScope};
use crate::error::{CoreError, ErrorKind};

pub async fn run(params: Params, _scope: &DispatchScope) -> Result<ActionOutcome, CoreError> {
    let path = require_str(&params, "path")?;
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CoreError::new(ErrorKind::ActionCrashed(e.to_string())).with_context(path.to_string()))?;
    Ok(ok(content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Environment, RuntimeConfig};
    use crate::dispatcher::{NoopScrubber, NoopSecretResolver};
    use crate::event::EventBus;
    use crate::persistence::memory_store::MemoryStore;
    use crate::registry::AgentRegistry;
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;

    fn test_scope(env: Arc<Environment>) -> DispatchScope {
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

    #[tokio::test]
    async fn reads_an_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt");
        tokio::fs::write(&path, "hello there").await.unwrap();

        let mut params = Params::new();
        params.insert("path".into(), serde_json::json!(path.to_str().unwrap()));
        let scope = test_scope(test_env());
        let outcome = run(params, &scope).await.unwrap();
        assert_eq!(outcome.content, "hello there");
    }

    #[tokio::test]
    async fn missing_file_crashes_with_context() {
        let mut params = Params::new();
        params.insert("path".into(), serde_json::json!("/nonexistent/path/does-not-exist.txt"));
        let scope = test_scope(test_env());
        let err = run(params, &scope).await.unwrap_err();
        matches!(err.kind, ErrorKind::ActionCrashed(_));
    }
}
