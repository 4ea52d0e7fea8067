//! `batch_sync`: spec §4.3 "a list of ≥ 2 batchable sub-actions executed
//! sequentially in one consensus step, stopping on the first error; the
//! result is the list of individual results up to the stop point."
//!
//! Grounded on spec §9's own description of batching as "a small
//! interpreter over the sub-action list, reusing the normal dispatch for
//! each child": each entry in `actions` is parsed into `(ActionKind,
//! Params)` and handed straight to [`super::dispatch_action_boxed`], the
//! same entry point a top-level decision goes through, so a batched
//! sub-action gets the identical budget/secret/executor treatment a
//! standalone one would.

use std::collections::HashMap;

use serde_json::Value;

use crate::action::Params;
use crate::agent::stimulus::ActionOutcome;
use crate::dispatcher::actions::parse_sub_action;
use crate::dispatcher::{ok_with_metadata, DispatchScope};
use crate::error::{CoreError, ErrorKind};

pub async fn run(params: Params, scope: &DispatchScope) -> Result<ActionOutcome, CoreError> {
    let actions = params
        .get("actions")
        .and_then(|v| v.as_array())
        .ok_or_else(|| CoreError::new(ErrorKind::MissingRequiredParam("actions".to_string())))?;
    if actions.len() < 2 {
        return Err(CoreError::new(ErrorKind::InvalidParam("actions".to_string()))
            .with_context("batch_sync requires at least 2 sub-actions"));
    }

    // Validate every sub-action's kind up front, before running any of
    // them, so a batch with one unbatchable entry never partially executes.
    let parsed: Vec<_> = actions.iter().map(|raw| parse_sub_action(raw)).collect::<Result<_, _>>()?;
    for (kind, _) in &parsed {
        if !kind.is_sync_batchable() {
            return Err(CoreError::new(ErrorKind::InvalidParam("actions".to_string()))
                .with_context(format!("{kind:?} is not a batch_sync-batchable action kind")));
        }
    }

    let mut results = Vec::with_capacity(parsed.len());
    for (kind, sub_params) in parsed {
        match super::dispatch_action_boxed(kind, sub_params, scope).await {
            Ok(outcome) => {
                let failed = !outcome.success;
                results.push(serde_json::json!({
                    "action": kind,
                    "success": outcome.success,
                    "content": outcome.content,
                }));
                if failed {
                    break;
                }
            }
            Err(err) => {
                results.push(serde_json::json!({
                    "action": kind,
                    "success": false,
                    "error": err.to_string(),
                }));
                break;
            }
        }
    }

    let stopped_early = results.len() < actions.len();
    let mut metadata = HashMap::new();
    metadata.insert("results".to_string(), Value::Array(results));
    Ok(ok_with_metadata(
        format!(
            "batch_sync ran {} of {} sub-action(s){}",
            metadata["results"].as_array().unwrap().len(),
            actions.len(),
            if stopped_early { ", stopped on first error" } else { "" }
        ),
        metadata,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionKind;
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
    async fn runs_sub_actions_sequentially_and_reports_all_results() {
        let scope = test_scope();
        let mut params = Params::new();
        params.insert(
            "actions".into(),
            serde_json::json!([
                {"action": "todo", "params": {"items": []}},
                {"action": "orient", "params": {"summary": "all good"}},
            ]),
        );
        let outcome = run(params, &scope).await.unwrap();
        assert!(outcome.success);
        let results = outcome.metadata.get("results").unwrap().as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r["success"] == serde_json::json!(true)));
    }

    #[tokio::test]
    async fn stops_on_first_error() {
        let scope = test_scope();
        let mut params = Params::new();
        params.insert(
            "actions".into(),
            serde_json::json!([
                {"action": "file_read", "params": {"path": "/nonexistent/for/sure"}},
                {"action": "orient", "params": {"summary": "should never run"}},
            ]),
        );
        let outcome = run(params, &scope).await.unwrap();
        let results = outcome.metadata.get("results").unwrap().as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["success"], serde_json::json!(false));
    }

    #[tokio::test]
    async fn rejects_unbatchable_sub_action_kind() {
        let scope = test_scope();
        let mut params = Params::new();
        params.insert(
            "actions".into(),
            serde_json::json!([
                {"action": "wait", "params": {"wait": true}},
                {"action": "orient", "params": {"summary": "x"}},
            ]),
        );
        let err = run(params, &scope).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidParam("actions".to_string()));
    }

    #[tokio::test]
    async fn rejects_fewer_than_two_sub_actions() {
        let scope = test_scope();
        let mut params = Params::new();
        params.insert("actions".into(), serde_json::json!([{"action": "orient", "params": {}}]));
        let err = run(params, &scope).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidParam("actions".to_string()));
    }

    #[test]
    fn execute_shell_is_not_sync_batchable() {
        assert!(!ActionKind::ExecuteShell.is_sync_batchable());
        assert!(ActionKind::ExecuteShell.is_batchable());
    }
}
