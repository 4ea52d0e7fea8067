//! The Action Dispatcher (spec §4.3): the single choke point between a
//! consensus [`crate::action::Decision`] and an isolated executor.
//!
//! `dispatch` walks the contract in order: classify costly/free, check
//! the budget enforcer, resolve `{{SECRET:name}}` templates, run the
//! matching [`actions`] executor, then scrub secret material out of the
//! result before it is allowed anywhere near conversation history (spec
//! §4.3 step 5 — "so secrets never enter history"). Every step is a
//! pure function of `(kind, params, budget, spent)` plus the injected
//! [`crate::config::Environment`], matching the §8 property test that
//! pins the dispatcher's classification/enforcement decisions to
//! exactly that tuple.

pub mod actions;

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::action::{ActionKind, Params};
use crate::agent::stimulus::ActionOutcome;
use crate::budget::enforcer::{self, EnforcementDecision};
use crate::budget::schema::BudgetData;
use crate::config::Environment;
use crate::error::{CoreError, ErrorKind};
use crate::persistence::Store;

/// `resolve_params(map) → {resolved_map, used_secret_names}` (spec
/// §6.4). Out-of-scope adapters (spec §1 "Credential encryption at
/// rest, secret templating … specified only by their interfaces") get
/// a real default implementation here, [`TemplateSecretResolver`],
/// because resolving `{{SECRET:name}}` markers against the durability
/// contract's own `get_secret` is squarely inside what §6.2 already
/// gives the core — only encryption-at-rest is left out.
#[async_trait]
pub trait SecretResolver: Send + Sync {
    async fn resolve_params(
        &self,
        params: &Params,
        store: &dyn Store,
    ) -> Result<(Params, Vec<String>), CoreError>;
}

/// `scrub(text_or_structure, used_secrets) → scrubbed` (spec §6.4).
/// Operates on the already-resolved secret *values*, not names — the
/// dispatcher looks values back up from the names [`SecretResolver`]
/// reports before calling this.
pub trait Scrubber: Send + Sync {
    fn scrub(&self, content: &str, used_secret_values: &[String]) -> String;
}

/// Identity resolver: no templates are ever present. Useful in tests
/// that don't exercise secret handling.
pub struct NoopSecretResolver;

#[async_trait]
impl SecretResolver for NoopSecretResolver {
    async fn resolve_params(
        &self,
        params: &Params,
        _store: &dyn Store,
    ) -> Result<(Params, Vec<String>), CoreError> {
        Ok((params.clone(), Vec::new()))
    }
}

/// Resolves `value == "{{SECRET:name}}"` string parameters against the
/// durability contract's secret table.
pub struct TemplateSecretResolver;

fn template_name(s: &str) -> Option<&str> {
    s.strip_prefix("{{SECRET:").and_then(|rest| rest.strip_suffix("}}"))
}

#[async_trait]
impl SecretResolver for TemplateSecretResolver {
    async fn resolve_params(
        &self,
        params: &Params,
        store: &dyn Store,
    ) -> Result<(Params, Vec<String>), CoreError> {
        let mut resolved = Params::new();
        let mut used = Vec::new();
        for (key, value) in params {
            if let Some(name) = value.as_str().and_then(template_name) {
                let secret = store
                    .get_secret(name)
                    .await?
                    .ok_or_else(|| CoreError::new(ErrorKind::NotFound))?;
                resolved.insert(key.clone(), serde_json::Value::String(secret.value));
                used.push(name.to_string());
            } else {
                resolved.insert(key.clone(), value.clone());
            }
        }
        Ok((resolved, used))
    }
}

/// Identity scrubber: used in tests where no secrets are ever touched.
pub struct NoopScrubber;

impl Scrubber for NoopScrubber {
    fn scrub(&self, content: &str, _used_secret_values: &[String]) -> String {
        content.to_string()
    }
}

/// Replaces every occurrence of each used secret value with a fixed
/// redaction marker.
pub struct RedactingScrubber;

impl Scrubber for RedactingScrubber {
    fn scrub(&self, content: &str, used_secret_values: &[String]) -> String {
        let mut out = content.to_string();
        for value in used_secret_values {
            if !value.is_empty() {
                out = out.replace(value.as_str(), "[REDACTED]");
            }
        }
        out
    }
}

/// The interface spec §1 carves out for fetch_web / call_api / call_mcp
/// / answer_engine / generate_images / long-running execute_shell:
/// "Concrete adapters … are out of scope. The core specifies only the
/// dispatch contract". When [`Environment::external_actions`] is `None`
/// these kinds fail with `service_unavailable` rather than silently
/// no-opping, so a caller always learns the adapter isn't wired up.
#[async_trait]
pub trait ExternalAction: Send + Sync {
    async fn call(&self, kind: ActionKind, params: &Params) -> Result<ActionOutcome, CoreError>;
}

/// Everything an executor needs beyond `(kind, params)` (spec §4.3
/// "scope carries `{agent_id, agent_ref, task_id, budget_data, spent,
/// capability_groups, event_bus, registry, persistence_owner,
/// secrets_resolver, ...}`").
pub struct DispatchScope {
    pub agent_id: String,
    pub task_id: String,
    pub parent_id: Option<String>,
    pub capability_groups: HashSet<String>,
    pub budget_data: BudgetData,
    pub spent: f64,
    pub action_id: String,
    pub env: Arc<Environment>,
}

pub struct Dispatcher;

impl Dispatcher {
    /// Run the full contract for one decision. Returns the scrubbed
    /// outcome on success, or a tagged [`CoreError`] (spec §7) — most
    /// notably `budget_exceeded` without ever invoking an executor when
    /// the enforcer blocks a costly action (spec §4.3 step 2).
    pub async fn dispatch(
        kind: ActionKind,
        params: Params,
        scope: &DispatchScope,
    ) -> Result<ActionOutcome, CoreError> {
        if enforcer::classify(kind, &params) == crate::budget::enforcer::ActionClass::Costly {
            if let EnforcementDecision::BlockedOverBudget =
                enforcer::check_action(kind, &params, &scope.budget_data, scope.spent)
            {
                return Err(CoreError::new(ErrorKind::BudgetExceeded));
            }
        }

        let (resolved_params, used_secret_names) = scope
            .env
            .secret_resolver
            .resolve_params(&params, scope.env.store.as_ref())
            .await?;

        for name in &used_secret_names {
            scope
                .env
                .store
                .log_secret_usage(crate::persistence::SecretUsage {
                    secret_name: name.clone(),
                    agent_id: scope.agent_id.clone(),
                    action_id: scope.action_id.clone(),
                    at: chrono::Utc::now(),
                })
                .await?;
        }

        let mut outcome = actions::dispatch_action(kind, resolved_params, scope).await?;

        if !used_secret_names.is_empty() {
            let mut used_values = Vec::with_capacity(used_secret_names.len());
            for name in &used_secret_names {
                if let Some(secret) = scope.env.store.get_secret(name).await? {
                    used_values.push(secret.value);
                }
            }
            outcome.content = scope.env.scrubber.scrub(&outcome.content, &used_values);
        }

        Ok(outcome)
    }
}

/// Metadata helper executors reach for repeatedly: wrap a plain success
/// string with no extra metadata.
pub(crate) fn ok(content: impl Into<String>) -> ActionOutcome {
    ActionOutcome {
        success: true,
        content: content.into(),
        metadata: HashMap::new(),
    }
}

pub(crate) fn ok_with_metadata(
    content: impl Into<String>,
    metadata: HashMap<String, serde_json::Value>,
) -> ActionOutcome {
    ActionOutcome {
        success: true,
        content: content.into(),
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::schema::BudgetMode;
    use crate::event::EventBus;
    use crate::persistence::memory_store::MemoryStore;
    use crate::registry::AgentRegistry;

    fn scope(env: Arc<Environment>, budget: BudgetData) -> DispatchScope {
        DispatchScope {
            agent_id: "a1".into(),
            task_id: "t1".into(),
            parent_id: None,
            capability_groups: HashSet::new(),
            budget_data: budget,
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
            config: crate::config::RuntimeConfig::default(),
        })
    }

    #[tokio::test]
    async fn record_cost_free_action_always_allowed_even_over_budget() {
        let env = test_env();
        let mut budget = BudgetData::new_root(10.0);
        budget.mode = BudgetMode::Root;
        let s = scope(env, budget);
        let mut params = Params::new();
        params.insert("amount".into(), serde_json::json!(5.0));
        params.insert("cost_type".into(), serde_json::json!("model_call"));
        let outcome = Dispatcher::dispatch(ActionKind::RecordCost, params, &s).await.unwrap();
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn spawn_child_blocked_when_over_budget() {
        let env = test_env();
        let mut budget = BudgetData::new_root(100.0);
        budget.add_committed(100.0);
        let s = scope(env, budget);
        let mut params = Params::new();
        params.insert("profile".into(), serde_json::json!("default"));
        let err = Dispatcher::dispatch(ActionKind::SpawnChild, params, &s).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::BudgetExceeded);
    }

    #[tokio::test]
    async fn secret_template_resolved_and_scrubbed_from_result() {
        let env = Arc::new(Environment {
            event_bus: Arc::new(EventBus::new()),
            store: Arc::new(MemoryStore::new()),
            registry: Arc::new(AgentRegistry::new()),
            models: HashMap::new(),
            secret_resolver: Arc::new(TemplateSecretResolver),
            scrubber: Arc::new(RedactingScrubber),
            external_actions: None,
            config: crate::config::RuntimeConfig::default(),
        });
        env.store
            .insert_secret(crate::persistence::SecretRecord {
                name: "api_key".into(),
                value: "sk-super-secret".into(),
                created_at: chrono::Utc::now(),
            })
            .await
            .unwrap();
        let s = scope(env, BudgetData::new_root(100.0));
        let mut params = Params::new();
        params.insert("path".into(), serde_json::json!("/tmp/out.txt"));
        params.insert("content".into(), serde_json::json!("{{SECRET:api_key}}"));
        let outcome = Dispatcher::dispatch(ActionKind::FileWrite, params, &s).await.unwrap();
        assert!(!outcome.content.contains("sk-super-secret"));
    }
}
