//! `generate_secret`: self-contained. Generates a
//! random value and stores it behind the durability contract's secret
//! table (`insert_secret`) under `name`. The generated value is never
//! returned in `content` — callers recover it later only indirectly,
//! through `{{SECRET:name}}` templating resolved by
//! [`crate::dispatcher::SecretResolver`], never in conversation history.

use sha2::{Digest, Sha256};

use crate::action::Params;
use crate::agent::stimulus::ActionOutcome;
use crate::dispatcher::actions::{optional_f64, require_str};
use crate::dispatcher::{ok, DispatchScope};
use crate::error::CoreError;
use crate::persistence::SecretRecord;

const DEFAULT_LENGTH: usize = 32;

/// Hex digest of two fresh v4 UUIDs, repeated until `length` hex chars
/// are available. No `rand` dependency: `Uuid::new_v4` is already an
/// OS-RNG source, the same one used for id generation in
/// [`super::spawn_child`].
fn random_hex(length: usize) -> String {
    let mut hex = String::new();
    while hex.len() < length {
        let mut hasher = Sha256::new();
        hasher.update(uuid::Uuid::new_v4().as_bytes());
        hasher.update(uuid::Uuid::new_v4().as_bytes());
        hex.push_str(&format!("{:x}", hasher.finalize()));
    }
    hex.truncate(length);
    hex
}

pub async fn run(params: Params, scope: &DispatchScope) -> Result<ActionOutcome, CoreError> {
    let name = require_str(&params, "name")?;
    let length = optional_f64(&params, "length")
        .map(|n| n as usize)
        .unwrap_or(DEFAULT_LENGTH)
        .max(1);
    let value = random_hex(length);

    scope
        .env
        .store
        .insert_secret(SecretRecord {
            name: name.to_string(),
            value,
            created_at: chrono::Utc::now(),
        })
        .await?;

    Ok(ok(format!("generated secret '{name}' ({length} chars)")))
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

    fn scope(env: Arc<Environment>) -> DispatchScope {
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
    async fn stores_generated_secret_and_never_echoes_value() {
        let env = test_env();
        let store = env.store.clone();
        let s = scope(env);

        let mut params = Params::new();
        params.insert("name".into(), serde_json::json!("api_key"));
        params.insert("length".into(), serde_json::json!(16));

        let outcome = run(params, &s).await.unwrap();
        assert!(outcome.success);

        let stored = store.get_secret("api_key").await.unwrap().unwrap();
        assert_eq!(stored.value.len(), 16);
        assert!(!outcome.content.contains(&stored.value));
    }

    #[tokio::test]
    async fn defaults_to_32_char_value() {
        let env = test_env();
        let store = env.store.clone();
        let s = scope(env);

        let mut params = Params::new();
        params.insert("name".into(), serde_json::json!("token"));

        run(params, &s).await.unwrap();
        let stored = store.get_secret("token").await.unwrap().unwrap();
        assert_eq!(stored.value.len(), 32);
    }
}
