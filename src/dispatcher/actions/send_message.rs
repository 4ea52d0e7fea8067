//! `send_message`: deliver a [`Stimulus::UserMessage`] to every recipient
//! resolved from `to ∈ {parent, children, announcement, [agent_id,…]}`
//! (spec §4.3), looked up by id through the injected
//! [`crate::registry::AgentRegistry`] — agents only ever communicate by
//! message passing, never by direct state access. `announcement`
//! recursively fans out to every descendant, grounded on the same
//! subtree-collection shape `dismiss_child` uses to reach a whole
//! subtree through the registry rather than an ownership pointer.
//! Delivery is best-effort and per-recipient: one dead mailbox does not
//! abort delivery to the rest, and only recipients that actually
//! received the message are recorded in `sent_to`.

use std::collections::HashMap;

use serde_json::Value;

use crate::action::Params;
use crate::agent::stimulus::{ActionOutcome, Stimulus};
use crate::dispatcher::actions::require_str;
use crate::dispatcher::{ok_with_metadata, DispatchScope};
use crate::error::{CoreError, ErrorKind};
use crate::event::{task_messages_topic, BusEvent};

/// Resolve the `to` selector to the set of candidate recipient agent ids.
/// Does not check liveness — that happens at delivery time, one mailbox
/// lookup per candidate.
fn resolve_recipients(to: &Value, scope: &DispatchScope) -> Vec<String> {
    if let Some(list) = to.as_array() {
        return list.iter().filter_map(|v| v.as_str().map(str::to_string)).collect();
    }
    match to.as_str() {
        Some("parent") => scope.parent_id.clone().into_iter().collect(),
        Some("children") => scope.env.registry.children_of(&scope.agent_id),
        Some("announcement") => collect_descendants(scope, &scope.agent_id),
        Some(literal_id) => vec![literal_id.to_string()],
        None => Vec::new(),
    }
}

/// Breadth-first collect of every descendant beneath (not including)
/// `root`, the same traversal `dismiss_child::collect_subtree` uses for
/// its own recursive reach through the registry.
fn collect_descendants(scope: &DispatchScope, root: &str) -> Vec<String> {
    let mut descendants = Vec::new();
    let mut frontier = vec![root.to_string()];
    while let Some(next) = frontier.pop() {
        for child in scope.env.registry.children_of(&next) {
            descendants.push(child.clone());
            frontier.push(child);
        }
    }
    descendants
}

pub async fn run(params: Params, scope: &DispatchScope) -> Result<ActionOutcome, CoreError> {
    let to = params
        .get("to")
        .ok_or_else(|| CoreError::new(ErrorKind::MissingRequiredParam("to".to_string())))?;
    let content = require_str(&params, "content")?;

    let recipients = resolve_recipients(to, scope);
    let mut sent_to = Vec::new();

    for recipient in &recipients {
        let Some(mailbox) = scope.env.registry.mailbox(recipient) else {
            continue;
        };
        if mailbox
            .send(Stimulus::UserMessage { content: content.to_string() })
            .await
            .is_err()
        {
            continue;
        }
        sent_to.push(recipient.clone());
        scope.env.event_bus.broadcast(
            task_messages_topic(&scope.task_id),
            BusEvent::Message {
                id: scope.action_id.clone(),
                sender_id: scope.agent_id.clone(),
                recipient_id: Some(recipient.clone()),
                content: content.to_string(),
                at: chrono::Utc::now(),
            },
        );
    }

    let mut metadata = HashMap::new();
    metadata.insert("sent_to".to_string(), serde_json::json!(sent_to));
    Ok(ok_with_metadata(
        format!("delivered to {} of {} resolved recipient(s)", sent_to.len(), recipients.len()),
        metadata,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
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

    fn test_scope(env: Arc<Environment>, agent_id: &str, parent_id: Option<&str>) -> DispatchScope {
        DispatchScope {
            agent_id: agent_id.into(),
            task_id: "t1".into(),
            parent_id: parent_id.map(String::from),
            capability_groups: HashSet::new(),
            budget_data: crate::budget::schema::BudgetData::new_na(),
            spent: 0.0,
            action_id: "act-1".into(),
            env,
        }
    }

    fn register(env: &Arc<Environment>, id: &str, parent: Option<&str>) -> tokio::sync::mpsc::Receiver<Stimulus> {
        let (tx, rx) = tokio::sync::mpsc::channel(8);
        env.registry.register(RegistryEntry {
            agent_id: id.into(),
            task_id: "t1".into(),
            parent_id: parent.map(String::from),
            mailbox: tx,
            metadata: HashMap::new(),
            done: Arc::new(tokio::sync::Notify::new()),
        });
        rx
    }

    #[tokio::test]
    async fn delivers_to_registered_mailbox_by_literal_id() {
        let env = test_env();
        let mut rx = register(&env, "recipient", None);

        let mut params = Params::new();
        params.insert("to".into(), serde_json::json!("recipient"));
        params.insert("content".into(), serde_json::json!("hello"));
        let scope = test_scope(env, "sender", None);
        let outcome = run(params, &scope).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.metadata.get("sent_to").unwrap(), &serde_json::json!(["recipient"]));
        match rx.recv().await.unwrap() {
            Stimulus::UserMessage { content } => assert_eq!(content, "hello"),
            other => panic!("unexpected stimulus: {other:?}"),
        }
    }

    #[tokio::test]
    async fn dead_literal_recipient_is_skipped_not_erroring() {
        let env = test_env();
        let mut params = Params::new();
        params.insert("to".into(), serde_json::json!("ghost"));
        params.insert("content".into(), serde_json::json!("hello"));
        let scope = test_scope(env, "sender", None);
        let outcome = run(params, &scope).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.metadata.get("sent_to").unwrap(), &serde_json::json!([]));
    }

    #[tokio::test]
    async fn to_parent_resolves_to_caller_parent_id() {
        let env = test_env();
        let mut rx_parent = register(&env, "parent", None);
        let _rx_self = register(&env, "child", Some("parent"));

        let mut params = Params::new();
        params.insert("to".into(), serde_json::json!("parent"));
        params.insert("content".into(), serde_json::json!("status update"));
        let scope = test_scope(env, "child", Some("parent"));
        let outcome = run(params, &scope).await.unwrap();
        assert_eq!(outcome.metadata.get("sent_to").unwrap(), &serde_json::json!(["parent"]));
        matches!(rx_parent.recv().await.unwrap(), Stimulus::UserMessage { .. });
    }

    #[tokio::test]
    async fn to_children_fans_out_to_direct_children_only() {
        let env = test_env();
        let mut rx_child = register(&env, "child", Some("root"));
        let mut rx_grandchild = register(&env, "grandchild", Some("child"));

        let mut params = Params::new();
        params.insert("to".into(), serde_json::json!("children"));
        params.insert("content".into(), serde_json::json!("go"));
        let scope = test_scope(env, "root", None);
        let outcome = run(params, &scope).await.unwrap();
        assert_eq!(outcome.metadata.get("sent_to").unwrap(), &serde_json::json!(["child"]));
        matches!(rx_child.recv().await.unwrap(), Stimulus::UserMessage { .. });
        assert!(rx_grandchild.try_recv().is_err());
    }

    #[tokio::test]
    async fn to_announcement_fans_out_to_every_descendant() {
        let env = test_env();
        let mut rx_child = register(&env, "child", Some("root"));
        let mut rx_grandchild = register(&env, "grandchild", Some("child"));

        let mut params = Params::new();
        params.insert("to".into(), serde_json::json!("announcement"));
        params.insert("content".into(), serde_json::json!("broadcast"));
        let scope = test_scope(env, "root", None);
        let outcome = run(params, &scope).await.unwrap();
        let mut sent = outcome.metadata.get("sent_to").unwrap().as_array().unwrap().clone();
        sent.sort_by(|a, b| a.as_str().cmp(&b.as_str()));
        assert_eq!(sent, vec![serde_json::json!("child"), serde_json::json!("grandchild")]);
        matches!(rx_child.recv().await.unwrap(), Stimulus::UserMessage { .. });
        matches!(rx_grandchild.recv().await.unwrap(), Stimulus::UserMessage { .. });
    }

    #[tokio::test]
    async fn to_list_of_ids_delivers_to_each() {
        let env = test_env();
        let mut rx_a = register(&env, "a", None);
        let mut rx_b = register(&env, "b", None);

        let mut params = Params::new();
        params.insert("to".into(), serde_json::json!(["a", "b"]));
        params.insert("content".into(), serde_json::json!("fan out"));
        let scope = test_scope(env, "sender", None);
        let outcome = run(params, &scope).await.unwrap();
        let mut sent = outcome.metadata.get("sent_to").unwrap().as_array().unwrap().clone();
        sent.sort_by(|x, y| x.as_str().cmp(&y.as_str()));
        assert_eq!(sent, vec![serde_json::json!("a"), serde_json::json!("b")]);
        matches!(rx_a.recv().await.unwrap(), Stimulus::UserMessage { .. });
        matches!(rx_b.recv().await.unwrap(), Stimulus::UserMessage { .. });
    }
}
