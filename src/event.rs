//! The topic-oriented event bus.
//!
//! A single `Arc<dyn EventHandler>` callback wired into every agent is the
//! obvious first design, but a *topic* pub/sub layer (`agents:lifecycle`,
//! `agents:<id>:logs`, …) handed to every component by injection, with no
//! process-global broker name, is more useful once many independent
//! observers (a UI, a log sink, a cost dashboard) want to subscribe to
//! different slices of the same event stream. This module keeps a single
//! `AgentEvent`-style variant catalogue for payload shapes but delivers
//! them through [`EventBus::subscribe`]/[`broadcast`] over
//! `tokio::sync::broadcast`, keyed by [`Topic`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

use crate::budget::schema::BudgetData;

/// A topic name. Agent- and task-scoped topics are parameterized by id, so
/// they are represented as an owned `String` rather than a fixed enum —
/// the set of live topics grows with the agent tree.
pub type Topic = String;

pub fn lifecycle_topic() -> Topic {
    "agents:lifecycle".to_string()
}
pub fn agent_logs_topic(agent_id: &str) -> Topic {
    format!("agents:{agent_id}:logs")
}
pub fn agent_todos_topic(agent_id: &str) -> Topic {
    format!("agents:{agent_id}:todos")
}
pub fn agent_costs_topic(agent_id: &str) -> Topic {
    format!("agents:{agent_id}:costs")
}
pub fn task_messages_topic(task_id: &str) -> Topic {
    format!("tasks:{task_id}:messages")
}
pub fn task_costs_topic(task_id: &str) -> Topic {
    format!("tasks:{task_id}:costs")
}
pub fn actions_all_topic() -> Topic {
    "actions:all".to_string()
}

/// Lifecycle payload variants.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    AgentSpawned {
        agent_id: String,
        parent_id: Option<String>,
        task_id: String,
        budget_data: BudgetData,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    AgentTerminated {
        agent_id: String,
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    StateChanged {
        agent_id: String,
        new_state: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// The full catalogue of payloads the core ever broadcasts.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BusEvent {
    Lifecycle(LifecycleEvent),
    Log {
        agent_id: String,
        level: LogLevel,
        message: String,
        metadata: HashMap<String, Value>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    Message {
        id: String,
        sender_id: String,
        recipient_id: Option<String>,
        content: String,
        at: chrono::DateTime<chrono::Utc>,
    },
    CostRecorded {
        agent_id: String,
        amount: f64,
        at: chrono::DateTime<chrono::Utc>,
    },
    ActionCompleted {
        agent_id: String,
        action_id: String,
        kind: String,
        result_summary: String,
    },
    TodoUpdated {
        agent_id: String,
        todos: Vec<crate::agent::state::TodoItem>,
    },
}

/// One delivered item: which topic it arrived on, and the payload.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub topic: Topic,
    pub payload: BusEvent,
}

const CHANNEL_CAPACITY: usize = 1024;

/// A single shared bus instance, injected into every agent/executor/task
/// manager through an `opts`-style environment rather than looked up by a
/// global name.
///
/// Internally a [`broadcast::Sender`] fans every [`broadcast`] call out to
/// all current subscribers of the matching topic; subscribing late on a
/// topic loses earlier events, which is an accepted best-effort delivery
/// semantics for things like `send_message` and lifecycle announcements.
pub struct EventBus {
    sender: broadcast::Sender<Envelope>,
    /// Tracked purely so tests and diagnostics can assert on subscription
    /// counts; the broadcast channel itself does not expose per-topic state.
    subscriptions: Mutex<HashMap<Topic, usize>>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe to a topic. Returns a filtered receiver that only yields
    /// envelopes whose `topic` equals `topic` — the underlying channel is
    /// shared across all topics so that a single `EventBus` instance (no
    /// global registry of per-topic channels) serves every subscriber.
    pub fn subscribe(&self, topic: impl Into<Topic>) -> TopicReceiver {
        let topic = topic.into();
        *self
            .subscriptions
            .lock()
            .unwrap()
            .entry(topic.clone())
            .or_insert(0) += 1;
        TopicReceiver {
            topic,
            rx: self.sender.subscribe(),
        }
    }

    /// Best-effort broadcast: if there are no subscribers the send is a
    /// cheap no-op (mirrors `broadcast::Sender::send`'s `Err(SendError)`
    /// when the channel has zero receivers, which is expected and not an
    /// error condition here).
    pub fn broadcast(&self, topic: impl Into<Topic>, payload: BusEvent) {
        let envelope = Envelope {
            topic: topic.into(),
            payload,
        };
        let _ = self.sender.send(envelope);
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        *self.subscriptions.lock().unwrap().get(topic).unwrap_or(&0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A subscription to exactly one topic, filtering out envelopes for others.
pub struct TopicReceiver {
    topic: Topic,
    rx: broadcast::Receiver<Envelope>,
}

impl TopicReceiver {
    /// Await the next envelope addressed to this subscription's topic,
    /// silently skipping (and, on lag, tolerating dropped) envelopes for
    /// other topics.
    pub async fn recv(&mut self) -> Option<BusEvent> {
        loop {
            match self.rx.recv().await {
                Ok(envelope) => {
                    if envelope.topic == self.topic {
                        return Some(envelope.payload);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_only_matching_topic() {
        let bus = EventBus::new();
        let mut rx_a = bus.subscribe(agent_logs_topic("a"));
        let mut rx_b = bus.subscribe(agent_logs_topic("b"));

        bus.broadcast(
            agent_logs_topic("a"),
            BusEvent::Log {
                agent_id: "a".into(),
                level: LogLevel::Info,
                message: "hello".into(),
                metadata: HashMap::new(),
                timestamp: chrono::Utc::now(),
            },
        );

        let got = rx_a.recv().await.expect("event for a");
        matches!(got, BusEvent::Log { .. });

        // b's subscription never receives the event addressed to a.
        let bus2 = bus; // keep alive
        drop(bus2.sender.clone());
        tokio::select! {
            _ = rx_b.recv() => panic!("topic b should not have received a's event"),
            _ = tokio::time::sleep(std::time::Duration::from_millis(20)) => {}
        }
    }

    #[tokio::test]
    async fn broadcast_with_no_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.broadcast(
            lifecycle_topic(),
            BusEvent::Lifecycle(LifecycleEvent::AgentTerminated {
                agent_id: "x".into(),
                reason: "test".into(),
                timestamp: chrono::Utc::now(),
            }),
        );
    }
}
