//! The agent registry (spec §5 "Shared resources — Agent registry").
//!
//! Keyed by `agent_id`, storing `{mailbox, task_id, parent_id, metadata}`.
//! Single-writer per key — only the agent itself registers or deregisters
//! its own entry; every other process only reads. Parent/child references
//! are id-based everywhere else in the crate (spec §9 "Cyclic parent ↔
//! child references must become id-based"); this registry is the one
//! place an `agent_id` resolves to a live mailbox handle.
//!
//! Grounded on the teacher's `tool_protocol.rs::ToolRegistry` (a
//! `RwLock`-guarded, name-keyed table of live handles looked up by every
//! caller but mutated only at registration time) — the same shape,
//! retargeted from tool names to agent ids.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, Notify};

use crate::agent::stimulus::Stimulus;

/// The mailbox an agent's process is listening on. Other components send
/// stimuli through this handle rather than ever touching the agent's
/// state directly (spec §5 "communicating only by message passing").
pub type AgentMailbox = mpsc::Sender<Stimulus>;

/// What the registry knows about one live (or once-live) agent.
#[derive(Clone)]
pub struct RegistryEntry {
    pub agent_id: String,
    pub task_id: String,
    pub parent_id: Option<String>,
    pub mailbox: AgentMailbox,
    pub metadata: HashMap<String, serde_json::Value>,
    /// Signalled once when the agent's mailbox loop exits, so callers
    /// (e.g. `TaskManager::pause`) can await a subtree's full shutdown
    /// without racing a missed notification (collect `notified()` futures
    /// before sending any stop stimuli).
    pub done: Arc<Notify>,
}

/// Read-mostly table of live agents, shared via `Arc` through the
/// injected environment (spec §5 "No process-global state" — this type
/// is never reached through a global, only through `Environment`).
#[derive(Default)]
pub struct AgentRegistry {
    entries: RwLock<HashMap<String, RegistryEntry>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-writer-per-key: only the agent identified by `entry.agent_id`
    /// ever calls this for its own id.
    pub fn register(&self, entry: RegistryEntry) {
        self.entries.write().unwrap().insert(entry.agent_id.clone(), entry);
    }

    pub fn deregister(&self, agent_id: &str) {
        self.entries.write().unwrap().remove(agent_id);
    }

    pub fn get(&self, agent_id: &str) -> Option<RegistryEntry> {
        self.entries.read().unwrap().get(agent_id).cloned()
    }

    pub fn mailbox(&self, agent_id: &str) -> Option<AgentMailbox> {
        self.get(agent_id).map(|e| e.mailbox)
    }

    pub fn done_signal(&self, agent_id: &str) -> Option<Arc<Notify>> {
        self.get(agent_id).map(|e| e.done)
    }

    pub fn children_of(&self, parent_id: &str) -> Vec<String> {
        self.entries
            .read()
            .unwrap()
            .values()
            .filter(|e| e.parent_id.as_deref() == Some(parent_id))
            .map(|e| e.agent_id.clone())
            .collect()
    }

    pub fn list_for_task(&self, task_id: &str) -> Vec<String> {
        self.entries
            .read()
            .unwrap()
            .values()
            .filter(|e| e.task_id == task_id)
            .map(|e| e.agent_id.clone())
            .collect()
    }

    pub fn is_live(&self, agent_id: &str) -> bool {
        self.entries.read().unwrap().contains_key(agent_id)
    }
}
