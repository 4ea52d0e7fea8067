//! Parent-first agent-tree reconstruction, split out
//! of [`super::manager::TaskManager`] since it is the one piece of task
//! lifecycle concerned purely with replay order rather than status
//! transitions.
//!
//! An append-only durable log is replayed strictly in order to rebuild a
//! session; the same "parent must exist before its dependents are
//! processed" shape applies here, retargeted from a linear chain to a
//! tree of persisted [`AgentState`]s.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::warn;

use crate::agent::core::{Agent, AgentHandle};
use crate::config::Environment;
use crate::error::CoreError;

pub struct Restorer;

impl Restorer {
    /// Spawn every agent persisted under `task_id`, parents strictly
    /// before their children, re-wiring nothing beyond what each
    /// [`crate::agent::state::AgentState`] already carries — parent/child
    /// references are id-based, so a freshly spawned process resolves them
    /// through the registry as soon as every sibling is registered.
    pub async fn restore(env: &Arc<Environment>, task_id: &str) -> Result<Vec<AgentHandle>, CoreError> {
        let mut pending = env.store.list_agents_for_task(task_id).await?;
        let mut handles = Vec::with_capacity(pending.len());
        let mut spawned: HashSet<String> = HashSet::new();

        // Bounded by `pending.len()` passes: each pass either spawns at
        // least one newly ready agent, or the remaining set has no root
        // reachable from an already-spawned parent (a corrupt store,
        // reported rather than looped on forever).
        for _ in 0..=pending.len() {
            if pending.is_empty() {
                break;
            }
            let mut progressed = false;
            let mut still_pending = Vec::new();
            for state in pending {
                let ready = match &state.parent_id {
                    None => true,
                    Some(parent_id) => spawned.contains(parent_id),
                };
                if ready {
                    spawned.insert(state.agent_id.clone());
                    handles.push(Agent::spawn(state, env.clone()).await?);
                    progressed = true;
                } else {
                    still_pending.push(state);
                }
            }
            pending = still_pending;
            if !progressed {
                break;
            }
        }

        if !pending.is_empty() {
            warn!(
                %task_id,
                orphaned = pending.len(),
                "could not restore every persisted agent: parent missing from store"
            );
        }

        Ok(handles)
    }
}
