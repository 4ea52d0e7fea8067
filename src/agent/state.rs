//! The agent's persisted state blob (spec §3 "Agent").
//!
//! Every agent process exclusively owns exactly one [`AgentState`] (spec §3
//! "Ownership"); no other process mutates it. This is the data that must be
//! written to the [`crate::persistence::Store`] before any action derived
//! from it is dispatched (invariant I-A3) and that the [`crate::task`]
//! restorer reconstructs verbatim on resume (spec §4.5).

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::action::Params;
use crate::budget::schema::BudgetData;
use crate::model::Message;

/// Spec §3 Todo item: `{content, state}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodoItem {
    pub content: String,
    pub state: TodoState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoState {
    Todo,
    Pending,
    Done,
}

/// Spec §3 "Pending action". Exists from dispatch until the result has been
/// folded into history and cleared (sync) or until async completion
/// arrives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAction {
    pub action_id: String,
    pub action_type: crate::action::ActionKind,
    pub params: Params,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub acked: bool,
    pub async_ref: Option<String>,
    /// The decision's original wait instruction, kept so the terminal
    /// result handler knows whether to arm a timer or re-enter consensus
    /// immediately (spec §4.1 / §4.2(i)).
    pub wait: crate::action::WaitValue,
}

/// The unique reference of the one armed wait timer (spec §4.1 I-A2,
/// Glossary "Wait timer"). Older references become stale the instant a
/// newer one replaces them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerRef(pub u64);

/// The full mutable state blob owned by one agent (spec §3 "Agent").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub agent_id: String,
    pub task_id: String,
    pub parent_id: Option<String>,

    pub models: Vec<String>,
    pub capability_groups: HashSet<String>,
    pub profile: String,

    /// `model_id → ordered sequence of messages` (spec §3 Conversation message).
    pub conversation_histories: HashMap<String, Vec<Message>>,
    pub pending_actions: HashMap<String, PendingAction>,
    pub children: HashSet<String>,
    pub todos: Vec<TodoItem>,
    pub budget_data: BudgetData,
    pub over_budget: bool,

    /// Accumulated ancestor constraints (spec §4.3 spawn_child:
    /// "downstream_constraints accumulated from ancestors").
    pub downstream_constraints: Vec<String>,

    /// (I-A1) At most one consensus round in flight; cleared only when a
    /// round completes or is explicitly cancelled.
    pub consensus_scheduled: bool,
    /// (I-A2) The reference of the one currently armed wait timer, if any.
    pub wait_timer: Option<TimerRef>,
    /// Children whose allocation has already been released from escrow —
    /// guards invariant I-B3's "once, idempotently" against a duplicate
    /// `child_terminated` stimulus for the same child.
    pub released_children: HashSet<String>,
}

impl AgentState {
    pub fn new_root(
        agent_id: impl Into<String>,
        task_id: impl Into<String>,
        models: Vec<String>,
        capability_groups: HashSet<String>,
        profile: impl Into<String>,
        budget_data: BudgetData,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            task_id: task_id.into(),
            parent_id: None,
            models,
            capability_groups,
            profile: profile.into(),
            conversation_histories: HashMap::new(),
            pending_actions: HashMap::new(),
            children: HashSet::new(),
            todos: Vec::new(),
            budget_data,
            over_budget: false,
            downstream_constraints: Vec::new(),
            consensus_scheduled: false,
            wait_timer: None,
            released_children: HashSet::new(),
        }
    }

    /// Build a child's initial state, inheriting models, capability groups,
    /// and accumulated ancestor constraints from the parent (spec §4.3
    /// spawn_child).
    pub fn new_child(
        agent_id: impl Into<String>,
        parent: &AgentState,
        budget_data: BudgetData,
        extra_constraint: Option<String>,
    ) -> Self {
        let mut downstream_constraints = parent.downstream_constraints.clone();
        if let Some(c) = extra_constraint {
            downstream_constraints.push(c);
        }
        Self {
            agent_id: agent_id.into(),
            task_id: parent.task_id.clone(),
            parent_id: Some(parent.agent_id.clone()),
            models: parent.models.clone(),
            capability_groups: parent.capability_groups.clone(),
            profile: parent.profile.clone(),
            conversation_histories: HashMap::new(),
            pending_actions: HashMap::new(),
            children: HashSet::new(),
            todos: Vec::new(),
            budget_data,
            over_budget: false,
            downstream_constraints,
            consensus_scheduled: false,
            wait_timer: None,
            released_children: HashSet::new(),
        }
    }

    /// A conversation round must end with a non-assistant turn before a new
    /// one begins (spec §3 "Conversation message"). Checked per-model.
    pub fn ends_with_non_assistant(&self, model_id: &str) -> bool {
        match self.conversation_histories.get(model_id) {
            None => true,
            Some(history) => !matches!(
                history.last().map(|m| m.role),
                Some(crate::model::Role::Assistant)
            ),
        }
    }
}
