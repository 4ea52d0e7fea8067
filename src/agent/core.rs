//! Agent Core (spec §4.1): the single-writer state machine every live
//! agent runs as.
//!
//! Grounded on the teacher's `orchestration.rs`, which already spawns
//! parallel `tokio::task`s per collaborating agent and the registry
//! idiom borrowed from `tool_protocol.rs::ToolRegistry` (see
//! [`crate::registry`]) — generalized here from "one task per
//! collaboration round" to "one task for an agent's entire lifetime,
//! reading its own mailbox". Every mutation of [`AgentState`] happens on
//! this task; nothing else is ever handed `&mut AgentState` (invariant
//! I-A3). A consensus round's resulting action is dispatched by spawning
//! a detached task that reports its outcome back through the same
//! mailbox as a [`Stimulus::ActionResult`], so the mailbox loop below
//! never awaits I/O directly — exactly the "dispatcher never blocks the
//! agent process" requirement of spec §4.3.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info, warn};

use crate::action::{ActionKind, Decision, WaitValue};
use crate::agent::state::{AgentState, PendingAction, TimerRef, TodoItem};
use crate::agent::stimulus::{ActionOutcome, Stimulus};
use crate::budget::schema::BudgetData;
use crate::budget::tracker::{BudgetStatus, Tracker};
use crate::config::Environment;
use crate::consensus::engine::ConsensusEngine;
use crate::dispatcher::{DispatchScope, Dispatcher};
use crate::event::{actions_all_topic, lifecycle_topic, BusEvent, LifecycleEvent};
use crate::model::{Message, Role};
use crate::registry::{AgentMailbox, RegistryEntry};

/// Mailbox depth for one agent. Generous enough that a burst of sibling
/// `send_message`/`child_terminated` stimuli never backpressures the
/// senders, without being unbounded (spec §5 "bounded mailbox").
pub const MAILBOX_CAPACITY: usize = 64;

/// What spawning an agent hands back to its caller: a live mailbox and a
/// notifier that fires once when the agent's process exits (spec §4.5
/// "Pause" — callers await a subtree's full shutdown rather than poll).
pub struct AgentHandle {
    pub agent_id: String,
    pub mailbox: AgentMailbox,
    pub done: Arc<Notify>,
}

/// One live agent process (spec §3 "Agent", §4.1). Owns exactly one
/// [`AgentState`] for its entire lifetime; every other component only
/// ever reaches it through [`AgentHandle::mailbox`].
pub struct Agent {
    state: AgentState,
    env: Arc<Environment>,
    mailbox_rx: mpsc::Receiver<Stimulus>,
    /// A clone of the sender half of `mailbox_rx`, used to loop stimuli
    /// back to this same agent: wait-timer expiry and dispatched-action
    /// results (spec §4.3 "results arrive as mailbox messages").
    self_tx: AgentMailbox,
    done: Arc<Notify>,
    /// Mints fresh [`TimerRef`]s; each one strictly newer than the last,
    /// so a stale ref can never be mistaken for the current one (I-A2).
    next_timer: u64,
    /// Mints fresh pending-action ids, unique within this agent's lifetime.
    next_action_seq: u64,
}

impl Agent {
    /// Spawn a fresh process for `state`: register it, persist its
    /// initial state, emit `agent_spawned`, then hand the mailbox loop to
    /// `tokio::spawn` (spec §4.5 Create / spawn_child).
    ///
    /// Does not send `state`'s first stimulus — callers that built this
    /// state from an `initial_message` (spawn_child) or a fresh task
    /// prompt (`TaskManager::create`) send a `UserMessage` themselves
    /// right after this returns, once they hold the mailbox.
    pub async fn spawn(state: AgentState, env: Arc<Environment>) -> Result<AgentHandle, crate::error::CoreError> {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let done = Arc::new(Notify::new());

        env.store.upsert_agent_state(&state.agent_id, state.clone()).await?;

        env.registry.register(RegistryEntry {
            agent_id: state.agent_id.clone(),
            task_id: state.task_id.clone(),
            parent_id: state.parent_id.clone(),
            mailbox: tx.clone(),
            metadata: HashMap::new(),
            done: done.clone(),
        });

        env.event_bus.broadcast(
            lifecycle_topic(),
            BusEvent::Lifecycle(LifecycleEvent::AgentSpawned {
                agent_id: state.agent_id.clone(),
                parent_id: state.parent_id.clone(),
                task_id: state.task_id.clone(),
                budget_data: state.budget_data,
                timestamp: chrono::Utc::now(),
            }),
        );

        let handle = AgentHandle {
            agent_id: state.agent_id.clone(),
            mailbox: tx.clone(),
            done: done.clone(),
        };

        let agent = Agent {
            state,
            env,
            mailbox_rx: rx,
            self_tx: tx,
            done,
            next_timer: 0,
            next_action_seq: 0,
        };
        tokio::spawn(agent.run());

        Ok(handle)
    }

    /// The mailbox loop (spec §5 "stimuli are processed strictly in
    /// arrival order; there is no intra-agent concurrency").
    async fn run(mut self) {
        loop {
            match self.mailbox_rx.recv().await {
                Some(Stimulus::Pause) => {
                    self.persist().await;
                    self.shut_down(false, "paused").await;
                    return;
                }
                Some(Stimulus::Terminate { reason }) => {
                    self.persist().await;
                    self.shut_down(true, &reason).await;
                    return;
                }
                Some(stimulus) => {
                    self.handle_stimulus(stimulus).await;
                    // Consensus scheduling collapses (spec §4.1): any
                    // number of stimuli arriving while a round is in
                    // flight just leave the latch set; exactly one round
                    // runs per time the latch transitions false -> true
                    // -> false here.
                    if self.state.consensus_scheduled {
                        self.state.consensus_scheduled = false;
                        self.run_consensus_and_dispatch().await;
                    }
                    self.persist().await;
                }
                None => {
                    self.shut_down(false, "mailbox closed").await;
                    return;
                }
            }
        }
    }

    async fn shut_down(&mut self, notify_parent: bool, reason: &str) {
        self.env.registry.deregister(&self.state.agent_id);
        self.env.event_bus.broadcast(
            lifecycle_topic(),
            BusEvent::Lifecycle(LifecycleEvent::AgentTerminated {
                agent_id: self.state.agent_id.clone(),
                reason: reason.to_string(),
                timestamp: chrono::Utc::now(),
            }),
        );

        if notify_parent {
            if let Some(parent_id) = self.state.parent_id.clone() {
                if let Some(mailbox) = self.env.registry.mailbox(&parent_id) {
                    let original_allocation = self.state.budget_data.allocated.unwrap_or(0.0);
                    let _ = mailbox
                        .send(Stimulus::ChildTerminated {
                            child_id: self.state.agent_id.clone(),
                            reason: reason.to_string(),
                            original_allocation,
                        })
                        .await;
                }
            }
        }

        info!(agent_id=%self.state.agent_id, %reason, "agent process exiting");
        self.done.notify_waiters();
    }

    async fn persist(&self) {
        if let Err(e) = self
            .env
            .store
            .upsert_agent_state(&self.state.agent_id, self.state.clone())
            .await
        {
            error!(agent_id=%self.state.agent_id, error=%e, "failed to persist agent state");
        }
    }

    async fn handle_stimulus(&mut self, stimulus: Stimulus) {
        match stimulus {
            Stimulus::UserMessage { content } => self.handle_user_message(content),
            Stimulus::ActionResult { action_id, result, is_ack } => {
                self.handle_action_result(action_id, result, is_ack).await
            }
            Stimulus::WaitExpired { timer_ref } => self.handle_wait_expired(timer_ref),
            Stimulus::ChildTerminated { child_id, reason, original_allocation } => {
                self.handle_child_terminated(child_id, reason, original_allocation).await
            }
            Stimulus::CostRecorded { amount } => self.handle_cost_recorded(amount).await,
            Stimulus::BudgetAdjusted { new_allocated } => self.handle_budget_adjusted(new_allocated),
            Stimulus::Pause | Stimulus::Terminate { .. } => {
                unreachable!("Pause/Terminate are handled directly in run()")
            }
        }
    }

    /// `user_message(content)` (spec §4.1 first bullet).
    fn handle_user_message(&mut self, content: String) {
        self.push_to_all_histories(Role::User, content);
        self.state.consensus_scheduled = true;
    }

    /// Append one turn to every model's conversation history, then
    /// enforce the per-profile token budget (spec §9 supplement:
    /// [`crate::agent::prompt::truncate_history`]) so a long-lived agent's
    /// history never grows without bound.
    fn push_to_all_histories(&mut self, role: Role, text: String) {
        let max_tokens = self.env.config.profile(&self.state.profile).max_history_tokens;
        let models = self.state.models.clone();
        for model_id in models {
            let history = self.state.conversation_histories.entry(model_id).or_default();
            history.push(Message::text(role, text.clone()));
            crate::agent::prompt::truncate_history(history, max_tokens);
        }
    }

    /// `action_result(action_id, result)` (spec §4.1 second bullet).
    async fn handle_action_result(&mut self, action_id: String, result: ActionOutcome, is_ack: bool) {
        if is_ack {
            if let Some(pending) = self.state.pending_actions.get_mut(&action_id) {
                pending.acked = true;
            }
            return;
        }

        let Some(pending) = self.state.pending_actions.remove(&action_id) else {
            warn!(agent_id=%self.state.agent_id, %action_id, "action result for unknown or already-cleared pending action");
            return;
        };

        if result.success {
            self.fold_outcome(&pending, &result).await;
        }

        // (I-A4) Any fold above (e.g. inserting a freshly spawned child
        // into `children`) completes before this announcement goes out.
        self.env.event_bus.broadcast(
            actions_all_topic(),
            BusEvent::ActionCompleted {
                agent_id: self.state.agent_id.clone(),
                action_id: action_id.clone(),
                kind: format!("{:?}", pending.action_type),
                result_summary: result.content.clone(),
            },
        );

        let text = if result.success {
            result.content.clone()
        } else {
            format!("error: {}", result.content)
        };
        self.push_to_all_histories(Role::Tool, text);

        match pending.wait {
            WaitValue::Immediate => self.state.consensus_scheduled = true,
            WaitValue::Seconds(secs) => self.arm_wait_timer(Some(Duration::from_secs(secs))),
            WaitValue::Indefinite => self.arm_wait_timer(None),
        }
    }

    /// `wait_expired(timer_ref)` (spec §4.1 third bullet, invariant I-A2).
    fn handle_wait_expired(&mut self, timer_ref: TimerRef) {
        if self.state.wait_timer != Some(timer_ref) {
            debug!(agent_id=%self.state.agent_id, ?timer_ref, "stale wait timer expiry ignored");
            return;
        }
        self.state.wait_timer = None;
        self.state.consensus_scheduled = true;
    }

    /// `child_terminated(child_id, reason, original_allocation)` (spec
    /// §4.1 fourth bullet, invariant I-B3's "once, idempotently").
    async fn handle_child_terminated(&mut self, child_id: String, reason: String, original_allocation: f64) {
        self.state.children.remove(&child_id);
        if self.state.released_children.insert(child_id.clone()) {
            self.state.budget_data.release_committed(original_allocation);
        }
        info!(agent_id=%self.state.agent_id, %child_id, %reason, "child terminated; escrow released");
        self.recompute_over_budget().await;
    }

    /// `cost_recorded(amount)` (spec §4.1 fifth bullet).
    async fn handle_cost_recorded(&mut self, _amount: f64) {
        self.recompute_over_budget().await;
    }

    /// Child-side fold of a parent's `adjust_budget` (spec §4.3
    /// adjust_budget: "atomically adjusts parent committed and child
    /// allocated" — this is the child's half; the parent's half is
    /// [`Self::fold_adjust_budget`]).
    fn handle_budget_adjusted(&mut self, new_allocated: f64) {
        self.state.budget_data.set_allocated(new_allocated);
    }

    async fn recompute_over_budget(&mut self) {
        let spent = self
            .env
            .store
            .sum_cost_by_agent(&self.state.agent_id)
            .await
            .unwrap_or(0.0);
        let status = Tracker::get_status(&self.state.budget_data, spent);
        self.state.over_budget = matches!(status, BudgetStatus::OverBudget);
    }

    /// Arms (or re-arms) the one wait timer an agent may hold (I-A2),
    /// replacing any previous reference. `None` means indefinite: no
    /// background task is spawned, so only an external stimulus (a new
    /// `UserMessage`, for instance) will ever resume consensus.
    fn arm_wait_timer(&mut self, duration: Option<Duration>) {
        self.next_timer += 1;
        let timer_ref = TimerRef(self.next_timer);
        self.state.wait_timer = Some(timer_ref);

        if let Some(duration) = duration {
            let self_tx = self.self_tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(duration).await;
                let _ = self_tx.send(Stimulus::WaitExpired { timer_ref }).await;
            });
        }
    }

    /// Runs one consensus round to completion and dispatches the winning
    /// decision, or records a terminal consensus failure as a tool-turn
    /// (spec §4.2 "Result handling": "the agent retries on the next
    /// stimulus" — no action is executed, and `consensus_scheduled` stays
    /// cleared until something else re-sets it).
    async fn run_consensus_and_dispatch(&mut self) {
        let spent = self
            .env
            .store
            .sum_cost_by_agent(&self.state.agent_id)
            .await
            .unwrap_or(0.0);

        match ConsensusEngine::run_round(&mut self.state, self.env.as_ref(), spent).await {
            Ok(decision) => self.dispatch_decision(decision).await,
            Err(e) => {
                warn!(agent_id=%self.state.agent_id, error=%e, "consensus round failed");
                self.push_to_all_histories(Role::Tool, format!("consensus failed: {e}"));
            }
        }
    }

    /// Records the decision as a pending action, persists (I-A3: "before
    /// any action is dispatched"), then hands the actual dispatch to a
    /// detached task that reports back through the mailbox — this is the
    /// "dispatcher never blocks the agent process" half of spec §4.3.
    async fn dispatch_decision(&mut self, decision: Decision) {
        self.next_action_seq += 1;
        let action_id = format!("act-{}-{}", self.state.agent_id, self.next_action_seq);

        self.state.pending_actions.insert(
            action_id.clone(),
            PendingAction {
                action_id: action_id.clone(),
                action_type: decision.action,
                params: decision.params.clone(),
                timestamp: chrono::Utc::now(),
                acked: false,
                async_ref: None,
                wait: decision.wait,
            },
        );
        self.persist().await;

        let spent = self
            .env
            .store
            .sum_cost_by_agent(&self.state.agent_id)
            .await
            .unwrap_or(0.0);
        let scope = DispatchScope {
            agent_id: self.state.agent_id.clone(),
            task_id: self.state.task_id.clone(),
            parent_id: self.state.parent_id.clone(),
            capability_groups: self.state.capability_groups.clone(),
            budget_data: self.state.budget_data,
            spent,
            action_id: action_id.clone(),
            env: self.env.clone(),
        };

        let self_tx = self.self_tx.clone();
        let kind = decision.action;
        let params = decision.params;
        tokio::spawn(async move {
            // A nested spawn so a panicking executor surfaces as a
            // `JoinError` here rather than silently dropping this action
            // id forever — the crash folds back through the normal
            // `ActionResult` path just like an executor-returned `Err`.
            let dispatch = tokio::spawn(async move { Dispatcher::dispatch(kind, params, &scope).await });
            let result = match dispatch.await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(e)) => ActionOutcome {
                    success: false,
                    content: e.to_string(),
                    metadata: HashMap::new(),
                },
                Err(join_err) => ActionOutcome {
                    success: false,
                    content: format!("action dispatch crashed: {join_err}"),
                    metadata: HashMap::new(),
                },
            };
            let _ = self_tx
                .send(Stimulus::ActionResult { action_id, result, is_ack: false })
                .await;
        });
    }

    /// Folds an executor's success metadata into [`AgentState`] for the
    /// handful of action kinds that need it — every other kind's entire
    /// effect already happened inside the executor itself (persistence
    /// writes, mailbox sends, event broadcasts).
    async fn fold_outcome(&mut self, pending: &PendingAction, result: &ActionOutcome) {
        match pending.action_type {
            ActionKind::SpawnChild => self.fold_spawn_child(result).await,
            ActionKind::AdjustBudget => self.fold_adjust_budget(result),
            ActionKind::Todo => self.fold_todo(result),
            ActionKind::LearnSkills => self.fold_learn_skills(result),
            _ => {}
        }
    }

    /// `spawn_child` (spec §4.3): build the child's state (only the
    /// owning agent has the parent context to do this — see
    /// [`crate::dispatcher::actions::spawn_child`]), commit its
    /// allocation, insert it into `children` before spawning so I-A4
    /// holds even if the spawn itself fails, then start its process.
    async fn fold_spawn_child(&mut self, result: &ActionOutcome) {
        let Some(child_id) = result.metadata.get("child_id").and_then(|v| v.as_str()).map(str::to_string) else {
            return;
        };
        let budget = result.metadata.get("budget").and_then(|v| v.as_f64());
        let initial_message = result
            .metadata
            .get("initial_message")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let child_budget = match budget {
            Some(amount) => {
                self.state.budget_data.add_committed(amount);
                BudgetData::new_allocated(amount)
            }
            None => BudgetData::new_na(),
        };

        let child_state = AgentState::new_child(child_id.clone(), &self.state, child_budget, None);
        self.state.children.insert(child_id.clone());

        match Agent::spawn(child_state, self.env.clone()).await {
            Ok(handle) => {
                if let Some(content) = initial_message {
                    let _ = handle.mailbox.send(Stimulus::UserMessage { content }).await;
                }
            }
            Err(e) => {
                error!(agent_id=%self.state.agent_id, %child_id, error=%e, "failed to spawn child agent");
                self.state.children.remove(&child_id);
                if let Some(amount) = budget {
                    self.state.budget_data.release_committed(amount);
                }
            }
        }
    }

    /// Parent-side fold of its own `adjust_budget` (spec §4.3
    /// adjust_budget). The child applies the same change to its own
    /// `allocated` on receipt of `Stimulus::BudgetAdjusted`
    /// ([`Self::handle_budget_adjusted`]); single-writer-per-state (I-A3)
    /// forbids this agent from reaching into the child's state directly.
    fn fold_adjust_budget(&mut self, result: &ActionOutcome) {
        if let Some(delta) = result.metadata.get("delta").and_then(|v| v.as_f64()) {
            self.state.budget_data.add_committed(delta);
        }
    }

    fn fold_todo(&mut self, result: &ActionOutcome) {
        let Some(raw) = result.metadata.get("todos") else {
            return;
        };
        match serde_json::from_value::<Vec<TodoItem>>(raw.clone()) {
            Ok(items) => self.state.todos = items,
            Err(e) => warn!(agent_id=%self.state.agent_id, error=%e, "could not fold todo metadata"),
        }
    }

    fn fold_learn_skills(&mut self, result: &ActionOutcome) {
        if let Some(lesson) = result.metadata.get("lesson").and_then(|v| v.as_str()) {
            self.state.downstream_constraints.push(lesson.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::state::TodoState;
    use crate::budget::schema::BudgetMode;
    use crate::config::RuntimeConfig;
    use crate::dispatcher::{NoopScrubber, NoopSecretResolver};
    use crate::error::CoreError;
    use crate::event::EventBus;
    use crate::model::{CompletionRequest, CompletionResponse, FinishReason, ModelProvider, Usage};
    use crate::persistence::memory_store::MemoryStore;
    use crate::persistence::CostRecord;
    use crate::registry::AgentRegistry;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;

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

    /// Build an `Agent` without going through `spawn`, for unit tests
    /// that only exercise one stimulus handler at a time.
    fn test_agent(state: AgentState, env: Arc<Environment>) -> Agent {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        Agent {
            state,
            env,
            mailbox_rx: rx,
            self_tx: tx,
            done: Arc::new(Notify::new()),
            next_timer: 0,
            next_action_seq: 0,
        }
    }

    fn root_state(id: &str, budget: BudgetData) -> AgentState {
        AgentState::new_root(id, "t1", vec!["m1".to_string()], HashSet::new(), "default", budget)
    }

    #[tokio::test]
    async fn user_message_appends_history_and_schedules_consensus() {
        let mut agent = test_agent(root_state("a1", BudgetData::new_na()), test_env());
        agent.handle_user_message("hello".to_string());
        assert!(agent.state.consensus_scheduled);
        let history = &agent.state.conversation_histories["m1"];
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].text_content(), "hello");
    }

    #[tokio::test]
    async fn stale_wait_timer_expiry_is_a_no_op() {
        let mut agent = test_agent(root_state("a1", BudgetData::new_na()), test_env());
        agent.arm_wait_timer(None);
        let current = agent.state.wait_timer;
        agent.handle_wait_expired(TimerRef(9999));
        assert_eq!(agent.state.wait_timer, current);
        assert!(!agent.state.consensus_scheduled);
    }

    #[tokio::test]
    async fn matching_wait_timer_expiry_clears_timer_and_schedules_consensus() {
        let mut agent = test_agent(root_state("a1", BudgetData::new_na()), test_env());
        agent.arm_wait_timer(None);
        let armed = agent.state.wait_timer.unwrap();
        agent.handle_wait_expired(armed);
        assert_eq!(agent.state.wait_timer, None);
        assert!(agent.state.consensus_scheduled);
    }

    #[tokio::test]
    async fn child_terminated_releases_escrow_exactly_once() {
        let mut budget = BudgetData::new_root(100.0);
        budget.add_committed(40.0);
        let mut agent = test_agent(root_state("parent", budget), test_env());
        agent.state.children.insert("child".to_string());

        agent
            .handle_child_terminated("child".to_string(), "done".to_string(), 40.0)
            .await;
        assert_eq!(agent.state.budget_data.committed, 0.0);
        assert!(!agent.state.children.contains("child"));

        // A duplicate delivery for the same child must not double-release.
        agent.state.budget_data.add_committed(40.0);
        agent
            .handle_child_terminated("child".to_string(), "done".to_string(), 40.0)
            .await;
        assert_eq!(agent.state.budget_data.committed, 40.0);
    }

    #[tokio::test]
    async fn cost_recorded_flips_over_budget() {
        let env = test_env();
        env.store
            .append_cost(CostRecord {
                agent_id: "a1".into(),
                task_id: "t1".into(),
                cost_type: "model_call".into(),
                amount: 100.0,
                metadata: HashMap::new(),
                at: chrono::Utc::now(),
            })
            .await
            .unwrap();
        let mut agent = test_agent(root_state("a1", BudgetData::new_root(100.0)), env);
        assert!(!agent.state.over_budget);
        agent.handle_cost_recorded(100.0).await;
        assert!(agent.state.over_budget);
    }

    #[tokio::test]
    async fn budget_adjusted_sets_new_allocation() {
        let mut agent = test_agent(root_state("child", BudgetData::new_allocated(50.0)), test_env());
        agent.handle_budget_adjusted(80.0);
        assert_eq!(agent.state.budget_data.allocated, Some(80.0));
    }

    #[tokio::test]
    async fn fold_todo_replaces_todo_list() {
        let mut agent = test_agent(root_state("a1", BudgetData::new_na()), test_env());
        let mut metadata = HashMap::new();
        metadata.insert(
            "todos".to_string(),
            serde_json::json!([{"content": "ship it", "state": "todo"}]),
        );
        let result = ActionOutcome { success: true, content: "ok".into(), metadata };
        agent.fold_todo(&result);
        assert_eq!(agent.state.todos.len(), 1);
        assert_eq!(agent.state.todos[0].content, "ship it");
        assert_eq!(agent.state.todos[0].state, TodoState::Todo);
    }

    #[tokio::test]
    async fn fold_learn_skills_pushes_downstream_constraint() {
        let mut agent = test_agent(root_state("a1", BudgetData::new_na()), test_env());
        let mut metadata = HashMap::new();
        metadata.insert("lesson".to_string(), serde_json::json!("retry fetches with backoff"));
        let result = ActionOutcome { success: true, content: "ok".into(), metadata };
        agent.fold_learn_skills(&result);
        assert_eq!(agent.state.downstream_constraints, vec!["retry fetches with backoff".to_string()]);
    }

    #[tokio::test]
    async fn fold_adjust_budget_applies_delta_to_committed() {
        let mut agent = test_agent(root_state("parent", BudgetData::new_root(100.0)), test_env());
        let mut metadata = HashMap::new();
        metadata.insert("delta".to_string(), serde_json::json!(30.0));
        let result = ActionOutcome { success: true, content: "ok".into(), metadata };
        agent.fold_adjust_budget(&result);
        assert_eq!(agent.state.budget_data.committed, 30.0);
    }

    #[tokio::test]
    async fn fold_spawn_child_registers_and_commits_budget() {
        let env = test_env();
        let mut agent = test_agent(root_state("parent", BudgetData::new_root(100.0)), env.clone());

        let mut metadata = HashMap::new();
        metadata.insert("child_id".to_string(), serde_json::json!("agent-child-1"));
        metadata.insert("profile".to_string(), serde_json::json!("default"));
        metadata.insert("budget".to_string(), serde_json::json!(20.0));
        let result = ActionOutcome { success: true, content: "spawned".into(), metadata };

        agent.fold_spawn_child(&result).await;

        assert!(agent.state.children.contains("agent-child-1"));
        assert_eq!(agent.state.budget_data.committed, 20.0);
        assert!(env.registry.is_live("agent-child-1"));

        let persisted = env.store.load_agent("agent-child-1").await.unwrap().unwrap();
        assert_eq!(persisted.parent_id, Some("parent".to_string()));
        assert_eq!(persisted.budget_data.mode, BudgetMode::Allocated);
    }

    struct ScriptedModel {
        id: String,
        replies: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ModelProvider for ScriptedModel {
        fn model_id(&self) -> &str {
            &self.id
        }

        async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, CoreError> {
            let mut replies = self.replies.lock().unwrap();
            let content = if replies.is_empty() { String::new() } else { replies.remove(0) };
            Ok(CompletionResponse {
                content,
                usage: Usage::default(),
                finish_reason: FinishReason::Stop,
                meta: HashMap::new(),
            })
        }
    }

    #[tokio::test]
    async fn end_to_end_user_message_drives_consensus_and_records_cost() {
        let mut models: HashMap<String, Arc<dyn ModelProvider>> = HashMap::new();
        let reply = r#"{"action":"record_cost","params":{"amount":2.5,"cost_type":"model_call"},"wait":false}"#;
        models.insert(
            "m1".to_string(),
            Arc::new(ScriptedModel { id: "m1".into(), replies: Mutex::new(vec![reply.to_string(); 6]) }),
        );

        let env = Arc::new(Environment {
            event_bus: Arc::new(EventBus::new()),
            store: Arc::new(MemoryStore::new()),
            registry: Arc::new(AgentRegistry::new()),
            models,
            secret_resolver: Arc::new(NoopSecretResolver),
            scrubber: Arc::new(NoopScrubber),
            external_actions: None,
            config: RuntimeConfig::default(),
        });

        let state = AgentState::new_root(
            "a1",
            "t1",
            vec!["m1".to_string()],
            HashSet::new(),
            "default",
            BudgetData::new_na(),
        );
        let handle = Agent::spawn(state, env.clone()).await.unwrap();
        handle
            .mailbox
            .send(Stimulus::UserMessage { content: "go".to_string() })
            .await
            .unwrap();

        // Give the spawned mailbox loop and its dispatch task a chance to run.
        for _ in 0..50 {
            if env.store.sum_cost_by_agent("a1").await.unwrap() > 0.0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(env.store.sum_cost_by_agent("a1").await.unwrap(), 2.5);

        handle
            .mailbox
            .send(Stimulus::Terminate { reason: "test done".to_string() })
            .await
            .unwrap();
        handle.done.notified().await;
        assert!(!env.registry.is_live("a1"));
    }
}
