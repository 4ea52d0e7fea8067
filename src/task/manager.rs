//! [`TaskManager`]: create, pause, resume, and delete the agent tree
//! rooted at a [`super::Task`].
//!
//! `create` is a single entry point that allocates a run, spawns its root
//! worker, and hands back a live handle, generalized here to a full
//! four-verb lifecycle; `resume` defers to [`super::restorer::Restorer`]'s
//! parent-first replay.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::info;

use crate::agent::core::{Agent, AgentHandle};
use crate::agent::state::AgentState;
use crate::agent::stimulus::Stimulus;
use crate::budget::schema::BudgetData;
use crate::config::Environment;
use crate::error::{CoreError, ErrorKind};
use crate::task::restorer::Restorer;
use crate::task::{Task, TaskStatus};

/// Parameters for a new root agent, separate from [`Task`] itself since a
/// task row carries no model/capability/profile selection of its own.
#[derive(Debug, Clone)]
pub struct RootAgentSpec {
    pub models: Vec<String>,
    pub capability_groups: HashSet<String>,
    pub profile: String,
}

pub struct TaskManager {
    env: Arc<Environment>,
}

impl TaskManager {
    /// Constructing a `TaskManager` is the one place a caller actually
    /// stands up the runtime, so this is where the startup "compile pass"
    /// over the static action schema registry (spec §9) runs — panicking
    /// here surfaces an internally inconsistent schema at boot rather than
    /// at the first unlucky dispatch call.
    pub fn new(env: Arc<Environment>) -> Self {
        crate::consensus::schema::validate_registry()
            .expect("static action schema registry must be internally consistent");
        Self { env }
    }

    /// Create (spec §4.5): allocate a task row, create the root agent
    /// with `mode = root` (or `na` if `budget_limit` is absent), register
    /// it, emit lifecycle, then send it the task prompt as its first
    /// stimulus. Idempotent on input validation failure: nothing is
    /// written to the store if `prompt` or `root.models` is empty.
    pub async fn create(
        &self,
        prompt: impl Into<String>,
        budget_limit: Option<f64>,
        root: RootAgentSpec,
    ) -> Result<(Task, AgentHandle), CoreError> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(CoreError::new(ErrorKind::InvalidParam("prompt".to_string()))
                .with_context("prompt must not be empty"));
        }
        if root.models.is_empty() {
            return Err(CoreError::new(ErrorKind::InvalidParam("models".to_string()))
                .with_context("at least one model is required"));
        }

        let task_id = format!("task-{}", uuid::Uuid::new_v4());
        let agent_id = format!("agent-{}", uuid::Uuid::new_v4());

        let budget_data = match budget_limit {
            Some(limit) => BudgetData::new_root(limit),
            None => BudgetData::new_na(),
        };

        let mut task = Task::new(task_id.clone(), prompt.clone(), budget_limit);
        self.env.store.save_task(task.clone()).await?;

        let root_state = AgentState::new_root(
            agent_id.clone(),
            task_id.clone(),
            root.models,
            root.capability_groups,
            root.profile,
            budget_data,
        );
        let handle = Agent::spawn(root_state, self.env.clone()).await?;
        handle
            .mailbox
            .send(Stimulus::UserMessage { content: prompt })
            .await
            .map_err(|_| CoreError::new(ErrorKind::ActionCrashed("root agent mailbox closed immediately".to_string())))?;

        self.env.store.update_task_status(&task_id, TaskStatus::Running).await?;
        task.status = TaskStatus::Running;

        Ok((task, handle))
    }

    /// Pause (spec §4.5): `running → pausing`, recursively terminate
    /// every live agent in the task's subtree, wait for them all to
    /// actually exit, then flip to `paused`. Idempotent: pausing a task
    /// that is not `running` is a no-op.
    pub async fn pause(&self, task_id: &str) -> Result<(), CoreError> {
        let task = self
            .env
            .store
            .get_task(task_id)
            .await?
            .ok_or_else(|| CoreError::new(ErrorKind::NotFound).with_context(format!("no task {task_id}")))?;

        if task.status != TaskStatus::Running {
            return Ok(());
        }

        self.env.store.update_task_status(task_id, TaskStatus::Pausing).await?;

        let live = self.env.registry.list_for_task(task_id);
        // Collect every `done` notifier before sending a single stop
        // stimulus, so a fast-exiting agent can never fire its
        // notification before we start waiting on it.
        let dones: Vec<_> = live
            .iter()
            .filter_map(|id| self.env.registry.done_signal(id))
            .collect();

        for agent_id in &live {
            if let Some(mailbox) = self.env.registry.mailbox(agent_id) {
                let _ = mailbox.send(Stimulus::Pause).await;
            }
        }

        for done in dones {
            done.notified().await;
        }

        self.env.store.update_task_status(task_id, TaskStatus::Paused).await?;
        info!(%task_id, agents = live.len(), "task paused");
        Ok(())
    }

    /// Resume (spec §4.5): load the agent tree in parent-first order from
    /// persistence and spawn each with its persisted state, then flip
    /// `status` back to `running`. Only meaningful for `paused` or
    /// `failed` tasks.
    pub async fn resume(&self, task_id: &str) -> Result<Vec<AgentHandle>, CoreError> {
        let task = self
            .env
            .store
            .get_task(task_id)
            .await?
            .ok_or_else(|| CoreError::new(ErrorKind::NotFound).with_context(format!("no task {task_id}")))?;

        if !matches!(task.status, TaskStatus::Paused | TaskStatus::Failed) {
            return Err(CoreError::new(ErrorKind::InvalidParam("status".to_string()))
                .with_context(format!("cannot resume a task in status {:?}", task.status)));
        }

        let handles = Restorer::restore(&self.env, task_id).await?;
        self.env.store.update_task_status(task_id, TaskStatus::Running).await?;
        info!(%task_id, agents = handles.len(), "task resumed");
        Ok(handles)
    }

    /// Delete (spec §4.5): pause first if the task is still running, then
    /// remove every persisted trace of it.
    pub async fn delete(&self, task_id: &str) -> Result<(), CoreError> {
        let task = self
            .env
            .store
            .get_task(task_id)
            .await?
            .ok_or_else(|| CoreError::new(ErrorKind::NotFound).with_context(format!("no task {task_id}")))?;

        if matches!(task.status, TaskStatus::Running | TaskStatus::Pausing) {
            self.pause(task_id).await?;
        }

        self.env.store.delete_task(task_id).await?;
        info!(%task_id, "task deleted");
        Ok(())
    }
}
