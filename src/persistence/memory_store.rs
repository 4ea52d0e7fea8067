//! An in-process [`Store`] backed by `Mutex`-guarded maps.
//!
//! Every unit and integration test in this crate that needs a `Store`
//! reaches for this one — it makes no durability claim beyond the
//! process's own lifetime, which is exactly right for a fast test double.
//! The locking granularity mirrors the teacher's `ThoughtChain`'s own
//! `Mutex<Vec<Thought>>` journal: one lock per logical table, held only
//! for the duration of the read or write.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use super::{CostRecord, Credential, LogEntry, SecretRecord, SecretUsage, Store};
use crate::agent::state::AgentState;
use crate::error::CoreError;
use crate::model::Message;
use crate::task::{Task, TaskStatus};

#[derive(Default)]
pub struct MemoryStore {
    tasks: Mutex<HashMap<String, Task>>,
    agents: Mutex<HashMap<String, AgentState>>,
    conversations: Mutex<HashMap<String, HashMap<String, Vec<Message>>>>,
    costs: Mutex<Vec<CostRecord>>,
    logs: Mutex<Vec<LogEntry>>,
    secrets: Mutex<HashMap<String, SecretRecord>>,
    secret_usage: Mutex<Vec<SecretUsage>>,
    credentials: Mutex<HashMap<String, Credential>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/demo convenience: seed a credential lookup without going
    /// through a dedicated `insert_credential` (spec §6.2 names no such
    /// write method — credentials are assumed provisioned out of band).
    pub fn seed_credential(&self, credential: Credential) {
        self.credentials
            .lock()
            .unwrap()
            .insert(credential.model_id.clone(), credential);
    }

    fn lock_poisoned() -> CoreError {
        CoreError::new(crate::error::ErrorKind::ActionCrashed(
            "persistence lock poisoned".to_string(),
        ))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn save_task(&self, task: Task) -> Result<(), CoreError> {
        let mut tasks = self.tasks.lock().map_err(|_| Self::lock_poisoned())?;
        tasks.insert(task.id.clone(), task);
        Ok(())
    }

    async fn update_task_status(&self, id: &str, status: TaskStatus) -> Result<(), CoreError> {
        let mut tasks = self.tasks.lock().map_err(|_| Self::lock_poisoned())?;
        match tasks.get_mut(id) {
            Some(task) => {
                task.status = status;
                task.updated_at = chrono::Utc::now();
                Ok(())
            }
            None => Err(CoreError::new(crate::error::ErrorKind::NotFound)),
        }
    }

    async fn update_task_budget(&self, id: &str, budget_limit: Option<f64>) -> Result<(), CoreError> {
        let mut tasks = self.tasks.lock().map_err(|_| Self::lock_poisoned())?;
        match tasks.get_mut(id) {
            Some(task) => {
                task.budget_limit = budget_limit;
                task.updated_at = chrono::Utc::now();
                Ok(())
            }
            None => Err(CoreError::new(crate::error::ErrorKind::NotFound)),
        }
    }

    async fn get_task(&self, id: &str) -> Result<Option<Task>, CoreError> {
        let tasks = self.tasks.lock().map_err(|_| Self::lock_poisoned())?;
        Ok(tasks.get(id).cloned())
    }

    async fn list_tasks(&self) -> Result<Vec<Task>, CoreError> {
        let tasks = self.tasks.lock().map_err(|_| Self::lock_poisoned())?;
        Ok(tasks.values().cloned().collect())
    }

    async fn delete_task(&self, id: &str) -> Result<(), CoreError> {
        let mut tasks = self.tasks.lock().map_err(|_| Self::lock_poisoned())?;
        tasks.remove(id);
        Ok(())
    }

    async fn upsert_agent_state(&self, agent_id: &str, blob: AgentState) -> Result<(), CoreError> {
        let mut agents = self.agents.lock().map_err(|_| Self::lock_poisoned())?;
        agents.insert(agent_id.to_string(), blob);
        Ok(())
    }

    async fn load_agent(&self, agent_id: &str) -> Result<Option<AgentState>, CoreError> {
        let agents = self.agents.lock().map_err(|_| Self::lock_poisoned())?;
        Ok(agents.get(agent_id).cloned())
    }

    async fn list_agents_for_task(&self, task_id: &str) -> Result<Vec<AgentState>, CoreError> {
        let agents = self.agents.lock().map_err(|_| Self::lock_poisoned())?;
        Ok(agents
            .values()
            .filter(|a| a.task_id == task_id)
            .cloned()
            .collect())
    }

    async fn append_conversation(
        &self,
        agent_id: &str,
        model_id: &str,
        entries: Vec<Message>,
    ) -> Result<(), CoreError> {
        let mut conversations = self.conversations.lock().map_err(|_| Self::lock_poisoned())?;
        let per_agent = conversations.entry(agent_id.to_string()).or_default();
        per_agent.entry(model_id.to_string()).or_default().extend(entries);
        Ok(())
    }

    async fn load_conversation(
        &self,
        agent_id: &str,
    ) -> Result<HashMap<String, Vec<Message>>, CoreError> {
        let conversations = self.conversations.lock().map_err(|_| Self::lock_poisoned())?;
        Ok(conversations.get(agent_id).cloned().unwrap_or_default())
    }

    async fn append_cost(&self, record: CostRecord) -> Result<(), CoreError> {
        let mut costs = self.costs.lock().map_err(|_| Self::lock_poisoned())?;
        costs.push(record);
        Ok(())
    }

    async fn sum_cost_by_agent(&self, agent_id: &str) -> Result<f64, CoreError> {
        let costs = self.costs.lock().map_err(|_| Self::lock_poisoned())?;
        Ok(costs
            .iter()
            .filter(|c| c.agent_id == agent_id)
            .map(|c| c.amount)
            .sum())
    }

    async fn sum_cost_by_task(&self, task_id: &str) -> Result<f64, CoreError> {
        let costs = self.costs.lock().map_err(|_| Self::lock_poisoned())?;
        Ok(costs
            .iter()
            .filter(|c| c.task_id == task_id)
            .map(|c| c.amount)
            .sum())
    }

    async fn list_costs_by_task(&self, task_id: &str) -> Result<Vec<CostRecord>, CoreError> {
        let costs = self.costs.lock().map_err(|_| Self::lock_poisoned())?;
        Ok(costs
            .iter()
            .filter(|c| c.task_id == task_id)
            .cloned()
            .collect())
    }

    async fn append_log(&self, entry: LogEntry) -> Result<(), CoreError> {
        let mut logs = self.logs.lock().map_err(|_| Self::lock_poisoned())?;
        logs.push(entry);
        Ok(())
    }

    async fn insert_secret(&self, secret: SecretRecord) -> Result<(), CoreError> {
        let mut secrets = self.secrets.lock().map_err(|_| Self::lock_poisoned())?;
        secrets.insert(secret.name.clone(), secret);
        Ok(())
    }

    async fn get_secret(&self, name: &str) -> Result<Option<SecretRecord>, CoreError> {
        let secrets = self.secrets.lock().map_err(|_| Self::lock_poisoned())?;
        Ok(secrets.get(name).cloned())
    }

    async fn delete_secret(&self, name: &str) -> Result<(), CoreError> {
        let mut secrets = self.secrets.lock().map_err(|_| Self::lock_poisoned())?;
        secrets.remove(name);
        Ok(())
    }

    async fn log_secret_usage(&self, usage: SecretUsage) -> Result<(), CoreError> {
        let mut usages = self.secret_usage.lock().map_err(|_| Self::lock_poisoned())?;
        usages.push(usage);
        Ok(())
    }

    async fn get_credential_by_model(&self, model_id: &str) -> Result<Option<Credential>, CoreError> {
        let credentials = self.credentials.lock().map_err(|_| Self::lock_poisoned())?;
        Ok(credentials.get(model_id).cloned())
    }
}
