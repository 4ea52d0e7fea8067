//! The durability contract (spec §6.2) and its implementations.
//!
//! The core only requires the narrow interface spec §6.2 lists — no SQL
//! schema, ORM, or generic repository layer (those are explicitly out of
//! scope, spec §1). [`Store`] is that interface as an `async_trait`.
//! [`memory_store::MemoryStore`] is the in-process reference
//! implementation used by every unit test in this crate;
//! [`jsonl_store::JsonlStore`] is a durable, append-only-file
//! implementation grounded on the teacher's `thought_chain.rs` (hash-
//! chained `.jsonl` logs) good enough to demonstrate real pause/resume
//! durability without a database dependency.
//!
//! "All writes that span two rows conceptually … must be atomic on
//! durable storage" (spec §6.2) — both implementations satisfy this by
//! holding a single lock across each such compound write rather than by
//! modeling real multi-row transactions, which is sufficient for the
//! single-process concurrency model spec §5 describes.

pub mod jsonl_store;
pub mod memory_store;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::agent::state::AgentState;
use crate::error::CoreError;
use crate::task::{Task, TaskStatus};

/// Spec §3 "Cost record": append-only, `{agent_id, task_id, cost_type,
/// amount, metadata, at}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostRecord {
    pub agent_id: String,
    pub task_id: String,
    pub cost_type: String,
    pub amount: f64,
    pub metadata: HashMap<String, serde_json::Value>,
    pub at: chrono::DateTime<chrono::Utc>,
}

/// One `append_log` entry (spec §6.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub agent_id: String,
    pub level: crate::event::LogLevel,
    pub message: String,
    pub metadata: HashMap<String, serde_json::Value>,
    pub at: chrono::DateTime<chrono::Utc>,
}

/// A stored secret (spec §6.4 credential interfaces — encryption at rest is
/// out of scope, spec §1; this crate stores the plaintext value behind the
/// same interface a real deployment would put an encrypting adapter
/// behind).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretRecord {
    pub name: String,
    pub value: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// One `log_secret_usage` audit entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretUsage {
    pub secret_name: String,
    pub agent_id: String,
    pub action_id: String,
    pub at: chrono::DateTime<chrono::Utc>,
}

/// A model credential, looked up by model id (spec §6.2
/// `get_credential_by_model`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub model_id: String,
    pub api_key: String,
}

/// The narrow persistence interface spec §6.2 names. Implementations must
/// be `Send + Sync` — agents and the task manager hold a shared `Arc<dyn
/// Store>` (spec §5 "No process-global state": persistence is injected,
/// never looked up by a global name).
#[async_trait]
pub trait Store: Send + Sync {
    // ---- Task ----
    async fn save_task(&self, task: Task) -> Result<(), CoreError>;
    async fn update_task_status(&self, id: &str, status: TaskStatus) -> Result<(), CoreError>;
    async fn update_task_budget(&self, id: &str, budget_limit: Option<f64>) -> Result<(), CoreError>;
    async fn get_task(&self, id: &str) -> Result<Option<Task>, CoreError>;
    async fn list_tasks(&self) -> Result<Vec<Task>, CoreError>;
    async fn delete_task(&self, id: &str) -> Result<(), CoreError>;

    // ---- Agent ----
    async fn upsert_agent_state(&self, agent_id: &str, blob: AgentState) -> Result<(), CoreError>;
    async fn load_agent(&self, agent_id: &str) -> Result<Option<AgentState>, CoreError>;
    async fn list_agents_for_task(&self, task_id: &str) -> Result<Vec<AgentState>, CoreError>;

    // ---- Conversation ----
    async fn append_conversation(
        &self,
        agent_id: &str,
        model_id: &str,
        entries: Vec<crate::model::Message>,
    ) -> Result<(), CoreError>;
    async fn load_conversation(
        &self,
        agent_id: &str,
    ) -> Result<HashMap<String, Vec<crate::model::Message>>, CoreError>;

    // ---- Cost ----
    async fn append_cost(&self, record: CostRecord) -> Result<(), CoreError>;
    async fn sum_cost_by_agent(&self, agent_id: &str) -> Result<f64, CoreError>;
    async fn sum_cost_by_task(&self, task_id: &str) -> Result<f64, CoreError>;
    async fn list_costs_by_task(&self, task_id: &str) -> Result<Vec<CostRecord>, CoreError>;

    // ---- Log ----
    async fn append_log(&self, entry: LogEntry) -> Result<(), CoreError>;

    // ---- Secrets ----
    async fn insert_secret(&self, secret: SecretRecord) -> Result<(), CoreError>;
    async fn get_secret(&self, name: &str) -> Result<Option<SecretRecord>, CoreError>;
    async fn delete_secret(&self, name: &str) -> Result<(), CoreError>;
    async fn log_secret_usage(&self, usage: SecretUsage) -> Result<(), CoreError>;
    async fn get_credential_by_model(&self, model_id: &str) -> Result<Option<Credential>, CoreError>;
}
