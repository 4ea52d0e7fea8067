//! A durable, append-only-file [`Store`], grounded directly on the
//! teacher's `thought_chain.rs`: one newline-delimited JSON file per
//! table under a base directory, loaded back into memory on
//! [`JsonlStore::open`] and appended to synchronously thereafter.
//!
//! `thought_chain.rs` hash-chains every entry because its purpose is
//! tamper-evidence for agent memory; this store only carries that
//! hash-chaining through for [`append_log`](Store::append_log), the one
//! table spec §6.2 frames as an audit trail. Tasks, agent state blobs,
//! and secrets are event-sourced the same way `ThoughtChain` replays
//! (`open` reads every line back in), but as plain snapshots: the latest
//! line for a given id wins.
//!
//! File writes are synchronous (`std::fs`, not `tokio::fs`), exactly as
//! `thought_chain.rs` does it — a single-process demo store has no need
//! for async I/O, and keeping the lock held across a read-modify-write
//! is simpler than threading cancellation through a blocking task.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use super::{CostRecord, Credential, LogEntry, SecretRecord, SecretUsage, Store};
use crate::agent::state::AgentState;
use crate::error::{CoreError, ErrorKind};
use crate::model::Message;
use crate::task::{Task, TaskStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConversationLine {
    agent_id: String,
    model_id: String,
    message: Message,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum SecretLine {
    Insert(SecretRecord),
    Delete { name: String },
}

/// A hash-chained log line, shaped like `thought_chain.rs`'s `Thought`
/// but narrowed to what `append_log` needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChainedLogLine {
    index: u64,
    entry: LogEntry,
    prev_hash: String,
    hash: String,
}

fn line_hash(index: u64, entry: &LogEntry, prev_hash: &str) -> String {
    let canonical = format!(
        "{}|{}|{:?}|{}|{}",
        index, entry.agent_id, entry.level, entry.message, prev_hash
    );
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

struct Inner {
    tasks: HashMap<String, Task>,
    agents: HashMap<String, AgentState>,
    conversations: HashMap<String, HashMap<String, Vec<Message>>>,
    costs: Vec<CostRecord>,
    logs: Vec<ChainedLogLine>,
    secrets: HashMap<String, SecretRecord>,
    secret_usage: Vec<SecretUsage>,
    credentials: HashMap<String, Credential>,
}

/// Durable, file-backed store rooted at one directory. Six `.jsonl`
/// files live under it: `tasks.jsonl`, `agents.jsonl`,
/// `conversations.jsonl`, `costs.jsonl`, `logs.jsonl`, `secrets.jsonl`.
/// Credentials and secret-usage audit records are provisioned/queried
/// in-memory only (spec §6.2 names no write path for either into
/// durable storage beyond `log_secret_usage`, which this store does
/// persist to `secret_usage.jsonl`).
pub struct JsonlStore {
    dir: PathBuf,
    inner: Mutex<Inner>,
}

fn read_lines<T: for<'de> Deserialize<'de>>(path: &PathBuf) -> io::Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);
    let mut out = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let value: T = serde_json::from_str(&line)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        out.push(value);
    }
    Ok(out)
}

fn append_line<T: Serialize>(path: &PathBuf, value: &T) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let line = serde_json::to_string(value)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
    writeln!(file, "{line}")?;
    file.flush()
}

impl JsonlStore {
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let mut tasks = HashMap::new();
        for task in read_lines::<Task>(&dir.join("tasks.jsonl"))? {
            tasks.insert(task.id.clone(), task);
        }

        let mut agents = HashMap::new();
        for agent in read_lines::<AgentState>(&dir.join("agents.jsonl"))? {
            agents.insert(agent.agent_id.clone(), agent);
        }

        let mut conversations: HashMap<String, HashMap<String, Vec<Message>>> = HashMap::new();
        for line in read_lines::<ConversationLine>(&dir.join("conversations.jsonl"))? {
            conversations
                .entry(line.agent_id)
                .or_default()
                .entry(line.model_id)
                .or_default()
                .push(line.message);
        }

        let costs = read_lines::<CostRecord>(&dir.join("costs.jsonl"))?;
        let logs = read_lines::<ChainedLogLine>(&dir.join("logs.jsonl"))?;

        let mut secrets = HashMap::new();
        for line in read_lines::<SecretLine>(&dir.join("secrets.jsonl"))? {
            match line {
                SecretLine::Insert(record) => {
                    secrets.insert(record.name.clone(), record);
                }
                SecretLine::Delete { name } => {
                    secrets.remove(&name);
                }
            }
        }

        let secret_usage = read_lines::<SecretUsage>(&dir.join("secret_usage.jsonl"))?;

        Ok(Self {
            dir,
            inner: Mutex::new(Inner {
                tasks,
                agents,
                conversations,
                costs,
                logs,
                secrets,
                secret_usage,
                credentials: HashMap::new(),
            }),
        })
    }

    pub fn seed_credential(&self, credential: Credential) {
        self.inner
            .lock()
            .unwrap()
            .credentials
            .insert(credential.model_id.clone(), credential);
    }

    fn io_err(e: io::Error) -> CoreError {
        CoreError::new(ErrorKind::ActionCrashed(e.to_string()))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, CoreError> {
        self.inner
            .lock()
            .map_err(|_| CoreError::new(ErrorKind::ActionCrashed("persistence lock poisoned".to_string())))
    }
}

#[async_trait]
impl Store for JsonlStore {
    async fn save_task(&self, task: Task) -> Result<(), CoreError> {
        append_line(&self.dir.join("tasks.jsonl"), &task).map_err(Self::io_err)?;
        self.lock()?.tasks.insert(task.id.clone(), task);
        Ok(())
    }

    async fn update_task_status(&self, id: &str, status: TaskStatus) -> Result<(), CoreError> {
        let updated = {
            let mut inner = self.lock()?;
            let task = inner.tasks.get_mut(id).ok_or_else(|| CoreError::new(ErrorKind::NotFound))?;
            task.status = status;
            task.updated_at = chrono::Utc::now();
            task.clone()
        };
        append_line(&self.dir.join("tasks.jsonl"), &updated).map_err(Self::io_err)
    }

    async fn update_task_budget(&self, id: &str, budget_limit: Option<f64>) -> Result<(), CoreError> {
        let updated = {
            let mut inner = self.lock()?;
            let task = inner.tasks.get_mut(id).ok_or_else(|| CoreError::new(ErrorKind::NotFound))?;
            task.budget_limit = budget_limit;
            task.updated_at = chrono::Utc::now();
            task.clone()
        };
        append_line(&self.dir.join("tasks.jsonl"), &updated).map_err(Self::io_err)
    }

    async fn get_task(&self, id: &str) -> Result<Option<Task>, CoreError> {
        Ok(self.lock()?.tasks.get(id).cloned())
    }

    async fn list_tasks(&self) -> Result<Vec<Task>, CoreError> {
        Ok(self.lock()?.tasks.values().cloned().collect())
    }

    async fn delete_task(&self, id: &str) -> Result<(), CoreError> {
        self.lock()?.tasks.remove(id);
        Ok(())
    }

    async fn upsert_agent_state(&self, agent_id: &str, blob: AgentState) -> Result<(), CoreError> {
        append_line(&self.dir.join("agents.jsonl"), &blob).map_err(Self::io_err)?;
        self.lock()?.agents.insert(agent_id.to_string(), blob);
        Ok(())
    }

    async fn load_agent(&self, agent_id: &str) -> Result<Option<AgentState>, CoreError> {
        Ok(self.lock()?.agents.get(agent_id).cloned())
    }

    async fn list_agents_for_task(&self, task_id: &str) -> Result<Vec<AgentState>, CoreError> {
        Ok(self
            .lock()?
            .agents
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
        for message in &entries {
            append_line(
                &self.dir.join("conversations.jsonl"),
                &ConversationLine {
                    agent_id: agent_id.to_string(),
                    model_id: model_id.to_string(),
                    message: message.clone(),
                },
            )
            .map_err(Self::io_err)?;
        }
        let mut inner = self.lock()?;
        inner
            .conversations
            .entry(agent_id.to_string())
            .or_default()
            .entry(model_id.to_string())
            .or_default()
            .extend(entries);
        Ok(())
    }

    async fn load_conversation(
        &self,
        agent_id: &str,
    ) -> Result<HashMap<String, Vec<Message>>, CoreError> {
        Ok(self.lock()?.conversations.get(agent_id).cloned().unwrap_or_default())
    }

    async fn append_cost(&self, record: CostRecord) -> Result<(), CoreError> {
        append_line(&self.dir.join("costs.jsonl"), &record).map_err(Self::io_err)?;
        self.lock()?.costs.push(record);
        Ok(())
    }

    async fn sum_cost_by_agent(&self, agent_id: &str) -> Result<f64, CoreError> {
        Ok(self
            .lock()?
            .costs
            .iter()
            .filter(|c| c.agent_id == agent_id)
            .map(|c| c.amount)
            .sum())
    }

    async fn sum_cost_by_task(&self, task_id: &str) -> Result<f64, CoreError> {
        Ok(self
            .lock()?
            .costs
            .iter()
            .filter(|c| c.task_id == task_id)
            .map(|c| c.amount)
            .sum())
    }

    async fn list_costs_by_task(&self, task_id: &str) -> Result<Vec<CostRecord>, CoreError> {
        Ok(self
            .lock()?
            .costs
            .iter()
            .filter(|c| c.task_id == task_id)
            .cloned()
            .collect())
    }

    async fn append_log(&self, entry: LogEntry) -> Result<(), CoreError> {
        let mut inner = self.lock()?;
        let index = inner.logs.len() as u64;
        let prev_hash = inner.logs.last().map(|l| l.hash.clone()).unwrap_or_default();
        let hash = line_hash(index, &entry, &prev_hash);
        let line = ChainedLogLine { index, entry, prev_hash, hash };
        append_line(&self.dir.join("logs.jsonl"), &line).map_err(Self::io_err)?;
        inner.logs.push(line);
        Ok(())
    }

    async fn insert_secret(&self, secret: SecretRecord) -> Result<(), CoreError> {
        append_line(&self.dir.join("secrets.jsonl"), &SecretLine::Insert(secret.clone())).map_err(Self::io_err)?;
        self.lock()?.secrets.insert(secret.name.clone(), secret);
        Ok(())
    }

    async fn get_secret(&self, name: &str) -> Result<Option<SecretRecord>, CoreError> {
        Ok(self.lock()?.secrets.get(name).cloned())
    }

    async fn delete_secret(&self, name: &str) -> Result<(), CoreError> {
        append_line(
            &self.dir.join("secrets.jsonl"),
            &SecretLine::Delete { name: name.to_string() },
        )
        .map_err(Self::io_err)?;
        self.lock()?.secrets.remove(name);
        Ok(())
    }

    async fn log_secret_usage(&self, usage: SecretUsage) -> Result<(), CoreError> {
        append_line(&self.dir.join("secret_usage.jsonl"), &usage).map_err(Self::io_err)?;
        self.lock()?.secret_usage.push(usage);
        Ok(())
    }

    async fn get_credential_by_model(&self, model_id: &str) -> Result<Option<Credential>, CoreError> {
        Ok(self.lock()?.credentials.get(model_id).cloned())
    }
}

/// Walks `logs.jsonl`'s chain and confirms no line has been altered,
/// mirroring `ThoughtChain::verify_integrity`.
pub fn verify_log_integrity(store: &JsonlStore) -> Result<bool, CoreError> {
    let inner = store.lock()?;
    let mut prev_hash = String::new();
    for line in &inner.logs {
        if line.prev_hash != prev_hash {
            return Ok(false);
        }
        let expected = line_hash(line.index, &line.entry, &line.prev_hash);
        if expected != line.hash {
            return Ok(false);
        }
        prev_hash = line.hash.clone();
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::LogLevel;

    #[tokio::test]
    async fn reopening_replays_tasks_and_costs() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = JsonlStore::open(dir.path()).unwrap();
            store.save_task(Task::new("t1", "investigate", Some(50.0))).await.unwrap();
            store
                .append_cost(CostRecord {
                    agent_id: "a1".to_string(),
                    task_id: "t1".to_string(),
                    cost_type: "model_call".to_string(),
                    amount: 2.5,
                    metadata: HashMap::new(),
                    at: chrono::Utc::now(),
                })
                .await
                .unwrap();
        }
        let reopened = JsonlStore::open(dir.path()).unwrap();
        assert_eq!(reopened.get_task("t1").await.unwrap().unwrap().prompt, "investigate");
        assert_eq!(reopened.sum_cost_by_task("t1").await.unwrap(), 2.5);
    }

    #[tokio::test]
    async fn log_chain_detects_tampering() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::open(dir.path()).unwrap();
        for i in 0..3 {
            store
                .append_log(LogEntry {
                    agent_id: "a1".to_string(),
                    level: LogLevel::Info,
                    message: format!("step {i}"),
                    metadata: HashMap::new(),
                    at: chrono::Utc::now(),
                })
                .await
                .unwrap();
        }
        assert!(verify_log_integrity(&store).unwrap());

        store.inner.lock().unwrap().logs[1].entry.message = "tampered".to_string();
        assert!(!verify_log_integrity(&store).unwrap());
    }
}
