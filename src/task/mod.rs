//! Task Manager and Restorer.
//!
//! A [`Task`] is the persistent row a user prompt arrives as; the
//! [`TaskManager`] creates, pauses, resumes, and deletes the agent tree
//! rooted at it. See [`manager`] for the four lifecycle verbs and
//! [`restorer::Restorer`] for parent-first tree reconstruction on resume.

pub mod manager;
pub mod restorer;

use serde::{Deserialize, Serialize};

/// A task's lifecycle status. Transitions: `pending → running`,
/// `running ↔ pausing → paused ↔ running`, `{running, pausing} →
/// {completed, failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Paused,
    Pausing,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Is `self → next` one of the allowed status transitions?
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Running, Pausing)
                | (Pausing, Paused)
                | (Paused, Running)
                | (Running, Running)
                | (Running, Completed)
                | (Running, Failed)
                | (Pausing, Completed)
                | (Pausing, Failed)
        )
    }
}

/// A task: the persistent row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub prompt: String,
    pub status: TaskStatus,
    pub result: Option<String>,
    pub error_message: Option<String>,
    /// `ℚ≥0 ∪ {∞}` — `None` means unlimited.
    pub budget_limit: Option<f64>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Task {
    pub fn new(id: impl Into<String>, prompt: impl Into<String>, budget_limit: Option<f64>) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: id.into(),
            prompt: prompt.into(),
            status: TaskStatus::Pending,
            result: None,
            error_message: None,
            budget_limit,
            created_at: now,
            updated_at: now,
        }
    }
}
