// Data models for the task registry

use crate::error::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A unit of work tracked by the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    /// Higher values dequeue first.
    pub priority: i64,
    /// Opaque caller-owned document; stored and returned verbatim,
    /// never interpreted by the store.
    pub metadata: serde_json::Value,
    /// Free-text grouping label, used only as a filter key.
    pub project_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Task lifecycle states. `pending` tasks are eligible for dequeue;
/// `done` and `cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Done,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for TaskStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" => Ok(TaskStatus::InProgress),
            "done" => Ok(TaskStatus::Done),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(StoreError::Validation(format!(
                "invalid status '{}' (expected pending, in_progress, done or cancelled)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input for [`crate::TaskStore::create_task`].
#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub priority: i64,
    pub metadata: serde_json::Value,
    pub project_id: Option<String>,
}

impl NewTask {
    /// New task with default priority 0 and empty metadata.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            priority: 0,
            metadata: serde_json::json!({}),
            project_id: None,
        }
    }
}

/// Field subset for [`crate::TaskStore::update_task`]. `None` fields are
/// left untouched; `metadata`, if set, replaces the stored value
/// wholesale (no merge).
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<i64>,
    pub metadata: Option<serde_json::Value>,
    pub project_id: Option<String>,
}

/// A link from a task to an externally-stored document. Immutable after
/// creation; removed either explicitly or with its owning task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub id: i64,
    pub task_id: i64,
    /// Identifier meaningful only to the external document store;
    /// never resolved or validated here.
    pub document_id: String,
    pub filename: Option<String>,
    pub description: Option<String>,
    pub attached_at: DateTime<Utc>,
}

/// Task counts by status. `total` always equals the sum of the four
/// status counts, computed from a single snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStats {
    pub total: i64,
    pub pending: i64,
    pub in_progress: i64,
    pub done: i64,
    pub cancelled: i64,
}
