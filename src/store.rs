// SQLite-backed task store with prioritized dequeue and attachment linkage

use crate::error::{Result, StoreError};
use crate::filter::TaskFilter;
use crate::models::{Attachment, NewTask, Task, TaskStats, TaskStatus, TaskUpdate};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

const SCHEMA: &str = r#"
CREATE TABLE tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    description TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    priority INTEGER NOT NULL DEFAULT 0,
    metadata TEXT NOT NULL DEFAULT '{}',
    project_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE task_attachments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id INTEGER NOT NULL,
    document_id TEXT NOT NULL,
    filename TEXT,
    description TEXT,
    attached_at TEXT NOT NULL,
    FOREIGN KEY (task_id) REFERENCES tasks (id) ON DELETE CASCADE
);

CREATE INDEX idx_task_attachments_task_id ON task_attachments (task_id);
CREATE INDEX idx_tasks_status_priority ON tasks (status, priority DESC, id);
"#;

const SELECT_TASK: &str =
    "SELECT id, title, description, status, priority, metadata, project_id, created_at, updated_at
     FROM tasks";

const SELECT_ATTACHMENT: &str =
    "SELECT id, task_id, document_id, filename, description, attached_at
     FROM task_attachments";

/// Sample tasks inserted on first initialization, as
/// (title, description, status, priority, metadata, created_at, updated_at).
/// All share the "monthly-reports" project.
const SEED_PROJECT: &str = "monthly-reports";
const SEED_TASKS: [(&str, &str, &str, i64, &str, &str, &str); 4] = [
    (
        "Create September 2024 Border Crossing Report",
        "Generate monthly border crossing report for September 2024 including traffic statistics, wait times, and incident summaries",
        "done",
        5,
        r#"{"month": "2024-09", "report_type": "border_crossing", "completed_by": "system"}"#,
        "2024-09-01T08:00:00Z",
        "2024-10-05T14:30:00Z",
    ),
    (
        "Create October 2024 Border Crossing Report",
        "Generate monthly border crossing report for October 2024 including traffic statistics, wait times, and incident summaries",
        "done",
        5,
        r#"{"month": "2024-10", "report_type": "border_crossing", "completed_by": "system"}"#,
        "2024-10-01T08:00:00Z",
        "2024-11-05T15:45:00Z",
    ),
    (
        "Create November 2024 Border Crossing Report",
        "Generate monthly border crossing report for November 2024 including traffic statistics, wait times, and incident summaries",
        "done",
        5,
        r#"{"month": "2024-11", "report_type": "border_crossing", "completed_by": "system"}"#,
        "2024-11-01T08:00:00Z",
        "2024-12-03T16:20:00Z",
    ),
    (
        "Create December 2024 Border Crossing Report",
        "Generate monthly border crossing report for December 2024 including traffic statistics, wait times, and incident summaries",
        "pending",
        10,
        r#"{"month": "2024-12", "report_type": "border_crossing", "due_date": "2025-01-05"}"#,
        "2024-12-01T08:00:00Z",
        "2024-12-01T08:00:00Z",
    ),
];

/// Durable task registry over a single SQLite database.
///
/// One instance owns one connection. Multiple instances (across threads
/// or processes) may share the same database file; every compound
/// mutation runs in its own transaction, so concurrent dequeues never
/// claim the same task twice.
pub struct TaskStore {
    db: Connection,
}

impl TaskStore {
    /// Open or create a store at the given database path.
    ///
    /// Parent directories are created as needed. On first creation the
    /// schema is initialized and the sample tasks are seeded in a
    /// single bootstrap transaction. The seed check is keyed on schema
    /// presence, not row count, so a store whose seed rows were deleted
    /// is never re-seeded.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let db = Connection::open(path)?;
        let store = Self::from_connection(db)?;
        debug!(path = %path.display(), "opened task store");
        Ok(store)
    }

    /// Open a fresh in-memory store. Goes through the same
    /// initialization path as [`TaskStore::open`], so it is seeded too.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(db: Connection) -> Result<Self> {
        db.busy_timeout(BUSY_TIMEOUT)?;
        db.pragma_update(None, "journal_mode", "WAL")?;
        db.pragma_update(None, "foreign_keys", "ON")?;

        let mut store = Self { db };
        store.init_schema()?;
        Ok(store)
    }

    /// Create the schema and seed the sample tasks, once per store
    /// lifetime. A no-op whenever the tasks table already exists.
    fn init_schema(&mut self) -> Result<()> {
        let initialized: bool = self
            .db
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'tasks'",
                [],
                |_| Ok(()),
            )
            .optional()?
            .is_some();

        if initialized {
            debug!("schema already present, skipping bootstrap");
            return Ok(());
        }

        let tx = self.db.transaction()?;
        tx.execute_batch(SCHEMA)?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO tasks (title, description, status, priority, metadata, project_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for (title, description, status, priority, metadata, created_at, updated_at) in
                SEED_TASKS
            {
                stmt.execute(rusqlite::params![
                    title,
                    description,
                    status,
                    priority,
                    metadata,
                    SEED_PROJECT,
                    created_at,
                    updated_at,
                ])?;
            }
        }

        tx.commit()?;
        info!(count = SEED_TASKS.len(), "created schema and seeded sample tasks");
        Ok(())
    }

    // ========================================================================
    // Task operations
    // ========================================================================

    /// Create a task in `pending` status and return its id.
    ///
    /// Ids are assigned by SQLite's AUTOINCREMENT and are never reused,
    /// even after deletes.
    pub fn create_task(&mut self, new: NewTask) -> Result<i64> {
        if new.title.trim().is_empty() {
            return Err(StoreError::Validation("title must not be empty".to_string()));
        }

        let now = fmt_timestamp(Utc::now());
        self.db.execute(
            "INSERT INTO tasks (title, description, status, priority, metadata, project_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                new.title,
                new.description,
                TaskStatus::Pending.as_str(),
                new.priority,
                new.metadata.to_string(),
                new.project_id,
                now,
                now,
            ],
        )?;

        let task_id = self.db.last_insert_rowid();
        info!(task_id, title = %new.title, "created task");
        Ok(task_id)
    }

    /// Get a single task by id.
    pub fn get_task(&self, task_id: i64) -> Result<Task> {
        fetch_task(&self.db, task_id)?.ok_or(StoreError::TaskNotFound(task_id))
    }

    /// List tasks matching the filter, fully materialized.
    ///
    /// Filters are conjunctive; ordering is `priority DESC, id ASC`
    /// when `order_by_priority` is set, plain `id ASC` otherwise, so
    /// repeated calls over unchanged data return identical sequences.
    pub fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let mut sql = format!("{} WHERE 1=1", SELECT_TASK);
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            sql.push_str(" AND status = ?");
            params.push(Box::new(status.as_str()));
        }
        if let Some(project_id) = &filter.project_id {
            sql.push_str(" AND project_id = ?");
            params.push(Box::new(project_id.clone()));
        }

        if filter.order_by_priority {
            sql.push_str(" ORDER BY priority DESC, id ASC");
        } else {
            sql.push_str(" ORDER BY id ASC");
        }

        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            params.push(Box::new(limit));
        }

        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.db.prepare(&sql)?;
        let rows = stmt.query_map(params_refs.as_slice(), task_from_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Update any subset of task fields; unset fields are untouched.
    ///
    /// `metadata`, if supplied, replaces the stored value wholesale.
    /// `updated_at` is refreshed on every successful call, including an
    /// empty field set. Returns the updated task.
    pub fn update_task(&mut self, task_id: i64, update: TaskUpdate) -> Result<Task> {
        if let Some(title) = &update.title {
            if title.trim().is_empty() {
                return Err(StoreError::Validation("title must not be empty".to_string()));
            }
        }

        let mut assignments: Vec<&str> = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(title) = update.title {
            assignments.push("title = ?");
            params.push(Box::new(title));
        }
        if let Some(description) = update.description {
            assignments.push("description = ?");
            params.push(Box::new(description));
        }
        if let Some(status) = update.status {
            assignments.push("status = ?");
            params.push(Box::new(status.as_str()));
        }
        if let Some(priority) = update.priority {
            assignments.push("priority = ?");
            params.push(Box::new(priority));
        }
        if let Some(metadata) = update.metadata {
            assignments.push("metadata = ?");
            params.push(Box::new(metadata.to_string()));
        }
        if let Some(project_id) = update.project_id {
            assignments.push("project_id = ?");
            params.push(Box::new(project_id));
        }

        assignments.push("updated_at = ?");
        params.push(Box::new(fmt_timestamp(Utc::now())));
        params.push(Box::new(task_id));

        let sql = format!("UPDATE tasks SET {} WHERE id = ?", assignments.join(", "));
        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let tx = self.db.transaction()?;
        let changed = tx.execute(&sql, params_refs.as_slice())?;
        if changed == 0 {
            return Err(StoreError::TaskNotFound(task_id));
        }
        let task = fetch_task(&tx, task_id)?.ok_or(StoreError::TaskNotFound(task_id))?;
        tx.commit()?;

        info!(task_id, "updated task");
        Ok(task)
    }

    /// Delete a task and all of its attachments.
    ///
    /// The cascade is SQLite's native ON DELETE CASCADE (foreign keys
    /// are enabled on open), so the whole removal is one statement.
    pub fn delete_task(&mut self, task_id: i64) -> Result<()> {
        let changed = self
            .db
            .execute("DELETE FROM tasks WHERE id = ?1", [task_id])?;
        if changed == 0 {
            return Err(StoreError::TaskNotFound(task_id));
        }
        info!(task_id, "deleted task and its attachments");
        Ok(())
    }

    /// Atomically claim the highest-priority pending task.
    ///
    /// The selection and the `pending` → `in_progress` transition run
    /// in one immediate transaction, so no two callers can claim the
    /// same task. Returns `None` when nothing is pending; that is an
    /// expected outcome, not an error.
    pub fn pop_next_task(&mut self, project_id: Option<&str>) -> Result<Option<Task>> {
        let tx = self
            .db
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let candidate: Option<i64> = match project_id {
            Some(project) => tx
                .query_row(
                    "SELECT id FROM tasks
                     WHERE status = 'pending' AND project_id = ?1
                     ORDER BY priority DESC, id ASC LIMIT 1",
                    [project],
                    |row| row.get(0),
                )
                .optional()?,
            None => tx
                .query_row(
                    "SELECT id FROM tasks
                     WHERE status = 'pending'
                     ORDER BY priority DESC, id ASC LIMIT 1",
                    [],
                    |row| row.get(0),
                )
                .optional()?,
        };

        let Some(task_id) = candidate else {
            return Ok(None);
        };

        tx.execute(
            "UPDATE tasks SET status = 'in_progress', updated_at = ?1 WHERE id = ?2",
            rusqlite::params![fmt_timestamp(Utc::now()), task_id],
        )?;
        let task = fetch_task(&tx, task_id)?.ok_or(StoreError::TaskNotFound(task_id))?;
        tx.commit()?;

        info!(task_id, "popped task and marked in_progress");
        Ok(Some(task))
    }

    /// Task counts by status, from a single consistent snapshot.
    pub fn get_stats(&self) -> Result<TaskStats> {
        let stats = self.db.query_row(
            "SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'in_progress' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'done' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'cancelled' THEN 1 ELSE 0 END), 0)
             FROM tasks",
            [],
            |row| {
                Ok(TaskStats {
                    total: row.get(0)?,
                    pending: row.get(1)?,
                    in_progress: row.get(2)?,
                    done: row.get(3)?,
                    cancelled: row.get(4)?,
                })
            },
        )?;
        Ok(stats)
    }

    // ========================================================================
    // Attachment operations
    // ========================================================================

    /// Link an externally-stored document to a task.
    ///
    /// The existence check and the insert share a transaction, so a
    /// concurrent task delete cannot leave an orphaned attachment.
    /// `document_id` is opaque and never resolved here.
    pub fn attach_document(
        &mut self,
        task_id: i64,
        document_id: &str,
        filename: Option<&str>,
        description: Option<&str>,
    ) -> Result<i64> {
        let tx = self.db.transaction()?;
        if !task_exists(&tx, task_id)? {
            return Err(StoreError::TaskNotFound(task_id));
        }

        tx.execute(
            "INSERT INTO task_attachments (task_id, document_id, filename, description, attached_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                task_id,
                document_id,
                filename,
                description,
                fmt_timestamp(Utc::now()),
            ],
        )?;
        let attachment_id = tx.last_insert_rowid();
        tx.commit()?;

        info!(attachment_id, task_id, document_id, "attached document");
        Ok(attachment_id)
    }

    /// List a task's attachments in attach order (`attached_at ASC`,
    /// id as the tie-break). Fails with not-found for an unknown task,
    /// matching [`TaskStore::get_task`]; a task with no attachments
    /// yields an empty list.
    pub fn list_attachments(&self, task_id: i64) -> Result<Vec<Attachment>> {
        let mut stmt = self.db.prepare(&format!(
            "{} WHERE task_id = ?1 ORDER BY attached_at ASC, id ASC",
            SELECT_ATTACHMENT
        ))?;
        let rows = stmt.query_map([task_id], attachment_from_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }

        if results.is_empty() && !task_exists(&self.db, task_id)? {
            return Err(StoreError::TaskNotFound(task_id));
        }
        Ok(results)
    }

    /// Get a single attachment by id.
    pub fn get_attachment(&self, attachment_id: i64) -> Result<Attachment> {
        let mut stmt = self
            .db
            .prepare(&format!("{} WHERE id = ?1", SELECT_ATTACHMENT))?;
        stmt.query_row([attachment_id], attachment_from_row)
            .optional()?
            .ok_or(StoreError::AttachmentNotFound(attachment_id))
    }

    /// Remove a single attachment. The owning task is untouched.
    pub fn remove_attachment(&mut self, attachment_id: i64) -> Result<()> {
        let changed = self.db.execute(
            "DELETE FROM task_attachments WHERE id = ?1",
            [attachment_id],
        )?;
        if changed == 0 {
            return Err(StoreError::AttachmentNotFound(attachment_id));
        }
        info!(attachment_id, "removed attachment");
        Ok(())
    }
}

// ============================================================================
// Row mapping helpers
// ============================================================================

fn fetch_task(conn: &Connection, task_id: i64) -> Result<Option<Task>> {
    let mut stmt = conn.prepare(&format!("{} WHERE id = ?1", SELECT_TASK))?;
    Ok(stmt.query_row([task_id], task_from_row).optional()?)
}

fn task_exists(conn: &Connection, task_id: i64) -> Result<bool> {
    let row = conn
        .query_row("SELECT 1 FROM tasks WHERE id = ?1", [task_id], |_| Ok(()))
        .optional()?;
    Ok(row.is_some())
}

fn task_from_row(row: &Row) -> rusqlite::Result<Task> {
    let status_raw: String = row.get(3)?;
    let metadata_raw: String = row.get(5)?;
    let created_raw: String = row.get(7)?;
    let updated_raw: String = row.get(8)?;

    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        status: status_raw
            .parse()
            .map_err(|e| conversion_failure(3, e))?,
        priority: row.get(4)?,
        metadata: serde_json::from_str(&metadata_raw).map_err(|e| conversion_failure(5, e))?,
        project_id: row.get(6)?,
        created_at: parse_timestamp(7, &created_raw)?,
        updated_at: parse_timestamp(8, &updated_raw)?,
    })
}

fn attachment_from_row(row: &Row) -> rusqlite::Result<Attachment> {
    let attached_raw: String = row.get(5)?;

    Ok(Attachment {
        id: row.get(0)?,
        task_id: row.get(1)?,
        document_id: row.get(2)?,
        filename: row.get(3)?,
        description: row.get(4)?,
        attached_at: parse_timestamp(5, &attached_raw)?,
    })
}

/// Timestamps persist as RFC 3339 UTC text with microsecond precision.
fn fmt_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_failure(idx, e))
}

fn conversion_failure<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}
