use clap::{Parser, Subcommand};
use eyre::Result;
use std::path::PathBuf;
use taskreg::{NewTask, StoreError, TaskFilter, TaskStatus, TaskStore, TaskUpdate};

#[derive(Parser)]
#[command(name = "taskreg")]
#[command(about = "Task registry CLI - prioritized queue with document attachments")]
#[command(version)]
struct Cli {
    /// Path to the SQLite database (default: <data dir>/taskreg/tasks.db)
    #[arg(short, long, env = "TASKREG_DB")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new task (status starts as pending)
    Create {
        title: String,
        #[arg(long)]
        description: Option<String>,
        /// Higher values dequeue first
        #[arg(long, default_value_t = 0)]
        priority: i64,
        /// Arbitrary JSON stored verbatim with the task
        #[arg(long)]
        metadata: Option<String>,
        #[arg(long)]
        project: Option<String>,
    },

    /// Show a single task
    Get { task_id: i64 },

    /// List tasks, highest priority first
    List {
        /// Filter by status (pending, in_progress, done, cancelled)
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        project: Option<String>,
        /// Order by id instead of priority
        #[arg(long)]
        by_id: bool,
        #[arg(long)]
        limit: Option<u32>,
    },

    /// Update fields of a task; omitted fields are left untouched
    Update {
        task_id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        priority: Option<i64>,
        /// Replaces the stored metadata wholesale
        #[arg(long)]
        metadata: Option<String>,
        #[arg(long)]
        project: Option<String>,
    },

    /// Delete a task and all of its attachments
    Delete { task_id: i64 },

    /// Claim the next pending task and mark it in_progress
    Pop {
        #[arg(long)]
        project: Option<String>,
    },

    /// Task counts by status
    Stats,

    /// Attach an externally-stored document to a task
    Attach {
        task_id: i64,
        document_id: String,
        #[arg(long)]
        filename: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },

    /// List a task's attachments in attach order
    Attachments { task_id: i64 },

    /// Show a single attachment
    GetAttachment { attachment_id: i64 },

    /// Remove a single attachment (the task is untouched)
    Detach { attachment_id: i64 },
}

fn main() {
    // Setup tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(err) = run(cli) {
        eprintln!("error: {err:#}");
        std::process::exit(exit_code(&err));
    }
}

/// Distinct exit codes per error class, so callers can tell "retry is
/// pointless" (validation: 2, not found: 3) from "retry may help"
/// (storage: 1).
fn exit_code(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<StoreError>() {
        Some(StoreError::Validation(_)) => 2,
        Some(e) if e.is_not_found() => 3,
        _ => 1,
    }
}

fn run(cli: Cli) -> Result<()> {
    let db_path = cli.db.unwrap_or_else(default_db_path);
    let mut store = TaskStore::open(&db_path)?;

    match cli.command {
        Commands::Create {
            title,
            description,
            priority,
            metadata,
            project,
        } => {
            let metadata = parse_metadata(metadata)?.unwrap_or_else(|| serde_json::json!({}));
            let task_id = store.create_task(NewTask {
                title,
                description,
                priority,
                metadata,
                project_id: project,
            })?;
            print_json(&store.get_task(task_id)?)?;
        }

        Commands::Get { task_id } => {
            print_json(&store.get_task(task_id)?)?;
        }

        Commands::List {
            status,
            project,
            by_id,
            limit,
        } => {
            let filter = TaskFilter {
                status: parse_status(status)?,
                project_id: project,
                order_by_priority: !by_id,
                limit,
            };
            print_json(&store.list_tasks(&filter)?)?;
        }

        Commands::Update {
            task_id,
            title,
            description,
            status,
            priority,
            metadata,
            project,
        } => {
            let update = TaskUpdate {
                title,
                description,
                status: parse_status(status)?,
                priority,
                metadata: parse_metadata(metadata)?,
                project_id: project,
            };
            print_json(&store.update_task(task_id, update)?)?;
        }

        Commands::Delete { task_id } => {
            store.delete_task(task_id)?;
            print_json(&serde_json::json!({ "deleted": task_id }))?;
        }

        Commands::Pop { project } => {
            // No pending task is an expected outcome, printed as null
            print_json(&store.pop_next_task(project.as_deref())?)?;
        }

        Commands::Stats => {
            print_json(&store.get_stats()?)?;
        }

        Commands::Attach {
            task_id,
            document_id,
            filename,
            description,
        } => {
            let attachment_id = store.attach_document(
                task_id,
                &document_id,
                filename.as_deref(),
                description.as_deref(),
            )?;
            print_json(&store.get_attachment(attachment_id)?)?;
        }

        Commands::Attachments { task_id } => {
            print_json(&store.list_attachments(task_id)?)?;
        }

        Commands::GetAttachment { attachment_id } => {
            print_json(&store.get_attachment(attachment_id)?)?;
        }

        Commands::Detach { attachment_id } => {
            store.remove_attachment(attachment_id)?;
            print_json(&serde_json::json!({ "removed": attachment_id }))?;
        }
    }

    Ok(())
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("taskreg").join("tasks.db"))
        .unwrap_or_else(|| PathBuf::from("tasks.db"))
}

fn parse_status(raw: Option<String>) -> Result<Option<TaskStatus>, StoreError> {
    raw.as_deref().map(str::parse).transpose()
}

fn parse_metadata(raw: Option<String>) -> Result<Option<serde_json::Value>, StoreError> {
    raw.map(|s| {
        serde_json::from_str(&s)
            .map_err(|e| StoreError::Validation(format!("metadata is not valid JSON: {e}")))
    })
    .transpose()
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
