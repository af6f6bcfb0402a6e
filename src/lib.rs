// taskreg - SQLite-backed task registry with prioritized dequeue and document attachments

pub mod error;
pub mod filter;
pub mod models;
pub mod store;

// Re-export main types for convenience
pub use error::{Result, StoreError};
pub use filter::TaskFilter;
pub use models::{Attachment, NewTask, Task, TaskStats, TaskStatus, TaskUpdate};
pub use store::TaskStore;

// Re-export rusqlite for embedders that need raw access
pub use rusqlite;
