// Query options for listing tasks

use crate::models::TaskStatus;

/// Filter and ordering options for [`crate::TaskStore::list_tasks`].
///
/// Filters are conjunctive: a task must match every `Some` field.
/// The default lists everything, highest priority first.
#[derive(Debug, Clone)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub project_id: Option<String>,
    /// When true (the default), order by `priority DESC` with ascending
    /// id as the tie-break; when false, order by ascending id. Either
    /// way the ordering is deterministic across repeated calls.
    pub order_by_priority: bool,
    /// Truncates the result after ordering; does not affect filtering.
    pub limit: Option<u32>,
}

impl Default for TaskFilter {
    fn default() -> Self {
        Self {
            status: None,
            project_id: None,
            order_by_priority: true,
            limit: None,
        }
    }
}

impl TaskFilter {
    pub fn with_status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_project(project_id: impl Into<String>) -> Self {
        Self {
            project_id: Some(project_id.into()),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_orders_by_priority() {
        let filter = TaskFilter::default();
        assert!(filter.order_by_priority);
        assert!(filter.status.is_none());
        assert!(filter.project_id.is_none());
        assert!(filter.limit.is_none());
    }

    #[test]
    fn test_with_status() {
        let filter = TaskFilter::with_status(TaskStatus::Pending);
        assert_eq!(filter.status, Some(TaskStatus::Pending));
        assert!(filter.order_by_priority);
    }

    #[test]
    fn test_with_project() {
        let filter = TaskFilter::with_project("monthly-reports");
        assert_eq!(filter.project_id.as_deref(), Some("monthly-reports"));
    }
}
