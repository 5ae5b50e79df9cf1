//! Session todo list: items, differential patches, and merge statistics.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a single todo item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    /// Not started yet.
    #[default]
    Pending,
    /// Currently being worked on.
    InProgress,
    /// Finished.
    Done,
    /// Abandoned.
    Cancelled,
    /// Failed.
    Error,
}

impl fmt::Display for TodoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Done => write!(f, "done"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// One entry in the session todo list.
///
/// Identity is the `id` when present, otherwise the `title`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    /// Optional stable identifier.
    #[serde(default)]
    pub id: Option<String>,
    /// Short description of the task.
    pub title: String,
    /// Current status.
    #[serde(default)]
    pub status: TodoStatus,
    /// Parent item (id or title) for nested tasks.
    #[serde(default)]
    pub parent_id: Option<String>,
}

impl TodoItem {
    /// Create a pending item with just a title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            status: TodoStatus::Pending,
            parent_id: None,
        }
    }

    /// Set a stable id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the status.
    #[must_use]
    pub fn with_status(mut self, status: TodoStatus) -> Self {
        self.status = status;
        self
    }

    /// The key this item is identified by: id when set, title otherwise.
    #[must_use]
    pub fn key(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.title)
    }
}

/// Differential update to a todo list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TodoPatch {
    /// Items to update in place (matched by key) or append.
    #[serde(default)]
    pub items: Vec<TodoItem>,
    /// Keys (id or title) of items to remove.
    #[serde(default)]
    pub deletes: Vec<String>,
    /// Drop every `Done` item after applying updates and deletes.
    #[serde(default)]
    pub remove_completed: bool,
}

/// Counts per status after a merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoStats {
    /// Total item count.
    pub total: usize,
    /// Items still pending.
    pub pending: usize,
    /// Items in progress.
    pub in_progress: usize,
    /// Finished items.
    pub done: usize,
    /// Abandoned items.
    pub cancelled: usize,
    /// Failed items.
    pub error: usize,
}

impl TodoStats {
    /// Compute statistics over a list.
    #[must_use]
    pub fn of(items: &[TodoItem]) -> Self {
        let mut stats = Self {
            total: items.len(),
            ..Self::default()
        };
        for item in items {
            let slot = match item.status {
                TodoStatus::Pending => &mut stats.pending,
                TodoStatus::InProgress => &mut stats.in_progress,
                TodoStatus::Done => &mut stats.done,
                TodoStatus::Cancelled => &mut stats.cancelled,
                TodoStatus::Error => &mut stats.error,
            };
            *slot = slot.saturating_add(1);
        }
        stats
    }
}

/// Apply a differential patch to a todo list.
///
/// Updates match existing items by key and replace them in place; unmatched
/// patch items are appended in patch order. Deletes remove by key. When
/// `remove_completed` is set, `Done` items are dropped last. Applying the
/// same patch twice yields the same list and statistics.
#[must_use]
pub fn merge_todos(current: &[TodoItem], patch: &TodoPatch) -> (Vec<TodoItem>, TodoStats) {
    let mut merged: Vec<TodoItem> = current.to_vec();

    for update in &patch.items {
        if let Some(existing) = merged.iter_mut().find(|i| i.key() == update.key()) {
            *existing = update.clone();
        } else {
            merged.push(update.clone());
        }
    }

    merged.retain(|item| !patch.deletes.iter().any(|key| item.key() == key));

    if patch.remove_completed {
        merged.retain(|item| item.status != TodoStatus::Done);
    }

    let stats = TodoStats::of(&merged);
    (merged, stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<TodoItem> {
        vec![
            TodoItem::new("design api").with_id("1"),
            TodoItem::new("write tests")
                .with_id("2")
                .with_status(TodoStatus::InProgress),
            TodoItem::new("ship it").with_status(TodoStatus::Done),
        ]
    }

    #[test]
    fn test_merge_updates_in_place() {
        let patch = TodoPatch {
            items: vec![
                TodoItem::new("design api")
                    .with_id("1")
                    .with_status(TodoStatus::Done),
            ],
            ..TodoPatch::default()
        };
        let (merged, stats) = merge_todos(&sample(), &patch);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].status, TodoStatus::Done);
        assert_eq!(stats.done, 2);
    }

    #[test]
    fn test_merge_appends_new_items() {
        let patch = TodoPatch {
            items: vec![TodoItem::new("review docs")],
            ..TodoPatch::default()
        };
        let (merged, stats) = merge_todos(&sample(), &patch);
        assert_eq!(merged.len(), 4);
        assert_eq!(merged[3].title, "review docs");
        assert_eq!(stats.pending, 2);
    }

    #[test]
    fn test_merge_deletes_by_id_and_title() {
        let patch = TodoPatch {
            deletes: vec!["2".to_string(), "ship it".to_string()],
            ..TodoPatch::default()
        };
        let (merged, stats) = merge_todos(&sample(), &patch);
        assert_eq!(merged.len(), 1);
        assert_eq!(stats.total, 1);
    }

    #[test]
    fn test_remove_completed_drops_done() {
        let patch = TodoPatch {
            remove_completed: true,
            ..TodoPatch::default()
        };
        let (merged, stats) = merge_todos(&sample(), &patch);
        assert!(merged.iter().all(|i| i.status != TodoStatus::Done));
        assert_eq!(stats.done, 0);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let patch = TodoPatch {
            items: vec![
                TodoItem::new("design api")
                    .with_id("1")
                    .with_status(TodoStatus::Done),
                TodoItem::new("new task"),
            ],
            deletes: vec!["2".to_string()],
            remove_completed: false,
        };
        let (once, stats_once) = merge_todos(&sample(), &patch);
        let (twice, stats_twice) = merge_todos(&once, &patch);
        assert_eq!(once, twice);
        assert_eq!(stats_once, stats_twice);
    }
}
