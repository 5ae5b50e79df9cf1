//! Shared session state.
//!
//! One [`Session`] exists per interactive conversation and spans every agent
//! run inside it, including nested sub-agents. The step counter and the
//! cancellation flag are atomic so the engine, async sub-agents, and tool
//! executors can inspect them concurrently.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::dirs;
use crate::ids::SessionId;
use crate::todo::{TodoItem, TodoPatch, TodoStats, merge_todos};

/// Shared state for one interactive conversation.
#[derive(Debug)]
pub struct Session {
    /// Unique session identifier.
    pub id: SessionId,
    /// Absolute workspace directory.
    pub work_dir: PathBuf,
    /// Canonical history file path.
    pub history_file: PathBuf,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    global_step: AtomicU64,
    cancelled: AtomicBool,
    cancel_token: Mutex<CancellationToken>,
    todos: Mutex<Vec<TodoItem>>,
}

impl Session {
    /// Create a new session rooted at `work_dir`.
    #[must_use]
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        let work_dir = work_dir.into();
        let id = SessionId::new();
        let history_file = dirs::history_file(&work_dir, &id);
        Self {
            id,
            work_dir,
            history_file,
            created_at: Utc::now(),
            global_step: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
            cancel_token: Mutex::new(CancellationToken::new()),
            todos: Mutex::new(Vec::new()),
        }
    }

    /// Resume a session with a known id.
    #[must_use]
    pub fn with_id(id: SessionId, work_dir: impl Into<PathBuf>) -> Self {
        let work_dir = work_dir.into();
        let history_file = dirs::history_file(&work_dir, &id);
        Self {
            id,
            work_dir,
            history_file,
            created_at: Utc::now(),
            global_step: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
            cancel_token: Mutex::new(CancellationToken::new()),
            todos: Mutex::new(Vec::new()),
        }
    }

    /// Claim the next step number.
    ///
    /// Monotonically increasing across every run in this session, nested
    /// sub-agents included.
    pub fn next_step(&self) -> u64 {
        self.global_step
            .fetch_add(1, Ordering::SeqCst)
            .saturating_add(1)
    }

    /// Current value of the step counter.
    pub fn current_step(&self) -> u64 {
        self.global_step.load(Ordering::SeqCst)
    }

    /// Request cancellation of everything running in this session.
    ///
    /// Idempotent. Sub-agents observe the same flag and token, so
    /// cancellation propagates bottom-up through nested runs.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            debug!(session = %self.id, "Session cancelled");
        }
        self.cancel_token
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .cancel();
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Clear the cancellation flag at the start of a new user turn.
    ///
    /// Installs a fresh cancellation token; tokens handed out before the
    /// reset stay cancelled.
    pub fn reset_cancelled(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
        *self
            .cancel_token
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = CancellationToken::new();
    }

    /// Token observing the current cancellation scope.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Snapshot of the todo list.
    pub fn todos(&self) -> Vec<TodoItem> {
        self.todos
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Apply a differential patch to the todo list.
    ///
    /// Returns the merged list and its statistics.
    pub fn apply_todo_patch(&self, patch: &TodoPatch) -> (Vec<TodoItem>, TodoStats) {
        let mut todos = self
            .todos
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let (merged, stats) = merge_todos(&todos, patch);
        *todos = merged.clone();
        (merged, stats)
    }

    /// Workspace-relative `.jimi` directory for this session's workspace.
    #[must_use]
    pub fn jimi_dir(&self) -> PathBuf {
        dirs::jimi_dir(&self.work_dir)
    }

    /// The workspace directory as a path.
    #[must_use]
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }
}
