//! On-disk layout conventions.
//!
//! All persistent state lives under a `.jimi` directory, either in the
//! workspace (`<work_dir>/.jimi`) or in the user's home (`~/.jimi`).

use crate::ids::SessionId;
use std::path::{Path, PathBuf};

/// Workspace-level Jimi directory.
#[must_use]
pub fn jimi_dir(work_dir: &Path) -> PathBuf {
    work_dir.join(".jimi")
}

/// Directory holding all session state for a workspace.
#[must_use]
pub fn sessions_dir(work_dir: &Path) -> PathBuf {
    jimi_dir(work_dir).join("sessions")
}

/// Directory holding one session's state.
#[must_use]
pub fn session_dir(work_dir: &Path, id: &SessionId) -> PathBuf {
    sessions_dir(work_dir).join(id.to_string())
}

/// Canonical message history file for a session.
#[must_use]
pub fn history_file(work_dir: &Path, id: &SessionId) -> PathBuf {
    session_dir(work_dir, id).join("history.jsonl")
}

/// User-level Jimi directory (`~/.jimi`), if the home directory is known.
#[must_use]
pub fn user_jimi_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".jimi"))
}
