//! History persistence: one JSON object per line, crash-recoverable by
//! line scan.

use jimi_llm::Message;
use std::io::Write;
use std::path::Path;
use tracing::{debug, warn};

/// Appends messages to a session's `history.jsonl`.
#[derive(Debug)]
pub struct HistoryWriter {
    file: std::fs::File,
}

impl HistoryWriter {
    /// Open (creating directories and the file as needed) for append.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be created or opened.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self { file })
    }

    /// Append one message as a JSON line.
    pub fn append(&mut self, message: &Message) {
        match serde_json::to_string(message) {
            Ok(mut line) => {
                line.push('\n');
                if let Err(e) = self.file.write_all(line.as_bytes()) {
                    warn!(error = %e, "Failed to append history line");
                }
            },
            Err(e) => warn!(error = %e, "Failed to serialize history message"),
        }
    }
}

/// Replay a history file into a message vector.
///
/// Malformed lines (a torn write from a crash) are skipped with a warning.
///
/// # Errors
///
/// Fails only when the file cannot be read at all.
pub fn load_history(path: &Path) -> std::io::Result<Vec<Message>> {
    let content = std::fs::read_to_string(path)?;
    let mut messages = Vec::new();
    for (index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Message>(line) {
            Ok(message) => messages.push(message),
            Err(e) => warn!(line = index.saturating_add(1), error = %e, "Skipping malformed history line"),
        }
    }
    debug!(count = messages.len(), path = %path.display(), "History loaded");
    Ok(messages)
}
