//! Session store discovery
//!
//! Lists project directories and transcript files with filesystem metadata
//! only. Nothing here opens a transcript.
//!
//! A missing or unreadable directory is the normal first-run state, so every
//! function returns an empty list instead of an error.

use crate::types::Session;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Extension of transcript files.
pub const TRANSCRIPT_EXTENSION: &str = "jsonl";

/// List the project directories under a projects root.
///
/// Returns directory paths sorted by name.
pub fn list_project_dirs(root: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::info!(
                root = %root.display(),
                error = %e,
                "Transcript store not readable, treating as empty"
            );
            return vec![];
        }
    };

    let mut dirs: Vec<PathBuf> = entries
        .flatten()
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|entry| entry.path())
        .collect();
    dirs.sort();
    dirs
}

/// List the transcript files in one project directory, newest first.
pub fn list_sessions(project_dir: &Path) -> Vec<Session> {
    if !project_dir.is_dir() {
        tracing::info!(
            dir = %project_dir.display(),
            "Project directory missing, no sessions"
        );
        return vec![];
    }

    let escaped = glob::Pattern::escape(&project_dir.to_string_lossy());
    let pattern = format!("{}/*.{}", escaped, TRANSCRIPT_EXTENSION);

    let entries = match glob::glob(&pattern) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::info!(
                dir = %project_dir.display(),
                error = %e,
                "Invalid session glob pattern"
            );
            return vec![];
        }
    };

    let mut sessions: Vec<Session> = entries
        .flatten()
        .filter(|path| path.is_file())
        .filter_map(|path| session_from_path(&path))
        .collect();

    sessions.sort_by(|a, b| b.modified_at.cmp(&a.modified_at).then(a.id.cmp(&b.id)));
    sessions
}

/// Build a [`Session`] from a transcript path using filesystem metadata.
///
/// Returns `None` if the file has no usable stem or its metadata can't be read.
pub fn session_from_path(path: &Path) -> Option<Session> {
    let id = path.file_stem()?.to_str()?.to_string();
    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Skipping unreadable session file");
            return None;
        }
    };

    let modified_at = metadata
        .modified()
        .ok()
        .map(DateTime::<Utc>::from)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    Some(Session {
        id,
        path: path.to_path_buf(),
        modified_at,
        size_bytes: metadata.len(),
        message_count: None,
    })
}

/// Path of the transcript file for `session_id` inside `project_dir`.
pub fn session_path(project_dir: &Path, session_id: &str) -> PathBuf {
    project_dir.join(format!("{}.{}", session_id, TRANSCRIPT_EXTENSION))
}
