//! Self-pollution guard
//!
//! With the `claude-cli` collaborator every analysis call is itself a Claude
//! Code session, and it lands in the same project directory hindsight reads.
//! Left alone, the next run would analyze its own prompts.
//!
//! The guard works in three steps:
//! - [`PollutionGuard::sweep`] before a run removes fingerprinted transcripts
//!   left behind by earlier runs
//! - [`PollutionGuard::observe_call`] after each call nominates session files
//!   modified since the call started
//! - [`PollutionGuard::cleanup`] after the run deletes nominated files that
//!   contain a fingerprint
//!
//! Timing only nominates. A file is deleted only when its content contains
//! one of [`fingerprints`].

use crate::analysis::prompt::{has_fingerprint, FINGERPRINTS};
use crate::config::GuardConfig;
use crate::ingest::store;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Filesystem mtimes can trail the wall clock by a few milliseconds.
const MTIME_SLACK_MS: i64 = 1000;

/// Result of [`PollutionGuard::cleanup`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Session ids whose files were deleted
    pub removed: Vec<String>,
    /// Tracked session ids kept because they lack a fingerprint
    pub spared: Vec<String>,
}

/// Tracks and removes transcripts created by analysis calls.
#[derive(Debug)]
pub struct PollutionGuard {
    dir: PathBuf,
    config: GuardConfig,
    tracked: BTreeSet<String>,
}

impl PollutionGuard {
    pub fn new(project_dir: impl Into<PathBuf>, config: &GuardConfig) -> Self {
        Self {
            dir: project_dir.into(),
            config: config.clone(),
            tracked: BTreeSet::new(),
        }
    }

    pub fn project_dir(&self) -> &Path {
        &self.dir
    }

    /// Session ids nominated so far.
    pub fn tracked(&self) -> impl Iterator<Item = &str> {
        self.tracked.iter().map(String::as_str)
    }

    /// Delete every fingerprinted session file in the project directory.
    ///
    /// Returns the ids of deleted sessions.
    pub fn sweep(&self) -> Vec<String> {
        let mut removed = Vec::new();
        for session in store::list_sessions(&self.dir) {
            if is_self_generated(&session.path) && remove(&session.path) {
                removed.push(session.id);
            }
        }
        if !removed.is_empty() {
            tracing::info!(
                dir = %self.dir.display(),
                count = removed.len(),
                "Swept self-generated transcripts"
            );
        }
        removed
    }

    /// Nominate session files modified at or after `started_at`.
    ///
    /// Polls `poll_attempts` times, `poll_interval_ms` apart, because the
    /// collaborator may flush its transcript after returning. Returns the ids
    /// that were newly nominated by this call.
    pub fn observe_call(&mut self, started_at: DateTime<Utc>) -> Vec<String> {
        let threshold = started_at - ChronoDuration::milliseconds(MTIME_SLACK_MS);
        let attempts = self.config.poll_attempts.max(1);
        let interval = Duration::from_millis(self.config.poll_interval_ms);
        let mut nominated = Vec::new();

        for attempt in 0..attempts {
            for session in store::list_sessions(&self.dir) {
                if session.modified_at >= threshold && self.tracked.insert(session.id.clone()) {
                    tracing::debug!(session_id = %session.id, attempt, "Nominated session");
                    nominated.push(session.id);
                }
            }
            if attempt + 1 < attempts && !interval.is_zero() {
                std::thread::sleep(interval);
            }
        }
        nominated
    }

    /// Delete nominated files that contain a fingerprint and forget them all.
    pub fn cleanup(&mut self) -> CleanupReport {
        let mut report = CleanupReport::default();
        for id in std::mem::take(&mut self.tracked) {
            let path = store::session_path(&self.dir, &id);
            if !path.exists() {
                continue;
            }
            if is_self_generated(&path) {
                if remove(&path) {
                    report.removed.push(id);
                }
            } else {
                tracing::debug!(session_id = %id, "Sparing session without fingerprint");
                report.spared.push(id);
            }
        }
        tracing::info!(
            removed = report.removed.len(),
            spared = report.spared.len(),
            "Guard cleanup finished"
        );
        report
    }
}

/// Substrings that mark a transcript as created by an analysis call.
pub fn fingerprints() -> &'static [&'static str] {
    FINGERPRINTS
}

/// True when the file at `path` contains an analysis prompt fingerprint.
///
/// Unreadable files are never considered self-generated.
pub fn is_self_generated(path: &Path) -> bool {
    match std::fs::read(path) {
        Ok(bytes) => has_fingerprint(&String::from_utf8_lossy(&bytes)),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Could not read transcript");
            false
        }
    }
}

fn remove(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::info!(path = %path.display(), "Deleted self-generated transcript");
            true
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to delete transcript");
            false
        }
    }
}
