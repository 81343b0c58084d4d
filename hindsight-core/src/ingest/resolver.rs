//! Working directory to project directory resolution
//!
//! Finds the transcript directory that belongs to the current working
//! directory. Exact reconstruction of the directory name is attempted first;
//! because the encoding loses hyphens, looser heuristics act as fallbacks:
//!
//! 1. **Exact path** - some [`DecodeStrategy`](super::path_codec::DecodeStrategy)
//!    turns the directory name into the working directory.
//! 2. **Project name** - the final path segment matches, case-insensitive.
//! 3. **Partial path** - at least two of the trailing three segments are
//!    shared, in any position.
//!
//! Name and partial matches are pooled, and the project with the most
//! recently modified session wins. Directories without sessions are never
//! returned.

use super::path_codec::{self, DecodeStrategy};
use super::store;
use crate::types::{MatchKind, Project, Session};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Number of trailing segments compared by the partial-path heuristic.
const PARTIAL_TAIL: usize = 3;

/// Minimum number of shared trailing segments for a partial-path match.
const PARTIAL_MIN_SHARED: usize = 2;

/// A project directory with at least one session.
#[derive(Debug, Clone)]
struct Candidate {
    dir: PathBuf,
    encoded_name: String,
    sessions: Vec<Session>,
    decodes: Vec<(DecodeStrategy, String)>,
}

impl Candidate {
    fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.sessions.iter().map(|s| s.modified_at).max()
    }
}

/// Resolves working directories against a transcript store.
pub struct ProjectResolver {
    root: PathBuf,
}

impl ProjectResolver {
    /// Create a resolver for the store rooted at `root`
    /// (the directory holding one subdirectory per encoded project path).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory this resolver scans.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `cwd` to its best matching project, or `None`.
    pub fn resolve(&self, cwd: &str) -> Option<Project> {
        self.resolve_at(cwd, Utc::now())
    }

    /// Resolve `cwd`, scoring activity relative to `now`.
    pub fn resolve_at(&self, cwd: &str, now: DateTime<Utc>) -> Option<Project> {
        let cwd = path_codec::normalize(cwd);
        let candidates = self.candidates();

        tracing::debug!(
            cwd = %cwd,
            candidates = candidates.len(),
            root = %self.root.display(),
            "Resolving project"
        );

        if let Some((candidate, decoded)) = exact_match(&candidates, cwd) {
            tracing::info!(
                project = %candidate.encoded_name,
                sessions = candidate.sessions.len(),
                "Resolved project by exact path"
            );
            return Some(into_project(candidate, decoded, MatchKind::ExactPath, now));
        }

        let mut matches = Vec::new();
        for candidate in &candidates {
            if let Some(decoded) = name_match(candidate, cwd) {
                matches.push((candidate, decoded, MatchKind::ProjectName));
            } else if let Some(decoded) = partial_match(candidate, cwd) {
                matches.push((candidate, decoded, MatchKind::PartialPath));
            }
        }

        let best = matches
            .into_iter()
            .max_by(|(a, _, _), (b, _, _)| a.last_modified().cmp(&b.last_modified()));

        match best {
            Some((candidate, decoded, kind)) => {
                tracing::info!(
                    project = %candidate.encoded_name,
                    match_kind = %kind,
                    sessions = candidate.sessions.len(),
                    "Resolved project by fallback heuristic"
                );
                Some(into_project(candidate, decoded, kind, now))
            }
            None => {
                tracing::info!(cwd = %cwd, "No project matches working directory");
                None
            }
        }
    }

    /// Reload the sessions of an already resolved project.
    pub fn refresh(&self, project: &mut Project, now: DateTime<Utc>) {
        project.sessions = store::list_sessions(&project.dir);
        project.activity_score = activity_score(&project.sessions, now);
    }

    fn candidates(&self) -> Vec<Candidate> {
        store::list_project_dirs(&self.root)
            .into_iter()
            .filter_map(|dir| {
                let encoded_name = dir.file_name()?.to_str()?.to_string();
                let sessions = store::list_sessions(&dir);
                if sessions.is_empty() {
                    return None;
                }
                let decodes = path_codec::decode_candidates(&encoded_name);
                Some(Candidate {
                    dir,
                    encoded_name,
                    sessions,
                    decodes,
                })
            })
            .collect()
    }
}

fn exact_match<'a>(candidates: &'a [Candidate], cwd: &str) -> Option<(&'a Candidate, String)> {
    for strategy in DecodeStrategy::ALL {
        for candidate in candidates {
            let hit = candidate
                .decodes
                .iter()
                .find(|(s, decoded)| *s == strategy && decoded == cwd);
            if let Some((_, decoded)) = hit {
                return Some((candidate, decoded.clone()));
            }
        }
    }
    None
}

fn name_match(candidate: &Candidate, cwd: &str) -> Option<String> {
    let wanted = path_codec::segments(cwd).last()?.to_lowercase();
    candidate
        .decodes
        .iter()
        .find(|(_, decoded)| {
            path_codec::segments(decoded)
                .last()
                .map(|last| last.to_lowercase() == wanted)
                .unwrap_or(false)
        })
        .map(|(_, decoded)| decoded.clone())
}

fn partial_match(candidate: &Candidate, cwd: &str) -> Option<String> {
    let cwd_segments = path_codec::segments(cwd);
    let cwd_tail = tail(&cwd_segments, PARTIAL_TAIL);
    if cwd_tail.is_empty() {
        return None;
    }
    let required = PARTIAL_MIN_SHARED.min(cwd_tail.len());

    candidate
        .decodes
        .iter()
        .find(|(_, decoded)| {
            let decoded_segments = path_codec::segments(decoded);
            let decoded_tail = tail(&decoded_segments, PARTIAL_TAIL);
            let shared: HashSet<&str> = cwd_tail
                .iter()
                .copied()
                .filter(|segment| decoded_tail.contains(segment))
                .collect();
            shared.len() >= required
        })
        .map(|(_, decoded)| decoded.clone())
}

fn tail<'a>(segments: &[&'a str], n: usize) -> Vec<&'a str> {
    segments[segments.len().saturating_sub(n)..].to_vec()
}

fn into_project(
    candidate: &Candidate,
    display_name: String,
    match_kind: MatchKind,
    now: DateTime<Utc>,
) -> Project {
    Project {
        encoded_name: candidate.encoded_name.clone(),
        display_name,
        dir: candidate.dir.clone(),
        activity_score: activity_score(&candidate.sessions, now),
        sessions: candidate.sessions.clone(),
        match_kind,
    }
}

/// Activity score of a set of sessions.
///
/// Grows as the newest session gets more recent and as the total transcript
/// size grows. Zero for an empty set.
pub fn activity_score(sessions: &[Session], now: DateTime<Utc>) -> f64 {
    let newest = match sessions.iter().map(|s| s.modified_at).max() {
        Some(ts) => ts,
        None => return 0.0,
    };
    let age_days = (now - newest).num_seconds().max(0) as f64 / 86_400.0;
    let recency = 1.0 / (1.0 + age_days);

    let total_kib = sessions.iter().map(|s| s.size_bytes).sum::<u64>() as f64 / 1024.0;
    let size = (1.0 + total_kib).ln();

    recency * (1.0 + size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn add_session(root: &Path, project: &str, id: &str, age_secs: u64) {
        let dir = root.join(project);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(format!("{id}.jsonl"));
        std::fs::write(&path, "{\"type\":\"user\"}\n").unwrap();
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(age_secs))
            .unwrap();
    }

    #[test]
    fn test_exact_path_match() {
        let store = TempDir::new().unwrap();
        add_session(store.path(), "-home-u-proj", "s1", 100);
        add_session(store.path(), "-home-u-proj", "s2", 50);
        add_session(store.path(), "-home-u-other", "s3", 10);

        let resolver = ProjectResolver::new(store.path());
        let project = resolver.resolve("/home/u/proj").expect("project should resolve");

        assert_eq!(project.match_kind, MatchKind::ExactPath);
        assert_eq!(project.encoded_name, "-home-u-proj");
        assert_eq!(project.display_name, "/home/u/proj");
        assert_eq!(project.sessions.len(), 2);
        assert_eq!(project.sessions[0].id, "s2");
    }

    #[test]
    fn test_exact_match_ignores_trailing_separator() {
        let store = TempDir::new().unwrap();
        add_session(store.path(), "-home-u-proj", "s1", 100);

        let resolver = ProjectResolver::new(store.path());
        let project = resolver.resolve("/home/u/proj/").unwrap();
        assert_eq!(project.match_kind, MatchKind::ExactPath);
    }

    #[test]
    fn test_exact_match_for_hyphenated_directory() {
        let store = TempDir::new().unwrap();
        add_session(store.path(), "-home-u-my-app", "s1", 100);

        let resolver = ProjectResolver::new(store.path());
        let project = resolver.resolve("/home/u/my-app").unwrap();
        assert_eq!(project.match_kind, MatchKind::ExactPath);
        assert_eq!(project.display_name, "/home/u/my-app");
    }

    #[test]
    fn test_project_without_sessions_is_never_returned() {
        let store = TempDir::new().unwrap();
        std::fs::create_dir_all(store.path().join("-home-u-proj")).unwrap();

        let resolver = ProjectResolver::new(store.path());
        assert!(resolver.resolve("/home/u/proj").is_none());
    }

    #[test]
    fn test_name_match_prefers_most_recent() {
        let store = TempDir::new().unwrap();
        add_session(store.path(), "-old-place-Proj", "s1", 5000);
        add_session(store.path(), "-new-place-proj", "s2", 10);

        let resolver = ProjectResolver::new(store.path());
        let project = resolver.resolve("/home/u/proj").unwrap();
        assert_eq!(project.match_kind, MatchKind::ProjectName);
        assert_eq!(project.encoded_name, "-new-place-proj");
    }

    #[test]
    fn test_more_recent_partial_match_beats_name_match() {
        let store = TempDir::new().unwrap();
        add_session(store.path(), "-mnt-proj", "s1", 5000);
        add_session(store.path(), "-home-u-elsewhere", "s2", 10);

        let resolver = ProjectResolver::new(store.path());
        let project = resolver.resolve("/home/u/proj").unwrap();
        assert_eq!(project.match_kind, MatchKind::PartialPath);
        assert_eq!(project.encoded_name, "-home-u-elsewhere");
    }

    #[test]
    fn test_more_recent_name_match_beats_partial_match() {
        let store = TempDir::new().unwrap();
        add_session(store.path(), "-mnt-proj", "s1", 10);
        add_session(store.path(), "-home-u-elsewhere", "s2", 5000);

        let resolver = ProjectResolver::new(store.path());
        let project = resolver.resolve("/home/u/proj").unwrap();
        assert_eq!(project.match_kind, MatchKind::ProjectName);
        assert_eq!(project.encoded_name, "-mnt-proj");
    }

    #[test]
    fn test_partial_path_match() {
        let store = TempDir::new().unwrap();
        add_session(store.path(), "-Users-u-work-api-v2", "s1", 10);

        // Shares "work" and "api" with the candidate's trailing segments
        let resolver = ProjectResolver::new(store.path());
        let project = resolver.resolve("/home/u/work/api").unwrap();
        assert_eq!(project.match_kind, MatchKind::PartialPath);
    }

    #[test]
    fn test_single_shared_segment_is_not_enough() {
        let store = TempDir::new().unwrap();
        add_session(store.path(), "-srv-data-thing", "s1", 10);

        let resolver = ProjectResolver::new(store.path());
        assert!(resolver.resolve("/home/data/proj").is_none());
    }

    #[test]
    fn test_empty_store_resolves_nothing() {
        let store = TempDir::new().unwrap();
        let resolver = ProjectResolver::new(store.path().join("missing"));
        assert!(resolver.resolve("/home/u/proj").is_none());
    }

    #[test]
    fn test_activity_score_is_monotonic() {
        let now = Utc::now();
        let session = |age_days: i64, size: u64| Session {
            id: "s".to_string(),
            path: PathBuf::from("/s.jsonl"),
            modified_at: now - chrono::Duration::days(age_days),
            size_bytes: size,
            message_count: None,
        };

        let recent = activity_score(&[session(1, 10_000)], now);
        let stale = activity_score(&[session(30, 10_000)], now);
        let bigger = activity_score(&[session(1, 10_000), session(2, 90_000)], now);

        assert!(recent > stale);
        assert!(bigger > recent);
        assert_eq!(activity_score(&[], now), 0.0);
    }
}
