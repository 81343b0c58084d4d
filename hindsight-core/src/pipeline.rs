//! End-to-end analysis of one project.
//!
//! ```text
//! resolve -> sweep -> re-list -> newest N -> parse -> filter -> sort -> batch
//!         -> analyze (guard observes each call) -> cleanup
//! ```
//!
//! [`plan`] stops after batching and never calls the collaborator or deletes
//! anything, which makes it the dry run of [`run`].

use crate::analysis::{AnalysisClient, Analyzer, ProgressReporter, RunReport};
use crate::batch::plan_batches;
use crate::config::{AnalysisConfig, Config};
use crate::guard::{self, CleanupReport, PollutionGuard};
use crate::ingest::{transcript, ProjectResolver};
use crate::types::{Batch, Message, Project};
use chrono::Utc;
use serde::Serialize;
use std::path::PathBuf;

/// What to analyze. Unset fields fall back to the configuration.
#[derive(Debug, Clone, Default)]
pub struct AnalysisRequest {
    pub cwd: String,
    /// Overrides `store.claude_root`/projects
    pub projects_root: Option<PathBuf>,
    pub max_sessions: Option<usize>,
    pub max_batch_tokens: Option<usize>,
}

impl AnalysisRequest {
    pub fn new(cwd: impl Into<String>) -> Self {
        Self {
            cwd: cwd.into(),
            ..Default::default()
        }
    }

    fn projects_root(&self, config: &Config) -> PathBuf {
        self.projects_root
            .clone()
            .unwrap_or_else(|| config.store.projects_root())
    }

    fn analysis_config(&self, config: &Config) -> AnalysisConfig {
        let mut analysis = config.analysis.clone();
        if let Some(max) = self.max_batch_tokens {
            analysis.max_batch_tokens = max;
        }
        if self.max_sessions.is_some() {
            analysis.max_sessions = self.max_sessions;
        }
        analysis
    }
}

/// Counters gathered while reading transcripts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TranscriptStats {
    pub sessions_total: usize,
    pub sessions_parsed: usize,
    /// Sessions that could not be opened
    pub sessions_failed: usize,
    /// Fingerprinted sessions left out of the analysis
    pub sessions_self_generated: usize,
    pub messages_total: usize,
    pub messages_selected: usize,
    pub malformed_lines: usize,
    pub estimated_tokens: usize,
}

/// A project read and batched, ready for analysis.
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub project: Project,
    pub stats: TranscriptStats,
    pub batches: Vec<Batch>,
}

#[derive(Debug, Clone)]
pub enum PlanOutcome {
    NoProject { cwd: String },
    Planned(Box<PreparedRun>),
}

/// Result of a full run.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectAnalysis {
    pub project: Project,
    pub stats: TranscriptStats,
    /// Sessions deleted by the sweep before reading
    pub swept: Vec<String>,
    pub report: RunReport,
    pub cleanup: CleanupReport,
}

#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    NoProject { cwd: String },
    Analyzed(Box<ProjectAnalysis>),
}

/// Resolve, read and batch without calling the collaborator.
pub fn plan(request: &AnalysisRequest, config: &Config) -> PlanOutcome {
    let resolver = ProjectResolver::new(request.projects_root(config));
    match resolver.resolve(&request.cwd) {
        Some(project) => {
            PlanOutcome::Planned(Box::new(prepare(project, &request.analysis_config(config))))
        }
        None => PlanOutcome::NoProject {
            cwd: request.cwd.clone(),
        },
    }
}

/// Analyze the project resolved for `request.cwd`.
pub fn run(
    request: &AnalysisRequest,
    config: &Config,
    client: &dyn AnalysisClient,
    progress: &mut dyn ProgressReporter,
) -> PipelineOutcome {
    let resolver = ProjectResolver::new(request.projects_root(config));
    let Some(mut project) = resolver.resolve(&request.cwd) else {
        return PipelineOutcome::NoProject {
            cwd: request.cwd.clone(),
        };
    };

    let mut guard = PollutionGuard::new(&project.dir, &config.guard);
    let swept = if config.guard.enabled {
        let swept = guard.sweep();
        resolver.refresh(&mut project, Utc::now());
        swept
    } else {
        Vec::new()
    };

    let analysis = request.analysis_config(config);
    let prepared = prepare(project, &analysis);

    let analyzer = Analyzer::new(client, &analysis);
    let report = analyzer.run(
        &prepared.batches,
        progress,
        config.guard.enabled.then_some(&mut guard),
    );
    let cleanup = if config.guard.enabled {
        guard.cleanup()
    } else {
        CleanupReport::default()
    };

    PipelineOutcome::Analyzed(Box::new(ProjectAnalysis {
        project: prepared.project,
        stats: prepared.stats,
        swept,
        report,
        cleanup,
    }))
}

/// Read the selected sessions of `project` and plan batches.
pub fn prepare(mut project: Project, analysis: &AnalysisConfig) -> PreparedRun {
    let mut stats = TranscriptStats {
        sessions_total: project.sessions.len(),
        ..Default::default()
    };

    // Sessions are listed newest first
    let selected = analysis
        .max_sessions
        .unwrap_or(project.sessions.len())
        .min(project.sessions.len());

    let mut messages: Vec<Message> = Vec::new();
    for session in project.sessions[..selected].iter_mut().rev() {
        if guard::is_self_generated(&session.path) {
            tracing::info!(session_id = %session.id, "Skipping self-generated session");
            stats.sessions_self_generated += 1;
            continue;
        }
        let parsed = match transcript::parse_file(&session.path) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(session_id = %session.id, error = %e, "Failed to read session");
                stats.sessions_failed += 1;
                continue;
            }
        };
        stats.sessions_parsed += 1;
        stats.malformed_lines += parsed.malformed_lines;
        stats.messages_total += parsed.messages.len();
        session.message_count = Some(parsed.messages.len());
        messages.extend(
            parsed
                .messages
                .into_iter()
                .filter(|m| m.kind.is_conversational() && !m.text().trim().is_empty()),
        );
    }

    messages.sort_by_key(|m| m.timestamp);
    stats.messages_selected = messages.len();

    let batches = plan_batches(messages, analysis.max_batch_tokens);
    stats.estimated_tokens = batches.iter().map(|b| b.estimated_tokens).sum();

    tracing::info!(
        project = %project.encoded_name,
        sessions = stats.sessions_parsed,
        messages = stats.messages_selected,
        batches = batches.len(),
        "Prepared analysis"
    );

    PreparedRun {
        project,
        stats,
        batches,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::prompt::PROMPT_MARKER;
    use crate::analysis::NoProgress;
    use crate::error::{Error, Result};
    use crate::ingest::store;
    use std::cell::Cell;
    use std::path::Path;
    use tempfile::TempDir;

    struct FixedClient {
        response: String,
        calls: Cell<usize>,
    }

    impl AnalysisClient for FixedClient {
        fn complete(&self, _prompt: &str) -> Result<String> {
            self.calls.set(self.calls.get() + 1);
            Ok(self.response.clone())
        }
    }

    struct FailingClient;

    impl AnalysisClient for FailingClient {
        fn complete(&self, _prompt: &str) -> Result<String> {
            Err(Error::Llm("down".to_string()))
        }
    }

    fn line(kind: &str, uuid: &str, ts: &str, text: &str) -> String {
        serde_json::json!({
            "type": kind,
            "uuid": uuid,
            "timestamp": ts,
            "sessionId": "s",
            "message": {"role": kind, "content": text}
        })
        .to_string()
    }

    fn store_with_project(cwd: &str) -> (TempDir, PathBuf) {
        let root = TempDir::new().unwrap();
        let dir = root
            .path()
            .join(crate::ingest::path_codec::encode(cwd));
        std::fs::create_dir_all(&dir).unwrap();
        (root, dir)
    }

    fn write_session(dir: &Path, id: &str, lines: &[String]) {
        std::fs::write(store::session_path(dir, id), lines.join("\n")).unwrap();
    }

    fn config(root: &Path) -> Config {
        let mut config = Config::default();
        config.store.claude_root = Some(root.to_path_buf());
        config.analysis.call_delay_ms = 0;
        config.guard.poll_attempts = 1;
        config.guard.poll_interval_ms = 0;
        config
    }

    fn request(root: &Path, cwd: &str) -> AnalysisRequest {
        AnalysisRequest {
            projects_root: Some(root.to_path_buf()),
            ..AnalysisRequest::new(cwd)
        }
    }

    #[test]
    fn test_plan_interleaves_sessions_chronologically() {
        let (root, dir) = store_with_project("/home/u/proj");
        write_session(
            &dir,
            "a",
            &[
                line("user", "a1", "2025-01-01T10:00:00Z", "first"),
                line("assistant", "a2", "2025-01-01T10:02:00Z", "third"),
            ],
        );
        write_session(
            &dir,
            "b",
            &[line("user", "b1", "2025-01-01T10:01:00Z", "second")],
        );

        let PlanOutcome::Planned(prepared) =
            plan(&request(root.path(), "/home/u/proj"), &config(root.path()))
        else {
            panic!("expected a planned run");
        };

        let texts: Vec<String> = prepared
            .batches
            .iter()
            .flat_map(|b| b.messages.iter().map(|m| m.text()))
            .collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
        assert_eq!(prepared.stats.sessions_parsed, 2);
        assert_eq!(prepared.stats.messages_selected, 3);
        assert!(prepared
            .project
            .sessions
            .iter()
            .all(|s| s.message_count.is_some()));
    }

    #[test]
    fn test_plan_skips_self_generated_without_deleting() {
        let (root, dir) = store_with_project("/home/u/proj");
        write_session(&dir, "real", &[line("user", "r1", "2025-01-01T10:00:00Z", "hi")]);
        write_session(
            &dir,
            "ours",
            &[line("user", "o1", "2025-01-01T11:00:00Z", PROMPT_MARKER)],
        );

        let PlanOutcome::Planned(prepared) =
            plan(&request(root.path(), "/home/u/proj"), &config(root.path()))
        else {
            panic!("expected a planned run");
        };
        assert_eq!(prepared.stats.sessions_self_generated, 1);
        assert_eq!(prepared.stats.messages_selected, 1);
        assert!(store::session_path(&dir, "ours").exists());
    }

    #[test]
    fn test_run_sweeps_and_merges() {
        let (root, dir) = store_with_project("/home/u/proj");
        write_session(&dir, "real", &[line("user", "r1", "2025-01-01T10:00:00Z", "use pnpm")]);
        write_session(
            &dir,
            "stale",
            &[line("user", "o1", "2025-01-01T11:00:00Z", PROMPT_MARKER)],
        );

        let client = FixedClient {
            response: r#"{"recommendations": ["Use pnpm"]}"#.to_string(),
            calls: Cell::new(0),
        };
        let outcome = run(
            &request(root.path(), "/home/u/proj"),
            &config(root.path()),
            &client,
            &mut NoProgress,
        );

        let PipelineOutcome::Analyzed(analysis) = outcome else {
            panic!("expected analysis");
        };
        assert_eq!(analysis.swept, vec!["stale".to_string()]);
        assert!(!store::session_path(&dir, "stale").exists());
        assert_eq!(client.calls.get(), 1);
        assert_eq!(analysis.report.merged.recommendations, vec!["Use pnpm"]);
        assert_eq!(analysis.project.sessions.len(), 1);
    }

    #[test]
    fn test_max_sessions_keeps_newest() {
        let (root, dir) = store_with_project("/home/u/proj");
        write_session(&dir, "old", &[line("user", "o", "2025-01-01T10:00:00Z", "old")]);
        std::thread::sleep(std::time::Duration::from_millis(20));
        write_session(&dir, "new", &[line("user", "n", "2025-01-02T10:00:00Z", "new")]);

        let mut req = request(root.path(), "/home/u/proj");
        req.max_sessions = Some(1);
        let PlanOutcome::Planned(prepared) = plan(&req, &config(root.path())) else {
            panic!("expected a planned run");
        };
        assert_eq!(prepared.stats.sessions_parsed, 1);
        assert_eq!(prepared.batches[0].messages[0].text(), "new");
    }

    #[test]
    fn test_failing_collaborator_still_completes() {
        let (root, dir) = store_with_project("/home/u/proj");
        write_session(&dir, "real", &[line("user", "r1", "2025-01-01T10:00:00Z", "hello")]);

        let PipelineOutcome::Analyzed(analysis) = run(
            &request(root.path(), "/home/u/proj"),
            &config(root.path()),
            &FailingClient,
            &mut NoProgress,
        ) else {
            panic!("expected analysis");
        };
        assert_eq!(analysis.report.failed(), 1);
        assert!(analysis.report.merged.is_empty());
    }

    #[test]
    fn test_unknown_directory_is_no_project() {
        let root = TempDir::new().unwrap();
        let outcome = plan(&request(root.path(), "/nowhere/at/all"), &config(root.path()));
        assert!(matches!(outcome, PlanOutcome::NoProject { .. }));
    }
}
