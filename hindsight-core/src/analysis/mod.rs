//! Batch analysis orchestration.
//!
//! Each batch becomes one prompt and one collaborator call. Calls run strictly
//! one after another with a fixed delay in between. A batch whose call fails
//! or whose response cannot be decoded contributes nothing to the merged
//! result, and the run carries on with the next batch.

pub mod client;
pub mod progress;
pub mod prompt;
pub mod response;

pub use client::{create_client, AnalysisClient, ClaudeCliClient, HttpAnalysisClient};
pub use progress::{NoProgress, ProgressReporter};
pub use prompt::{build_prompt, FINGERPRINTS};
pub use response::{parse_response, DecodedAnalysis, RecoveryStage};

use crate::batch::estimate_tokens;
use crate::config::AnalysisConfig;
use crate::error::{Error, Result};
use crate::guard::PollutionGuard;
use crate::merge::merge;
use crate::types::{AnalysisResult, Batch};
use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::time::Duration;

/// How one batch ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchStatus {
    /// Response decoded; lists the fields that received defaults
    Analyzed { defaulted_fields: Vec<String> },
    /// Response received but no analysis could be recovered from it
    FormatError { message: String },
    /// The collaborator call itself failed
    CallFailed { message: String },
}

impl BatchStatus {
    pub fn is_analyzed(&self) -> bool {
        matches!(self, BatchStatus::Analyzed { .. })
    }
}

/// Per-batch record kept in the run report.
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub index: usize,
    pub message_count: usize,
    pub estimated_tokens: usize,
    /// SHA-256 of the prompt, hex encoded
    pub prompt_hash: String,
    #[serde(flatten)]
    pub status: BatchStatus,
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub merged: AnalysisResult,
    pub outcomes: Vec<BatchOutcome>,
    pub calls_made: usize,
    /// Estimated tokens of all prompts sent
    pub tokens_sent: usize,
    /// Estimated transcript tokens in batches that were analyzed
    pub tokens_analyzed: usize,
}

impl RunReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.status.is_analyzed()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// Runs batches through an [`AnalysisClient`].
pub struct Analyzer<'a> {
    client: &'a dyn AnalysisClient,
    max_batch_tokens: usize,
    call_delay: Duration,
}

impl<'a> Analyzer<'a> {
    pub fn new(client: &'a dyn AnalysisClient, config: &AnalysisConfig) -> Self {
        Self {
            client,
            max_batch_tokens: config.max_batch_tokens,
            call_delay: Duration::from_millis(config.call_delay_ms),
        }
    }

    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = delay;
        self
    }

    /// Analyze one batch with a single collaborator call.
    pub fn analyze_batch(&self, batch: &Batch) -> Result<DecodedAnalysis> {
        let prompt = build_prompt(batch, self.max_batch_tokens);
        let raw = self.client.complete(&prompt)?;
        parse_response(&raw)
    }

    /// Analyze `batches` in order and merge the successful results.
    ///
    /// When a guard is given, every call is followed by
    /// [`PollutionGuard::observe_call`]. Cleanup is left to the caller.
    pub fn run(
        &self,
        batches: &[Batch],
        progress: &mut dyn ProgressReporter,
        mut guard: Option<&mut PollutionGuard>,
    ) -> RunReport {
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!("analysis_run", run_id = %run_id, batches = batches.len());
        let _enter = span.enter();

        progress.on_start(batches.len());
        let mut results = Vec::new();
        let mut outcomes = Vec::with_capacity(batches.len());
        let mut tokens_sent = 0usize;
        let mut tokens_analyzed = 0usize;

        for (index, batch) in batches.iter().enumerate() {
            if index > 0 && !self.call_delay.is_zero() {
                std::thread::sleep(self.call_delay);
            }
            progress.on_batch_start(index, batches.len(), batch.estimated_tokens);

            let prompt = build_prompt(batch, self.max_batch_tokens);
            let prompt_hash = prompt_hash(&prompt);
            tokens_sent += estimate_tokens(&prompt);

            let started_at = Utc::now();
            let response = self.client.complete(&prompt);
            if let Some(guard) = guard.as_deref_mut() {
                guard.observe_call(started_at);
            }

            let status = match response.and_then(|raw| parse_response(&raw)) {
                Ok(decoded) => {
                    tracing::info!(
                        index,
                        messages = batch.messages.len(),
                        defaulted = decoded.defaulted.len(),
                        "Batch analyzed"
                    );
                    tokens_analyzed += batch.estimated_tokens;
                    results.push(decoded.result);
                    BatchStatus::Analyzed {
                        defaulted_fields: decoded.defaulted,
                    }
                }
                Err(Error::AnalysisFormat(message)) => {
                    tracing::warn!(index, error = %message, "Unusable analysis response");
                    BatchStatus::FormatError { message }
                }
                Err(e) => {
                    tracing::warn!(index, error = %e, "Analysis call failed");
                    BatchStatus::CallFailed {
                        message: e.to_string(),
                    }
                }
            };

            progress.on_batch_done(index, &status);
            outcomes.push(BatchOutcome {
                index,
                message_count: batch.messages.len(),
                estimated_tokens: batch.estimated_tokens,
                prompt_hash,
                status,
            });
        }

        progress.on_finish();
        let report = RunReport {
            run_id,
            merged: merge(&results),
            calls_made: outcomes.len(),
            outcomes,
            tokens_sent,
            tokens_analyzed,
        };
        tracing::info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            tokens_sent = report.tokens_sent,
            "Analysis run finished"
        );
        report
    }
}

/// Hex-encoded SHA-256 of a prompt.
pub fn prompt_hash(prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Message, MessageKind, Payload};
    use std::cell::RefCell;

    struct MockClient {
        responses: RefCell<Vec<Result<String>>>,
        prompts: RefCell<Vec<String>>,
    }

    impl MockClient {
        fn new(responses: Vec<Result<String>>) -> Self {
            Self {
                responses: RefCell::new(responses.into_iter().rev().collect()),
                prompts: RefCell::new(Vec::new()),
            }
        }
    }

    impl AnalysisClient for MockClient {
        fn complete(&self, prompt: &str) -> Result<String> {
            self.prompts.borrow_mut().push(prompt.to_string());
            self.responses
                .borrow_mut()
                .pop()
                .unwrap_or_else(|| Err(Error::Llm("no more responses".to_string())))
        }
    }

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl ProgressReporter for Recorder {
        fn on_start(&mut self, total: usize) {
            self.events.push(format!("start {total}"));
        }
        fn on_batch_start(&mut self, index: usize, _total: usize, _tokens: usize) {
            self.events.push(format!("batch {index}"));
        }
        fn on_batch_done(&mut self, index: usize, status: &BatchStatus) {
            self.events
                .push(format!("done {index} {}", status.is_analyzed()));
        }
        fn on_finish(&mut self) {
            self.events.push("finish".to_string());
        }
    }

    fn batch(text: &str) -> Batch {
        let message = Message {
            kind: MessageKind::Human,
            id: "m".to_string(),
            parent_id: None,
            session_id: "s".to_string(),
            timestamp: Utc::now(),
            cwd: None,
            payload: Payload::Text(text.to_string()),
        };
        Batch {
            estimated_tokens: estimate_tokens(text),
            messages: vec![message],
        }
    }

    fn config() -> AnalysisConfig {
        AnalysisConfig {
            max_batch_tokens: 1000,
            call_delay_ms: 0,
            max_sessions: None,
        }
    }

    #[test]
    fn test_failed_batches_contribute_nothing() {
        let client = MockClient::new(vec![
            Ok(r#"{"recommendations": ["Use pnpm"]}"#.to_string()),
            Err(Error::Llm("rate limited".to_string())),
            Ok("sorry, no JSON today".to_string()),
            Ok("```json\n{\"recommendations\": [\"Run tests first\"]}\n```".to_string()),
        ]);
        let analyzer = Analyzer::new(&client, &config());
        let batches = vec![batch("one"), batch("two"), batch("three"), batch("four")];

        let mut recorder = Recorder::default();
        let report = analyzer.run(&batches, &mut recorder, None);

        assert_eq!(report.calls_made, 4);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 2);
        assert!(matches!(report.outcomes[1].status, BatchStatus::CallFailed { .. }));
        assert!(matches!(report.outcomes[2].status, BatchStatus::FormatError { .. }));
        assert_eq!(
            report.merged.recommendations,
            vec!["Use pnpm", "Run tests first"]
        );
        assert_eq!(
            report.tokens_analyzed,
            batches[0].estimated_tokens + batches[3].estimated_tokens
        );
        assert_eq!(recorder.events.first().map(String::as_str), Some("start 4"));
        assert_eq!(recorder.events.last().map(String::as_str), Some("finish"));
        assert!(recorder.events.contains(&"done 1 false".to_string()));
    }

    #[test]
    fn test_prompt_hash_matches_sent_prompt() {
        let client = MockClient::new(vec![Ok("{}".to_string())]);
        let analyzer = Analyzer::new(&client, &config());
        let report = analyzer.run(&[batch("hello")], &mut NoProgress, None);

        let sent = client.prompts.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(report.outcomes[0].prompt_hash, prompt_hash(&sent[0]));
        assert_eq!(report.outcomes[0].prompt_hash.len(), 64);
        assert_eq!(report.tokens_sent, estimate_tokens(&sent[0]));
    }

    #[test]
    fn test_analyze_batch_surfaces_errors() {
        let client = MockClient::new(vec![Ok("not json".to_string())]);
        let analyzer = Analyzer::new(&client, &config());
        assert!(matches!(
            analyzer.analyze_batch(&batch("x")),
            Err(Error::AnalysisFormat(_))
        ));
        assert!(matches!(
            analyzer.analyze_batch(&batch("x")),
            Err(Error::Llm(_))
        ));
    }

    #[test]
    fn test_call_delay_only_between_calls() {
        let client = MockClient::new(vec![Ok("{}".to_string())]);
        let analyzer =
            Analyzer::new(&client, &config()).with_call_delay(Duration::from_secs(30));
        let started = std::time::Instant::now();
        analyzer.run(&[batch("only")], &mut NoProgress, None);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_empty_run() {
        let client = MockClient::new(vec![]);
        let analyzer = Analyzer::new(&client, &config());
        let report = analyzer.run(&[], &mut NoProgress, None);
        assert_eq!(report.calls_made, 0);
        assert!(report.merged.is_empty());
        assert!(!report.run_id.is_empty());
    }
}
