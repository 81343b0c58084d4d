//! Analysis collaborator adapters.

use crate::config::{LlmConfig, LlmProvider};
use crate::error::{Error, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::json;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

const SYSTEM_PROMPT: &str =
    "You analyze coding-assistant transcripts and answer with a single JSON object only.";
const CLAUDE_MAX_TOKENS: u32 = 4096;

/// Tools the print-mode CLI must never use while analyzing.
const DISALLOWED_TOOLS: &[&str] = &[
    "Bash", "Edit", "Write", "MultiEdit", "NotebookEdit", "Read", "Glob", "Grep", "WebFetch",
    "WebSearch", "Task", "TodoWrite",
];

/// Text completion interface for the analysis collaborator.
pub trait AnalysisClient {
    fn complete(&self, prompt: &str) -> Result<String>;
}

/// Create the client selected by `llm.provider`.
pub fn create_client(llm: &LlmConfig) -> Result<Box<dyn AnalysisClient>> {
    match llm.provider {
        LlmProvider::ClaudeCli => Ok(Box::new(ClaudeCliClient::new(llm))),
        _ => Ok(Box::new(HttpAnalysisClient::new(llm)?)),
    }
}

/// Runs `claude --print` for one turn with tools disabled.
///
/// The prompt is written to stdin so it never shows up in process listings.
pub struct ClaudeCliClient {
    program: PathBuf,
    model: String,
    working_dir: Option<PathBuf>,
}

impl ClaudeCliClient {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            program: config
                .cli_path
                .clone()
                .unwrap_or_else(|| PathBuf::from("claude")),
            model: config.model.clone(),
            working_dir: None,
        }
    }

    /// Run the CLI from `dir` instead of the current directory.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--print")
            .arg("--output-format")
            .arg("text")
            .arg("--max-turns")
            .arg("1");
        if !self.model.trim().is_empty() {
            cmd.arg("--model").arg(&self.model);
        }
        cmd.arg("--disallowedTools").arg(DISALLOWED_TOOLS.join(","));
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

impl AnalysisClient for ClaudeCliClient {
    fn complete(&self, prompt: &str) -> Result<String> {
        let mut child = self.command().spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::Llm(format!(
                    "`{}` not found. Install Claude Code or set llm.cli_path",
                    self.program.display()
                ))
            } else {
                Error::Llm(format!("failed to start {}: {e}", self.program.display()))
            }
        })?;

        // stdin is closed at the end of this block so the child sees EOF
        let write_error = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(prompt.as_bytes()).err(),
            None => None,
        };

        let output = child
            .wait_with_output()
            .map_err(|e| Error::Llm(format!("failed to wait for claude: {e}")))?;
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            return Err(Error::Llm(format!(
                "claude exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        if let Some(e) = write_error {
            return Err(Error::Llm(format!(
                "failed to write prompt to claude: {e}: {}",
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if stdout.is_empty() {
            return Err(Error::Llm("claude returned an empty response".to_string()));
        }
        Ok(stdout)
    }
}

/// HTTP client for Ollama, the Anthropic Messages API and OpenAI Chat Completions.
pub struct HttpAnalysisClient {
    model: String,
    provider: LlmProvider,
    endpoint: String,
    api_key: Option<String>,
    runtime: tokio::runtime::Runtime,
    http: reqwest::Client,
}

impl HttpAnalysisClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        if config.provider == LlmProvider::ClaudeCli {
            return Err(Error::Config(
                "claude-cli provider has no HTTP endpoint".to_string(),
            ));
        }

        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| config.provider.default_endpoint().to_string());
        let api_key = match config.provider {
            LlmProvider::ClaudeCli | LlmProvider::Ollama => None,
            LlmProvider::Claude => config
                .api_key
                .clone()
                .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok()),
            LlmProvider::OpenAI => config
                .api_key
                .clone()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok()),
        };

        if matches!(config.provider, LlmProvider::Claude | LlmProvider::OpenAI) && api_key.is_none()
        {
            return Err(Error::Config(
                "llm.api_key (or provider env var) is required".to_string(),
            ));
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Llm(format!("failed to build tokio runtime: {e}")))?;
        let timeout_secs = config.timeout_secs.max(1);
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Error::Llm(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            model: config.model.clone(),
            provider: config.provider,
            endpoint,
            api_key,
            runtime,
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.endpoint.trim_end_matches('/'))
    }

    async fn post(
        &self,
        name: &str,
        url: String,
        headers: HeaderMap,
        body: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let resp = self
            .http
            .post(url)
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Llm(format!("{name} request failed: {e}")))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| Error::Llm(format!("{name} read body failed: {e}")))?;
        if !status.is_success() {
            return Err(Error::Llm(format!(
                "{name} returned {}: {}",
                status.as_u16(),
                text
            )));
        }
        Ok(serde_json::from_str(&text)?)
    }

    fn json_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }
}

impl AnalysisClient for HttpAnalysisClient {
    fn complete(&self, prompt: &str) -> Result<String> {
        let api_key = self.api_key.as_deref().unwrap_or_default();
        self.runtime.block_on(async {
            match self.provider {
                LlmProvider::ClaudeCli => Err(Error::Config(
                    "claude-cli provider has no HTTP endpoint".to_string(),
                )),
                LlmProvider::Ollama => {
                    let json = self
                        .post(
                            "ollama",
                            self.url("/api/generate"),
                            Self::json_headers(),
                            json!({
                                "model": self.model,
                                "system": SYSTEM_PROMPT,
                                "prompt": prompt,
                                "stream": false,
                            }),
                        )
                        .await?;
                    json.get("response")
                        .and_then(|v| v.as_str())
                        .map(ToString::to_string)
                        .ok_or_else(|| {
                            Error::Llm(
                                "ollama response missing string field `response`".to_string(),
                            )
                        })
                }
                LlmProvider::Claude => {
                    let mut headers = Self::json_headers();
                    headers.insert(
                        "x-api-key",
                        HeaderValue::from_str(api_key).map_err(|e| {
                            Error::Llm(format!("invalid claude api key header: {e}"))
                        })?,
                    );
                    headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));

                    let json = self
                        .post(
                            "claude",
                            self.url("/v1/messages"),
                            headers,
                            json!({
                                "model": self.model,
                                "max_tokens": CLAUDE_MAX_TOKENS,
                                "temperature": 0,
                                "system": SYSTEM_PROMPT,
                                "messages": [{ "role": "user", "content": prompt }],
                            }),
                        )
                        .await?;
                    json.get("content")
                        .and_then(|v| v.as_array())
                        .and_then(|arr| arr.first())
                        .and_then(|v| v.get("text"))
                        .and_then(|v| v.as_str())
                        .map(ToString::to_string)
                        .ok_or_else(|| {
                            Error::Llm("claude response missing content[0].text".to_string())
                        })
                }
                LlmProvider::OpenAI => {
                    let mut headers = Self::json_headers();
                    headers.insert(
                        AUTHORIZATION,
                        HeaderValue::from_str(&format!("Bearer {api_key}"))
                            .map_err(|e| Error::Llm(format!("invalid auth header: {e}")))?,
                    );

                    let json = self
                        .post(
                            "openai",
                            self.url("/v1/chat/completions"),
                            headers,
                            json!({
                                "model": self.model,
                                "temperature": 0,
                                "messages": [
                                    { "role": "system", "content": SYSTEM_PROMPT },
                                    { "role": "user", "content": prompt }
                                ]
                            }),
                        )
                        .await?;
                    json.get("choices")
                        .and_then(|v| v.as_array())
                        .and_then(|arr| arr.first())
                        .and_then(|v| v.get("message"))
                        .and_then(|v| v.get("content"))
                        .and_then(|v| v.as_str())
                        .map(ToString::to_string)
                        .ok_or_else(|| {
                            Error::Llm(
                                "openai response missing choices[0].message.content".to_string(),
                            )
                        })
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn llm(provider: LlmProvider) -> LlmConfig {
        LlmConfig {
            provider,
            model: "test-model".to_string(),
            endpoint: None,
            api_key: None,
            timeout_secs: 5,
            cli_path: None,
        }
    }

    #[test]
    fn test_missing_cli_reports_install_hint() {
        let mut config = llm(LlmProvider::ClaudeCli);
        config.cli_path = Some(PathBuf::from("/nonexistent/hindsight-test/claude"));
        let client = create_client(&config).unwrap();

        let err = client.complete("hello").unwrap_err();
        match err {
            Error::Llm(msg) => assert!(msg.contains("not found"), "{msg}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_cli_exiting_early_reports_stderr() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("claude");
        std::fs::write(&script, "#!/bin/sh\necho 'not logged in' >&2\nexit 3\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut config = llm(LlmProvider::ClaudeCli);
        config.cli_path = Some(script);
        let client = ClaudeCliClient::new(&config);

        // Large enough to overflow the pipe buffer after the child has exited
        let prompt = "x".repeat(1 << 20);
        match client.complete(&prompt).unwrap_err() {
            Error::Llm(msg) => assert!(msg.contains("not logged in"), "{msg}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_cli_command_disables_tools_and_limits_turns() {
        let client = ClaudeCliClient::new(&llm(LlmProvider::ClaudeCli)).with_working_dir("/tmp");
        let cmd = client.command();
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(cmd.get_program(), "claude");
        assert!(args.windows(2).any(|w| w == ["--max-turns", "1"]));
        assert!(args.windows(2).any(|w| w == ["--model", "test-model"]));
        let tools_idx = args.iter().position(|a| a == "--disallowedTools").unwrap();
        assert!(args[tools_idx + 1].contains("Bash"));
        assert_eq!(cmd.get_current_dir(), Some(std::path::Path::new("/tmp")));
    }

    #[test]
    fn test_http_client_requires_api_key() {
        let mut config = llm(LlmProvider::OpenAI);
        config.api_key = None;
        config.endpoint = Some("http://127.0.0.1:9".to_string());
        // Only fails when the env var is not set in the test environment
        if std::env::var("OPENAI_API_KEY").is_err() {
            assert!(matches!(
                HttpAnalysisClient::new(&config),
                Err(Error::Config(_))
            ));
        }
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let config = llm(LlmProvider::Ollama);
        let client = HttpAnalysisClient::new(&config).unwrap();
        assert_eq!(client.url("/api/generate"), "http://localhost:11434/api/generate");
    }
}
