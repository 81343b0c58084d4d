//! Core domain types for hindsight
//!
//! These types model the transcript store (sessions and their messages), the
//! units of work handed to the analysis collaborator, and the findings it
//! returns.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Transcript** | A line-delimited JSON file holding one conversation session |
//! | **Session** | One transcript file on disk |
//! | **Project** | The sessions the resolver associates with one working directory |
//! | **Batch** | A token-budgeted, chronologically contiguous slice of messages |
//! | **Finding** | A mistake or success with the lesson learned from it |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Placeholder the collaborator uses (and the decoder fills in) for facts it
/// could not infer.
pub const UNKNOWN: &str = "unknown";

// ============================================
// Messages
// ============================================

/// What kind of transcript entry a message is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// A turn typed by the person using the assistant
    Human,
    /// A turn produced by the assistant
    Assistant,
    /// A summary the assistant tool wrote for the session
    Summary,
    /// A user-role record that only carries tool output
    ToolResult,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Human => "human",
            MessageKind::Assistant => "assistant",
            MessageKind::Summary => "summary",
            MessageKind::ToolResult => "tool_result",
        }
    }

    /// Tag used for this kind inside analysis prompts.
    pub fn prompt_tag(&self) -> &'static str {
        match self {
            MessageKind::Human => "USER",
            MessageKind::Assistant => "ASSISTANT",
            MessageKind::Summary => "SUMMARY",
            MessageKind::ToolResult => "TOOL",
        }
    }

    /// Whether messages of this kind carry conversation worth analyzing.
    pub fn is_conversational(&self) -> bool {
        !matches!(self, MessageKind::ToolResult)
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A typed content block inside a message payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        is_error: bool,
    },
}

/// Message payload: either a bare string or a list of typed blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl Payload {
    /// Text parts of the payload. Tool invocations and tool results are ignored.
    pub fn text_parts(&self) -> Vec<String> {
        match self {
            Payload::Text(text) if text.is_empty() => vec![],
            Payload::Text(text) => vec![text.clone()],
            Payload::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } if !text.is_empty() => Some(text.clone()),
                    _ => None,
                })
                .collect(),
        }
    }
}

/// One transcript entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub kind: MessageKind,
    /// Unique id of the record (`uuid`, or `leafUuid` for summaries)
    pub id: String,
    /// Parent record; links messages into a thread tree
    pub parent_id: Option<String>,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    /// Working directory at capture time
    pub cwd: Option<String>,
    pub payload: Payload,
}

impl Message {
    /// Text parts of the payload.
    pub fn text_parts(&self) -> Vec<String> {
        self.payload.text_parts()
    }

    /// All text parts joined with newlines.
    pub fn text(&self) -> String {
        self.text_parts().join("\n")
    }
}

// ============================================
// Sessions & Projects
// ============================================

/// One transcript file on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Identifier taken from the file stem
    pub id: String,
    /// Absolute path to the `.jsonl` file
    pub path: PathBuf,
    pub modified_at: DateTime<Utc>,
    pub size_bytes: u64,
    /// Number of messages, once the transcript has been parsed
    pub message_count: Option<usize>,
}

/// How confidently a project directory was matched to the working directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchKind {
    /// A decoded directory name equals the working directory
    ExactPath,
    /// The final path segment matches
    ProjectName,
    /// Trailing path segments overlap
    PartialPath,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKind::ExactPath => "exact-path",
            MatchKind::ProjectName => "project-name",
            MatchKind::PartialPath => "partial-path",
        }
    }
}

impl std::fmt::Display for MatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A directory of sessions in the transcript store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Directory name as stored (e.g. `-home-u-proj`)
    pub encoded_name: String,
    /// Best decoded path for display
    pub display_name: String,
    /// Absolute path of the project directory inside the store
    pub dir: PathBuf,
    /// Sessions, newest first
    pub sessions: Vec<Session>,
    /// Grows with recency and aggregate transcript size
    pub activity_score: f64,
    pub match_kind: MatchKind,
}

impl Project {
    /// Modification time of the newest session.
    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.sessions.iter().map(|s| s.modified_at).max()
    }

    /// Total bytes across all sessions.
    pub fn total_bytes(&self) -> u64 {
        self.sessions.iter().map(|s| s.size_bytes).sum()
    }
}

// ============================================
// Batches
// ============================================

/// A contiguous, chronologically ordered slice of messages sent in one call.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub messages: Vec<Message>,
    /// Sum of the estimated token cost of `messages`
    pub estimated_tokens: usize,
}

// ============================================
// Analysis results
// ============================================

/// A mistake or success observed in the transcripts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Finding {
    /// What happened
    pub description: String,
    /// The reusable lesson
    pub lesson: String,
    /// Quote or pointer supporting the finding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

/// What the collaborator inferred about the person using the assistant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub os: String,
    pub verbosity: String,
    pub tech_level: String,
    pub patience: String,
    pub restrictions: Vec<String>,
    pub tools: Vec<String>,
    pub boundaries: Vec<String>,
    pub preferences: Vec<String>,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            os: UNKNOWN.to_string(),
            verbosity: UNKNOWN.to_string(),
            tech_level: UNKNOWN.to_string(),
            patience: UNKNOWN.to_string(),
            restrictions: vec![],
            tools: vec![],
            boundaries: vec![],
            preferences: vec![],
        }
    }
}

/// Structured findings for one batch, or the merged findings for a run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub mistakes: Vec<Finding>,
    pub successes: Vec<Finding>,
    pub user_profile: UserProfile,
    pub recommendations: Vec<String>,
}

impl AnalysisResult {
    /// True when the result carries no findings and no inferred facts.
    pub fn is_empty(&self) -> bool {
        self.mistakes.is_empty()
            && self.successes.is_empty()
            && self.recommendations.is_empty()
            && self.user_profile == UserProfile::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_text_parts_bare_string() {
        let payload = Payload::Text("hello".to_string());
        assert_eq!(payload.text_parts(), vec!["hello".to_string()]);

        let empty = Payload::Text(String::new());
        assert!(empty.text_parts().is_empty());
    }

    #[test]
    fn test_payload_text_parts_ignores_tool_blocks() {
        let payload = Payload::Blocks(vec![
            ContentBlock::Text {
                text: "first".to_string(),
            },
            ContentBlock::ToolUse {
                name: "Bash".to_string(),
                input: serde_json::json!({"command": "ls"}),
            },
            ContentBlock::ToolResult {
                tool_use_id: "toolu_1".to_string(),
                is_error: false,
            },
            ContentBlock::Text {
                text: "second".to_string(),
            },
        ]);
        assert_eq!(
            payload.text_parts(),
            vec!["first".to_string(), "second".to_string()]
        );
    }

    #[test]
    fn test_match_kind_serializes_kebab_case() {
        let json = serde_json::to_string(&MatchKind::ExactPath).unwrap();
        assert_eq!(json, "\"exact-path\"");
        assert_eq!(MatchKind::PartialPath.to_string(), "partial-path");
    }

    #[test]
    fn test_empty_analysis_result() {
        assert!(AnalysisResult::default().is_empty());

        let mut result = AnalysisResult::default();
        result.user_profile.os = "macOS".to_string();
        assert!(!result.is_empty());
    }
}
