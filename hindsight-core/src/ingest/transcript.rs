//! Claude Code JSONL transcript parser
//!
//! Parses session logs from `~/.claude/projects/[encoded-path]/*.jsonl` into
//! typed [`Message`]s sorted by timestamp.
//!
//! # Error Handling
//!
//! The parser is designed to be resilient and recover from errors:
//!
//! - **Malformed JSON lines**: Counted, recorded in
//!   [`ParsedTranscript::warnings`], line skipped, parsing continues. Writers
//!   may truncate the final line when they crash mid-write.
//!
//! - **Missing fields**: Uses defaults via `#[serde(default)]`. A record
//!   without a timestamp inherits the previous record's timestamp (the Unix
//!   epoch for the first record), which keeps reparsing deterministic.
//!
//! - **Unknown record types**: `file-history-snapshot`, `system` and other
//!   bookkeeping records are counted in [`ParsedTranscript::ignored_records`].
//!
//! Only failing to open the file is an error.

use crate::error::{Error, Result};
use crate::types::{ContentBlock, Message, MessageKind, Payload};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Messages parsed from one transcript plus bookkeeping about skipped lines.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ParsedTranscript {
    /// Messages sorted ascending by timestamp (ties keep file order)
    pub messages: Vec<Message>,
    /// Lines that were not valid records
    pub malformed_lines: usize,
    /// Valid records of types that carry no conversation
    pub ignored_records: usize,
    /// Warnings encountered during parsing (non-fatal)
    pub warnings: Vec<String>,
}

// ============================================
// Raw JSONL record types (serde deserialization)
// ============================================

/// Represents a single line from a Claude Code transcript.
///
/// Uses `#[serde(default)]` liberally to handle missing fields gracefully.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawRecord {
    uuid: Option<String>,
    parent_uuid: Option<String>,
    session_id: Option<String>,
    #[serde(rename = "type")]
    record_type: Option<String>,
    timestamp: Option<String>,
    cwd: Option<String>,

    message: Option<RawMessage>,

    // Summary records
    summary: Option<String>,
    leaf_uuid: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawMessage {
    content: Option<RawContent>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawContent {
    Text(String),
    Blocks(Vec<RawBlock>),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum RawBlock {
    #[serde(rename = "text")]
    Text {
        #[serde(default, deserialize_with = "null_as_empty")]
        text: String,
    },
    #[serde(rename = "tool_use")]
    ToolUse {
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        #[serde(default)]
        tool_use_id: String,
        #[serde(default)]
        is_error: bool,
    },
    // Catch-all for images, thinking blocks and future block types
    #[serde(other)]
    Unknown,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Parse a transcript file.
///
/// Returns an error only when the file cannot be opened.
pub fn parse_file(path: &Path) -> Result<ParsedTranscript> {
    let file = File::open(path).map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to open {}: {}", path.display(), e),
        ))
    })?;

    let fallback_session_id = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();

    let parsed = parse_lines(BufReader::new(file), &fallback_session_id);

    if parsed.malformed_lines > 0 {
        tracing::warn!(
            path = %path.display(),
            malformed = parsed.malformed_lines,
            "Skipped malformed transcript lines"
        );
    }
    tracing::debug!(
        path = %path.display(),
        messages = parsed.messages.len(),
        ignored = parsed.ignored_records,
        "Parsed transcript"
    );

    Ok(parsed)
}

/// Parse transcript content already held in memory.
pub fn parse_str(content: &str, fallback_session_id: &str) -> ParsedTranscript {
    parse_lines(content.as_bytes(), fallback_session_id)
}

fn parse_lines<R: BufRead>(reader: R, fallback_session_id: &str) -> ParsedTranscript {
    let mut result = ParsedTranscript::default();
    let mut last_timestamp: DateTime<Utc> = DateTime::<Utc>::UNIX_EPOCH;

    for (index, line_result) in reader.lines().enumerate() {
        let line_number = index + 1;

        let line = match line_result {
            Ok(l) => l,
            Err(e) => {
                result.malformed_lines += 1;
                result
                    .warnings
                    .push(format!("Line {}: read error: {}", line_number, e));
                continue;
            }
        };

        // Skip empty lines
        if line.trim().is_empty() {
            continue;
        }

        let record: RawRecord = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                result.malformed_lines += 1;
                result
                    .warnings
                    .push(format!("Line {}: JSON parse error: {}", line_number, e));
                continue;
            }
        };

        // Records without a timestamp reuse the last seen one
        let timestamp = record
            .timestamp
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(last_timestamp);
        last_timestamp = timestamp;

        match record_to_message(record, timestamp, fallback_session_id, line_number) {
            Some(message) => result.messages.push(message),
            None => result.ignored_records += 1,
        }
    }

    // Stable sort keeps file order for equal timestamps
    result.messages.sort_by_key(|m| m.timestamp);
    result
}

/// Convert a raw record into a message, or `None` for non-conversation records.
fn record_to_message(
    record: RawRecord,
    timestamp: DateTime<Utc>,
    fallback_session_id: &str,
    line_number: usize,
) -> Option<Message> {
    let record_type = record.record_type.as_deref().unwrap_or("unknown");
    let session_id = record
        .session_id
        .clone()
        .unwrap_or_else(|| fallback_session_id.to_string());

    let (kind, id, payload) = match record_type {
        "user" | "assistant" => {
            let payload = record
                .message
                .and_then(|m| m.content)
                .map(convert_content)
                .unwrap_or_else(|| Payload::Text(String::new()));
            let kind = if record_type == "assistant" {
                MessageKind::Assistant
            } else if is_tool_result_only(&payload) {
                MessageKind::ToolResult
            } else {
                MessageKind::Human
            };
            let id = record
                .uuid
                .unwrap_or_else(|| format!("line-{}", line_number));
            (kind, id, payload)
        }
        "summary" => {
            let id = record
                .leaf_uuid
                .or(record.uuid)
                .unwrap_or_else(|| format!("line-{}", line_number));
            let payload = Payload::Text(record.summary.unwrap_or_default());
            (MessageKind::Summary, id, payload)
        }
        _ => return None,
    };

    Some(Message {
        kind,
        id,
        parent_id: record.parent_uuid,
        session_id,
        timestamp,
        cwd: record.cwd,
        payload,
    })
}

fn convert_content(content: RawContent) -> Payload {
    match content {
        RawContent::Text(text) => Payload::Text(text),
        RawContent::Blocks(blocks) => Payload::Blocks(
            blocks
                .into_iter()
                .filter_map(|block| match block {
                    RawBlock::Text { text } => Some(ContentBlock::Text { text }),
                    RawBlock::ToolUse { name, input } => Some(ContentBlock::ToolUse { name, input }),
                    RawBlock::ToolResult {
                        tool_use_id,
                        is_error,
                    } => Some(ContentBlock::ToolResult {
                        tool_use_id,
                        is_error,
                    }),
                    RawBlock::Unknown => None,
                })
                .collect(),
        ),
    }
}

fn is_tool_result_only(payload: &Payload) -> bool {
    match payload {
        Payload::Blocks(blocks) => {
            !blocks.is_empty()
                && blocks
                    .iter()
                    .all(|b| matches!(b, ContentBlock::ToolResult { .. }))
        }
        Payload::Text(_) => false,
    }
}
