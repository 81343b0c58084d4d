//! Analysis prompt construction
//!
//! Every prompt starts with [`PROMPT_MARKER`] and contains
//! [`SCHEMA_SENTINEL`]. The analysis collaborator may record prompts in the
//! same transcript store hindsight reads, and these substrings are how such
//! transcripts are recognised (see [`crate::guard`]). Both must survive JSON
//! string escaping unchanged: no quotes, backslashes or control characters.

use crate::types::Batch;

/// First line of every analysis prompt.
pub const PROMPT_MARKER: &str = "[hindsight:transcript-analysis:v1]";

/// Phrase embedded in the output instructions of every analysis prompt.
pub const SCHEMA_SENTINEL: &str = "hindsight-insight-schema";

/// Substrings that identify transcripts created by hindsight's own prompts.
pub const FINGERPRINTS: &[&str] = &[PROMPT_MARKER, SCHEMA_SENTINEL];

/// Characters per token used to size the per-message truncation budget.
const CHARS_PER_TOKEN: usize = 4;

const TRUNCATION_NOTE: &str = " ...[truncated]";

const INSTRUCTIONS: &str = "\
You are reviewing an excerpt of past conversations between a developer and an AI coding assistant. \
Extract reusable behavioral insights that would help the assistant work better with this developer in future sessions.

Look for:
- mistakes: things the assistant did that the developer corrected, rejected or had to repeat
- successes: approaches the developer approved of or that clearly worked
- user_profile: facts about the developer and their environment
- recommendations: concrete instructions the assistant should follow next time

Only report what the excerpt supports. Prefer specific, actionable lessons over generic advice.";

const SCHEMA: &str = r#"{
  "mistakes": [{"description": "what went wrong", "lesson": "what to do instead", "evidence": "short quote"}],
  "successes": [{"description": "what worked", "lesson": "what to keep doing", "evidence": "short quote"}],
  "user_profile": {
    "os": "operating system or unknown",
    "verbosity": "preferred answer length or unknown",
    "tech_level": "expertise level or unknown",
    "patience": "tolerance for mistakes or unknown",
    "restrictions": ["things the developer forbids"],
    "tools": ["tools, languages and frameworks in use"],
    "boundaries": ["actions that need explicit permission"],
    "preferences": ["stylistic or workflow preferences"]
  },
  "recommendations": ["instruction for future sessions"]
}"#;

/// Build the prompt for one batch.
///
/// `max_batch_tokens` bounds the prompt: a single message longer than the
/// batch budget is truncated to it.
pub fn build_prompt(batch: &Batch, max_batch_tokens: usize) -> String {
    let max_message_chars = max_batch_tokens.saturating_mul(CHARS_PER_TOKEN).max(1);

    let mut transcript = String::new();
    for msg in &batch.messages {
        let text = msg.text();
        let body = truncate_chars(&text, max_message_chars);
        transcript.push_str(&format!(
            "[{}] [{}] {}\n",
            msg.timestamp.to_rfc3339(),
            msg.kind.prompt_tag(),
            body
        ));
    }

    format!(
        "{PROMPT_MARKER}\n{INSTRUCTIONS}\n\n\
         Respond with a single JSON object ({SCHEMA_SENTINEL}) shaped like this and nothing else:\n\
         {SCHEMA}\n\
         Use \"unknown\" for profile facts the excerpt does not reveal and [] for empty lists.\n\n\
         === TRANSCRIPT EXCERPT ({} messages) ===\n{}=== END EXCERPT ===\n\nReturn only JSON.",
        batch.messages.len(),
        transcript
    )
}

/// True when `content` contains any analysis prompt fingerprint.
pub fn has_fingerprint(content: &str) -> bool {
    FINGERPRINTS.iter().any(|f| content.contains(f))
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}{}", &text[..byte_idx], TRUNCATION_NOTE),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Message, MessageKind, Payload};
    use chrono::{TimeZone, Utc};

    fn message(kind: MessageKind, text: &str) -> Message {
        Message {
            kind,
            id: "m".to_string(),
            parent_id: None,
            session_id: "s".to_string(),
            timestamp: Utc.with_ymd_and_hms(2025, 1, 10, 10, 0, 0).unwrap(),
            cwd: None,
            payload: Payload::Text(text.to_string()),
        }
    }

    fn batch(messages: Vec<Message>) -> Batch {
        Batch {
            messages,
            estimated_tokens: 0,
        }
    }

    #[test]
    fn test_prompt_carries_fingerprints_and_role_tags() {
        let prompt = build_prompt(
            &batch(vec![
                message(MessageKind::Human, "please use pnpm"),
                message(MessageKind::Assistant, "Sure, switching to pnpm."),
            ]),
            1000,
        );

        assert!(prompt.starts_with(PROMPT_MARKER));
        assert!(has_fingerprint(&prompt));
        assert!(FINGERPRINTS.iter().all(|f| prompt.contains(f)));
        assert!(prompt.contains("[2025-01-10T10:00:00+00:00] [USER] please use pnpm"));
        assert!(prompt.contains("[ASSISTANT] Sure, switching to pnpm."));
        assert!(prompt.contains("(2 messages)"));
    }

    #[test]
    fn test_fingerprints_survive_json_escaping() {
        let prompt = build_prompt(&batch(vec![message(MessageKind::Human, "hi")]), 100);
        let escaped = serde_json::to_string(&prompt).unwrap();
        assert!(has_fingerprint(&escaped));
        for fingerprint in FINGERPRINTS {
            assert!(escaped.contains(fingerprint));
        }
    }

    #[test]
    fn test_oversized_message_is_truncated() {
        let long = "é".repeat(500);
        let prompt = build_prompt(&batch(vec![message(MessageKind::Human, &long)]), 10);
        assert!(prompt.contains(&format!("{}{}", "é".repeat(40), TRUNCATION_NOTE)));
        assert!(!prompt.contains(&"é".repeat(41)));
    }

    #[test]
    fn test_plain_text_has_no_fingerprint() {
        assert!(!has_fingerprint("just a normal conversation about hindsight"));
    }
}
