//! Collaborator response parsing
//!
//! Responses are expected to hold one JSON object, but models wrap it in code
//! fences, surround it with prose, or get the quoting wrong. Recovery runs in
//! three stages:
//!
//! 1. parse directly after stripping optional code fences
//! 2. parse the substring from the first `{` to the last `}`
//! 3. apply [`REPAIRS`] in order, retrying after each one
//!
//! The recovered value is then decoded against the analysis schema, filling
//! defaults for missing fields and reporting which fields were defaulted.

use crate::error::{Error, Result};
use crate::types::{AnalysisResult, Finding, UserProfile, UNKNOWN};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

/// A pure repair transform. Returns `None` when it has nothing to fix.
pub type Repair = fn(&str) -> Option<String>;

/// Repairs for known quoting mistakes, applied cumulatively in this order.
pub const REPAIRS: &[(&str, Repair)] = &[
    ("smart_quotes", repair_smart_quotes),
    ("trailing_commas", repair_trailing_commas),
    ("single_quoted_keys", repair_single_quoted_keys),
    ("single_quoted_values", repair_single_quoted_values),
    ("unquoted_keys", repair_unquoted_keys),
];

static SMART_DOUBLE_QUOTES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\u{201C}\u{201D}\u{201E}\u{201F}]").unwrap());
static TRAILING_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r",(\s*[}\]])").unwrap());
static SINGLE_QUOTED_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"'([A-Za-z_][A-Za-z0-9_]*)'(\s*:)").unwrap());
static SINGLE_QUOTED_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([:\[,]\s*)'([^'"\\]*)'(\s*[,}\]])"#).unwrap());
static UNQUOTED_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)(\s*:)").unwrap());

/// Which recovery stage produced the JSON value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStage {
    /// Parsed as-is (after fence stripping)
    Direct,
    /// Parsed from the outermost brace pair
    Extracted,
    /// Parsed after the named repair (and all repairs before it)
    Repaired(&'static str),
}

/// A decoded analysis plus how it was obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAnalysis {
    pub result: AnalysisResult,
    /// Field paths that were missing or invalid and received defaults
    pub defaulted: Vec<String>,
    pub stage: RecoveryStage,
}

/// Recover and decode a raw collaborator response.
pub fn parse_response(raw: &str) -> Result<DecodedAnalysis> {
    let (value, stage) = recover_json(raw)?;
    let (result, defaulted) = decode_analysis(&value)?;
    if stage != RecoveryStage::Direct {
        tracing::debug!(stage = ?stage, "Recovered analysis JSON");
    }
    Ok(DecodedAnalysis {
        result,
        defaulted,
        stage,
    })
}

/// Run the recovery ladder, returning the first JSON object it produces.
pub fn recover_json(raw: &str) -> Result<(Value, RecoveryStage)> {
    let unfenced = strip_code_fences(raw);
    if let Some(value) = parse_object(unfenced) {
        return Ok((value, RecoveryStage::Direct));
    }

    let extracted = extract_json_object(unfenced);
    if let Some(value) = extracted.and_then(parse_object) {
        return Ok((value, RecoveryStage::Extracted));
    }

    let mut current = extracted.unwrap_or(unfenced).to_string();
    for &(name, repair) in REPAIRS {
        if let Some(repaired) = repair(&current) {
            current = repaired;
            if let Some(value) = parse_object(&current) {
                return Ok((value, RecoveryStage::Repaired(name)));
            }
        }
    }

    Err(Error::AnalysisFormat(format!(
        "no JSON object could be recovered from {} bytes of response",
        raw.len()
    )))
}

/// Remove a surrounding Markdown code fence, if any.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") on the opening fence line
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// Substring from the first `{` to the last `}`, if well ordered.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&raw[start..=end])
}

fn parse_object(candidate: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(value) if value.is_object() => Some(value),
        _ => None,
    }
}

fn replace_if_match(re: &Regex, input: &str, replacement: &str) -> Option<String> {
    if re.is_match(input) {
        Some(re.replace_all(input, replacement).into_owned())
    } else {
        None
    }
}

/// Curly double quotes used as JSON delimiters.
pub fn repair_smart_quotes(input: &str) -> Option<String> {
    replace_if_match(&SMART_DOUBLE_QUOTES, input, "\"")
}

/// `[1, 2,]` and `{"a": 1,}`.
pub fn repair_trailing_commas(input: &str) -> Option<String> {
    replace_if_match(&TRAILING_COMMA, input, "$1")
}

/// `{'key': ...}`.
pub fn repair_single_quoted_keys(input: &str) -> Option<String> {
    replace_if_match(&SINGLE_QUOTED_KEY, input, "\"$1\"$2")
}

/// `{"key": 'value'}` and `['a', 'b']`.
pub fn repair_single_quoted_values(input: &str) -> Option<String> {
    // Adjacent values share a delimiter, so a second pass catches the ones the
    // first pass skipped
    let once = SINGLE_QUOTED_VALUE.replace_all(input, "$1\"$2\"$3");
    let twice = SINGLE_QUOTED_VALUE.replace_all(&once, "$1\"$2\"$3");
    if twice == input {
        None
    } else {
        Some(twice.into_owned())
    }
}

/// `{key: ...}`. Text inside double-quoted strings is left alone.
pub fn repair_unquoted_keys(input: &str) -> Option<String> {
    let mut out = String::with_capacity(input.len() + 16);
    let mut changed = false;
    let mut run_start = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in input.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
                out.push_str(&input[run_start..=idx]);
                run_start = idx + 1;
            }
        } else if ch == '"' {
            changed |= quote_keys(&input[run_start..idx], &mut out);
            in_string = true;
            run_start = idx;
        }
    }
    if in_string {
        out.push_str(&input[run_start..]);
    } else {
        changed |= quote_keys(&input[run_start..], &mut out);
    }

    changed.then_some(out)
}

fn quote_keys(segment: &str, out: &mut String) -> bool {
    let replaced = UNQUOTED_KEY.replace_all(segment, "$1\"$2\"$3");
    let changed = matches!(replaced, std::borrow::Cow::Owned(_));
    out.push_str(&replaced);
    changed
}

// ============================================
// Schema decoding
// ============================================

/// Decode a JSON value into an [`AnalysisResult`], defaulting missing fields.
///
/// Returns the result and the paths of every defaulted field. Fails only when
/// the value is not an object.
pub fn decode_analysis(value: &Value) -> Result<(AnalysisResult, Vec<String>)> {
    let obj = value.as_object().ok_or_else(|| {
        Error::AnalysisFormat("analysis response must be a JSON object".to_string())
    })?;
    let mut defaulted = Vec::new();

    let mistakes = decode_findings(obj.get("mistakes"), "mistakes", &mut defaulted);
    let successes = decode_findings(obj.get("successes"), "successes", &mut defaulted);
    let recommendations =
        decode_string_list(obj.get("recommendations"), "recommendations", &mut defaulted);

    let empty = Map::new();
    let profile = match obj.get("user_profile") {
        Some(Value::Object(p)) => p,
        _ => {
            defaulted.push("user_profile".to_string());
            &empty
        }
    };

    let mut scalar = |field: &str| {
        decode_scalar(
            profile.get(field),
            &format!("user_profile.{field}"),
            &mut defaulted,
        )
    };
    let os = scalar("os");
    let verbosity = scalar("verbosity");
    let tech_level = scalar("tech_level");
    let patience = scalar("patience");

    let mut list = |field: &str| {
        decode_string_list(
            profile.get(field),
            &format!("user_profile.{field}"),
            &mut defaulted,
        )
    };
    let user_profile = UserProfile {
        os,
        verbosity,
        tech_level,
        patience,
        restrictions: list("restrictions"),
        tools: list("tools"),
        boundaries: list("boundaries"),
        preferences: list("preferences"),
    };

    Ok((
        AnalysisResult {
            mistakes,
            successes,
            user_profile,
            recommendations,
        },
        defaulted,
    ))
}

fn is_unknown(s: &str) -> bool {
    s.trim().eq_ignore_ascii_case(UNKNOWN)
}

fn decode_scalar(value: Option<&Value>, path: &str, defaulted: &mut Vec<String>) -> String {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => {
            if is_unknown(s) {
                UNKNOWN.to_string()
            } else {
                s.trim().to_string()
            }
        }
        _ => {
            defaulted.push(path.to_string());
            UNKNOWN.to_string()
        }
    }
}

fn decode_string_list(
    value: Option<&Value>,
    path: &str,
    defaulted: &mut Vec<String>,
) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty() && !is_unknown(s))
            .map(ToString::to_string)
            .collect(),
        // "unknown" for a list means "nothing known", not a format error
        Some(Value::String(s)) if is_unknown(s) => vec![],
        _ => {
            defaulted.push(path.to_string());
            vec![]
        }
    }
}

fn decode_findings(value: Option<&Value>, path: &str, defaulted: &mut Vec<String>) -> Vec<Finding> {
    let items = match value {
        Some(Value::Array(items)) => items,
        Some(Value::String(s)) if is_unknown(s) => return vec![],
        _ => {
            defaulted.push(path.to_string());
            return vec![];
        }
    };

    let mut findings = Vec::new();
    for (index, item) in items.iter().enumerate() {
        let Some(obj) = item.as_object() else {
            defaulted.push(format!("{path}[{index}]"));
            continue;
        };
        let mut field = |name: &str| -> String {
            match obj.get(name).and_then(|v| v.as_str()).map(str::trim) {
                Some(s) if !s.is_empty() => s.to_string(),
                _ => {
                    defaulted.push(format!("{path}[{index}].{name}"));
                    String::new()
                }
            }
        };
        let description = field("description");
        let lesson = field("lesson");
        if description.is_empty() && lesson.is_empty() {
            continue;
        }
        let evidence = obj
            .get("evidence")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string);
        findings.push(Finding {
            description,
            lesson,
            evidence,
        });
    }
    findings
}
