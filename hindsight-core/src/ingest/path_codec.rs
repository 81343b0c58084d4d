//! Claude Code project directory naming
//!
//! Claude Code stores each project's transcripts under
//! `~/.claude/projects/<encoded-path>/`, where the encoded path is the
//! absolute working directory with every separator turned into a hyphen:
//!
//! ```text
//! /home/u/proj        ->  -home-u-proj
//! /home/u/my-app      ->  -home-u-my-app
//! ```
//!
//! The encoding is not reversible once a path segment itself contains a
//! hyphen, so [`decode`] offers several [`DecodeStrategy`]s and callers try
//! them most-specific first.

/// Separator used by encoded directory names.
const HYPHEN: char = '-';

/// Path separator on the paths being encoded.
const SEPARATOR: char = '/';

/// How hyphens in an encoded name are mapped back to path separators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodeStrategy {
    /// Every hyphen is a separator.
    AllSeparators,
    /// The last two hyphen-delimited segments form one path component.
    JoinLastTwo,
    /// The last three hyphen-delimited segments form one path component.
    JoinLastThree,
}

impl DecodeStrategy {
    /// All strategies, in the order they should be tried.
    pub const ALL: [DecodeStrategy; 3] = [
        DecodeStrategy::AllSeparators,
        DecodeStrategy::JoinLastTwo,
        DecodeStrategy::JoinLastThree,
    ];

    /// Number of trailing segments glued back into one component.
    fn joined_tail(&self) -> usize {
        match self {
            DecodeStrategy::AllSeparators => 1,
            DecodeStrategy::JoinLastTwo => 2,
            DecodeStrategy::JoinLastThree => 3,
        }
    }
}

/// Encode an absolute path as a project directory name.
///
/// The leading separator is stripped, the remaining separators become
/// hyphens, and the name carries a leading hyphen marking the filesystem root.
/// Trailing separators are ignored.
pub fn encode(path: &str) -> String {
    let trimmed = normalize(path);
    let body = trimmed.trim_start_matches(SEPARATOR);
    let mut encoded = String::with_capacity(body.len() + 1);
    encoded.push(HYPHEN);
    encoded.push_str(&body.replace(SEPARATOR, "-"));
    encoded
}

/// Decode an encoded project name with the given strategy.
///
/// Returns `None` when the name has fewer segments than the strategy needs
/// or no segments at all.
pub fn decode(name: &str, strategy: DecodeStrategy) -> Option<String> {
    let body = name.strip_prefix(HYPHEN).unwrap_or(name);
    if body.is_empty() {
        return None;
    }

    let segments: Vec<&str> = body.split(HYPHEN).collect();
    let tail = strategy.joined_tail();
    if segments.len() < tail {
        return None;
    }

    let split_at = segments.len() - tail;
    let mut components: Vec<String> = segments[..split_at].iter().map(|s| s.to_string()).collect();
    components.push(segments[split_at..].join("-"));

    Some(format!("{}{}", SEPARATOR, components.join("/")))
}

/// Every distinct decoding of `name`, most specific strategy first.
pub fn decode_candidates(name: &str) -> Vec<(DecodeStrategy, String)> {
    let mut candidates: Vec<(DecodeStrategy, String)> = Vec::new();
    for strategy in DecodeStrategy::ALL {
        if let Some(decoded) = decode(name, strategy) {
            if !candidates.iter().any(|(_, existing)| existing == &decoded) {
                candidates.push((strategy, decoded));
            }
        }
    }
    candidates
}

/// Strip trailing separators, keeping a bare root intact.
pub fn normalize(path: &str) -> &str {
    let trimmed = path.trim_end_matches(SEPARATOR);
    if trimmed.is_empty() && path.starts_with(SEPARATOR) {
        "/"
    } else {
        trimmed
    }
}

/// Non-empty path segments.
pub fn segments(path: &str) -> Vec<&str> {
    path.split(SEPARATOR).filter(|s| !s.is_empty()).collect()
}
