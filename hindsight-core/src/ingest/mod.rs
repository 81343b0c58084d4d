//! Transcript store access
//!
//! Everything that knows about Claude Code's on-disk layout lives here:
//!
//! ```text
//! ~/.claude/projects/
//!   -home-you-project-a/
//!     b4749c81-937a-4bd4-b62c-9d78905f0975.jsonl   # one session transcript
//!     0f1e2d3c-4b5a-6978-8796-a5b4c3d2e1f0.jsonl
//!   -home-you-my-app/
//!     ...
//! ```
//!
//! - [`path_codec`] maps working directories to and from directory names
//! - [`store`] lists directories and session files (metadata only)
//! - [`resolver`] picks the project directory for a working directory
//! - [`transcript`] parses one session file into messages

pub mod path_codec;
pub mod resolver;
pub mod store;
pub mod transcript;

pub use resolver::ProjectResolver;
pub use transcript::{parse_file, ParsedTranscript};
