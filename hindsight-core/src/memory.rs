//! Memory file handoff
//!
//! Hindsight does not edit memory files itself. It loads the current content
//! verbatim and hands it over, together with the merged analysis, to a
//! [`MemoryUpdater`] supplied by the caller.

use crate::error::{Error, Result};
use crate::types::AnalysisResult;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// File name of the conventional per-project memory file.
pub const DEFAULT_MEMORY_FILE: &str = "CLAUDE.md";

/// A memory file as found on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryFile {
    pub path: PathBuf,
    /// Content exactly as read, empty when the file does not exist
    pub content: String,
    pub exists: bool,
}

impl MemoryFile {
    /// Read `path`. A missing file yields empty content.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(Self {
                path: path.to_path_buf(),
                content,
                exists: true,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self {
                path: path.to_path_buf(),
                content: String::new(),
                exists: false,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => Err(Error::Parse {
                path: path.display().to_string(),
                message: "memory file is not valid UTF-8".to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

/// Produces updated memory content from an analysis and the current content.
pub trait MemoryUpdater {
    fn update(&self, analysis: &AnalysisResult, existing: &str) -> Result<String>;
}

/// The payload handed to an external updater.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryHandoff<'a> {
    pub analysis: &'a AnalysisResult,
    pub memory_path: &'a Path,
    pub existing_memory: &'a str,
}

impl<'a> MemoryHandoff<'a> {
    pub fn new(analysis: &'a AnalysisResult, memory: &'a MemoryFile) -> Self {
        Self {
            analysis,
            memory_path: &memory.path,
            existing_memory: &memory.content,
        }
    }

    /// Run `updater` over this handoff.
    pub fn apply(&self, updater: &dyn MemoryUpdater) -> Result<String> {
        updater.update(self.analysis, self.existing_memory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct AppendRecommendations;

    impl MemoryUpdater for AppendRecommendations {
        fn update(&self, analysis: &AnalysisResult, existing: &str) -> Result<String> {
            let mut out = existing.to_string();
            for rec in &analysis.recommendations {
                out.push_str(&format!("- {rec}\n"));
            }
            Ok(out)
        }
    }

    #[test]
    fn test_load_is_verbatim() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_MEMORY_FILE);
        let content = "# Notes\r\n\n  keep   spacing\n\u{1F600}";
        std::fs::write(&path, content).unwrap();

        let memory = MemoryFile::load(&path).unwrap();
        assert!(memory.exists);
        assert_eq!(memory.content, content);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let memory = MemoryFile::load(&dir.path().join("nope.md")).unwrap();
        assert!(!memory.exists);
        assert!(memory.content.is_empty());
    }

    #[test]
    fn test_non_utf8_file_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_MEMORY_FILE);
        std::fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();
        assert!(matches!(MemoryFile::load(&path), Err(Error::Parse { .. })));
    }

    #[test]
    fn test_handoff_passes_existing_content() {
        let memory = MemoryFile {
            path: PathBuf::from("CLAUDE.md"),
            content: "# Memory\n".to_string(),
            exists: true,
        };
        let analysis = AnalysisResult {
            recommendations: vec!["Use pnpm".to_string()],
            ..Default::default()
        };

        let handoff = MemoryHandoff::new(&analysis, &memory);
        let updated = handoff.apply(&AppendRecommendations).unwrap();
        assert_eq!(updated, "# Memory\n- Use pnpm\n");

        let json = serde_json::to_value(&handoff).unwrap();
        assert_eq!(json["existing_memory"], "# Memory\n");
        assert_eq!(json["memory_path"], "CLAUDE.md");
    }
}
