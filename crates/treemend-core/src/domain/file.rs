//! Source file model and per-file repair status.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Damage tier assigned by the classifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Clean,
    Patchable,
    Unsalvageable,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Clean => "clean",
            Tier::Patchable => "patchable",
            Tier::Unsalvageable => "unsalvageable",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final disposition of a file over a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Unchanged,
    Patched,
    Rewritten,
    SkippedError,
}

impl FileStatus {
    /// Combine the status carried so far with the status of a newer pass.
    ///
    /// A rewrite outranks a patch, and a patch outranks an error seen in a
    /// later pass. An error only sticks when nothing was ever written.
    pub fn merge(self, newer: FileStatus) -> FileStatus {
        use FileStatus::*;
        match (self, newer) {
            (Rewritten, _) | (_, Rewritten) => Rewritten,
            (Patched, _) | (_, Patched) => Patched,
            (_, SkippedError) => SkippedError,
            (SkippedError, Unchanged) => SkippedError,
            (Unchanged, Unchanged) => Unchanged,
        }
    }
}

/// One rule firing against a file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleEvent {
    pub rule_id: String,
    pub iteration: u32,
}

/// A file under repair. Lives for one iteration of the repair phase.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub content: String,
    pub tier: Tier,
    pub events: Vec<RuleEvent>,
    pub status: FileStatus,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            tier: Tier::Clean,
            events: Vec::new(),
            status: FileStatus::Unchanged,
        }
    }

    /// Extension without the leading dot.
    pub fn extension(&self) -> Option<&str> {
        extension_of(&self.path)
    }

    pub fn record(&mut self, rule_id: impl Into<String>, iteration: u32) {
        self.events.push(RuleEvent {
            rule_id: rule_id.into(),
            iteration,
        });
    }

    /// Replace the content and fold `status` into the current status.
    pub fn replace_content(&mut self, content: String, status: FileStatus) {
        self.content = content;
        self.status = self.status.merge(status);
    }
}

pub(crate) fn extension_of(path: &Path) -> Option<&str> {
    path.extension().and_then(|e| e.to_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ordering() {
        assert!(Tier::Clean < Tier::Patchable);
        assert!(Tier::Patchable < Tier::Unsalvageable);
    }

    #[test]
    fn test_tier_serde() {
        let json = serde_json::to_string(&Tier::Unsalvageable).expect("serialize");
        assert_eq!(json, "\"unsalvageable\"");
    }

    #[test]
    fn test_status_merge() {
        use FileStatus::*;
        assert_eq!(Unchanged.merge(Patched), Patched);
        assert_eq!(Patched.merge(Unchanged), Patched);
        assert_eq!(Patched.merge(Rewritten), Rewritten);
        assert_eq!(Rewritten.merge(SkippedError), Rewritten);
        assert_eq!(Unchanged.merge(SkippedError), SkippedError);
        assert_eq!(SkippedError.merge(Unchanged), SkippedError);
        assert_eq!(Unchanged.merge(Unchanged), Unchanged);
    }

    #[test]
    fn test_source_file_record_and_replace() {
        let mut file = SourceFile::new("src/a.ts", "x;;");
        assert_eq!(file.extension(), Some("ts"));

        file.record("doubled-semicolon", 1);
        file.replace_content("x;".to_string(), FileStatus::Patched);

        assert_eq!(file.content, "x;");
        assert_eq!(file.status, FileStatus::Patched);
        assert_eq!(file.events.len(), 1);
        assert_eq!(file.events[0].iteration, 1);
    }
}
