//! File corpus scanner.
//!
//! Walks a root directory and returns the candidate source files in lexical
//! order. Traversal is read-only; unreadable subtrees are logged and
//! skipped.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::domain::error::{Result, TreemendError};
use crate::domain::file::extension_of;

/// Directory holding treemend's own run artifacts under the root.
pub const STATE_DIR: &str = ".treemend";

/// Which files the scanner yields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScanConfig {
    /// Extensions without the leading dot, matched case-sensitively.
    pub include_extensions: Vec<String>,

    /// Path components that prune a subtree when matched exactly.
    pub exclude_fragments: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            include_extensions: ["ts", "tsx", "js", "jsx", "mjs", "cjs"]
                .iter()
                .map(|e| e.to_string())
                .collect(),
            exclude_fragments: [
                "node_modules",
                ".git",
                ".next",
                "dist",
                "build",
                "coverage",
                STATE_DIR,
            ]
            .iter()
            .map(|e| e.to_string())
            .collect(),
        }
    }
}

impl ScanConfig {
    pub fn validate(&self) -> Result<()> {
        if self.include_extensions.is_empty() {
            return Err(TreemendError::Config(
                "scan.include_extensions must not be empty".to_string(),
            ));
        }
        if let Some(ext) = self.include_extensions.iter().find(|e| e.starts_with('.')) {
            return Err(TreemendError::Config(format!(
                "scan.include_extensions entry {ext:?} must not start with '.'"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Scanner {
    config: ScanConfig,
    excluded_paths: Vec<PathBuf>,
}

impl Scanner {
    pub fn new(config: ScanConfig) -> Self {
        Self {
            config,
            excluded_paths: Vec::new(),
        }
    }

    /// Also prune `path` and everything below it.
    pub fn exclude_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.excluded_paths.push(path.into());
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// List matching files under `root`, sorted and deduplicated.
    pub fn scan(&self, root: &Path) -> Result<Vec<PathBuf>> {
        if !root.is_dir() {
            return Err(TreemendError::RootNotFound(root.to_path_buf()));
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !self.is_pruned(e))
        {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(
                        path = ?e.path(),
                        error = %e,
                        "skipping unreadable path"
                    );
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }
            if self.is_included(entry.path()) {
                files.push(entry.into_path());
            }
        }

        files.sort();
        files.dedup();
        debug!(root = %root.display(), count = files.len(), "scan complete");
        Ok(files)
    }

    fn is_pruned(&self, entry: &DirEntry) -> bool {
        if self.excluded_paths.iter().any(|p| entry.path() == p) {
            return true;
        }
        entry
            .file_name()
            .to_str()
            .map(|name| self.config.exclude_fragments.iter().any(|f| f == name))
            .unwrap_or(false)
    }

    fn is_included(&self, path: &Path) -> bool {
        extension_of(path)
            .map(|ext| self.config.include_extensions.iter().any(|e| e == ext))
            .unwrap_or(false)
    }
}

/// `path` relative to `root`, with `/` separators.
pub fn relative_display(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, "export {};\n").expect("write");
    }

    fn rels(root: &Path, files: &[PathBuf]) -> Vec<String> {
        files.iter().map(|f| relative_display(root, f)).collect()
    }

    #[test]
    fn test_scan_filters_and_sorts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        touch(root, "src/b.ts");
        touch(root, "src/a.tsx");
        touch(root, "src/readme.md");
        touch(root, "src/upper.TS");
        touch(root, "node_modules/pkg/index.js");
        touch(root, ".git/hooks/x.js");
        touch(root, ".treemend/runs/r/report.js");
        touch(root, "app/api/users/route.ts");

        let files = Scanner::new(ScanConfig::default()).scan(root).expect("scan");
        assert_eq!(
            rels(root, &files),
            vec!["app/api/users/route.ts", "src/a.tsx", "src/b.ts"]
        );
    }

    #[test]
    fn test_fragments_match_whole_components_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        touch(root, "distinct/keep.ts");
        touch(root, "dist/drop.ts");

        let files = Scanner::new(ScanConfig::default()).scan(root).expect("scan");
        assert_eq!(rels(root, &files), vec!["distinct/keep.ts"]);
    }

    #[test]
    fn test_root_named_like_fragment_is_still_scanned() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("build");
        touch(&root, "index.ts");

        let files = Scanner::new(ScanConfig::default()).scan(&root).expect("scan");
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_explicit_excluded_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        touch(root, "reports/out.js");
        touch(root, "src/in.js");

        let files = Scanner::new(ScanConfig::default())
            .exclude_path(root.join("reports"))
            .scan(root)
            .expect("scan");
        assert_eq!(rels(root, &files), vec!["src/in.js"]);
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = Scanner::new(ScanConfig::default())
            .scan(&dir.path().join("nope"))
            .unwrap_err();
        assert!(matches!(err, TreemendError::RootNotFound(_)));
    }

    #[test]
    fn test_scan_is_deterministic() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        for name in ["z.ts", "m/a.ts", "m/b.js", "a.ts"] {
            touch(root, name);
        }
        let scanner = Scanner::new(ScanConfig::default());
        let first = scanner.scan(root).expect("scan");
        assert_eq!(scanner.scan(root).expect("scan"), first);
    }

    #[test]
    fn test_dotted_extension_rejected() {
        let config = ScanConfig {
            include_extensions: vec![".ts".to_string()],
            ..ScanConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
