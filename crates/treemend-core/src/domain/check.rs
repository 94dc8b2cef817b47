//! Verification check definitions.
//!
//! A check is plain data: an argv, a timeout, which exit codes count as a
//! pass and how to turn tool output into diagnostics. Execution lives in
//! `treemend-ci`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::domain::error::{Result, TreemendError};

/// How to turn raw tool output into diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ExtractorSpec {
    /// Regex applied per line. Named groups `file`, `line`, `col`, `code`,
    /// `severity` and `message` are picked up when present.
    Pattern { pattern: String },

    /// Every non-empty line containing `keyword` (case-insensitive).
    Lines {
        #[serde(default = "default_keyword")]
        keyword: String,
    },

    /// Never extract; failures still get one synthetic diagnostic.
    None,
}

fn default_keyword() -> String {
    "error".to_string()
}

impl Default for ExtractorSpec {
    fn default() -> Self {
        ExtractorSpec::Lines {
            keyword: default_keyword(),
        }
    }
}

/// Configuration for one verification check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckSpec {
    /// Unique check name.
    pub name: String,

    /// Command to execute (first element is the executable).
    pub command: Vec<String>,

    /// Working directory relative to the scan root.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Timeout in seconds. Must be positive.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Exit codes treated as a pass.
    #[serde(default = "default_pass_exit_codes")]
    pub pass_exit_codes: Vec<i32>,

    #[serde(default)]
    pub extractor: ExtractorSpec,

    /// Upper bound on retained diagnostics.
    #[serde(default = "default_max_diagnostics")]
    pub max_diagnostics: usize,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_pass_exit_codes() -> Vec<i32> {
    vec![0]
}

fn default_max_diagnostics() -> usize {
    200
}

fn default_enabled() -> bool {
    true
}

impl CheckSpec {
    /// Create a custom check with default mapping and extractor.
    pub fn custom(name: impl Into<String>, command: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            name: name.into(),
            command,
            working_dir: None,
            timeout_secs,
            pass_exit_codes: default_pass_exit_codes(),
            extractor: ExtractorSpec::default(),
            max_diagnostics: default_max_diagnostics(),
            enabled: true,
        }
    }

    pub fn with_extractor(mut self, extractor: ExtractorSpec) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_pass_exit_codes(mut self, codes: Vec<i32>) -> Self {
        self.pass_exit_codes = codes;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Whether `exit_code` maps to a pass.
    pub fn passes(&self, exit_code: i32) -> bool {
        self.pass_exit_codes.contains(&exit_code)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| TreemendError::InvalidCheck {
            name: self.name.clone(),
            reason: reason.to_string(),
        };
        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if self.command.first().map_or(true, |exe| exe.trim().is_empty()) {
            return Err(invalid("command must not be empty"));
        }
        if self.timeout_secs == 0 {
            return Err(invalid("timeout_secs must be positive"));
        }
        if self.pass_exit_codes.is_empty() {
            return Err(invalid("pass_exit_codes must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_defaults() {
        let check = CheckSpec::custom("echo", vec!["echo".to_string()], 60);
        assert!(check.enabled);
        assert!(check.passes(0));
        assert!(!check.passes(1));
        assert_eq!(check.extractor, ExtractorSpec::default());
        assert!(check.validate().is_ok());
    }

    #[test]
    fn test_inverted_exit_mapping() {
        let check = CheckSpec::custom("no-matches", vec!["grep".to_string()], 60)
            .with_pass_exit_codes(vec![1]);
        assert!(check.passes(1));
        assert!(!check.passes(0));
    }

    #[test]
    fn test_validate_rejects_bad_checks() {
        assert!(CheckSpec::custom("", vec!["x".to_string()], 1).validate().is_err());
        assert!(CheckSpec::custom("a", vec![], 1).validate().is_err());
        assert!(CheckSpec::custom("a", vec!["x".to_string()], 0).validate().is_err());
        assert!(CheckSpec::custom("a", vec!["x".to_string()], 1)
            .with_pass_exit_codes(vec![])
            .validate()
            .is_err());
    }

    #[test]
    fn test_check_from_toml() {
        let check: CheckSpec = toml::from_str(
            r#"
            name = "typecheck"
            command = ["npx", "tsc", "--noEmit"]
            timeout_secs = 600
            extractor = { strategy = "pattern", pattern = '^(?P<file>[^(]+)\((?P<line>\d+),(?P<col>\d+)\): (?P<message>.*)$' }
            "#,
        )
        .expect("parse");
        assert_eq!(check.timeout_secs, 600);
        assert_eq!(check.pass_exit_codes, vec![0]);
        assert!(matches!(check.extractor, ExtractorSpec::Pattern { .. }));
    }
}
