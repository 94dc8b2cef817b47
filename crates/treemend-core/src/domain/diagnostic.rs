//! Normalized diagnostics extracted from verification output.

use serde::{Deserialize, Serialize};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Hint,
    Warning,
    Error,
}

impl Severity {
    /// Map a free-form severity word from tool output.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "warning" | "warn" => Severity::Warning,
            "hint" | "info" | "note" => Severity::Hint,
            _ => Severity::Error,
        }
    }
}

/// A single normalized diagnostic from a verification check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Diagnostic {
    /// Severity level.
    pub severity: Severity,

    /// Tool-specific code (e.g. "TS2304").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Human-readable message.
    pub message: String,

    /// Source file path as reported by the tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Line number (1-indexed).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,

    /// Column number (1-indexed).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,

    /// Name of the check that produced this diagnostic.
    pub check: String,

    /// True when the engine made this diagnostic up (timeout, spawn
    /// failure, unparsable output) rather than reading it from the tool.
    #[serde(default)]
    pub synthetic: bool,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>, check: impl Into<String>) -> Self {
        Self {
            severity,
            code: None,
            message: message.into(),
            file: None,
            line: None,
            column: None,
            check: check.into(),
            synthetic: false,
        }
    }

    /// Engine-generated error diagnostic.
    pub fn synthetic(check: impl Into<String>, code: &str, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.to_string()),
            synthetic: true,
            ..Self::new(Severity::Error, message, check)
        }
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_position(mut self, line: Option<u32>, column: Option<u32>) -> Self {
        self.line = line;
        self.column = column;
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}
