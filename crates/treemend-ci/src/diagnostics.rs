//! Diagnostic extraction from raw check output.
//!
//! Turns the stdout/stderr of a check into normalized [`Diagnostic`]s using
//! the check's extraction strategy. A failed check always yields at least
//! one diagnostic so failures are never silent.

use regex::Regex;
use treemend_core::domain::{Diagnostic, ExtractorSpec, Result, Severity, TreemendError};

/// Synthetic diagnostic codes.
pub const CODE_TIMEOUT: &str = "timeout";
pub const CODE_SPAWN: &str = "spawn";
pub const CODE_EXIT: &str = "exit";

const TAIL_MAX_CHARS: usize = 240;

#[derive(Debug, Clone)]
enum Strategy {
    Pattern(Regex),
    Lines(String),
    None,
}

/// An [`ExtractorSpec`] with its regex compiled.
#[derive(Debug, Clone)]
pub struct CompiledExtractor {
    strategy: Strategy,
}

impl CompiledExtractor {
    pub fn compile(spec: &ExtractorSpec, check: &str) -> Result<Self> {
        let strategy = match spec {
            ExtractorSpec::Pattern { pattern } => {
                let regex = Regex::new(pattern).map_err(|e| TreemendError::InvalidCheck {
                    name: check.to_string(),
                    reason: format!("bad extractor pattern: {e}"),
                })?;
                Strategy::Pattern(regex)
            }
            ExtractorSpec::Lines { keyword } => Strategy::Lines(keyword.to_ascii_lowercase()),
            ExtractorSpec::None => Strategy::None,
        };
        Ok(Self { strategy })
    }

    /// Extract up to `max` diagnostics from `output`.
    pub fn extract(&self, check: &str, output: &str, max: usize) -> Vec<Diagnostic> {
        let lines = output.lines().map(str::trim_end).filter(|l| !l.trim().is_empty());
        match &self.strategy {
            Strategy::Pattern(regex) => lines
                .filter_map(|line| from_captures(regex, check, line))
                .take(max)
                .collect(),
            Strategy::Lines(keyword) => lines
                .filter(|line| line.to_ascii_lowercase().contains(keyword.as_str()))
                .map(|line| Diagnostic::new(Severity::Error, line.trim(), check))
                .take(max)
                .collect(),
            Strategy::None => Vec::new(),
        }
    }
}

fn from_captures(regex: &Regex, check: &str, line: &str) -> Option<Diagnostic> {
    let caps = regex.captures(line)?;
    let group = |name: &str| caps.name(name).map(|m| m.as_str().trim().to_string());

    let severity = group("severity")
        .map(|s| Severity::from_label(&s))
        .unwrap_or(Severity::Error);
    let message = group("message")
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| line.trim().to_string());

    let mut diagnostic = Diagnostic::new(severity, message, check).with_position(
        group("line").and_then(|l| l.parse().ok()),
        group("col").and_then(|c| c.parse().ok()),
    );
    if let Some(file) = group("file") {
        diagnostic = diagnostic.with_file(file);
    }
    if let Some(code) = group("code") {
        diagnostic = diagnostic.with_code(code);
    }
    Some(diagnostic)
}

fn last_line(output: &str) -> Option<String> {
    let line = output.lines().rev().map(str::trim).find(|l| !l.is_empty())?;
    Some(line.chars().take(TAIL_MAX_CHARS).collect())
}

/// Diagnostic for a failed check whose extractor found nothing.
pub fn exit_diagnostic(check: &str, exit_code: Option<i32>, stdout: &str, stderr: &str) -> Diagnostic {
    let status = match exit_code {
        Some(code) => format!("exited with code {code}"),
        None => "was terminated by a signal".to_string(),
    };
    let message = match last_line(stderr).or_else(|| last_line(stdout)) {
        Some(tail) => format!("{check} {status}: {tail}"),
        None => format!("{check} {status}"),
    };
    Diagnostic::synthetic(check, CODE_EXIT, message)
}

pub fn timeout_diagnostic(check: &str, timeout_secs: u64) -> Diagnostic {
    Diagnostic::synthetic(
        check,
        CODE_TIMEOUT,
        format!("{check} timed out after {timeout_secs}s"),
    )
}

pub fn spawn_diagnostic(check: &str, error: &str) -> Diagnostic {
    Diagnostic::synthetic(check, CODE_SPAWN, format!("{check} could not be started: {error}"))
}
