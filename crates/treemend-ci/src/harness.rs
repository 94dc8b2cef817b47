//! Verification harness.
//!
//! Runs every configured check concurrently against the working tree and
//! joins them into a single [`VerificationRun`]. The [`Verifier`] trait is
//! the seam the convergence controller depends on.

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use treemend_core::domain::{CheckSpec, Diagnostic, Result, TreemendError};
use treemend_core::report::CheckSummary;

use crate::diagnostics::{exit_diagnostic, spawn_diagnostic, timeout_diagnostic, CompiledExtractor};
use crate::runner::{CheckExecution, CheckRunner};

/// Judgment of one check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckOutcome {
    pub name: String,
    pub passed: bool,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub duration_ms: u64,
    pub diagnostics: Vec<Diagnostic>,
}

impl CheckOutcome {
    /// A passing outcome with no diagnostics.
    pub fn pass(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            exit_code: Some(0),
            timed_out: false,
            duration_ms: 0,
            diagnostics: Vec::new(),
        }
    }

    /// A failing outcome carrying `diagnostics`, or a synthetic one if empty.
    pub fn fail(name: impl Into<String>, exit_code: i32, diagnostics: Vec<Diagnostic>) -> Self {
        let name = name.into();
        let diagnostics = if diagnostics.is_empty() {
            vec![exit_diagnostic(&name, Some(exit_code), "", "")]
        } else {
            diagnostics
        };
        Self {
            name,
            passed: false,
            exit_code: Some(exit_code),
            timed_out: false,
            duration_ms: 0,
            diagnostics,
        }
    }

    /// Judge a raw execution against its spec.
    pub fn from_execution(
        spec: &CheckSpec,
        extractor: &CompiledExtractor,
        exec: CheckExecution,
    ) -> Self {
        let name = spec.name.clone();

        if let Some(error) = &exec.spawn_error {
            return Self {
                diagnostics: vec![spawn_diagnostic(&name, error)],
                passed: false,
                exit_code: None,
                timed_out: false,
                duration_ms: exec.duration_ms,
                name,
            };
        }
        if exec.timed_out {
            return Self {
                diagnostics: vec![timeout_diagnostic(&name, spec.timeout_secs)],
                passed: false,
                exit_code: None,
                timed_out: true,
                duration_ms: exec.duration_ms,
                name,
            };
        }

        let passed = exec.exit_code.is_some_and(|code| spec.passes(code));
        let mut diagnostics = Vec::new();
        if !passed {
            let output = format!("{}\n{}", exec.stdout, exec.stderr);
            diagnostics = extractor.extract(&name, &output, spec.max_diagnostics);
            if diagnostics.is_empty() {
                diagnostics.push(exit_diagnostic(
                    &name,
                    exec.exit_code,
                    &exec.stdout,
                    &exec.stderr,
                ));
            }
        }

        Self {
            name,
            passed,
            exit_code: exec.exit_code,
            timed_out: false,
            duration_ms: exec.duration_ms,
            diagnostics,
        }
    }

    pub fn summary(&self) -> CheckSummary {
        CheckSummary {
            name: self.name.clone(),
            passed: self.passed,
            exit_code: self.exit_code,
            timed_out: self.timed_out,
            duration_ms: self.duration_ms,
            diagnostic_count: self.diagnostics.len(),
        }
    }
}

/// Joined results of one verification pass, in check order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VerificationRun {
    pub outcomes: Vec<CheckOutcome>,
}

impl VerificationRun {
    pub fn new(outcomes: Vec<CheckOutcome>) -> Self {
        Self { outcomes }
    }

    /// True when every check passed; vacuously true with no checks.
    pub fn all_passed(&self) -> bool {
        self.outcomes.iter().all(|o| o.passed)
    }

    pub fn failed_names(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| !o.passed)
            .map(|o| o.name.as_str())
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&CheckOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }

    pub fn by_name(&self) -> BTreeMap<&str, &CheckOutcome> {
        self.outcomes.iter().map(|o| (o.name.as_str(), o)).collect()
    }

    pub fn summaries(&self) -> Vec<CheckSummary> {
        self.outcomes.iter().map(|o| o.summary()).collect()
    }

    /// Every diagnostic across checks, in check order.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.outcomes
            .iter()
            .flat_map(|o| o.diagnostics.iter().cloned())
            .collect()
    }
}

/// Something that can judge the working tree.
#[async_trait]
pub trait Verifier: Send + Sync {
    /// Names of the checks this verifier runs.
    fn check_names(&self) -> Vec<String>;

    /// Run every check against `root`. Never fails; tool problems become
    /// failed outcomes with synthetic diagnostics.
    async fn verify(&self, root: &Path) -> VerificationRun;
}

/// Verifier that runs checks as real subprocesses.
#[derive(Debug, Clone)]
pub struct ProcessHarness {
    checks: Vec<(CheckSpec, CompiledExtractor)>,
}

impl ProcessHarness {
    pub fn new(checks: Vec<CheckSpec>) -> Result<Self> {
        let mut compiled: Vec<(CheckSpec, CompiledExtractor)> = Vec::with_capacity(checks.len());
        for spec in checks {
            spec.validate()?;
            if compiled.iter().any(|(c, _)| c.name == spec.name) {
                return Err(TreemendError::InvalidCheck {
                    name: spec.name,
                    reason: "duplicate check name".to_string(),
                });
            }
            let extractor = CompiledExtractor::compile(&spec.extractor, &spec.name)?;
            compiled.push((spec, extractor));
        }
        Ok(Self { checks: compiled })
    }

    pub fn checks(&self) -> impl Iterator<Item = &CheckSpec> {
        self.checks.iter().map(|(spec, _)| spec)
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}

#[async_trait]
impl Verifier for ProcessHarness {
    fn check_names(&self) -> Vec<String> {
        self.checks().map(|c| c.name.clone()).collect()
    }

    async fn verify(&self, root: &Path) -> VerificationRun {
        let runs = self.checks.iter().map(|(spec, extractor)| async move {
            let exec = CheckRunner::execute(spec, root).await;
            CheckOutcome::from_execution(spec, extractor, exec)
        });
        VerificationRun::new(join_all(runs).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use treemend_core::domain::ExtractorSpec;

    fn exec(exit_code: Option<i32>, stdout: &str) -> CheckExecution {
        CheckExecution {
            name: "t".to_string(),
            exit_code,
            stdout: stdout.to_string(),
            stderr: String::new(),
            duration_ms: 3,
            timed_out: false,
            spawn_error: None,
        }
    }

    fn spec() -> CheckSpec {
        CheckSpec::custom("t", vec!["true".to_string()], 5)
    }

    fn lines() -> CompiledExtractor {
        CompiledExtractor::compile(&ExtractorSpec::default(), "t").expect("compile")
    }

    #[test]
    fn test_pass_has_no_diagnostics() {
        let outcome = CheckOutcome::from_execution(&spec(), &lines(), exec(Some(0), "error? no"));
        assert!(outcome.passed);
        assert!(outcome.diagnostics.is_empty());
    }

    #[test]
    fn test_failure_extracts_diagnostics() {
        let outcome = CheckOutcome::from_execution(
            &spec(),
            &lines(),
            exec(Some(1), "building\nerror: x\nerror: y\n"),
        );
        assert!(!outcome.passed);
        assert_eq!(outcome.diagnostics.len(), 2);
    }

    #[test]
    fn test_silent_failure_gets_synthetic_diagnostic() {
        let outcome = CheckOutcome::from_execution(&spec(), &lines(), exec(Some(3), ""));
        assert_eq!(outcome.diagnostics.len(), 1);
        assert!(outcome.diagnostics[0].synthetic);
    }

    #[test]
    fn test_custom_pass_codes() {
        let spec = spec().with_pass_exit_codes(vec![0, 1]);
        let outcome = CheckOutcome::from_execution(&spec, &lines(), exec(Some(1), ""));
        assert!(outcome.passed);
    }

    #[test]
    fn test_signal_exit_fails() {
        let outcome = CheckOutcome::from_execution(&spec(), &lines(), exec(None, ""));
        assert!(!outcome.passed);
        assert!(outcome.diagnostics[0].message.contains("signal"));
    }

    #[test]
    fn test_run_helpers() {
        let run = VerificationRun::new(vec![
            CheckOutcome::pass("lint"),
            CheckOutcome::fail("build", 1, Vec::new()),
        ]);
        assert!(!run.all_passed());
        assert_eq!(run.failed_names(), vec!["build"]);
        assert_eq!(run.diagnostics().len(), 1);
        assert_eq!(run.summaries()[1].diagnostic_count, 1);
        assert!(run.by_name()["lint"].passed);
        assert!(VerificationRun::default().all_passed());
    }

    #[test]
    fn test_duplicate_checks_rejected() {
        let err = ProcessHarness::new(vec![spec(), spec()]).unwrap_err();
        assert!(matches!(err, TreemendError::InvalidCheck { .. }));
    }
}
