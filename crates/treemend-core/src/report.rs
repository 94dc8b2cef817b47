//! Run report: the terminal artifact of a treemend run.
//!
//! A [`RunReport`] is assembled by [`ReportBuilder`] while the controller
//! runs and is immutable once finished. It is persisted as
//! `<dir>/<run_id>/report.json` next to a `report.digest` holding the
//! SHA-256 of the JSON bytes, and can be read back with integrity checks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::domain::diagnostic::Diagnostic;
use crate::domain::error::{Result, TreemendError};
use crate::domain::file::{FileStatus, RuleEvent, Tier};
use crate::domain::rule::RuleProfile;
use crate::domain::state::{ControllerState, StateTransition};
use crate::fs_atomic::write_atomic;
use crate::repair::{FileRepair, RepairAction};
use crate::scanner::STATE_DIR;

pub const REPORT_SCHEMA_VERSION: u32 = 1;

const REPORT_FILE: &str = "report.json";
const DIGEST_FILE: &str = "report.digest";

/// `<root>/.treemend/runs`, the default report location.
pub fn default_runs_dir(root: &Path) -> PathBuf {
    root.join(STATE_DIR).join("runs")
}

// ---------------------------------------------------------------------------
// Report model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Converged,
    Exhausted,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustReason {
    IterationCap,
    Deadline,
    Cancelled,
    DryRun,
    /// The tree could no longer be scanned after the first iteration.
    ScanFailed,
}

impl ExhaustReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExhaustReason::IterationCap => "iteration_cap",
            ExhaustReason::Deadline => "deadline",
            ExhaustReason::Cancelled => "cancelled",
            ExhaustReason::DryRun => "dry_run",
            ExhaustReason::ScanFailed => "scan_failed",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TierCounts {
    pub clean: usize,
    pub patchable: usize,
    pub unsalvageable: usize,

    /// Files that could not be read or written.
    pub skipped: usize,
}

impl TierCounts {
    pub fn add(&mut self, tier: Option<Tier>) {
        match tier {
            Some(Tier::Clean) => self.clean += 1,
            Some(Tier::Patchable) => self.patchable += 1,
            Some(Tier::Unsalvageable) => self.unsalvageable += 1,
            None => self.skipped += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.clean + self.patchable + self.unsalvageable + self.skipped
    }
}

/// One check's result, as recorded per iteration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckSummary {
    pub name: String,
    pub passed: bool,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub duration_ms: u64,
    pub diagnostic_count: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IterationSnapshot {
    pub iteration: u32,

    /// Strictness level in force while the checks ran.
    pub strictness_level: u32,

    pub files_scanned: usize,

    /// Tiers as classified at the start of the iteration.
    pub tiers: TierCounts,

    pub patched: usize,
    pub rewritten: usize,

    /// Rule id → number of firings this iteration.
    pub rules_fired: BTreeMap<String, usize>,

    pub checks: Vec<CheckSummary>,
}

impl IterationSnapshot {
    pub fn from_repairs(iteration: u32, strictness_level: u32, repairs: &[FileRepair]) -> Self {
        let mut snapshot = Self {
            iteration,
            strictness_level,
            files_scanned: repairs.len(),
            ..Self::default()
        };
        for repair in repairs {
            snapshot.tiers.add(repair.initial_tier());
            match repair.action {
                RepairAction::Patched { .. } => snapshot.patched += 1,
                RepairAction::Rewritten { .. } => snapshot.rewritten += 1,
                _ => {}
            }
            for event in &repair.events {
                *snapshot
                    .rules_fired
                    .entry(event.rule_id.clone())
                    .or_insert(0) += 1;
            }
        }
        snapshot
    }

    pub fn all_checks_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }
}

/// Per-file result accumulated across iterations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileOutcome {
    pub path: String,
    pub initial_tier: Option<Tier>,
    pub final_tier: Option<Tier>,
    pub status: FileStatus,
    pub signatures: Vec<String>,
    pub events: Vec<RuleEvent>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunReport {
    pub schema_version: u32,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub root: PathBuf,
    pub profile: RuleProfile,
    pub dry_run: bool,
    pub iteration_cap: u32,
    pub iterations: u32,
    pub strictness_level: u32,
    pub verdict: Verdict,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exhaust_reason: Option<ExhaustReason>,

    pub transitions: Vec<StateTransition>,
    pub snapshots: Vec<IterationSnapshot>,

    /// Diagnostics from the last verification run.
    pub diagnostics: Vec<Diagnostic>,

    pub files: Vec<FileOutcome>,
}

impl RunReport {
    pub fn is_converged(&self) -> bool {
        self.verdict == Verdict::Converged
    }

    /// Process exit code: 0 converged, 1 exhausted.
    pub fn exit_code(&self) -> i32 {
        match self.verdict {
            Verdict::Converged => 0,
            Verdict::Exhausted => 1,
        }
    }

    /// Rule firings summed over every iteration.
    pub fn rules_fired_total(&self) -> BTreeMap<String, usize> {
        let mut total = BTreeMap::new();
        for snapshot in &self.snapshots {
            for (rule, count) in &snapshot.rules_fired {
                *total.entry(rule.clone()).or_insert(0) += count;
            }
        }
        total
    }

    pub fn status_counts(&self) -> BTreeMap<FileStatus, usize> {
        let mut counts = BTreeMap::new();
        for file in &self.files {
            *counts.entry(file.status).or_insert(0) += 1;
        }
        counts
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Accumulates run history until the controller reaches a terminal state.
#[derive(Debug, Clone)]
pub struct ReportBuilder {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    root: PathBuf,
    profile: RuleProfile,
    dry_run: bool,
    iteration_cap: u32,
    transitions: Vec<StateTransition>,
    snapshots: Vec<IterationSnapshot>,
}

impl ReportBuilder {
    pub fn new(root: &Path, profile: RuleProfile, dry_run: bool, iteration_cap: u32) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            root: root.to_path_buf(),
            profile,
            dry_run,
            iteration_cap,
            transitions: Vec::new(),
            snapshots: Vec::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn transition(&mut self, iteration: u32, state: ControllerState) {
        self.transitions.push(StateTransition { iteration, state });
    }

    pub fn snapshot(&mut self, snapshot: IterationSnapshot) {
        self.snapshots.push(snapshot);
    }

    pub fn last_snapshot_mut(&mut self) -> Option<&mut IterationSnapshot> {
        self.snapshots.last_mut()
    }

    pub fn finish(
        self,
        verdict: Verdict,
        exhaust_reason: Option<ExhaustReason>,
        strictness_level: u32,
        diagnostics: Vec<Diagnostic>,
        files: Vec<FileOutcome>,
    ) -> RunReport {
        let iterations = self.snapshots.iter().map(|s| s.iteration).max().unwrap_or(0);
        RunReport {
            schema_version: REPORT_SCHEMA_VERSION,
            run_id: self.run_id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            root: self.root,
            profile: self.profile,
            dry_run: self.dry_run,
            iteration_cap: self.iteration_cap,
            iterations,
            strictness_level,
            verdict,
            exhaust_reason,
            transitions: self.transitions,
            snapshots: self.snapshots,
            diagnostics,
            files,
        }
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Persist `<dir>/<run_id>/report.json` and `report.digest`, then verify
/// the written artifact. Returns the run directory.
pub fn write_report(report: &RunReport, dir: &Path) -> Result<PathBuf> {
    let run_dir = dir.join(report.run_id.to_string());
    fs::create_dir_all(&run_dir)?;

    let json = serde_json::to_vec_pretty(report)?;
    let digest = sha256_hex(&json);

    write_atomic(&run_dir.join(REPORT_FILE), &json)?;
    write_atomic(&run_dir.join(DIGEST_FILE), format!("{digest}\n").as_bytes())?;

    read_report(&run_dir)?;
    Ok(run_dir)
}

/// Read `<run_dir>/report.json`, verifying it against `report.digest`.
pub fn read_report(run_dir: &Path) -> Result<RunReport> {
    let json = fs::read(run_dir.join(REPORT_FILE))?;
    let expected = fs::read_to_string(run_dir.join(DIGEST_FILE))?;
    let actual = sha256_hex(&json);
    if expected.trim() != actual {
        return Err(TreemendError::DigestMismatch {
            expected: expected.trim().to_string(),
            actual,
        });
    }
    Ok(serde_json::from_slice(&json)?)
}

// ---------------------------------------------------------------------------
// Markdown
// ---------------------------------------------------------------------------

/// Render a Markdown summary for terminals and CI comments.
pub fn render_summary_md(report: &RunReport) -> String {
    let mut out = String::new();
    out.push_str("# treemend run\n\n");

    let verdict = match (report.verdict, report.exhaust_reason) {
        (Verdict::Converged, _) => "converged".to_string(),
        (Verdict::Exhausted, Some(reason)) => format!("exhausted ({})", reason.as_str()),
        (Verdict::Exhausted, None) => "exhausted".to_string(),
    };
    out.push_str(&format!(
        "- run: `{}`\n- root: `{}`\n- verdict: **{}**\n- iterations: {} / {}\n- profile: {}\n- strictness level: {}\n",
        report.run_id,
        report.root.display(),
        verdict,
        report.iterations,
        report.iteration_cap,
        report.profile,
        report.strictness_level,
    ));
    if report.dry_run {
        out.push_str("- dry run: nothing was written\n");
    }
    out.push('\n');

    if !report.snapshots.is_empty() {
        out.push_str("## Iterations\n\n");
        out.push_str("| # | level | clean | patchable | unsalvageable | patched | rewritten | checks |\n");
        out.push_str("|---|---|---|---|---|---|---|---|\n");
        for s in &report.snapshots {
            let checks = if s.checks.is_empty() {
                "-".to_string()
            } else {
                s.checks
                    .iter()
                    .map(|c| format!("{} {}", c.name, if c.passed { "ok" } else { "FAIL" }))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            out.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} | {} | {} |\n",
                s.iteration,
                s.strictness_level,
                s.tiers.clean,
                s.tiers.patchable,
                s.tiers.unsalvageable,
                s.patched,
                s.rewritten,
                checks
            ));
        }
        out.push('\n');
    }

    let fired = report.rules_fired_total();
    if !fired.is_empty() {
        out.push_str("## Rules fired\n\n");
        for (rule, count) in &fired {
            out.push_str(&format!("- `{rule}`: {count}\n"));
        }
        out.push('\n');
    }

    let warned: Vec<_> = report.files.iter().filter(|f| !f.warnings.is_empty()).collect();
    if !warned.is_empty() {
        out.push_str("## Warnings\n\n");
        for file in warned {
            for warning in &file.warnings {
                out.push_str(&format!("- `{}`: {}\n", file.path, warning));
            }
        }
        out.push('\n');
    }

    if !report.diagnostics.is_empty() {
        out.push_str(&format!(
            "## Diagnostics ({})\n\n",
            report.diagnostics.len()
        ));
        for d in report.diagnostics.iter().take(20) {
            let location = match (&d.file, d.line) {
                (Some(file), Some(line)) => format!("{file}:{line}"),
                (Some(file), None) => file.clone(),
                _ => "-".to_string(),
            };
            out.push_str(&format!("- [{}] {}: {}\n", d.check, location, d.message));
        }
        if report.diagnostics.len() > 20 {
            out.push_str(&format!("- … {} more\n", report.diagnostics.len() - 20));
        }
    }
    out
}
