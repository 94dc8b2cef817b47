//! Repair phase: classify and fix every scanned file.
//!
//! Files are sharded across a bounded rayon pool. Each worker owns one
//! file at a time and returns a [`FileRepair`] value; the collected vector
//! is the only merge point, folded into a [`FileLedger`] by the caller.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::classifier::{Classification, Classifier};
use crate::domain::error::{Result, TreemendError};
use crate::domain::file::{FileStatus, RuleEvent, SourceFile, Tier};
use crate::fs_atomic::write_atomic;
use crate::report::FileOutcome;
use crate::scanner::relative_display;
use crate::structure::delimiter_balance;
use crate::template::{RewriteOutcome, TemplateRegistry};
use crate::transform::{RuleSkip, Transformer};

/// Prefix for rule events recorded by template rewrites.
pub const TEMPLATE_EVENT_PREFIX: &str = "template:";

/// Everything a worker needs; shared read-only across the pool.
#[derive(Debug, Clone, Copy)]
pub struct RepairContext<'a> {
    pub root: &'a Path,
    pub classifier: &'a Classifier,
    pub transformer: Transformer<'a>,
    pub templates: &'a TemplateRegistry,
    pub iteration: u32,

    /// When false, results stay in memory.
    pub write: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RepairAction {
    Unchanged,
    Patched {
        fired: Vec<String>,
        reached_fixpoint: bool,
    },
    Rewritten {
        role: String,
    },
    Skipped {
        error: String,
    },
}

impl RepairAction {
    pub fn status(&self) -> FileStatus {
        match self {
            RepairAction::Unchanged => FileStatus::Unchanged,
            RepairAction::Patched { .. } => FileStatus::Patched,
            RepairAction::Rewritten { .. } => FileStatus::Rewritten,
            RepairAction::Skipped { .. } => FileStatus::SkippedError,
        }
    }
}

/// Result of repairing one file in one iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRepair {
    /// Root-relative path with `/` separators.
    pub path: String,

    /// `None` when the file could not be read.
    pub classification: Option<Classification>,

    /// Tier of the content after this iteration's repair.
    pub final_tier: Option<Tier>,

    pub action: RepairAction,
    pub events: Vec<RuleEvent>,
    pub skipped_rules: Vec<RuleSkip>,
    pub warnings: Vec<String>,

    /// Repaired content, kept only for dry runs.
    pub content: Option<String>,
}

impl FileRepair {
    pub fn initial_tier(&self) -> Option<Tier> {
        self.classification.as_ref().map(|c| c.tier)
    }

    pub fn status(&self) -> FileStatus {
        self.action.status()
    }

    fn skipped(path: String, error: String) -> Self {
        Self {
            path,
            classification: None,
            final_tier: None,
            action: RepairAction::Skipped { error },
            events: Vec::new(),
            skipped_rules: Vec::new(),
            warnings: Vec::new(),
            content: None,
        }
    }
}

/// Classify, repair and (optionally) write back a single file.
pub fn repair_file(ctx: &RepairContext<'_>, path: &Path) -> FileRepair {
    let rel = relative_display(ctx.root, path);
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!(path = %rel, error = %e, "cannot read file");
            return FileRepair::skipped(rel, e.to_string());
        }
    };

    let mut file = SourceFile::new(rel.clone(), content);
    let classification = ctx.classifier.classify(&file.content);
    file.tier = classification.tier;

    let mut warnings = Vec::new();
    let mut skipped_rules = Vec::new();
    let mut action = RepairAction::Unchanged;

    if classification.tier == Tier::Unsalvageable {
        match ctx.templates.rewrite(Path::new(&rel)) {
            RewriteOutcome::Rewritten { role, content } => {
                file.record(format!("{TEMPLATE_EVENT_PREFIX}{role}"), ctx.iteration);
                file.replace_content(content, FileStatus::Rewritten);
                action = RepairAction::Rewritten { role };
            }
            RewriteOutcome::UnknownRole { reason } => {
                warnings.push(format!("unsalvageable file left to rules: {reason}"));
                file.tier = Tier::Patchable;
            }
        }
    }

    if file.tier == Tier::Patchable {
        let outcome = ctx.transformer.transform(&file.content, file.extension());
        for fired in &outcome.fired {
            file.record(fired.rule_id.clone(), ctx.iteration);
        }
        if !outcome.reached_fixpoint {
            warnings.push(format!(
                "no fixpoint after {} passes",
                ctx.transformer.max_passes()
            ));
        }
        skipped_rules = outcome.skipped.clone();
        if outcome.content != file.content {
            action = RepairAction::Patched {
                fired: outcome.fired_ids(),
                reached_fixpoint: outcome.reached_fixpoint,
            };
            file.replace_content(outcome.content, FileStatus::Patched);
        }
    }

    if let Some(warning) = delimiter_balance(&file.content).describe() {
        warnings.push(warning);
    }

    let changed = file.status != FileStatus::Unchanged;
    let final_tier = if changed {
        ctx.classifier.classify(&file.content).tier
    } else {
        classification.tier
    };

    if changed && ctx.write {
        if let Err(e) = write_atomic(path, file.content.as_bytes()) {
            warn!(path = %rel, error = %e, "cannot write repaired file");
            let mut failed = FileRepair::skipped(rel, e.to_string());
            failed.classification = Some(classification);
            failed.final_tier = Some(file.tier);
            failed.warnings = warnings;
            return failed;
        }
    }

    debug!(
        path = %rel,
        tier = %classification.tier,
        status = ?file.status,
        events = file.events.len(),
        "file repaired"
    );

    FileRepair {
        path: rel,
        classification: Some(classification),
        final_tier: Some(final_tier),
        action,
        events: file.events,
        skipped_rules,
        warnings,
        content: (changed && !ctx.write).then_some(file.content),
    }
}

// ---------------------------------------------------------------------------
// Worker pool
// ---------------------------------------------------------------------------

/// Bounded pool for the repair phase.
pub struct RepairPool {
    pool: ThreadPool,
}

impl RepairPool {
    /// `workers == 0` means one worker per available core.
    pub fn new(workers: usize) -> Result<Self> {
        let threads = if workers == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            workers
        };
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|idx| format!("treemend-repair-{idx}"))
            .build()
            .map_err(|e| TreemendError::WorkerPool(e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Repair `paths` in parallel. Output order follows `paths`.
    pub fn run(&self, ctx: &RepairContext<'_>, paths: &[PathBuf]) -> Vec<FileRepair> {
        self.pool
            .install(|| paths.par_iter().map(|p| repair_file(ctx, p)).collect())
    }
}

impl std::fmt::Debug for RepairPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepairPool")
            .field("workers", &self.workers())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct LedgerEntry {
    initial_tier: Option<Tier>,
    final_tier: Option<Tier>,
    status: FileStatus,
    signatures: BTreeSet<String>,
    events: Vec<RuleEvent>,
    warnings: Vec<String>,
}

/// Per-path history across iterations.
#[derive(Debug, Clone, Default)]
pub struct FileLedger {
    entries: BTreeMap<String, LedgerEntry>,
}

impl FileLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn absorb(&mut self, repairs: &[FileRepair]) {
        for repair in repairs {
            let entry = self
                .entries
                .entry(repair.path.clone())
                .or_insert_with(|| LedgerEntry {
                    initial_tier: repair.initial_tier(),
                    final_tier: None,
                    status: FileStatus::Unchanged,
                    signatures: BTreeSet::new(),
                    events: Vec::new(),
                    warnings: Vec::new(),
                });

            if entry.initial_tier.is_none() {
                entry.initial_tier = repair.initial_tier();
            }
            if repair.final_tier.is_some() {
                entry.final_tier = repair.final_tier;
            }
            entry.status = entry.status.merge(repair.status());
            if let Some(c) = &repair.classification {
                entry.signatures.extend(c.signatures.iter().cloned());
            }
            entry.events.extend(repair.events.iter().cloned());
            if let RepairAction::Skipped { error } = &repair.action {
                entry.warnings.push(format!("skipped: {error}"));
            }
            for warning in &repair.warnings {
                if !entry.warnings.contains(warning) {
                    entry.warnings.push(warning.clone());
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn outcomes(&self) -> Vec<FileOutcome> {
        self.entries
            .iter()
            .map(|(path, e)| FileOutcome {
                path: path.clone(),
                initial_tier: e.initial_tier,
                final_tier: e.final_tier,
                status: e.status,
                signatures: e.signatures.iter().cloned().collect(),
                events: e.events.clone(),
                warnings: e.warnings.clone(),
            })
            .collect()
    }
}
