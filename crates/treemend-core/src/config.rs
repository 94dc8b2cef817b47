//! Engine configuration.
//!
//! One immutable [`EngineConfig`] is built per run (defaults, then an
//! optional `treemend.toml`, then CLI overrides) and handed to every
//! component at construction. Table sections that are absent fall back to
//! defaults; list sections (`[[rules]]`, `[[signatures]]`, `[[ladders]]`,
//! `[[checks]]`) replace the built-ins when present, while `[[templates]]`
//! entries add or override roles.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::classifier::ClassifierThresholds;
use crate::domain::check::CheckSpec;
use crate::domain::error::{Result, TreemendError};
use crate::domain::rule::{RuleProfile, RuleSpec};
use crate::domain::signature::SignatureSpec;
use crate::report::default_runs_dir;
use crate::scanner::ScanConfig;
use crate::strictness::StrictnessLadder;
use crate::template::TemplateSpec;
use crate::transform::DEFAULT_MAX_PASSES;

/// Config file looked up at the scan root.
pub const CONFIG_FILE: &str = "treemend.toml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TransformConfig {
    /// Cap on full rule passes per file per iteration.
    pub max_passes: u32,

    pub profile: RuleProfile,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            max_passes: DEFAULT_MAX_PASSES,
            profile: RuleProfile::Smart,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ControllerConfig {
    /// Maximum repair/verify iterations. Must be at least 1.
    pub iteration_cap: u32,

    /// Relax tool configs on repeated failure.
    pub escalate: bool,

    /// Consecutive failed verifications before relaxing one level.
    pub escalate_after: u32,

    /// Wall-clock budget for the whole run.
    pub deadline_secs: Option<u64>,

    /// Repair workers; 0 means one per core.
    pub workers: usize,

    /// Check names to run; empty runs every enabled check.
    pub only_checks: Vec<String>,

    pub dry_run: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            iteration_cap: 5,
            escalate: true,
            escalate_after: 1,
            deadline_secs: None,
            workers: 0,
            only_checks: Vec::new(),
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReportConfig {
    /// Where run directories go; relative paths resolve against the root.
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub scan: ScanConfig,
    pub classifier: ClassifierThresholds,
    pub transform: TransformConfig,
    pub controller: ControllerConfig,
    pub report: ReportConfig,
    pub checks: Vec<CheckSpec>,
    pub rules: Vec<RuleSpec>,
    pub signatures: Vec<SignatureSpec>,
    pub templates: Vec<TemplateSpec>,
    pub ladders: Vec<StrictnessLadder>,
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        debug!(path = %path.display(), "loading config");
        Self::from_toml_str(&raw)
    }

    /// Load `<root>/treemend.toml` if present, otherwise defaults.
    pub fn discover(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        if path.is_file() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.scan.validate()?;
        self.classifier.validate()?;

        if self.transform.max_passes == 0 {
            return Err(TreemendError::Config(
                "transform.max_passes must be at least 1".to_string(),
            ));
        }
        if self.controller.iteration_cap == 0 {
            return Err(TreemendError::Config(
                "controller.iteration_cap must be at least 1".to_string(),
            ));
        }
        if self.controller.escalate_after == 0 {
            return Err(TreemendError::Config(
                "controller.escalate_after must be at least 1".to_string(),
            ));
        }
        if self.controller.deadline_secs == Some(0) {
            return Err(TreemendError::Config(
                "controller.deadline_secs must be positive".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for check in &self.checks {
            check.validate()?;
            if !names.insert(check.name.as_str()) {
                return Err(TreemendError::InvalidCheck {
                    name: check.name.clone(),
                    reason: "duplicate check name".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Directory that receives `<run_id>/report.json`.
    pub fn runs_dir(&self, root: &Path) -> PathBuf {
        match &self.report.dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => root.join(dir),
            None => default_runs_dir(root),
        }
    }
}
