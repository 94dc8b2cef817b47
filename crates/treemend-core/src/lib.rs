//! treemend core library
//!
//! Scanning, classification, rule-based transformation, template rewrites,
//! strictness ladders and run reports. Verification and the convergence
//! loop live in `treemend-ci`.

pub mod catalog;
pub mod classifier;
pub mod config;
pub mod domain;
pub mod engine;
pub mod fs_atomic;
pub mod obs;
pub mod repair;
pub mod report;
pub mod scanner;
pub mod strictness;
pub mod structure;
pub mod telemetry;
pub mod template;
pub mod transform;

pub use domain::{
    CheckSpec, ControllerState, CorruptionSignature, Diagnostic, ExtractorSpec, FileStatus,
    MatcherSpec, Result, RuleEvent, RuleProfile, RuleSpec, Severity, SignatureSpec, SourceFile,
    StateTransition, Strength, Tier, TransformationRule, TreemendError,
};

pub use classifier::{Classification, Classifier, ClassifierThresholds, SignatureSet};
pub use config::{ControllerConfig, EngineConfig, ReportConfig, TransformConfig, CONFIG_FILE};
pub use engine::RepairEngine;
pub use repair::{FileLedger, FileRepair, RepairAction, RepairContext, RepairPool};
pub use report::{
    read_report, render_summary_md, write_report, CheckSummary, ExhaustReason, FileOutcome,
    IterationSnapshot, ReportBuilder, RunReport, TierCounts, Verdict,
};
pub use scanner::{ScanConfig, Scanner};
pub use strictness::{
    ConfigSynthesizer, Relaxation, StrictnessLadder, Synthesis, ToolConfigArtifact,
};
pub use telemetry::init_tracing;
pub use structure::{delimiter_balance, DelimiterBalance};
pub use template::{ParamKind, RewriteOutcome, TemplateRegistry, TemplateSpec};
pub use transform::{RuleTable, TransformOutcome, Transformer};

/// Crate version, recorded in logs.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
