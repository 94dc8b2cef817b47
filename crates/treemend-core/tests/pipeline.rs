//! End-to-end repair pipeline: scan, classify, patch or rewrite, report.

use std::fs;
use std::path::Path;
use treemend_core::repair::RepairPool;
use treemend_core::report::{read_report, write_report, IterationSnapshot};
use treemend_core::{
    EngineConfig, ExhaustReason, FileLedger, FileStatus, RepairAction, RepairEngine,
    ReportBuilder, RuleProfile, Tier, TreemendError, Verdict,
};

const WRECKED_ROUTE: &str = r#"import { NextRequest; NextResponse } from 'next/server';
<<<<<<< HEAD
export async function GET(req: NextRequest) {
  return NextResponse.json({ patients: [] };
"#;

fn seed(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn read(root: &Path, rel: &str) -> String {
    fs::read_to_string(root.join(rel)).unwrap()
}

/// Scan and repair one iteration with the engine's own pool.
fn repair_once(
    engine: &RepairEngine,
    root: &Path,
    iteration: u32,
    write: bool,
) -> Vec<treemend_core::FileRepair> {
    let paths = engine.scanner(root).scan(root).unwrap();
    let pool = RepairPool::new(2).unwrap();
    pool.run(&engine.repair_context(root, iteration, write), &paths)
}

#[test]
fn test_trailing_semicolon_patched_then_stable() {
    let dir = tempfile::tempdir().unwrap();
    seed(
        dir.path(),
        "src/orders.ts",
        "export const order = {\n  id: 7,\n  status: 'PENDING';\n};\n",
    );
    let engine = RepairEngine::builtin().unwrap();

    let first = repair_once(&engine, dir.path(), 1, true);
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].initial_tier(), Some(Tier::Patchable));
    assert_eq!(first[0].status(), FileStatus::Patched);
    assert_eq!(
        read(dir.path(), "src/orders.ts"),
        "export const order = {\n  id: 7,\n  status: 'PENDING'\n};\n"
    );

    let second = repair_once(&engine, dir.path(), 2, true);
    assert_eq!(second[0].initial_tier(), Some(Tier::Clean));
    assert_eq!(second[0].action, RepairAction::Unchanged);
    assert!(second[0].events.is_empty());
}

#[test]
fn test_unsalvageable_endpoint_rewritten_from_template() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path(), "app/api/patients/route.ts", WRECKED_ROUTE);
    let engine = RepairEngine::builtin().unwrap();

    let repairs = repair_once(&engine, dir.path(), 1, true);
    let repair = &repairs[0];
    assert_eq!(repair.initial_tier(), Some(Tier::Unsalvageable));
    assert_eq!(
        repair.action,
        RepairAction::Rewritten {
            role: "basic-endpoint".to_string()
        }
    );
    assert_eq!(repair.final_tier, Some(Tier::Clean));

    let content = read(dir.path(), "app/api/patients/route.ts");
    assert!(content.contains("type PatientsRecord"));
    assert!(content.contains("const patientsStore"));
    assert!(content.contains("Invalid patients payload"));
}

#[test]
fn test_dynamic_segment_uses_parameterized_template() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path(), "app/api/patients/[patientId]/route.ts", WRECKED_ROUTE);
    let engine = RepairEngine::builtin().unwrap();

    let repairs = repair_once(&engine, dir.path(), 1, true);
    assert_eq!(
        repairs[0].action,
        RepairAction::Rewritten {
            role: "parameterized-endpoint".to_string()
        }
    );
    let content = read(dir.path(), "app/api/patients/[patientId]/route.ts");
    assert!(content.contains("params['patientId']"));
    assert!(!content.contains("params.patientId"));
}

#[test]
fn test_unknown_role_falls_back_to_rules() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path(), "lib/wrecked.ts", WRECKED_ROUTE);
    let engine = RepairEngine::builtin().unwrap();

    let repairs = repair_once(&engine, dir.path(), 1, true);
    let repair = &repairs[0];
    assert_eq!(repair.initial_tier(), Some(Tier::Unsalvageable));
    assert!(!matches!(repair.action, RepairAction::Rewritten { .. }));
    assert!(repair.warnings.iter().any(|w| w.starts_with("unsalvageable")));
}

#[test]
fn test_configured_rule_replaces_catalogue() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path(), "src/a.ts", "let a = 1;   \nlet b = 2;\t\n");
    let config = EngineConfig::from_toml_str(
        r#"
[[signatures]]
id = "trailing-whitespace"
strength = "weak"
kind = "pattern"
pattern = '(?m)[ \t]+$'

[[rules]]
id = "strip-trailing-whitespace"
priority = 1
pattern = '(?m)[ \t]+$'
replacement = ""
"#,
    )
    .unwrap();
    let engine = RepairEngine::from_config(config).unwrap();
    assert_eq!(engine.rules().len(), 1);

    let repairs = repair_once(&engine, dir.path(), 1, true);
    assert_eq!(repairs[0].status(), FileStatus::Patched);
    assert_eq!(read(dir.path(), "src/a.ts"), "let a = 1;\nlet b = 2;\n");
}

#[test]
fn test_invalid_rule_rejected_before_any_write() {
    let err = EngineConfig::from_toml_str(
        r#"
[[rules]]
id = "broken"
priority = 1
pattern = '('
replacement = ""
"#,
    )
    .and_then(RepairEngine::from_config)
    .unwrap_err();
    assert!(matches!(err, TreemendError::InvalidRule { .. }));
}

#[test]
fn test_aggressive_profile_is_superset() {
    let smart = RepairEngine::builtin().unwrap();
    let mut config = EngineConfig::default();
    config.transform.profile = RuleProfile::Aggressive;
    let aggressive = RepairEngine::from_config(config).unwrap();

    for rule in smart.rules().rules() {
        assert!(aggressive.rules().rules().iter().any(|r| r.id() == rule.id()));
    }
}

#[test]
fn test_report_from_repairs_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path(), "app/api/patients/route.ts", WRECKED_ROUTE);
    seed(dir.path(), "src/order.ts", "const o = { status: 'PENDING'; };\n");
    let engine = RepairEngine::builtin().unwrap();

    let repairs = repair_once(&engine, dir.path(), 1, false);
    let mut ledger = FileLedger::new();
    ledger.absorb(&repairs);

    let mut builder = ReportBuilder::new(dir.path(), RuleProfile::Smart, true, 1);
    builder.snapshot(IterationSnapshot::from_repairs(1, 0, &repairs));
    let report = builder.finish(
        Verdict::Exhausted,
        Some(ExhaustReason::DryRun),
        0,
        Vec::new(),
        ledger.outcomes(),
    );
    assert_eq!(report.snapshots[0].tiers.unsalvageable, 1);
    assert_eq!(report.snapshots[0].tiers.patchable, 1);
    assert_eq!(report.files.len(), 2);

    let run_dir = write_report(&report, &engine.config().runs_dir(dir.path())).unwrap();
    assert_eq!(read_report(&run_dir).unwrap(), report);

    // Dry run: sources untouched, report directory ignored by later scans.
    assert_eq!(read(dir.path(), "app/api/patients/route.ts"), WRECKED_ROUTE);
    assert_eq!(engine.scanner(dir.path()).scan(dir.path()).unwrap().len(), 2);
}
