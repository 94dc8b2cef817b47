//! Integration tests for the process-backed verification harness.

use std::time::Instant;
use treemend_ci::diagnostics::{CODE_SPAWN, CODE_TIMEOUT};
use treemend_ci::{resolve_checks, ProcessHarness, Verifier};
use treemend_core::{CheckSpec, ExtractorSpec};

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

fn sh(name: &str, script: &str, timeout_secs: u64) -> CheckSpec {
    CheckSpec::custom(name, argv(&["sh", "-c", script]), timeout_secs)
}

/// Test: passing and failing checks are judged independently
#[tokio::test]
async fn test_mixed_outcomes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let harness = ProcessHarness::new(vec![
        CheckSpec::custom("echo", argv(&["echo", "ok"]), 60),
        CheckSpec::custom("false", argv(&["false"]), 60),
    ])
    .expect("harness");

    assert_eq!(harness.check_names(), vec!["echo", "false"]);
    let run = harness.verify(dir.path()).await;

    assert!(!run.all_passed());
    assert_eq!(run.failed_names(), vec!["false"]);
    let failed = run.get("false").expect("false outcome");
    assert_eq!(failed.exit_code, Some(1));
    assert_eq!(failed.diagnostics.len(), 1);
    assert!(failed.diagnostics[0].synthetic);
    assert!(run.get("echo").expect("echo outcome").diagnostics.is_empty());
}

/// Test: a hung tool is killed and reported with a timeout diagnostic
#[tokio::test]
async fn test_timeout_produces_synthetic_diagnostic() {
    let dir = tempfile::tempdir().expect("tempdir");
    let harness = ProcessHarness::new(vec![CheckSpec::custom(
        "hang",
        argv(&["sleep", "10"]),
        1,
    )])
    .expect("harness");

    let run = harness.verify(dir.path()).await;
    let outcome = run.get("hang").expect("outcome");
    assert!(!outcome.passed);
    assert!(outcome.timed_out);
    assert_eq!(outcome.exit_code, None);
    assert_eq!(outcome.diagnostics[0].code.as_deref(), Some(CODE_TIMEOUT));
    assert!(outcome.duration_ms < 10_000);
}

/// Test: nothing a timed-out check spawned keeps running after verify returns
#[cfg(unix)]
#[tokio::test]
async fn test_timed_out_check_leaves_no_writers_behind() {
    let dir = tempfile::tempdir().expect("tempdir");
    let harness = ProcessHarness::new(vec![sh(
        "npm-like",
        "(sleep 2; touch late-write) & wait",
        1,
    )])
    .expect("harness");

    let run = harness.verify(dir.path()).await;
    assert!(run.get("npm-like").expect("outcome").timed_out);

    tokio::time::sleep(std::time::Duration::from_secs(3)).await;
    assert!(!dir.path().join("late-write").exists());
}

/// Test: a tool that cannot start fails its check instead of the run
#[tokio::test]
async fn test_spawn_failure_is_a_failed_check() {
    let dir = tempfile::tempdir().expect("tempdir");
    let harness = ProcessHarness::new(vec![CheckSpec::custom(
        "ghost",
        argv(&["treemend-no-such-tool"]),
        60,
    )])
    .expect("harness");

    let run = harness.verify(dir.path()).await;
    let outcome = run.get("ghost").expect("outcome");
    assert!(!outcome.passed);
    assert_eq!(outcome.diagnostics[0].code.as_deref(), Some(CODE_SPAWN));
}

/// Test: a grep-style check with inverted exit codes and a pattern extractor
#[tokio::test]
async fn test_pattern_extraction_from_real_output() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::create_dir_all(dir.path().join("src")).expect("mkdir");
    std::fs::write(dir.path().join("src/a.ts"), "let a = 1;\nlet b = 2;;\n").expect("write");
    std::fs::write(dir.path().join("src/b.ts"), "let c = 3;\n").expect("write");

    let spec = CheckSpec::custom("no-double-semicolons", argv(&["grep", "-rn", ";;", "src"]), 60)
        .with_pass_exit_codes(vec![1])
        .with_extractor(ExtractorSpec::Pattern {
            pattern: r"^(?P<file>[^:]+):(?P<line>\d+):(?P<message>.*)$".to_string(),
        });
    let harness = ProcessHarness::new(vec![spec]).expect("harness");

    let run = harness.verify(dir.path()).await;
    let outcome = run.get("no-double-semicolons").expect("outcome");
    assert!(!outcome.passed);
    assert_eq!(outcome.exit_code, Some(0));
    assert_eq!(outcome.diagnostics.len(), 1);
    let diagnostic = &outcome.diagnostics[0];
    assert_eq!(diagnostic.file.as_deref(), Some("src/a.ts"));
    assert_eq!(diagnostic.line, Some(2));
    assert_eq!(diagnostic.message, "let b = 2;;");

    std::fs::write(dir.path().join("src/a.ts"), "let a = 1;\nlet b = 2;\n").expect("write");
    assert!(harness.verify(dir.path()).await.all_passed());
}

/// Test: diagnostics per check are capped
#[tokio::test]
async fn test_diagnostic_cap() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut spec = sh("noisy", "for i in 1 2 3 4 5 6; do echo \"error $i\"; done; exit 1", 60);
    spec.max_diagnostics = 4;
    let harness = ProcessHarness::new(vec![spec]).expect("harness");

    let run = harness.verify(dir.path()).await;
    assert_eq!(run.get("noisy").expect("outcome").diagnostics.len(), 4);
}

/// Test: checks run concurrently, not back to back
#[tokio::test]
async fn test_checks_run_concurrently() {
    let dir = tempfile::tempdir().expect("tempdir");
    let harness = ProcessHarness::new(vec![
        sh("a", "sleep 1", 30),
        sh("b", "sleep 1", 30),
        sh("c", "sleep 1", 30),
    ])
    .expect("harness");

    let start = Instant::now();
    let run = harness.verify(dir.path()).await;
    assert!(run.all_passed());
    assert!(start.elapsed().as_secs_f64() < 2.5);
    let names: Vec<_> = run.outcomes.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
}

/// Test: a harness built from the selected built-ins
#[test]
fn test_harness_from_builtin_selection() {
    let checks = resolve_checks(&[], &["lint".to_string()]).expect("resolve");
    let harness = ProcessHarness::new(checks).expect("harness");
    assert_eq!(harness.len(), 1);
    assert_eq!(harness.check_names(), vec!["lint"]);
}
