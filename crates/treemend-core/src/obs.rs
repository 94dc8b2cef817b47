//! Structured lifecycle events for treemend runs.
//!
//! - `run_span` tags everything logged during a run with its `run_id`
//! - `emit_*` functions log the controller's lifecycle with stable
//!   `event` names so JSON logs can be filtered by event

use tracing::{info, warn};

use crate::domain::state::ControllerState;
use crate::report::{ExhaustReason, Verdict};

/// Span tagging everything logged during a run with its `run_id`.
///
/// Use with `tracing::Instrument` for async work.
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("treemend.run", run_id = %run_id)
}

pub fn emit_run_started(run_id: &str, root: &str, iteration_cap: u32, dry_run: bool) {
    info!(
        event = "run.started",
        run_id = %run_id,
        root = %root,
        iteration_cap,
        dry_run,
    );
}

pub fn emit_iteration_started(iteration: u32, strictness_level: u32) {
    info!(event = "iteration.started", iteration, strictness_level);
}

pub fn emit_state(iteration: u32, state: ControllerState) {
    info!(event = "state.entered", iteration, state = %state);
}

/// Repair phase summary for one iteration.
pub fn emit_repair_finished(iteration: u32, files: usize, patched: usize, rewritten: usize) {
    info!(
        event = "repair.finished",
        iteration,
        files,
        patched,
        rewritten,
    );
}

pub fn emit_check_finished(name: &str, passed: bool, duration_ms: u64, diagnostics: usize) {
    if passed {
        info!(event = "check.finished", check = %name, passed, duration_ms, diagnostics);
    } else {
        warn!(event = "check.finished", check = %name, passed, duration_ms, diagnostics);
    }
}

pub fn emit_escalated(iteration: u32, from_level: u32, to_level: u32, artifacts: usize) {
    info!(
        event = "strictness.escalated",
        iteration,
        from_level,
        to_level,
        artifacts,
    );
}

pub fn emit_run_finished(
    run_id: &str,
    verdict: Verdict,
    reason: Option<ExhaustReason>,
    iterations: u32,
    duration_ms: u64,
) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        verdict = ?verdict,
        reason = reason.map(|r| r.as_str()).unwrap_or("none"),
        iterations,
        duration_ms,
    );
}

/// A non-fatal step failure the run carries on from.
pub fn emit_step_error(step: &str, error: &dyn std::fmt::Display) {
    warn!(event = "run.step_error", step = %step, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_span_enter() {
        let _span = run_span("test-run").entered();
        emit_state(1, ControllerState::Scanning);
        emit_run_finished("test-run", Verdict::Converged, None, 1, 5);
    }
}
