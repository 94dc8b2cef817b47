//! Convergence controller.
//!
//! Drives the repair loop until the verification harness is satisfied or
//! the run runs out of iterations, time or patience:
//!
//! ```text
//! Scanning → Classifying → Repairing → Verifying
//!     → Converged
//!     → Escalating → (next iteration)
//!     → Exhausted
//! ```
//!
//! Every state change is logged and recorded in the report's transition
//! trace. The cancellation flag and deadline are checked at each phase
//! boundary and raced against verification; either one ends the run as
//! `Exhausted` with a report still produced. Past the first iteration a
//! failed scan does too; only a tree that cannot be scanned at all is an
//! error.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant as StdInstant;
use tokio::sync::Notify;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::Instrument;
use treemend_core::domain::{ControllerState, Diagnostic, Result, Tier, TreemendError};
use treemend_core::engine::RepairEngine;
use treemend_core::obs;
use treemend_core::repair::{FileLedger, FileRepair, RepairPool};
use treemend_core::report::{
    write_report, ExhaustReason, IterationSnapshot, ReportBuilder, RunReport, Verdict,
};

use crate::harness::{VerificationRun, Verifier};

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Shared, clonable cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    inner: Arc<CancelInner>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

async fn wait_for_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Iterates repair and verification until convergence or exhaustion.
pub struct ConvergenceController<V> {
    engine: RepairEngine,
    verifier: V,
    pool: RepairPool,
    cancel: CancellationFlag,
}

impl<V: Verifier> ConvergenceController<V> {
    pub fn new(engine: RepairEngine, verifier: V) -> Result<Self> {
        let pool = RepairPool::new(engine.config().controller.workers)?;
        Ok(Self {
            engine,
            verifier,
            pool,
            cancel: CancellationFlag::new(),
        })
    }

    /// Share an externally owned flag, e.g. one tripped by Ctrl-C.
    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    pub fn engine(&self) -> &RepairEngine {
        &self.engine
    }

    pub fn verifier(&self) -> &V {
        &self.verifier
    }

    /// Run the loop under `root` and return the finished report.
    ///
    /// Only a missing root is an error; exhaustion is a normal verdict.
    pub async fn run(&self, root: &Path) -> Result<RunReport> {
        if !root.is_dir() {
            return Err(TreemendError::RootNotFound(root.to_path_buf()));
        }
        let settings = &self.engine.config().controller;
        let builder = ReportBuilder::new(
            root,
            self.engine.config().transform.profile,
            settings.dry_run,
            settings.iteration_cap,
        );
        let run_id = builder.run_id().to_string();
        let span = obs::run_span(&run_id);
        self.drive(root, builder, run_id).instrument(span).await
    }

    /// [`run`](Self::run), then persist the report under the configured
    /// runs directory. Returns the report and its run directory.
    pub async fn run_and_record(&self, root: &Path) -> Result<(RunReport, PathBuf)> {
        let report = self.run(root).await?;
        let run_dir = write_report(&report, &self.engine.config().runs_dir(root))?;
        Ok((report, run_dir))
    }

    fn interruption(&self, deadline: Option<Instant>) -> Option<ExhaustReason> {
        if self.cancel.is_cancelled() {
            Some(ExhaustReason::Cancelled)
        } else if deadline.is_some_and(|at| Instant::now() >= at) {
            Some(ExhaustReason::Deadline)
        } else {
            None
        }
    }

    async fn drive(
        &self,
        root: &Path,
        mut builder: ReportBuilder,
        run_id: String,
    ) -> Result<RunReport> {
        let started = StdInstant::now();
        let settings = &self.engine.config().controller;
        let deadline = settings
            .deadline_secs
            .map(|secs| Instant::now() + Duration::from_secs(secs));
        let max_level = self.engine.synthesizer().max_level();

        obs::emit_run_started(
            &run_id,
            &root.display().to_string(),
            settings.iteration_cap,
            settings.dry_run,
        );

        let mut ledger = FileLedger::new();
        let mut last_run: Option<VerificationRun> = None;
        let mut config_diagnostics: Vec<Diagnostic> = Vec::new();
        let mut level = 0u32;
        let mut consecutive_failures = 0u32;
        let mut iteration = 0u32;

        let (verdict, reason) = loop {
            iteration += 1;
            obs::emit_iteration_started(iteration, level);

            if let Some(reason) = self.interruption(deadline) {
                break (Verdict::Exhausted, Some(reason));
            }

            enter(&mut builder, iteration, ControllerState::Scanning);
            let paths = match self.engine.scanner(root).scan(root) {
                Ok(paths) => paths,
                Err(e) if iteration == 1 => return Err(e),
                Err(e) => {
                    obs::emit_step_error("scan", &e);
                    break (Verdict::Exhausted, Some(ExhaustReason::ScanFailed));
                }
            };

            if let Some(reason) = self.interruption(deadline) {
                break (Verdict::Exhausted, Some(reason));
            }

            // Classification runs inside the repair workers; the state is
            // still recorded so the trace reads in pipeline order.
            enter(&mut builder, iteration, ControllerState::Classifying);
            enter(&mut builder, iteration, ControllerState::Repairing);
            let repairs = {
                let ctx = self
                    .engine
                    .repair_context(root, iteration, !settings.dry_run);
                self.pool.run(&ctx, &paths)
            };
            ledger.absorb(&repairs);

            let snapshot = IterationSnapshot::from_repairs(iteration, level, &repairs);
            obs::emit_repair_finished(
                iteration,
                snapshot.files_scanned,
                snapshot.patched,
                snapshot.rewritten,
            );
            builder.snapshot(snapshot);

            if settings.dry_run {
                break dry_run_verdict(&repairs);
            }

            if let Some(reason) = self.interruption(deadline) {
                break (Verdict::Exhausted, Some(reason));
            }

            enter(&mut builder, iteration, ControllerState::Verifying);
            let run = tokio::select! {
                run = self.verifier.verify(root) => run,
                _ = self.cancel.cancelled() => {
                    break (Verdict::Exhausted, Some(ExhaustReason::Cancelled));
                }
                _ = wait_for_deadline(deadline) => {
                    break (Verdict::Exhausted, Some(ExhaustReason::Deadline));
                }
            };

            for outcome in &run.outcomes {
                obs::emit_check_finished(
                    &outcome.name,
                    outcome.passed,
                    outcome.duration_ms,
                    outcome.diagnostics.len(),
                );
            }
            if let Some(snapshot) = builder.last_snapshot_mut() {
                snapshot.checks = run.summaries();
            }
            let passed = run.all_passed();
            last_run = Some(run);

            if passed {
                break (Verdict::Converged, None);
            }

            consecutive_failures += 1;
            if iteration >= settings.iteration_cap {
                break (Verdict::Exhausted, Some(ExhaustReason::IterationCap));
            }

            if settings.escalate
                && level < max_level
                && consecutive_failures >= settings.escalate_after
            {
                enter(&mut builder, iteration, ControllerState::Escalating);
                match self.engine.synthesizer().write(root, level + 1) {
                    Ok(synthesis) => {
                        obs::emit_escalated(
                            iteration,
                            level,
                            level + 1,
                            synthesis.artifacts.len(),
                        );
                        config_diagnostics.extend(synthesis.skipped);
                        level += 1;
                        consecutive_failures = 0;
                    }
                    Err(e) => obs::emit_step_error("escalate", &e),
                }
            }
        };

        let terminal = match verdict {
            Verdict::Converged => ControllerState::Converged,
            Verdict::Exhausted => ControllerState::Exhausted,
        };
        enter(&mut builder, iteration, terminal);

        let mut diagnostics = config_diagnostics;
        if let Some(run) = last_run {
            diagnostics.extend(run.diagnostics());
        }
        let report = builder.finish(verdict, reason, level, diagnostics, ledger.outcomes());

        obs::emit_run_finished(
            &run_id,
            verdict,
            reason,
            report.iterations,
            started.elapsed().as_millis() as u64,
        );
        Ok(report)
    }
}

fn enter(builder: &mut ReportBuilder, iteration: u32, state: ControllerState) {
    builder.transition(iteration, state);
    obs::emit_state(iteration, state);
}

/// Dry runs never verify: converged only if nothing needed repair.
fn dry_run_verdict(repairs: &[FileRepair]) -> (Verdict, Option<ExhaustReason>) {
    if repairs.iter().all(|r| r.initial_tier() == Some(Tier::Clean)) {
        (Verdict::Converged, None)
    } else {
        (Verdict::Exhausted, Some(ExhaustReason::DryRun))
    }
}
