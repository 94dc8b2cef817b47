//! treemend CI - verification and convergence
//!
//! Provides the outer loop of a treemend run:
//! - Runs verification checks (typecheck, lint, format, build) as
//!   subprocesses and normalizes their diagnostics
//! - Drives repair iterations until the checks pass or the run exhausts
//! - Escalates tool strictness on repeated failure

pub mod check;
pub mod controller;
pub mod diagnostics;
pub mod harness;
pub mod runner;

// Re-export key types
pub use check::{builtin_checks, resolve_checks, BuiltinCheck};
pub use controller::{CancellationFlag, ConvergenceController};
pub use diagnostics::CompiledExtractor;
pub use harness::{CheckOutcome, ProcessHarness, VerificationRun, Verifier};
pub use runner::{CheckExecution, CheckRunner};
