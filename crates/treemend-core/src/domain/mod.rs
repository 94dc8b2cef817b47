//! Domain models for treemend.
//!
//! Canonical definitions for the core entities:
//! - `SourceFile`: a file under repair with its tier and rule events
//! - `TransformationRule`: an ordered, idempotent regex rewrite
//! - `CorruptionSignature`: a named damage predicate
//! - `CheckSpec`: an external verification check
//! - `Diagnostic`: normalized output of a check

pub mod check;
pub mod diagnostic;
pub mod error;
pub mod file;
pub mod rule;
pub mod signature;
pub mod state;

pub use check::{CheckSpec, ExtractorSpec};
pub use diagnostic::{Diagnostic, Severity};
pub use error::{Result, TreemendError};
pub use file::{FileStatus, RuleEvent, SourceFile, Tier};
pub use rule::{RuleProfile, RuleSpec, TransformationRule};
pub use signature::{CorruptionSignature, MatcherSpec, SignatureSpec, Strength};
pub use state::{ControllerState, StateTransition};
