//! Convergence controller states.

use serde::{Deserialize, Serialize};

/// States of the convergence loop.
///
/// `Scanning → Classifying → Repairing → Verifying →
/// {Converged | Escalating → (next iteration) | Exhausted}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    Scanning,
    Classifying,
    Repairing,
    Verifying,
    Escalating,
    Converged,
    Exhausted,
}

impl ControllerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ControllerState::Converged | ControllerState::Exhausted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ControllerState::Scanning => "scanning",
            ControllerState::Classifying => "classifying",
            ControllerState::Repairing => "repairing",
            ControllerState::Verifying => "verifying",
            ControllerState::Escalating => "escalating",
            ControllerState::Converged => "converged",
            ControllerState::Exhausted => "exhausted",
        }
    }
}

impl std::fmt::Display for ControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded state change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateTransition {
    pub iteration: u32,
    pub state: ControllerState,
}
