//! Built-in verification checks and check selection.

use serde::{Deserialize, Serialize};
use treemend_core::domain::{CheckSpec, ExtractorSpec, Result, TreemendError};

/// `file(line,col): error TS1234: message`
const TSC_PATTERN: &str = r"^(?P<file>[^\s(][^(]*)\((?P<line>\d+),(?P<col>\d+)\): (?P<severity>error|warning) (?P<code>TS\d+): (?P<message>.+)$";

/// `file:line:col: message [Error/rule]`
const ESLINT_UNIX_PATTERN: &str = r"^(?P<file>[^:\s][^:]*):(?P<line>\d+):(?P<col>\d+): (?P<message>.+?)(?: \[(?P<severity>Error|Warning)/(?P<code>[^\]]+)\])?$";

/// `[warn] path/to/file.tsx`
const PRETTIER_PATTERN: &str = r"^\[warn\] (?P<file>\S+\.\w+)$";

/// Checks treemend knows how to run out of the box.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinCheck {
    /// npx tsc --noEmit --pretty false
    TypeCheck,

    /// npx eslint . --format unix
    Lint,

    /// npx prettier --check .
    Format,

    /// npm run build
    Build,
}

impl BuiltinCheck {
    pub fn all() -> [BuiltinCheck; 4] {
        [
            BuiltinCheck::TypeCheck,
            BuiltinCheck::Lint,
            BuiltinCheck::Format,
            BuiltinCheck::Build,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            BuiltinCheck::TypeCheck => "typecheck",
            BuiltinCheck::Lint => "lint",
            BuiltinCheck::Format => "format",
            BuiltinCheck::Build => "build",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::all().into_iter().find(|c| c.name() == name)
    }

    pub fn command(&self) -> Vec<String> {
        let argv: &[&str] = match self {
            BuiltinCheck::TypeCheck => &["npx", "tsc", "--noEmit", "--pretty", "false"],
            BuiltinCheck::Lint => &["npx", "eslint", ".", "--format", "unix"],
            BuiltinCheck::Format => &["npx", "prettier", "--check", "."],
            BuiltinCheck::Build => &["npm", "run", "build"],
        };
        argv.iter().map(|s| s.to_string()).collect()
    }

    pub fn timeout_secs(&self) -> u64 {
        match self {
            BuiltinCheck::Format => 120,
            BuiltinCheck::TypeCheck | BuiltinCheck::Lint => 300,
            BuiltinCheck::Build => 600,
        }
    }

    pub fn extractor(&self) -> ExtractorSpec {
        match self {
            BuiltinCheck::TypeCheck => ExtractorSpec::Pattern {
                pattern: TSC_PATTERN.to_string(),
            },
            BuiltinCheck::Lint => ExtractorSpec::Pattern {
                pattern: ESLINT_UNIX_PATTERN.to_string(),
            },
            BuiltinCheck::Format => ExtractorSpec::Pattern {
                pattern: PRETTIER_PATTERN.to_string(),
            },
            BuiltinCheck::Build => ExtractorSpec::default(),
        }
    }

    pub fn spec(&self) -> CheckSpec {
        CheckSpec::custom(self.name(), self.command(), self.timeout_secs())
            .with_extractor(self.extractor())
    }
}

pub fn builtin_checks() -> Vec<CheckSpec> {
    BuiltinCheck::all().iter().map(|c| c.spec()).collect()
}

/// Pick the checks a run executes.
///
/// `configured` replaces the built-ins when non-empty. `only` narrows the
/// set by name; an explicitly selected check runs even if disabled.
pub fn resolve_checks(configured: &[CheckSpec], only: &[String]) -> Result<Vec<CheckSpec>> {
    let available = if configured.is_empty() {
        builtin_checks()
    } else {
        configured.to_vec()
    };

    if only.is_empty() {
        return Ok(available.into_iter().filter(|c| c.enabled).collect());
    }

    for name in only {
        if !available.iter().any(|c| &c.name == name) {
            return Err(TreemendError::InvalidCheck {
                name: name.clone(),
                reason: "unknown check".to_string(),
            });
        }
    }
    Ok(available
        .into_iter()
        .filter(|c| only.contains(&c.name))
        .collect())
}
