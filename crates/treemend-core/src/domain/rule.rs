//! Transformation rules and rule-set profiles.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

use crate::domain::error::{Result, TreemendError};

/// Named rule-set profile selected at invocation time.
///
/// `Aggressive` enables every rule that `Smart` enables, plus the rules
/// whose minimum profile is `Aggressive`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RuleProfile {
    #[default]
    Smart,
    Aggressive,
}

impl RuleProfile {
    /// Whether a rule requiring `minimum` is active under this profile.
    pub fn enables(&self, minimum: RuleProfile) -> bool {
        *self >= minimum
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleProfile::Smart => "smart",
            RuleProfile::Aggressive => "aggressive",
        }
    }
}

impl std::str::FromStr for RuleProfile {
    type Err = TreemendError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "smart" => Ok(RuleProfile::Smart),
            "aggressive" => Ok(RuleProfile::Aggressive),
            other => Err(TreemendError::Config(format!("unknown rule profile: {other}"))),
        }
    }
}

impl std::fmt::Display for RuleProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declarative rule definition, as found in config files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleSpec {
    pub id: String,

    #[serde(default)]
    pub description: String,

    /// Lower runs first within a pass. Ties break on id.
    pub priority: i32,

    /// Multi-line regex.
    pub pattern: String,

    /// Replacement template; `${1}` / `${name}` expand capture groups.
    pub replacement: String,

    /// Extensions (without dot) this rule applies to. Empty means all.
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Only apply while this signature matches the current content.
    #[serde(default)]
    pub requires_signature: Option<String>,

    /// Minimum profile that enables the rule.
    #[serde(default)]
    pub profile: RuleProfile,
}

/// A compiled, ready-to-apply rule.
#[derive(Debug, Clone)]
pub struct TransformationRule {
    spec: RuleSpec,
    regex: Regex,
}

impl TransformationRule {
    pub fn compile(spec: RuleSpec) -> Result<Self> {
        if spec.id.trim().is_empty() {
            return Err(TreemendError::InvalidRule {
                id: spec.id.clone(),
                reason: "id must not be empty".to_string(),
            });
        }
        let regex = RegexBuilder::new(&spec.pattern)
            .multi_line(true)
            .build()
            .map_err(|e| TreemendError::InvalidRule {
                id: spec.id.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self { spec, regex })
    }

    pub fn id(&self) -> &str {
        &self.spec.id
    }

    pub fn priority(&self) -> i32 {
        self.spec.priority
    }

    pub fn profile(&self) -> RuleProfile {
        self.spec.profile
    }

    pub fn requires_signature(&self) -> Option<&str> {
        self.spec.requires_signature.as_deref()
    }

    pub fn spec(&self) -> &RuleSpec {
        &self.spec
    }

    pub fn applies_to(&self, extension: Option<&str>) -> bool {
        if self.spec.extensions.is_empty() {
            return true;
        }
        match extension {
            Some(ext) => self.spec.extensions.iter().any(|e| e == ext),
            None => false,
        }
    }

    /// Apply the rule once over the whole content. Borrowed when nothing matched.
    pub fn apply<'c>(&self, content: &'c str) -> Cow<'c, str> {
        self.regex.replace_all(content, self.spec.replacement.as_str())
    }
}
