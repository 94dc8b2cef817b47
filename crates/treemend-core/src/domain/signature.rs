//! Corruption signatures: named predicates over file content.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::domain::error::{Result, TreemendError};
use crate::structure::delimiter_balance;

/// How much a matched signature counts toward the unsalvageable tier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Strength {
    Weak,
    Strong,
}

/// How a signature decides whether it matches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatcherSpec {
    /// Multi-line regex; matches when found anywhere in the content.
    Pattern { pattern: String },

    /// Matches when the delimiter imbalance is at least `min_imbalance`.
    Unbalanced {
        #[serde(default = "default_min_imbalance")]
        min_imbalance: usize,
    },
}

fn default_min_imbalance() -> usize {
    1
}

/// Declarative signature definition, as found in config files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignatureSpec {
    pub id: String,

    #[serde(default)]
    pub description: String,

    pub strength: Strength,

    #[serde(flatten)]
    pub matcher: MatcherSpec,
}

impl SignatureSpec {
    pub fn pattern(id: &str, strength: Strength, description: &str, pattern: &str) -> Self {
        Self {
            id: id.to_string(),
            description: description.to_string(),
            strength,
            matcher: MatcherSpec::Pattern {
                pattern: pattern.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone)]
enum Matcher {
    Pattern(Regex),
    Unbalanced(usize),
}

/// A compiled signature.
#[derive(Debug, Clone)]
pub struct CorruptionSignature {
    spec: SignatureSpec,
    matcher: Matcher,
}

impl CorruptionSignature {
    pub fn compile(spec: SignatureSpec) -> Result<Self> {
        if spec.id.trim().is_empty() {
            return Err(TreemendError::InvalidSignature {
                id: spec.id.clone(),
                reason: "id must not be empty".to_string(),
            });
        }

        let matcher = match &spec.matcher {
            MatcherSpec::Pattern { pattern } => {
                let regex = RegexBuilder::new(pattern)
                    .multi_line(true)
                    .build()
                    .map_err(|e| TreemendError::InvalidSignature {
                        id: spec.id.clone(),
                        reason: e.to_string(),
                    })?;
                Matcher::Pattern(regex)
            }
            MatcherSpec::Unbalanced { min_imbalance } => {
                if *min_imbalance == 0 {
                    return Err(TreemendError::InvalidSignature {
                        id: spec.id.clone(),
                        reason: "min_imbalance must be at least 1".to_string(),
                    });
                }
                Matcher::Unbalanced(*min_imbalance)
            }
        };

        Ok(Self { spec, matcher })
    }

    pub fn id(&self) -> &str {
        &self.spec.id
    }

    pub fn strength(&self) -> Strength {
        self.spec.strength
    }

    pub fn spec(&self) -> &SignatureSpec {
        &self.spec
    }

    pub fn matches(&self, content: &str) -> bool {
        match &self.matcher {
            Matcher::Pattern(regex) => regex.is_match(content),
            Matcher::Unbalanced(min) => delimiter_balance(content).imbalance() >= *min,
        }
    }
}
