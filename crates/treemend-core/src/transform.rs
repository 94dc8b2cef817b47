//! Rule-based transformer.
//!
//! Applies an ordered rule table to file content in full passes until a
//! pass changes nothing (fixpoint) or the pass cap is reached. The
//! transformer is pure over `(content, rules)`; callers decide whether to
//! write the result.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

use crate::catalog;
use crate::classifier::SignatureSet;
use crate::domain::error::{Result, TreemendError};
use crate::domain::rule::{RuleProfile, RuleSpec, TransformationRule};
use crate::structure::delimiter_balance;

/// Default cap on full passes per file.
pub const DEFAULT_MAX_PASSES: u32 = 8;

/// Ordered, validated set of rules.
///
/// Order is `(priority, id)` ascending and is fixed at construction.
#[derive(Debug, Clone)]
pub struct RuleTable {
    rules: Vec<TransformationRule>,
}

impl RuleTable {
    /// Compile and order `specs`. Rejects duplicate ids and bad patterns.
    pub fn new(specs: Vec<RuleSpec>) -> Result<Self> {
        let mut seen = BTreeSet::new();
        let mut rules = Vec::with_capacity(specs.len());
        for spec in specs {
            if !seen.insert(spec.id.clone()) {
                return Err(TreemendError::InvalidRule {
                    id: spec.id,
                    reason: "duplicate rule id".to_string(),
                });
            }
            rules.push(TransformationRule::compile(spec)?);
        }
        rules.sort_by(|a, b| {
            a.priority()
                .cmp(&b.priority())
                .then_with(|| a.id().cmp(b.id()))
        });
        Ok(Self { rules })
    }

    pub fn builtin() -> Result<Self> {
        Self::new(catalog::builtin_rules())
    }

    /// Rules enabled under `profile`, order preserved.
    pub fn for_profile(&self, profile: RuleProfile) -> Self {
        Self {
            rules: self
                .rules
                .iter()
                .filter(|r| profile.enables(r.profile()))
                .cloned()
                .collect(),
        }
    }

    /// Ensure every `requires_signature` names a known signature.
    pub fn check_signatures(&self, signatures: &SignatureSet) -> Result<()> {
        for rule in &self.rules {
            if let Some(required) = rule.requires_signature() {
                if signatures.get(required).is_none() {
                    return Err(TreemendError::InvalidRule {
                        id: rule.id().to_string(),
                        reason: format!("requires unknown signature {required}"),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn rules(&self) -> &[TransformationRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// A rule that changed the content in a given pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FiredRule {
    pub rule_id: String,
    pub pass: u32,
}

/// A rule application that was discarded for this file and pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleSkip {
    pub rule_id: String,
    pub pass: u32,
    pub reason: String,
}

/// Result of transforming one file's content.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformOutcome {
    pub content: String,
    pub fired: Vec<FiredRule>,
    pub skipped: Vec<RuleSkip>,
    pub reached_fixpoint: bool,
    pub passes: u32,
}

impl TransformOutcome {
    /// Distinct rule ids that fired, in first-fired order.
    pub fn fired_ids(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.fired
            .iter()
            .filter(|f| seen.insert(f.rule_id.as_str()))
            .map(|f| f.rule_id.clone())
            .collect()
    }
}

/// Applies a rule table to content.
#[derive(Debug, Clone, Copy)]
pub struct Transformer<'a> {
    rules: &'a RuleTable,
    signatures: &'a SignatureSet,
    max_passes: u32,
}

impl<'a> Transformer<'a> {
    pub fn new(rules: &'a RuleTable, signatures: &'a SignatureSet, max_passes: u32) -> Self {
        Self {
            rules,
            signatures,
            max_passes: max_passes.max(1),
        }
    }

    pub fn max_passes(&self) -> u32 {
        self.max_passes
    }

    pub fn transform(&self, content: &str, extension: Option<&str>) -> TransformOutcome {
        let mut current = content.to_string();
        let mut fired = Vec::new();
        let mut skipped = Vec::new();
        let mut reached_fixpoint = false;
        let mut passes = 0;

        for pass in 1..=self.max_passes {
            passes = pass;
            let before_pass = current.clone();

            for rule in self.rules.rules() {
                if !rule.applies_to(extension) {
                    continue;
                }
                if let Some(required) = rule.requires_signature() {
                    if !self.signatures.matches(required, &current) {
                        continue;
                    }
                }

                let next = rule.apply(&current);
                if next == current.as_str() {
                    continue;
                }

                let before = delimiter_balance(&current).imbalance();
                let after = delimiter_balance(&next).imbalance();
                if after > before {
                    debug!(rule = rule.id(), pass, before, after, "rule rejected");
                    skipped.push(RuleSkip {
                        rule_id: rule.id().to_string(),
                        pass,
                        reason: format!("delimiter imbalance would grow from {before} to {after}"),
                    });
                    continue;
                }

                current = next.into_owned();
                fired.push(FiredRule {
                    rule_id: rule.id().to_string(),
                    pass,
                });
            }

            if current == before_pass {
                reached_fixpoint = true;
                break;
            }
        }

        TransformOutcome {
            content: current,
            fired,
            skipped,
            reached_fixpoint,
            passes,
        }
    }
}
