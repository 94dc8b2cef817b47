//! Corruption classifier.
//!
//! Evaluates every signature against a file's content and buckets the file
//! into a [`Tier`]. Classification is a pure function of the content and
//! the signature set: the same input always yields the same tier and the
//! same ordered signature list.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::catalog;
use crate::domain::error::{Result, TreemendError};
use crate::domain::file::Tier;
use crate::domain::signature::{CorruptionSignature, SignatureSpec, Strength};

// ---------------------------------------------------------------------------
// Signature set
// ---------------------------------------------------------------------------

/// Compiled signatures, kept in id order.
#[derive(Debug, Clone)]
pub struct SignatureSet {
    signatures: Vec<CorruptionSignature>,
}

impl SignatureSet {
    /// Compile `specs`. Rejects duplicate ids and invalid patterns.
    pub fn new(specs: Vec<SignatureSpec>) -> Result<Self> {
        let mut seen = BTreeSet::new();
        let mut signatures = Vec::with_capacity(specs.len());
        for spec in specs {
            if !seen.insert(spec.id.clone()) {
                return Err(TreemendError::InvalidSignature {
                    id: spec.id,
                    reason: "duplicate signature id".to_string(),
                });
            }
            signatures.push(CorruptionSignature::compile(spec)?);
        }
        signatures.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(Self { signatures })
    }

    pub fn builtin() -> Result<Self> {
        Self::new(catalog::builtin_signatures())
    }

    pub fn get(&self, id: &str) -> Option<&CorruptionSignature> {
        self.signatures
            .binary_search_by(|s| s.id().cmp(id))
            .ok()
            .map(|idx| &self.signatures[idx])
    }

    /// Whether signature `id` matches `content`. Unknown ids never match.
    pub fn matches(&self, id: &str, content: &str) -> bool {
        self.get(id).is_some_and(|s| s.matches(content))
    }

    pub fn iter(&self) -> impl Iterator<Item = &CorruptionSignature> {
        self.signatures.iter()
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

/// Tier boundaries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClassifierThresholds {
    /// Matched strong signatures at which a file is beyond patching.
    pub unsalvageable_strong: usize,
}

impl Default for ClassifierThresholds {
    fn default() -> Self {
        Self {
            unsalvageable_strong: 2,
        }
    }
}

impl ClassifierThresholds {
    pub fn validate(&self) -> Result<()> {
        if self.unsalvageable_strong == 0 {
            return Err(TreemendError::Config(
                "classifier.unsalvageable_strong must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Result of classifying one file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Classification {
    pub tier: Tier,

    /// Matched signature ids, in id order.
    pub signatures: Vec<String>,

    pub strong_matches: usize,
    pub weak_matches: usize,
}

impl Classification {
    pub fn clean() -> Self {
        Self {
            tier: Tier::Clean,
            signatures: Vec::new(),
            strong_matches: 0,
            weak_matches: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Classifier {
    signatures: SignatureSet,
    thresholds: ClassifierThresholds,
}

impl Classifier {
    pub fn new(signatures: SignatureSet, thresholds: ClassifierThresholds) -> Result<Self> {
        thresholds.validate()?;
        Ok(Self {
            signatures,
            thresholds,
        })
    }

    pub fn builtin() -> Result<Self> {
        Self::new(SignatureSet::builtin()?, ClassifierThresholds::default())
    }

    pub fn signatures(&self) -> &SignatureSet {
        &self.signatures
    }

    pub fn thresholds(&self) -> ClassifierThresholds {
        self.thresholds
    }

    pub fn classify(&self, content: &str) -> Classification {
        let mut matched = Vec::new();
        let mut strong_matches = 0;
        let mut weak_matches = 0;

        for signature in self.signatures.iter() {
            if !signature.matches(content) {
                continue;
            }
            match signature.strength() {
                Strength::Strong => strong_matches += 1,
                Strength::Weak => weak_matches += 1,
            }
            matched.push(signature.id().to_string());
        }

        let tier = if strong_matches >= self.thresholds.unsalvageable_strong {
            Tier::Unsalvageable
        } else if matched.is_empty() {
            Tier::Clean
        } else {
            Tier::Patchable
        };

        Classification {
            tier,
            signatures: matched,
            strong_matches,
            weak_matches,
        }
    }
}
