//! Compiled repair engine.
//!
//! Turns an [`EngineConfig`] into the validated, immutable pieces the
//! controller drives: classifier, ordered rule table, template registry and
//! config synthesizer. All validation happens here, before any file is
//! touched.

use std::path::Path;

use crate::catalog;
use crate::classifier::{Classifier, SignatureSet};
use crate::config::EngineConfig;
use crate::domain::error::Result;
use crate::repair::RepairContext;
use crate::scanner::Scanner;
use crate::strictness::{builtin_ladders, ConfigSynthesizer};
use crate::template::{builtin_templates, TemplateRegistry};
use crate::transform::{RuleTable, Transformer};

#[derive(Debug, Clone)]
pub struct RepairEngine {
    config: EngineConfig,
    classifier: Classifier,
    rules: RuleTable,
    templates: TemplateRegistry,
    synthesizer: ConfigSynthesizer,
}

impl RepairEngine {
    pub fn from_config(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let signature_specs = if config.signatures.is_empty() {
            catalog::builtin_signatures()
        } else {
            config.signatures.clone()
        };
        let signatures = SignatureSet::new(signature_specs)?;

        let rule_specs = if config.rules.is_empty() {
            catalog::builtin_rules()
        } else {
            config.rules.clone()
        };
        let rules = RuleTable::new(rule_specs)?.for_profile(config.transform.profile);
        rules.check_signatures(&signatures)?;

        let mut templates = TemplateRegistry::new(builtin_templates())?;
        for spec in &config.templates {
            templates.register(spec.clone())?;
        }

        let ladders = if config.ladders.is_empty() {
            builtin_ladders()
        } else {
            config.ladders.clone()
        };
        let synthesizer = ConfigSynthesizer::new(ladders)?;

        let classifier = Classifier::new(signatures, config.classifier)?;

        Ok(Self {
            config,
            classifier,
            rules,
            templates,
            synthesizer,
        })
    }

    pub fn builtin() -> Result<Self> {
        Self::from_config(EngineConfig::default())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Rules active under the configured profile, in application order.
    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    pub fn synthesizer(&self) -> &ConfigSynthesizer {
        &self.synthesizer
    }

    pub fn transformer(&self) -> Transformer<'_> {
        Transformer::new(
            &self.rules,
            self.classifier.signatures(),
            self.config.transform.max_passes,
        )
    }

    /// Scanner for `root`, pruning the run's report directory.
    pub fn scanner(&self, root: &Path) -> Scanner {
        Scanner::new(self.config.scan.clone()).exclude_path(self.config.runs_dir(root))
    }

    pub fn repair_context<'a>(
        &'a self,
        root: &'a Path,
        iteration: u32,
        write: bool,
    ) -> RepairContext<'a> {
        RepairContext {
            root,
            classifier: &self.classifier,
            transformer: self.transformer(),
            templates: &self.templates,
            iteration,
            write,
        }
    }
}
