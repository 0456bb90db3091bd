//! Unified Validator
//!
//! Orchestrates the validation passes into a single pipeline:
//! shape, permission gate, triggers, then consistency. Rules come from the
//! embedded YAML table or a custom file.

use std::path::Path;

use crate::error::Result;
use crate::errors::{ValidationResult, Violation};
use crate::frontmatter::MarkdownDocument;
use crate::rules::RuleTable;
use crate::validators::{
    validate_consistency, validate_fragment_keys, validate_imported_toolsets, validate_permissions,
    validate_shape, validate_triggers, OptionSchemas,
};
use crate::workflow::WorkflowConfig;

/// The unified validator that runs every pass
pub struct Validator {
    rules: RuleTable,
    option_schemas: OptionSchemas,
}

impl Validator {
    pub fn new(rules: RuleTable) -> Result<Self> {
        let option_schemas = OptionSchemas::compile(&rules)?;
        Ok(Self {
            rules,
            option_schemas,
        })
    }

    /// Validator over the embedded rule table
    pub fn with_builtin_rules() -> Result<Self> {
        Self::new(RuleTable::builtin())
    }

    /// Load validator from a custom rule file
    pub fn from_file(rules_path: &Path) -> Result<Self> {
        Self::new(RuleTable::from_file(rules_path)?)
    }

    /// Validate a lifted workflow through every pass
    pub fn validate(&self, config: &WorkflowConfig, file_path: &str) -> ValidationResult {
        let mut result = ValidationResult::new(file_path);

        // Pass 1: Shape
        result.extend(validate_shape(config, &self.rules, &self.option_schemas));

        // Pass 2: Permission gate
        result.extend(validate_permissions(config, &self.rules));

        // Pass 3: Triggers
        result.extend(validate_triggers(config));

        // Pass 4: Consistency (warnings, after every per-field pass)
        result.extend(validate_consistency(config, &self.rules));

        tracing::debug!(
            file = file_path,
            errors = result.errors.len(),
            warnings = result.warnings.len(),
            "validated"
        );
        result
    }

    pub fn validate_document(&self, doc: &MarkdownDocument, file_path: &str) -> ValidationResult {
        self.validate(&WorkflowConfig::lift(&doc.frontmatter), file_path)
    }

    /// Validate a workflow file from path
    pub fn validate_file(&self, path: &Path) -> Result<ValidationResult> {
        let content = std::fs::read_to_string(path)?;
        let file_path = path.to_string_lossy().to_string();
        let doc = MarkdownDocument::parse(&content, &file_path)?;
        Ok(self.validate_document(&doc, &file_path))
    }

    /// Validate an imported fragment; locations are prefixed with the import
    pub fn validate_fragment(&self, config: &WorkflowConfig, import: &str) -> Vec<Violation> {
        validate_fragment_keys(config, &self.rules, import)
            .into_iter()
            .map(|v| v.within(import))
            .collect()
    }

    /// Toolset permission warnings for a `github` tool that only an import
    /// declares; locations are prefixed with the import
    pub fn validate_imported_tools(
        &self,
        config: &WorkflowConfig,
        fragment: &WorkflowConfig,
        import: &str,
    ) -> Vec<Violation> {
        validate_imported_toolsets(config, fragment, &self.rules)
            .into_iter()
            .map(|v| v.within(import))
            .collect()
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }
}
