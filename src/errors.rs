//! Validation diagnostics
//!
//! Structured violations for each validation pass, designed for
//! helpful messages with a frontmatter location and a fix suggestion.

use serde::Serialize;
use thiserror::Error;

/// Diagnostic family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticKind {
    /// Wrong value kind for a field
    Shape,
    /// Disallowed permission level
    Policy,
    /// Import could not be fetched or cached
    Resolution,
    /// Non-fatal cross-field mismatch
    Consistency,
}

impl std::fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiagnosticKind::Shape => write!(f, "shape"),
            DiagnosticKind::Policy => write!(f, "policy"),
            DiagnosticKind::Resolution => write!(f, "resolution"),
            DiagnosticKind::Consistency => write!(f, "consistency"),
        }
    }
}

/// Severity of validation issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A single violation, located by dotted frontmatter path
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Violation {
    // Shape errors
    #[error("unknown field '{field}'")]
    UnknownField {
        location: String,
        field: String,
        suggestions: Vec<String>,
    },

    #[error("expected {expected}, found {found}")]
    WrongShape {
        location: String,
        expected: String,
        found: String,
    },

    #[error("tool '{tool}' is not allowed: {reason}")]
    DisallowedTool {
        location: String,
        tool: String,
        reason: String,
    },

    #[error("unknown tool '{tool}'")]
    UnknownTool {
        location: String,
        tool: String,
        suggestions: Vec<String>,
    },

    #[error("'{field}' must be a bare key with no value, found {found}")]
    PresenceOnly {
        location: String,
        field: String,
        found: String,
    },

    #[error("boolean input '{input}' has default {value}; it must be the string \"{value}\"")]
    BooleanDefault {
        location: String,
        input: String,
        value: bool,
    },

    #[error("input '{input}' has unsupported type '{input_type}'")]
    InvalidInputType {
        location: String,
        input: String,
        input_type: String,
    },

    #[error("safe output '{name}' uses underscores")]
    UnderscoreIdentifier {
        location: String,
        name: String,
        hyphenated: String,
    },

    #[error("unknown safe output '{name}'")]
    UnknownSafeOutput {
        location: String,
        name: String,
        suggestions: Vec<String>,
    },

    #[error("invalid option: {details}")]
    InvalidOption { location: String, details: String },

    #[error("unknown engine '{engine}'")]
    UnknownEngine {
        location: String,
        engine: String,
        suggestions: Vec<String>,
    },

    #[error("unknown permission scope '{scope}'")]
    UnknownPermissionScope {
        location: String,
        scope: String,
        suggestions: Vec<String>,
    },

    #[error("invalid access level '{level}' (expected read or none)")]
    InvalidAccessLevel { location: String, level: String },

    #[error("trigger '{trigger}' requires a non-empty 'types' list")]
    MissingTriggerTypes { location: String, trigger: String },

    #[error("trigger '{trigger}' must be a bare key or a mapping, found {found}")]
    AmbiguousTrigger {
        location: String,
        trigger: String,
        found: String,
    },

    #[error("unknown trigger '{trigger}'")]
    UnknownTrigger {
        location: String,
        trigger: String,
        suggestions: Vec<String>,
    },

    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidCron {
        location: String,
        expression: String,
        reason: String,
    },

    #[error("invalid network domain '{domain}'")]
    InvalidDomain { location: String, domain: String },

    #[error("import '{reference}' is a raw network locator")]
    RawLocatorImport { location: String, reference: String },

    #[error("malformed import '{reference}': {reason}")]
    MalformedImport {
        location: String,
        reference: String,
        reason: String,
    },

    // Policy errors
    #[error("permission '{scope}: {level}' grants write access (strict mode allows read-only permissions)")]
    WritePermission {
        location: String,
        scope: String,
        level: String,
    },

    // Resolution errors
    #[error("import '{reference}' could not be resolved: {reason}")]
    ImportFailed {
        location: String,
        reference: String,
        reason: String,
        severity: Severity,
    },

    // Consistency warnings
    #[error("github toolset '{toolset}' needs '{scope}: read' in permissions")]
    MissingImpliedPermission {
        location: String,
        toolset: String,
        scope: String,
    },

    #[error("workflow declares no trigger and can never run")]
    NoTriggers { location: String },

    #[error("mcp server '{server}' exposes no operations ('allowed' is empty)")]
    EmptyAllowList { location: String, server: String },

    #[error("'{key}' in imported fragment '{import}' is ignored")]
    IgnoredImportKey {
        location: String,
        key: String,
        import: String,
    },
}

impl Violation {
    /// Diagnostic family of this violation
    pub fn kind(&self) -> DiagnosticKind {
        match self {
            Violation::WritePermission { .. } => DiagnosticKind::Policy,
            Violation::ImportFailed { .. } => DiagnosticKind::Resolution,
            Violation::MissingImpliedPermission { .. }
            | Violation::NoTriggers { .. }
            | Violation::EmptyAllowList { .. }
            | Violation::IgnoredImportKey { .. } => DiagnosticKind::Consistency,
            _ => DiagnosticKind::Shape,
        }
    }

    /// Get severity (error vs warning)
    pub fn severity(&self) -> Severity {
        match self {
            Violation::ImportFailed { severity, .. } => *severity,
            _ if self.kind() == DiagnosticKind::Consistency => Severity::Warning,
            _ => Severity::Error,
        }
    }

    /// Dotted frontmatter path the violation points at
    pub fn location(&self) -> &str {
        match self {
            Violation::UnknownField { location, .. }
            | Violation::WrongShape { location, .. }
            | Violation::DisallowedTool { location, .. }
            | Violation::UnknownTool { location, .. }
            | Violation::PresenceOnly { location, .. }
            | Violation::BooleanDefault { location, .. }
            | Violation::InvalidInputType { location, .. }
            | Violation::UnderscoreIdentifier { location, .. }
            | Violation::UnknownSafeOutput { location, .. }
            | Violation::InvalidOption { location, .. }
            | Violation::UnknownEngine { location, .. }
            | Violation::UnknownPermissionScope { location, .. }
            | Violation::InvalidAccessLevel { location, .. }
            | Violation::MissingTriggerTypes { location, .. }
            | Violation::AmbiguousTrigger { location, .. }
            | Violation::UnknownTrigger { location, .. }
            | Violation::InvalidCron { location, .. }
            | Violation::InvalidDomain { location, .. }
            | Violation::RawLocatorImport { location, .. }
            | Violation::MalformedImport { location, .. }
            | Violation::WritePermission { location, .. }
            | Violation::ImportFailed { location, .. }
            | Violation::MissingImpliedPermission { location, .. }
            | Violation::NoTriggers { location }
            | Violation::EmptyAllowList { location, .. }
            | Violation::IgnoredImportKey { location, .. } => location,
        }
    }

    /// Prefix the location, e.g. with the import a fragment came from
    pub fn within(mut self, prefix: &str) -> Self {
        let location = self.location_mut();
        *location = format!("{}:{}", prefix, location);
        self
    }

    fn location_mut(&mut self) -> &mut String {
        match self {
            Violation::UnknownField { location, .. }
            | Violation::WrongShape { location, .. }
            | Violation::DisallowedTool { location, .. }
            | Violation::UnknownTool { location, .. }
            | Violation::PresenceOnly { location, .. }
            | Violation::BooleanDefault { location, .. }
            | Violation::InvalidInputType { location, .. }
            | Violation::UnderscoreIdentifier { location, .. }
            | Violation::UnknownSafeOutput { location, .. }
            | Violation::InvalidOption { location, .. }
            | Violation::UnknownEngine { location, .. }
            | Violation::UnknownPermissionScope { location, .. }
            | Violation::InvalidAccessLevel { location, .. }
            | Violation::MissingTriggerTypes { location, .. }
            | Violation::AmbiguousTrigger { location, .. }
            | Violation::UnknownTrigger { location, .. }
            | Violation::InvalidCron { location, .. }
            | Violation::InvalidDomain { location, .. }
            | Violation::RawLocatorImport { location, .. }
            | Violation::MalformedImport { location, .. }
            | Violation::WritePermission { location, .. }
            | Violation::ImportFailed { location, .. }
            | Violation::MissingImpliedPermission { location, .. }
            | Violation::NoTriggers { location }
            | Violation::EmptyAllowList { location, .. }
            | Violation::IgnoredImportKey { location, .. } => location,
        }
    }

    /// Get suggestion for fixing this violation
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Violation::UnknownField { suggestions, .. }
            | Violation::UnknownTool { suggestions, .. }
            | Violation::UnknownSafeOutput { suggestions, .. }
            | Violation::UnknownEngine { suggestions, .. }
            | Violation::UnknownPermissionScope { suggestions, .. }
            | Violation::UnknownTrigger { suggestions, .. } => did_you_mean(suggestions),
            Violation::DisallowedTool { tool, .. } if tool == "read" => {
                Some("Remove 'read'; read access is implied by 'edit'".to_string())
            }
            Violation::PresenceOnly { field, .. } => Some(format!("Write '{}:' with nothing after the colon", field)),
            Violation::BooleanDefault { value, .. } => Some(format!("default: \"{}\"", value)),
            Violation::UnderscoreIdentifier { hyphenated, .. } => {
                Some(format!("Rename to '{}'", hyphenated))
            }
            Violation::MissingTriggerTypes { .. } => {
                Some("Add types, e.g. 'types: [opened, synchronize]'".to_string())
            }
            Violation::AmbiguousTrigger { trigger, .. } => {
                Some(format!("Write '{}:' with nothing after the colon", trigger))
            }
            Violation::RawLocatorImport { .. } | Violation::MalformedImport { .. } => {
                Some("Use owner/repo/path/to/file.md@ref".to_string())
            }
            Violation::WritePermission { scope, .. } => Some(format!(
                "Use '{}: read' and declare the mutation under 'safe-outputs'",
                scope
            )),
            Violation::MissingImpliedPermission { scope, .. } => {
                Some(format!("Add '{}: read' to permissions", scope))
            }
            Violation::NoTriggers { .. } => Some("Add 'on: workflow_dispatch:'".to_string()),
            _ => None,
        }
    }

    /// Serializable view for `--format json`
    pub fn report(&self) -> DiagnosticReport {
        DiagnosticReport {
            kind: self.kind(),
            severity: self.severity(),
            location: self.location().to_string(),
            message: self.to_string(),
            suggestion: self.suggestion(),
        }
    }
}

fn did_you_mean(suggestions: &[String]) -> Option<String> {
    if suggestions.is_empty() {
        None
    } else {
        Some(format!("Did you mean: {}?", suggestions.join(", ")))
    }
}

/// Flattened diagnostic for machine-readable output
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticReport {
    pub kind: DiagnosticKind,
    pub severity: Severity,
    pub location: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// Result of validating a workflow file
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub file_path: String,
    pub errors: Vec<Violation>,
    pub warnings: Vec<Violation>,
}

impl ValidationResult {
    pub fn new(file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Route a violation by its severity
    pub fn add(&mut self, violation: Violation) {
        if violation.severity() == Severity::Warning {
            self.warnings.push(violation);
        } else {
            self.errors.push(violation);
        }
    }

    pub fn extend(&mut self, violations: impl IntoIterator<Item = Violation>) {
        for v in violations {
            self.add(v);
        }
    }

    /// Errors of one family
    pub fn errors_of(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Violation> {
        self.errors.iter().filter(move |e| e.kind() == kind)
    }

    pub fn reports(&self) -> Vec<DiagnosticReport> {
        self.errors
            .iter()
            .chain(self.warnings.iter())
            .map(Violation::report)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_display() {
        assert_eq!(format!("{}", DiagnosticKind::Shape), "shape");
        assert_eq!(format!("{}", DiagnosticKind::Policy), "policy");
    }

    #[test]
    fn test_write_permission_is_policy_error() {
        let v = Violation::WritePermission {
            location: "permissions.contents".to_string(),
            scope: "contents".to_string(),
            level: "write".to_string(),
        };
        assert_eq!(v.kind(), DiagnosticKind::Policy);
        assert_eq!(v.severity(), Severity::Error);
        assert_eq!(v.location(), "permissions.contents");
        assert!(v.suggestion().unwrap().contains("safe-outputs"));
    }

    #[test]
    fn test_consistency_is_warning() {
        let v = Violation::MissingImpliedPermission {
            location: "tools.github.toolsets".to_string(),
            toolset: "issues".to_string(),
            scope: "issues".to_string(),
        };
        assert_eq!(v.severity(), Severity::Warning);
    }

    #[test]
    fn test_import_failed_keeps_own_severity() {
        let v = Violation::ImportFailed {
            location: "imports[0]".to_string(),
            reference: "a/b/c.md@v1".to_string(),
            reason: "timeout".to_string(),
            severity: Severity::Warning,
        };
        assert_eq!(v.kind(), DiagnosticKind::Resolution);
        assert_eq!(v.severity(), Severity::Warning);
    }

    #[test]
    fn test_validation_result_routes_by_severity() {
        let mut result = ValidationResult::new("ci.md");
        assert!(result.is_valid());

        result.add(Violation::NoTriggers {
            location: "on".to_string(),
        });
        assert!(result.is_valid());
        assert!(result.has_warnings());

        result.add(Violation::MissingTriggerTypes {
            location: "on.pull_request".to_string(),
            trigger: "pull_request".to_string(),
        });
        assert!(!result.is_valid());
        assert_eq!(result.errors_of(DiagnosticKind::Shape).count(), 1);
        assert_eq!(result.reports().len(), 2);
    }

    #[test]
    fn test_unknown_field_suggestion() {
        let v = Violation::UnknownField {
            location: "permisions".to_string(),
            field: "permisions".to_string(),
            suggestions: vec!["permissions".to_string()],
        };
        assert_eq!(v.suggestion(), Some("Did you mean: permissions?".to_string()));
    }

    #[test]
    fn test_report_serializes() {
        let v = Violation::UnderscoreIdentifier {
            location: "safe-outputs.create_issue".to_string(),
            name: "create_issue".to_string(),
            hyphenated: "create-issue".to_string(),
        };
        let json = serde_json::to_value(v.report()).unwrap();
        assert_eq!(json["kind"], "shape");
        assert_eq!(json["severity"], "error");
        assert_eq!(json["suggestion"], "Rename to 'create-issue'");
    }
}
