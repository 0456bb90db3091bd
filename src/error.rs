//! Error types with fix suggestions
//!
//! Error code ranges:
//! - AWC-000-009: Document errors (read, frontmatter, YAML)
//! - AWC-010-019: Configuration and rule table errors
//! - AWC-020-029: Import resolution errors
//! - AWC-030-039: Compilation errors

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AwcError>;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

#[derive(Error, Debug)]
pub enum AwcError {
    // ═══════════════════════════════════════════
    // DOCUMENT ERRORS (000-009)
    // ═══════════════════════════════════════════
    #[error("[AWC-001] '{path}' has no frontmatter (expected a leading '---' block)")]
    FrontmatterMissing { path: String },

    #[error("[AWC-002] '{path}' frontmatter is not closed by '---'")]
    FrontmatterUnterminated { path: String },

    #[error("[AWC-003] YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("[AWC-004] Frontmatter must be a mapping, found {found}")]
    FrontmatterNotMapping { found: &'static str },

    #[error("[AWC-005] IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("[AWC-006] Workflow '{name}' not found in {dir}")]
    WorkflowNotFound { name: String, dir: String },

    // ═══════════════════════════════════════════
    // CONFIG ERRORS (010-019)
    // ═══════════════════════════════════════════
    #[error("[AWC-010] Configuration error: {reason}")]
    Config { reason: String },

    #[error("[AWC-011] Rule table error: {reason}")]
    Rules { reason: String },

    // ═══════════════════════════════════════════
    // RESOLUTION ERRORS (020-029)
    // ═══════════════════════════════════════════
    #[error("[AWC-020] Malformed import '{reference}': {reason}")]
    MalformedImport { reference: String, reason: String },

    #[error("[AWC-021] Import origin unreachable for '{coordinate}': {reason}")]
    OriginUnreachable { coordinate: String, reason: String },

    #[error("[AWC-022] Import path not found: '{coordinate}'")]
    ImportPathNotFound { coordinate: String },

    #[error("[AWC-023] Version pin '{pin}' cannot be resolved for '{coordinate}'")]
    PinUnresolvable { coordinate: String, pin: String },

    #[error("[AWC-024] Fetching '{coordinate}' timed out after {timeout_secs}s")]
    FetchTimeout { coordinate: String, timeout_secs: u64 },

    #[error("[AWC-025] Import cycle: {chain}")]
    ImportCycle { chain: String },

    #[error("[AWC-026] Failed to write import cache '{path}': {reason}")]
    CacheWrite { path: String, reason: String },

    // ═══════════════════════════════════════════
    // COMPILE ERRORS (030-039)
    // ═══════════════════════════════════════════
    #[error("[AWC-030] Workflow '{path}' has {count} error(s); no lock file written")]
    ValidationFailed { path: String, count: usize },

    #[error("[AWC-031] Failed to emit lock file: {reason}")]
    Emit { reason: String },
}

impl AwcError {
    /// Whether this error comes from fetching or caching an import
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            AwcError::OriginUnreachable { .. }
                | AwcError::ImportPathNotFound { .. }
                | AwcError::PinUnresolvable { .. }
                | AwcError::FetchTimeout { .. }
                | AwcError::ImportCycle { .. }
                | AwcError::CacheWrite { .. }
        )
    }

    /// Stable error code (e.g. "AWC-022")
    pub fn code(&self) -> &'static str {
        match self {
            AwcError::FrontmatterMissing { .. } => "AWC-001",
            AwcError::FrontmatterUnterminated { .. } => "AWC-002",
            AwcError::YamlParse(_) => "AWC-003",
            AwcError::FrontmatterNotMapping { .. } => "AWC-004",
            AwcError::Io(_) => "AWC-005",
            AwcError::WorkflowNotFound { .. } => "AWC-006",
            AwcError::Config { .. } => "AWC-010",
            AwcError::Rules { .. } => "AWC-011",
            AwcError::MalformedImport { .. } => "AWC-020",
            AwcError::OriginUnreachable { .. } => "AWC-021",
            AwcError::ImportPathNotFound { .. } => "AWC-022",
            AwcError::PinUnresolvable { .. } => "AWC-023",
            AwcError::FetchTimeout { .. } => "AWC-024",
            AwcError::ImportCycle { .. } => "AWC-025",
            AwcError::CacheWrite { .. } => "AWC-026",
            AwcError::ValidationFailed { .. } => "AWC-030",
            AwcError::Emit { .. } => "AWC-031",
        }
    }
}

impl FixSuggestion for AwcError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            AwcError::FrontmatterMissing { .. } => {
                Some("Start the file with '---', the YAML frontmatter, then '---'")
            }
            AwcError::FrontmatterUnterminated { .. } => {
                Some("Close the frontmatter with a line containing only '---'")
            }
            AwcError::YamlParse(_) => Some("Check YAML syntax: indentation and quoting"),
            AwcError::FrontmatterNotMapping { .. } => {
                Some("Frontmatter must be 'key: value' pairs at the top level")
            }
            AwcError::Io(_) => Some("Check file path and permissions"),
            AwcError::WorkflowNotFound { .. } => Some("Run 'awc list' to see available workflows"),
            AwcError::Config { .. } => Some("Check ~/.config/awc/config.toml syntax"),
            AwcError::Rules { .. } => Some("Check the rule table YAML referenced by compile.rules"),
            AwcError::MalformedImport { .. } => {
                Some("Use owner/repo/path/to/file.md@ref instead of a URL")
            }
            AwcError::OriginUnreachable { .. } => {
                Some("Check network access and the resolver api_url setting")
            }
            AwcError::ImportPathNotFound { .. } => {
                Some("Verify the file path exists in the repository at that ref")
            }
            AwcError::PinUnresolvable { .. } => {
                Some("Use an existing tag, branch or commit SHA after '@'")
            }
            AwcError::FetchTimeout { .. } => Some("Retry, or raise AWC_FETCH_TIMEOUT"),
            AwcError::ImportCycle { .. } => Some("Remove one of the imports forming the cycle"),
            AwcError::CacheWrite { .. } => Some("Check permissions on the import cache directory"),
            AwcError::ValidationFailed { .. } => {
                Some("Run 'awc validate <name>' to see every diagnostic")
            }
            AwcError::Emit { .. } => None,
        }
    }
}
