//! awc - agentic workflow compiler
//!
//! Validates markdown workflows (YAML frontmatter plus a prompt body),
//! resolves their imports and emits a locked CI workflow next to each.

pub mod cache;
pub mod compiler;
pub mod config;
pub mod cron;
pub mod error;
pub mod errors;
pub mod field;
pub mod frontmatter;
pub mod imports;
pub mod init;
pub mod lockfile;
pub mod resolver;
pub mod rules;
pub mod util;
pub mod validator;
pub mod validators;
pub mod workflow;

pub use cache::ImportCache;
pub use compiler::{CompileOptions, CompileOutcome, Compiler, LockState, LockStatus};
pub use config::AwcConfig;
pub use error::{AwcError, FixSuggestion, Result};
pub use errors::{DiagnosticKind, Severity, ValidationResult, Violation};
pub use field::{Presence, Section};
pub use frontmatter::{Frontmatter, MarkdownDocument};
pub use imports::{ImportCoordinate, ImportReference, ImportSource};
pub use resolver::{Fetcher, HttpFetcher, Resolver};
pub use rules::RuleTable;
pub use validator::Validator;
pub use workflow::WorkflowConfig;
