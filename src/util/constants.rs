//! Centralized constants for compiler configuration
//!
//! Timeouts, limits and default locations in one place for easy tuning.

use std::time::Duration;

// ═══════════════════════════════════════════════════════════════
// Import Resolution
// ═══════════════════════════════════════════════════════════════

/// Timeout for fetching one import from the origin
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for establishing HTTP connections
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum number of HTTP redirects to follow
pub const REDIRECT_LIMIT: usize = 5;

/// Maximum nesting of transitive imports
pub const MAX_IMPORT_DEPTH: usize = 16;

/// GitHub REST API base
pub const DEFAULT_API_URL: &str = "https://api.github.com";

// ═══════════════════════════════════════════════════════════════
// Repository Layout
// ═══════════════════════════════════════════════════════════════

/// Import cache, relative to the repository root
pub const DEFAULT_CACHE_DIR: &str = ".github/aw/imports";

/// Where workflow markdown and lock files live
pub const DEFAULT_WORKFLOWS_DIR: &str = ".github/workflows";

/// Suffix of generated files, next to `<name>.md`
pub const LOCK_SUFFIX: &str = ".lock.yml";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_are_positive() {
        assert!(FETCH_TIMEOUT.as_secs() > 0);
        assert!(CONNECT_TIMEOUT.as_secs() > 0);
    }

    #[test]
    fn connect_timeout_is_shorter_than_fetch() {
        assert!(CONNECT_TIMEOUT < FETCH_TIMEOUT);
    }

    #[test]
    fn cache_lives_under_github_dir() {
        assert!(DEFAULT_CACHE_DIR.starts_with(".github/"));
        assert!(LOCK_SUFFIX.ends_with(".yml"));
    }
}
