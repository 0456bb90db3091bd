//! Compiler Configuration Module
//!
//! Config is stored in `~/.config/awc/config.toml`.
//!
//! ## Priority Order (highest to lowest)
//!
//! 1. Environment variables (`AWC_API_URL`, `AWC_FETCH_TIMEOUT`, `AWC_CACHE_DIR`, `GITHUB_TOKEN`)
//! 2. Config file (`~/.config/awc/config.toml`)
//! 3. Defaults

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AwcError, Result};
use crate::util::constants::{
    DEFAULT_API_URL, DEFAULT_CACHE_DIR, DEFAULT_WORKFLOWS_DIR, FETCH_TIMEOUT,
};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AwcConfig {
    #[serde(default)]
    pub resolver: ResolverSettings,

    #[serde(default)]
    pub compile: CompileSettings,

    /// Origin token; only ever read from the environment
    #[serde(skip)]
    pub token: Option<String>,
}

/// Import resolver settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResolverSettings {
    /// Contents API base URL
    pub api_url: String,

    /// Per-fetch timeout in seconds
    pub timeout_secs: u64,

    /// Import cache directory, relative to the working directory
    pub cache_dir: PathBuf,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            timeout_secs: FETCH_TIMEOUT.as_secs(),
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
        }
    }
}

/// Compile settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CompileSettings {
    pub workflows_dir: PathBuf,

    /// Replacement rule table
    pub rules: Option<PathBuf>,
}

impl Default for CompileSettings {
    fn default() -> Self {
        Self {
            workflows_dir: PathBuf::from(DEFAULT_WORKFLOWS_DIR),
            rules: None,
        }
    }
}

impl AwcConfig {
    /// Returns `~/.config/awc/` on Unix, `%APPDATA%/awc/` on Windows
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("awc")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load configuration from the default location
    ///
    /// Returns default config if file doesn't exist.
    /// Returns error if file exists but is malformed.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| AwcError::Config {
            reason: format!("Failed to read config file: {}", e),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| AwcError::Config {
            reason: format!("Failed to parse config file: {}", e),
        })?;
        if config.resolver.timeout_secs == 0 {
            return Err(AwcError::Config {
                reason: "resolver.timeout_secs must be at least 1".to_string(),
            });
        }
        Ok(config)
    }

    /// Merge with process environment variables
    ///
    /// Environment variables take precedence over config file values.
    pub fn with_env(self) -> Result<Self> {
        self.with_env_from(|key| std::env::var(key).ok())
    }

    /// Merge with variables from `lookup`
    pub fn with_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(url) = var("AWC_API_URL") {
            self.resolver.api_url = url;
        }

        if let Some(secs) = var("AWC_FETCH_TIMEOUT") {
            self.resolver.timeout_secs = secs
                .parse()
                .ok()
                .filter(|n: &u64| *n > 0)
                .ok_or_else(|| AwcError::Config {
                    reason: format!("AWC_FETCH_TIMEOUT must be whole seconds above 0, got '{}'", secs),
                })?;
        }

        if let Some(dir) = var("AWC_CACHE_DIR") {
            self.resolver.cache_dir = PathBuf::from(dir);
        }

        if let Some(token) = var("GITHUB_TOKEN") {
            self.token = Some(token);
        }

        Ok(self)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.resolver.timeout_secs)
    }
}

/// Mask a token for display, e.g. "ghp_***"
pub fn mask_token(token: &str, visible_chars: usize) -> String {
    if token.is_empty() {
        return String::new();
    }

    let visible = token
        .char_indices()
        .nth(visible_chars)
        .map(|(i, _)| i)
        .unwrap_or(token.len());
    format!("{}***", &token[..visible])
}
