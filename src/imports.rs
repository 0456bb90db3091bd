//! Import references
//!
//! An import names a reusable markdown fragment by structured coordinate:
//!
//! - `owner/repo/path/to/fragment.md@v1.2.0` (remote, pinned)
//! - `{ repo: owner/repo, path: fragment.md, ref: v1, optional: true }`
//! - `shared/tools.md` (local, relative to the importing file)
//!
//! Raw network locators (`https://...`) are rejected.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml::Value;

use crate::error::AwcError;
use crate::field::describe_value;
use crate::frontmatter::key_string;

static NAME_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").expect("name segment regex"));

static PIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.\-/]+$").expect("pin regex"));

const LOCATOR_SCHEMES: &[&str] = &["http", "https", "ftp", "git", "ssh", "file"];

/// Why an import declaration was rejected before any fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportShapeError {
    /// URL instead of a coordinate
    RawLocator,
    /// Wrong shape; the string explains
    Malformed(String),
}

impl ImportShapeError {
    pub fn into_error(self, reference: &str) -> AwcError {
        let reason = match self {
            ImportShapeError::RawLocator => "raw network locators are not allowed".to_string(),
            ImportShapeError::Malformed(reason) => reason,
        };
        AwcError::MalformedImport {
            reference: reference.to_string(),
            reason,
        }
    }
}

/// Remote fragment coordinate (origin, path, version pin)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImportCoordinate {
    pub owner: String,
    pub repo: String,
    pub path: String,
    pub pin: String,
}

impl ImportCoordinate {
    /// Parse `owner/repo/path@pin`
    pub fn parse(reference: &str) -> Result<Self, ImportShapeError> {
        let (location, pin) = reference
            .rsplit_once('@')
            .ok_or_else(|| ImportShapeError::Malformed("missing '@ref' version pin".to_string()))?;

        let mut parts = location.splitn(3, '/');
        let owner = parts.next().unwrap_or_default();
        let repo = parts.next().unwrap_or_default();
        let path = parts.next().unwrap_or_default();
        Self::from_parts(&format!("{}/{}", owner, repo), path, pin)
    }

    /// Build from `owner/repo`, path and pin, validating each part
    pub fn from_parts(repo: &str, path: &str, pin: &str) -> Result<Self, ImportShapeError> {
        let (owner, name) = repo.split_once('/').ok_or_else(|| {
            ImportShapeError::Malformed(format!("'{}' is not owner/repo", repo))
        })?;

        if !NAME_SEGMENT.is_match(owner) || !NAME_SEGMENT.is_match(name) {
            return Err(ImportShapeError::Malformed(format!(
                "'{}' is not owner/repo",
                repo
            )));
        }
        if pin.is_empty() {
            return Err(ImportShapeError::Malformed(
                "version pin after '@' is empty".to_string(),
            ));
        }
        validate_pin(pin)?;
        validate_fragment_path(path)?;
        if Path::new(path)
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(ImportShapeError::Malformed(format!(
                "'{}' escapes the repository root",
                path
            )));
        }

        Ok(Self {
            owner: owner.to_string(),
            repo: name.to_string(),
            path: path.to_string(),
            pin: pin.to_string(),
        })
    }

    /// Cache key covering the full coordinate
    pub fn key(&self) -> String {
        self.to_string()
    }

    /// Relative cache location: `owner/repo/pin/path`
    ///
    /// The pin is one percent-encoded segment, so `a.md@release/v1` and
    /// `v1/a.md@release` never share a file.
    pub fn cache_path(&self) -> PathBuf {
        let mut p = PathBuf::from(&self.owner);
        p.push(&self.repo);
        p.push(url::form_urlencoded::byte_serialize(self.pin.as_bytes()).collect::<String>());
        for segment in self.path.split('/') {
            p.push(segment);
        }
        p
    }
}

impl fmt::Display for ImportCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}@{}", self.owner, self.repo, self.path, self.pin)
    }
}

/// Where an import comes from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImportSource {
    Remote(ImportCoordinate),
    /// Path relative to the importing file
    Local(PathBuf),
}

impl fmt::Display for ImportSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportSource::Remote(c) => write!(f, "{}", c),
            ImportSource::Local(p) => write!(f, "{}", p.display()),
        }
    }
}

/// A declared import
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportReference {
    pub source: ImportSource,
    /// Optional imports degrade to a warning when a cached copy exists
    pub optional: bool,
}

impl ImportReference {
    pub fn remote(coordinate: ImportCoordinate) -> Self {
        Self {
            source: ImportSource::Remote(coordinate),
            optional: false,
        }
    }

    /// Parse one entry of the `imports` sequence
    pub fn parse(value: &Value) -> Result<Self, ImportShapeError> {
        match value {
            Value::String(s) => Self::parse_str(s),
            Value::Mapping(m) => {
                let mut repo = None;
                let mut path = None;
                let mut pin = None;
                let mut optional = false;

                for (k, v) in m {
                    let key = key_string(k);
                    match (key.as_str(), v) {
                        ("repo", Value::String(s)) => repo = Some(s.as_str()),
                        ("path", Value::String(s)) => path = Some(s.as_str()),
                        ("ref", Value::String(s)) => pin = Some(s.as_str()),
                        ("optional", Value::Bool(b)) => optional = *b,
                        ("url", _) => return Err(ImportShapeError::RawLocator),
                        ("repo" | "path" | "ref", other) => {
                            return Err(ImportShapeError::Malformed(format!(
                                "'{}' must be a string, found {}",
                                key,
                                describe_value(other)
                            )))
                        }
                        ("optional", other) => {
                            return Err(ImportShapeError::Malformed(format!(
                                "'optional' must be a boolean, found {}",
                                describe_value(other)
                            )))
                        }
                        _ => {
                            return Err(ImportShapeError::Malformed(format!(
                                "unknown import field '{}'",
                                key
                            )))
                        }
                    }
                }

                let path = path.ok_or_else(|| {
                    ImportShapeError::Malformed("import mapping needs 'path'".to_string())
                })?;
                if is_raw_locator(path) {
                    return Err(ImportShapeError::RawLocator);
                }

                let source = match (repo, pin) {
                    (Some(repo), Some(pin)) => {
                        ImportSource::Remote(ImportCoordinate::from_parts(repo, path, pin)?)
                    }
                    (Some(_), None) => {
                        return Err(ImportShapeError::Malformed(
                            "remote import needs a 'ref' version pin".to_string(),
                        ))
                    }
                    (None, Some(_)) => {
                        return Err(ImportShapeError::Malformed(
                            "'ref' given without 'repo'".to_string(),
                        ))
                    }
                    (None, None) => ImportSource::Local(parse_local(path)?),
                };
                Ok(Self { source, optional })
            }
            other => Err(ImportShapeError::Malformed(format!(
                "expected a string or mapping, found {}",
                describe_value(other)
            ))),
        }
    }

    fn parse_str(s: &str) -> Result<Self, ImportShapeError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ImportShapeError::Malformed("empty import".to_string()));
        }
        if is_raw_locator(s) {
            return Err(ImportShapeError::RawLocator);
        }
        let source = if s.contains('@') {
            ImportSource::Remote(ImportCoordinate::parse(s)?)
        } else {
            ImportSource::Local(parse_local(s)?)
        };
        Ok(Self {
            source,
            optional: false,
        })
    }
}

/// `https://...`, `git@host:...`, `www.host/...`
pub fn is_raw_locator(s: &str) -> bool {
    if s.contains("://") || s.starts_with("git@") || s.starts_with("www.") {
        return true;
    }
    url::Url::parse(s)
        .map(|u| LOCATOR_SCHEMES.contains(&u.scheme()))
        .unwrap_or(false)
}

fn parse_local(path: &str) -> Result<PathBuf, ImportShapeError> {
    let p = Path::new(path);
    if p.is_absolute() {
        return Err(ImportShapeError::Malformed(
            "local imports must be relative to the workflow file".to_string(),
        ));
    }
    validate_fragment_path(path)?;
    Ok(p.to_path_buf())
}

/// Ref name rules after git's check-ref-format
fn validate_pin(pin: &str) -> Result<(), ImportShapeError> {
    let invalid = |why: &str| {
        Err(ImportShapeError::Malformed(format!(
            "invalid version pin '{}': {}",
            pin, why
        )))
    };

    if !PIN.is_match(pin) {
        return invalid("only letters, digits, '.', '_', '-' and '/' are allowed");
    }
    if pin.starts_with('/') || pin.ends_with('/') {
        return invalid("must not start or end with '/'");
    }
    if pin.contains("..") {
        return invalid("must not contain '..'");
    }
    if pin.ends_with('.') || pin.ends_with(".lock") {
        return invalid("must not end with '.' or '.lock'");
    }
    if pin.split('/').any(|segment| segment.is_empty() || segment.starts_with('.')) {
        return invalid("path components must be non-empty and not start with '.'");
    }
    Ok(())
}

fn validate_fragment_path(path: &str) -> Result<(), ImportShapeError> {
    if path.is_empty() {
        return Err(ImportShapeError::Malformed("missing fragment path".to_string()));
    }
    if !path.ends_with(".md") {
        return Err(ImportShapeError::Malformed(format!(
            "'{}' is not a markdown fragment (.md)",
            path
        )));
    }
    if path.split('/').any(str::is_empty) {
        return Err(ImportShapeError::Malformed(format!("invalid path '{}'", path)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(s: &str) -> Result<ImportReference, ImportShapeError> {
        ImportReference::parse(&Value::String(s.to_string()))
    }

    #[test]
    fn test_parse_remote_coordinate() {
        let r = parse_str("acme/agentics/shared/tools.md@v1.2.0").unwrap();
        let ImportSource::Remote(c) = r.source else {
            panic!("expected remote import");
        };
        assert_eq!(c.owner, "acme");
        assert_eq!(c.repo, "agentics");
        assert_eq!(c.path, "shared/tools.md");
        assert_eq!(c.pin, "v1.2.0");
        assert_eq!(c.key(), "acme/agentics/shared/tools.md@v1.2.0");
        assert!(!r.optional);
    }

    #[test]
    fn test_cache_path_includes_pin() {
        let c = ImportCoordinate::parse("acme/agentics/shared/tools.md@release/2").unwrap();
        assert_eq!(
            c.cache_path(),
            PathBuf::from("acme/agentics/release%2F2/shared/tools.md")
        );
    }

    #[test]
    fn test_cache_path_distinct_for_slashed_pins() {
        let a = ImportCoordinate::parse("acme/x/a.md@release/v1").unwrap();
        let b = ImportCoordinate::parse("acme/x/v1/a.md@release").unwrap();
        assert_ne!(a.cache_path(), b.cache_path());
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn test_pin_cannot_escape() {
        for pin in ["../../../escape", "..", "v1/../main", "/v1", "v1/", ".hidden", "a//b", "v1.lock", "v1."] {
            let reference = format!("acme/x/a.md@{}", pin);
            assert!(
                matches!(
                    ImportCoordinate::parse(&reference),
                    Err(ImportShapeError::Malformed(_))
                ),
                "{} should be rejected",
                pin
            );
        }
        assert!(ImportCoordinate::parse("acme/x/a.md@feature/v1.2").is_ok());
    }

    #[test]
    fn test_raw_url_rejected() {
        assert_eq!(
            parse_str("https://raw.githubusercontent.com/acme/x/main/a.md"),
            Err(ImportShapeError::RawLocator)
        );
        assert_eq!(
            parse_str("git@github.com:acme/x.git"),
            Err(ImportShapeError::RawLocator)
        );
    }

    #[test]
    fn test_local_import() {
        let r = parse_str("shared/mcp/notion.md").unwrap();
        assert_eq!(r.source, ImportSource::Local(PathBuf::from("shared/mcp/notion.md")));
    }

    #[test]
    fn test_absolute_local_rejected() {
        assert!(matches!(
            parse_str("/etc/shared.md"),
            Err(ImportShapeError::Malformed(_))
        ));
    }

    #[test]
    fn test_missing_pin() {
        let err = parse_str("acme/agentics/tools.md@").unwrap_err();
        assert!(matches!(err, ImportShapeError::Malformed(m) if m.contains("empty")));
    }

    #[test]
    fn test_not_markdown() {
        let err = parse_str("acme/agentics/tools.yaml@v1").unwrap_err();
        assert!(matches!(err, ImportShapeError::Malformed(m) if m.contains(".md")));
    }

    #[test]
    fn test_too_few_segments() {
        assert!(parse_str("acme@v1").is_err());
        assert!(parse_str("acme/agentics@v1").is_err());
    }

    #[test]
    fn test_mapping_form() {
        let v: Value = serde_yaml::from_str(
            "repo: acme/agentics\npath: shared/tools.md\nref: main\noptional: true\n",
        )
        .unwrap();
        let r = ImportReference::parse(&v).unwrap();
        assert!(r.optional);
        assert_eq!(
            r.source,
            ImportSource::Remote(ImportCoordinate::parse("acme/agentics/shared/tools.md@main").unwrap())
        );
    }

    #[test]
    fn test_mapping_with_url_is_raw_locator() {
        let v: Value = serde_yaml::from_str("url: https://example.com/a.md\n").unwrap();
        assert_eq!(ImportReference::parse(&v), Err(ImportShapeError::RawLocator));
    }

    #[test]
    fn test_mapping_remote_without_ref() {
        let v: Value = serde_yaml::from_str("repo: acme/agentics\npath: a.md\n").unwrap();
        assert!(matches!(
            ImportReference::parse(&v),
            Err(ImportShapeError::Malformed(m)) if m.contains("ref")
        ));
    }

    #[test]
    fn test_non_string_import() {
        assert!(ImportReference::parse(&Value::Bool(true)).is_err());
    }

    #[test]
    fn test_shape_error_into_awc_error() {
        let err = ImportShapeError::RawLocator.into_error("https://x/a.md");
        assert!(matches!(err, AwcError::MalformedImport { .. }));
    }
}
