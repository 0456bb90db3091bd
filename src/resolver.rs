//! Import Resolver
//!
//! Resolves import references to fragment content, backed by the
//! coordinate-addressed [`ImportCache`].
//!
//! ## Design
//!
//! - [`Fetcher`] abstracts the origin; [`HttpFetcher`] talks to the GitHub
//!   contents API
//! - One async mutex per coordinate (in a `DashMap`): concurrent resolutions
//!   of the same coordinate fetch at most once
//! - Each fetch is bounded by a timeout
//! - Transitive imports are walked breadth-first; each level is fetched
//!   concurrently with `join_all`
//! - A reference found in its own ancestor chain is a cycle; one reachable
//!   twice (diamond) is resolved once

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use reqwest::StatusCode;
use tokio::sync::Mutex;
use url::Url;

use crate::cache::ImportCache;
use crate::config::AwcConfig;
use crate::error::{AwcError, Result};
use crate::errors::{Severity, Violation};
use crate::frontmatter::MarkdownDocument;
use crate::imports::{ImportCoordinate, ImportReference, ImportSource};
use crate::util::constants::{CONNECT_TIMEOUT, MAX_IMPORT_DEPTH, REDIRECT_LIMIT};
use crate::workflow::WorkflowConfig;

/// GitHub reports an unknown ref with this message
const UNKNOWN_REF_MESSAGE: &str = "No commit found for the ref";

// ============================================================================
// FETCHER TRAIT
// ============================================================================

/// Source of remote fragment content
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch raw content for a coordinate
    async fn fetch(&self, coordinate: &ImportCoordinate) -> Result<String>;
}

/// Fetcher for the GitHub contents API
///
/// `GET {api}/repos/{owner}/{repo}/contents/{path}?ref={pin}` with the raw
/// media type, so the body is the file itself.
pub struct HttpFetcher {
    client: reqwest::Client,
    api_url: Url,
    token: Option<String>,
}

impl HttpFetcher {
    pub fn new(api_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let api_url = Url::parse(api_url).map_err(|e| AwcError::Config {
            reason: format!("invalid api_url '{}': {}", api_url, e),
        })?;
        if api_url.cannot_be_a_base() {
            return Err(AwcError::Config {
                reason: format!("api_url '{}' cannot be a base URL", api_url),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .redirect(reqwest::redirect::Policy::limited(REDIRECT_LIMIT))
            .user_agent(concat!("awc/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AwcError::Config {
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_url,
            token,
        })
    }

    pub fn from_config(config: &AwcConfig) -> Result<Self> {
        Self::new(
            &config.resolver.api_url,
            config.token.clone(),
            config.fetch_timeout(),
        )
    }

    /// Contents API URL for a coordinate
    pub fn contents_url(&self, coordinate: &ImportCoordinate) -> Url {
        let mut url = self.api_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["repos", coordinate.owner.as_str(), coordinate.repo.as_str(), "contents"])
                .extend(coordinate.path.split('/'));
        }
        url.query_pairs_mut().append_pair("ref", &coordinate.pin);
        url
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, coordinate: &ImportCoordinate) -> Result<String> {
        let url = self.contents_url(coordinate);
        tracing::debug!(coordinate = %coordinate, url = %url, "fetch");

        let mut request = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/vnd.github.raw");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AwcError::FetchTimeout {
                    coordinate: coordinate.to_string(),
                    timeout_secs: 0,
                }
            } else {
                AwcError::OriginUnreachable {
                    coordinate: coordinate.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AwcError::OriginUnreachable {
                coordinate: coordinate.to_string(),
                reason: format!("failed to read response: {}", e),
            })?;

        classify_response(coordinate, status, body)
    }
}

/// Map an origin response to content or a distinct resolution error
fn classify_response(
    coordinate: &ImportCoordinate,
    status: StatusCode,
    body: String,
) -> Result<String> {
    if status.is_success() {
        return Ok(body);
    }

    let unknown_ref = body.contains(UNKNOWN_REF_MESSAGE);
    match status {
        StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY if unknown_ref => {
            Err(AwcError::PinUnresolvable {
                coordinate: coordinate.to_string(),
                pin: coordinate.pin.clone(),
            })
        }
        StatusCode::UNPROCESSABLE_ENTITY => Err(AwcError::PinUnresolvable {
            coordinate: coordinate.to_string(),
            pin: coordinate.pin.clone(),
        }),
        StatusCode::NOT_FOUND => Err(AwcError::ImportPathNotFound {
            coordinate: coordinate.to_string(),
        }),
        _ => Err(AwcError::OriginUnreachable {
            coordinate: coordinate.to_string(),
            reason: format!("HTTP {}", status),
        }),
    }
}

// ============================================================================
// RESOLVER
// ============================================================================

/// An imported fragment, parsed
#[derive(Debug, Clone)]
pub struct Fragment {
    pub source: ImportSource,
    /// Where the import was declared, e.g. `imports[0] > imports[1]`
    pub location: String,
    pub document: MarkdownDocument,
    pub config: WorkflowConfig,
    pub depth: usize,
}

impl Fragment {
    pub fn label(&self) -> String {
        self.source.to_string()
    }
}

/// Outcome of resolving a document's import graph
#[derive(Debug, Default)]
pub struct ResolvedImports {
    /// Fragments in breadth-first order
    pub fragments: Vec<Fragment>,
    /// Resolution errors and degraded-import warnings
    pub violations: Vec<Violation>,
}

struct Pending {
    reference: ImportReference,
    location: String,
    /// Keys of every ancestor, root first
    chain: Vec<String>,
}

struct Loaded {
    content: String,
    degraded: Option<AwcError>,
}

/// Resolves import references through the cache and a fetcher
pub struct Resolver {
    fetcher: Arc<dyn Fetcher>,
    cache: ImportCache,
    timeout: Duration,
    locks: DashMap<String, Arc<Mutex<()>>>,
    /// Coordinates fetched by this resolver; a forced resolve refetches once
    refreshed: DashMap<String, ()>,
}

impl Resolver {
    pub fn new(fetcher: Arc<dyn Fetcher>, cache: ImportCache, timeout: Duration) -> Self {
        Self {
            fetcher,
            cache,
            timeout,
            locks: DashMap::new(),
            refreshed: DashMap::new(),
        }
    }

    pub fn from_config(config: &AwcConfig) -> Result<Self> {
        let fetcher = HttpFetcher::from_config(config)?;
        Ok(Self::new(
            Arc::new(fetcher),
            ImportCache::new(&config.resolver.cache_dir),
            config.fetch_timeout(),
        ))
    }

    pub fn cache(&self) -> &ImportCache {
        &self.cache
    }

    /// Resolve one coordinate to content
    ///
    /// A cached coordinate is returned without fetching unless `force` is set.
    pub async fn resolve(&self, coordinate: &ImportCoordinate, force: bool) -> Result<String> {
        let key = coordinate.key();
        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        if !force || self.refreshed.contains_key(&key) {
            if let Some(content) = self.cache.read(coordinate).await? {
                tracing::debug!(coordinate = %coordinate, "cache hit");
                return Ok(content);
            }
        }

        let fetched = tokio::time::timeout(self.timeout, self.fetcher.fetch(coordinate)).await;
        let content = match fetched {
            Ok(Ok(content)) => content,
            Ok(Err(AwcError::FetchTimeout { .. })) | Err(_) => {
                return Err(AwcError::FetchTimeout {
                    coordinate: coordinate.to_string(),
                    timeout_secs: self.timeout.as_secs(),
                })
            }
            Ok(Err(e)) => return Err(e),
        };

        self.cache.write(coordinate, &content).await?;
        self.refreshed.insert(key, ());
        Ok(content)
    }

    /// Resolve every import reachable from a document
    ///
    /// Malformed nested references are skipped here; fragment validation
    /// reports them.
    pub async fn resolve_imports(
        &self,
        root_path: &Path,
        config: &WorkflowConfig,
        force: bool,
    ) -> ResolvedImports {
        let root_key = local_key(root_path);
        let root_source = ImportSource::Local(root_path.to_path_buf());
        let mut resolved = ResolvedImports::default();
        let mut visited: HashSet<String> = HashSet::from([root_key.clone()]);

        let mut level = children(&root_source, config, "", &[root_key], &mut resolved);
        let mut depth = 0;

        while !level.is_empty() {
            if depth >= MAX_IMPORT_DEPTH {
                for pending in level {
                    resolved.violations.push(failure(
                        &pending,
                        format!("import nesting exceeds {} levels", MAX_IMPORT_DEPTH),
                    ));
                }
                break;
            }

            let mut batch = Vec::new();
            for pending in level {
                let key = source_key(&pending.reference.source);
                if pending.chain.contains(&key) {
                    let mut chain: Vec<&str> = pending.chain[1..].iter().map(String::as_str).collect();
                    chain.push(&key);
                    let err = AwcError::ImportCycle {
                        chain: chain.join(" -> "),
                    };
                    resolved.violations.push(failure(&pending, err.to_string()));
                    continue;
                }
                if !visited.insert(key) {
                    tracing::debug!(import = %pending.reference.source, "already resolved");
                    continue;
                }
                batch.push(pending);
            }

            let loads = join_all(batch.iter().map(|p| self.load(&p.reference, force))).await;

            let mut next = Vec::new();
            for (pending, loaded) in batch.into_iter().zip(loads) {
                let loaded = match loaded {
                    Ok(loaded) => loaded,
                    Err(e) if pending.reference.optional && e.is_resolution() => {
                        tracing::warn!(import = %pending.reference.source, error = %e, "optional import skipped");
                        resolved.violations.push(Violation::ImportFailed {
                            location: pending.location.clone(),
                            reference: pending.reference.source.to_string(),
                            reason: format!("{}; optional import skipped", e),
                            severity: Severity::Warning,
                        });
                        continue;
                    }
                    Err(e) => {
                        resolved.violations.push(failure(&pending, e.to_string()));
                        continue;
                    }
                };
                if let Some(e) = &loaded.degraded {
                    resolved.violations.push(Violation::ImportFailed {
                        location: pending.location.clone(),
                        reference: pending.reference.source.to_string(),
                        reason: format!("{}; using cached copy", e),
                        severity: Severity::Warning,
                    });
                }

                let label = pending.reference.source.to_string();
                let document = match MarkdownDocument::parse(&loaded.content, &label) {
                    Ok(doc) => doc,
                    Err(e) => {
                        resolved.violations.push(failure(&pending, e.to_string()));
                        continue;
                    }
                };
                let config = WorkflowConfig::lift(&document.frontmatter);

                let mut chain = pending.chain.clone();
                chain.push(source_key(&pending.reference.source));
                next.extend(children(
                    &pending.reference.source,
                    &config,
                    &pending.location,
                    &chain,
                    &mut resolved,
                ));

                resolved.fragments.push(Fragment {
                    source: pending.reference.source,
                    location: pending.location,
                    document,
                    config,
                    depth: depth + 1,
                });
            }

            level = next;
            depth += 1;
        }

        resolved
    }

    async fn load(&self, reference: &ImportReference, force: bool) -> Result<Loaded> {
        match &reference.source {
            ImportSource::Remote(coordinate) => match self.resolve(coordinate, force).await {
                Ok(content) => Ok(Loaded {
                    content,
                    degraded: None,
                }),
                Err(e) if reference.optional && e.is_resolution() => {
                    match self.cache.read(coordinate).await {
                        Ok(Some(content)) => {
                            tracing::warn!(coordinate = %coordinate, error = %e, "optional import degraded to cached copy");
                            Ok(Loaded {
                                content,
                                degraded: Some(e),
                            })
                        }
                        _ => Err(e),
                    }
                }
                Err(e) => Err(e),
            },
            ImportSource::Local(path) => match tokio::fs::read_to_string(path).await {
                Ok(content) => Ok(Loaded {
                    content,
                    degraded: None,
                }),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    Err(AwcError::ImportPathNotFound {
                        coordinate: path.display().to_string(),
                    })
                }
                Err(e) => Err(e.into()),
            },
        }
    }
}

/// Pending children of a resolved document, sources made absolute
fn children(
    parent: &ImportSource,
    config: &WorkflowConfig,
    parent_location: &str,
    chain: &[String],
    resolved: &mut ResolvedImports,
) -> Vec<Pending> {
    let Some(imports) = config.imports.present() else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for decl in imports {
        let location = if parent_location.is_empty() {
            decl.location.clone()
        } else {
            format!("{} > {}", parent_location, decl.location)
        };
        let mut reference = match ImportReference::parse(&decl.value) {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(location = %location, error = ?e, "skipping malformed import");
                continue;
            }
        };

        match relative_to(parent, &reference.source) {
            Ok(source) => reference.source = source,
            Err(e) => {
                resolved.violations.push(Violation::ImportFailed {
                    location,
                    reference: reference.source.to_string(),
                    reason: e.to_string(),
                    severity: Severity::Error,
                });
                continue;
            }
        }

        out.push(Pending {
            reference,
            location,
            chain: chain.to_vec(),
        });
    }
    out
}

/// Place a local reference next to its parent
///
/// Inside a remote fragment, a local path names a file in the same
/// repository at the same pin.
fn relative_to(parent: &ImportSource, child: &ImportSource) -> Result<ImportSource> {
    let ImportSource::Local(relative) = child else {
        return Ok(child.clone());
    };

    match parent {
        ImportSource::Local(parent_path) => {
            let dir = parent_path.parent().unwrap_or_else(|| Path::new(""));
            Ok(ImportSource::Local(normalize(&dir.join(relative))))
        }
        ImportSource::Remote(coordinate) => {
            let mut segments: Vec<&str> = coordinate.path.split('/').collect();
            segments.pop();
            for component in relative.components() {
                match component {
                    Component::CurDir => {}
                    Component::ParentDir => {
                        if segments.pop().is_none() {
                            return Err(AwcError::MalformedImport {
                                reference: relative.display().to_string(),
                                reason: format!("escapes the root of {}", coordinate),
                            });
                        }
                    }
                    Component::Normal(s) => segments.push(s.to_str().unwrap_or_default()),
                    _ => {
                        return Err(AwcError::MalformedImport {
                            reference: relative.display().to_string(),
                            reason: "local imports must be relative".to_string(),
                        })
                    }
                }
            }
            Ok(ImportSource::Remote(ImportCoordinate {
                owner: coordinate.owner.clone(),
                repo: coordinate.repo.clone(),
                path: segments.join("/"),
                pin: coordinate.pin.clone(),
            }))
        }
    }
}

/// Lexical normalization (no filesystem access)
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn local_key(path: &Path) -> String {
    format!("local:{}", normalize(path).display())
}

fn source_key(source: &ImportSource) -> String {
    match source {
        ImportSource::Remote(c) => c.key(),
        ImportSource::Local(p) => local_key(p),
    }
}

fn failure(pending: &Pending, reason: String) -> Violation {
    Violation::ImportFailed {
        location: pending.location.clone(),
        reference: pending.reference.source.to_string(),
        reason,
        severity: Severity::Error,
    }
}
