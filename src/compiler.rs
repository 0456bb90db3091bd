//! Compilation pipeline
//!
//! read → parse → validate → resolve imports → merge → emit → write.
//! Any error stops the pipeline before the lock file is touched.

use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};

use crate::config::AwcConfig;
use crate::error::{AwcError, Result};
use crate::errors::ValidationResult;
use crate::frontmatter::MarkdownDocument;
use crate::lockfile::{emit, LockInput};
use crate::resolver::{Fragment, Resolver};
use crate::util::constants::LOCK_SUFFIX;
use crate::validator::Validator;
use crate::workflow::WorkflowConfig;

/// Compile options
#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
    /// Refetch imports and rewrite lock files even when unchanged
    pub force: bool,
}

/// What happened to the lock file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    Written,
    Unchanged,
    /// Errors were found; nothing written
    Skipped,
}

/// Result of compiling one workflow
#[derive(Debug)]
pub struct CompileOutcome {
    pub source: PathBuf,
    pub lock_path: PathBuf,
    pub result: ValidationResult,
    pub lock: LockStatus,
    pub imports: usize,
}

pub struct Compiler {
    validator: Validator,
    resolver: Resolver,
}

impl Compiler {
    pub fn new(validator: Validator, resolver: Resolver) -> Self {
        Self {
            validator,
            resolver,
        }
    }

    pub fn from_config(config: &AwcConfig) -> Result<Self> {
        let validator = match &config.compile.rules {
            Some(path) => Validator::from_file(path)?,
            None => Validator::with_builtin_rules()?,
        };
        Ok(Self::new(validator, Resolver::from_config(config)?))
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    /// Compile one workflow file
    pub async fn compile_file(&self, path: &Path, options: CompileOptions) -> Result<CompileOutcome> {
        let file_path = path.to_string_lossy().to_string();
        let lock_path = lock_path_for(path);
        tracing::info!(file = %file_path, force = options.force, "compile");

        let content = tokio::fs::read_to_string(path).await?;
        let doc = MarkdownDocument::parse(&content, &file_path)?;
        let config = WorkflowConfig::lift(&doc.frontmatter);

        let mut result = self.validator.validate(&config, &file_path);
        let skipped = |result: ValidationResult, imports: usize| CompileOutcome {
            source: path.to_path_buf(),
            lock_path: lock_path.clone(),
            result,
            lock: LockStatus::Skipped,
            imports,
        };
        if !result.is_valid() {
            tracing::debug!(errors = result.errors.len(), "validation failed; not resolving imports");
            return Ok(skipped(result, 0));
        }

        let resolved = self
            .resolver
            .resolve_imports(path, &config, options.force)
            .await;
        result.extend(resolved.violations);
        for fragment in &resolved.fragments {
            result.extend(
                self.validator
                    .validate_fragment(&fragment.config, &fragment.label()),
            );
        }
        // The first fragment declaring `github` supplies the merged tool
        if let Some(fragment) = resolved
            .fragments
            .iter()
            .find(|f| f.config.tool("github").is_some())
        {
            result.extend(self.validator.validate_imported_tools(
                &config,
                &fragment.config,
                &fragment.label(),
            ));
        }
        let imports = resolved.fragments.len();
        if !result.is_valid() {
            return Ok(skipped(result, imports));
        }

        let merged = merge(&doc, &resolved.fragments);
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "workflow".to_string());
        let text = emit(&LockInput {
            stem: &stem,
            config: &config,
            prompt: &merged.prompt,
            tools: &merged.tools,
            mcp_servers: &merged.mcp_servers,
            rules: self.validator.rules(),
        })?;

        let lock = write_lock(&lock_path, &text, options.force).await?;
        tracing::info!(lock = %lock_path.display(), status = ?lock, imports, "compiled");

        Ok(CompileOutcome {
            source: path.to_path_buf(),
            lock_path,
            result,
            lock,
            imports,
        })
    }
}

/// Sections after imports are merged in
#[derive(Debug, Default)]
pub struct Merged {
    pub tools: Mapping,
    pub mcp_servers: Mapping,
    pub prompt: String,
}

/// Merge fragments into the main document. The main document wins on
/// conflicting keys; earlier fragments win over later ones.
pub fn merge(doc: &MarkdownDocument, fragments: &[Fragment]) -> Merged {
    let section = |d: &MarkdownDocument, key: &str| {
        d.frontmatter
            .get(key)
            .and_then(Value::as_mapping)
            .cloned()
            .unwrap_or_default()
    };

    let mut merged = Merged {
        tools: section(doc, "tools"),
        mcp_servers: section(doc, "mcp-servers"),
        prompt: doc.body.clone(),
    };

    for fragment in fragments {
        for (target, key) in [
            (&mut merged.tools, "tools"),
            (&mut merged.mcp_servers, "mcp-servers"),
        ] {
            for (k, v) in section(&fragment.document, key) {
                if !target.contains_key(&k) {
                    target.insert(k, v);
                }
            }
        }

        let body = fragment.document.body.trim();
        if !body.is_empty() {
            if !merged.prompt.is_empty() {
                merged.prompt.push_str("\n\n");
            }
            merged.prompt.push_str(body);
        }
    }
    merged
}

/// `<dir>/<name>.md` → `<dir>/<name>.lock.yml`
pub fn lock_path_for(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{}{}", stem, LOCK_SUFFIX))
}

async fn write_lock(path: &Path, text: &str, force: bool) -> Result<LockStatus> {
    if !force {
        if let Ok(existing) = tokio::fs::read_to_string(path).await {
            if existing == text {
                return Ok(LockStatus::Unchanged);
            }
        }
    }
    tokio::fs::write(path, text).await?;
    Ok(LockStatus::Written)
}

/// Workflow markdown files in a directory, sorted
pub fn workflow_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let pattern = dir.join("*.md").to_string_lossy().to_string();
    let entries = glob::glob(&pattern).map_err(|e| AwcError::Config {
        reason: format!("bad workflow pattern '{}': {}", pattern, e),
    })?;

    let mut files = Vec::new();
    for entry in entries {
        files.push(entry.map_err(|e| AwcError::Io(e.into_error()))?);
    }
    files.sort();
    Ok(files)
}

/// Locate a workflow by name (`triage`, `triage.md`) or path
pub fn find_workflow(dir: &Path, name: &str) -> Result<PathBuf> {
    let direct = PathBuf::from(name);
    if direct.is_file() {
        return Ok(direct);
    }
    let file = if name.ends_with(".md") {
        name.to_string()
    } else {
        format!("{}.md", name)
    };
    let candidate = dir.join(file);
    if candidate.is_file() {
        return Ok(candidate);
    }
    Err(AwcError::WorkflowNotFound {
        name: name.to_string(),
        dir: dir.display().to_string(),
    })
}

/// Lock state shown by `awc list`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Compiled,
    /// Lock file older than its source
    Stale,
    NotCompiled,
    Invalid,
}

impl std::fmt::Display for LockState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockState::Compiled => write!(f, "compiled"),
            LockState::Stale => write!(f, "stale"),
            LockState::NotCompiled => write!(f, "not compiled"),
            LockState::Invalid => write!(f, "invalid"),
        }
    }
}

/// One row of `awc list`
#[derive(Debug, Clone)]
pub struct WorkflowStatus {
    pub path: PathBuf,
    pub name: String,
    pub triggers: Vec<String>,
    pub state: LockState,
}

/// Validate a workflow (no imports) and compare it with its lock file
pub fn workflow_status(validator: &Validator, path: &Path) -> WorkflowStatus {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let parsed = std::fs::read_to_string(path)
        .map_err(AwcError::from)
        .and_then(|c| MarkdownDocument::parse(&c, &path.to_string_lossy()));

    let doc = match parsed {
        Ok(doc) => doc,
        Err(_) => {
            return WorkflowStatus {
                path: path.to_path_buf(),
                name: stem,
                triggers: Vec::new(),
                state: LockState::Invalid,
            }
        }
    };

    let config = WorkflowConfig::lift(&doc.frontmatter);
    let triggers = config
        .triggers
        .present()
        .map(|t| t.iter().map(|t| t.name.clone()).collect())
        .unwrap_or_default();
    let valid = validator
        .validate(&config, &path.to_string_lossy())
        .is_valid();

    let state = if !valid {
        LockState::Invalid
    } else {
        lock_state(path, &lock_path_for(path))
    };

    WorkflowStatus {
        path: path.to_path_buf(),
        name: config.name.unwrap_or(stem),
        triggers,
        state,
    }
}

fn lock_state(source: &Path, lock: &Path) -> LockState {
    let modified = |p: &Path| std::fs::metadata(p).and_then(|m| m.modified()).ok();
    match (modified(source), modified(lock)) {
        (_, None) => LockState::NotCompiled,
        (Some(src), Some(lock)) if lock < src => LockState::Stale,
        _ => LockState::Compiled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ImportCache;
    use crate::resolver::Fetcher;
    use crate::imports::ImportCoordinate;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Origin with no files; counts calls
    #[derive(Default)]
    struct EmptyOrigin {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl Fetcher for EmptyOrigin {
        async fn fetch(&self, coordinate: &ImportCoordinate) -> Result<String> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Err(AwcError::ImportPathNotFound {
                coordinate: coordinate.to_string(),
            })
        }
    }

    fn compiler(dir: &TempDir, origin: Arc<EmptyOrigin>) -> Compiler {
        Compiler::new(
            Validator::with_builtin_rules().unwrap(),
            Resolver::new(
                origin,
                ImportCache::new(dir.path().join("cache")),
                Duration::from_secs(1),
            ),
        )
    }

    const VALID: &str = r#"---
on:
  workflow_dispatch:
permissions:
  contents: read
tools:
  edit:
safe-outputs:
  create-issue:
---

# Triage

Look at open issues.
"#;

    #[tokio::test]
    async fn writes_lock_for_valid_workflow() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("triage.md");
        std::fs::write(&path, VALID).unwrap();

        let outcome = compiler(&dir, Arc::default())
            .compile_file(&path, CompileOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.lock, LockStatus::Written);
        assert_eq!(outcome.lock_path, dir.path().join("triage.lock.yml"));
        let lock: Value =
            serde_yaml::from_str(&std::fs::read_to_string(&outcome.lock_path).unwrap()).unwrap();
        let run = lock["jobs"]["agent"]["steps"][1]["run"].as_str().unwrap();
        assert!(run.contains("Look at open issues."));
    }

    #[tokio::test]
    async fn unchanged_lock_is_not_rewritten_unless_forced() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("triage.md");
        std::fs::write(&path, VALID).unwrap();
        let compiler = compiler(&dir, Arc::default());

        compiler.compile_file(&path, CompileOptions::default()).await.unwrap();
        let again = compiler.compile_file(&path, CompileOptions::default()).await.unwrap();
        assert_eq!(again.lock, LockStatus::Unchanged);

        let forced = compiler
            .compile_file(&path, CompileOptions { force: true })
            .await
            .unwrap();
        assert_eq!(forced.lock, LockStatus::Written);
    }

    #[tokio::test]
    async fn invalid_workflow_leaves_no_lock_and_fetches_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.md");
        std::fs::write(
            &path,
            "---\non:\n  workflow_dispatch:\npermissions:\n  contents: write\nimports:\n  - acme/x/a.md@v1\n---\nBody\n",
        )
        .unwrap();
        let origin = Arc::new(EmptyOrigin::default());

        let outcome = compiler(&dir, origin.clone())
            .compile_file(&path, CompileOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.lock, LockStatus::Skipped);
        assert!(!outcome.lock_path.exists());
        assert_eq!(origin.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_required_import_leaves_no_lock() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wf.md");
        std::fs::write(
            &path,
            "---\non:\n  workflow_dispatch:\nimports:\n  - acme/x/a.md@v1\n---\nBody\n",
        )
        .unwrap();

        let outcome = compiler(&dir, Arc::default())
            .compile_file(&path, CompileOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.lock, LockStatus::Skipped);
        assert_eq!(outcome.result.errors.len(), 1);
        assert!(!outcome.lock_path.exists());
    }

    #[tokio::test]
    async fn local_fragment_merged() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("shared")).unwrap();
        std::fs::write(
            dir.path().join("shared/tools.md"),
            "---\ntools:\n  bash: [\"make test\"]\n  edit:\n---\nRun the tests first.\n",
        )
        .unwrap();
        let path = dir.path().join("wf.md");
        std::fs::write(
            &path,
            "---\non:\n  workflow_dispatch:\nengine: claude\nimports:\n  - shared/tools.md\n---\nFix the bug.\n",
        )
        .unwrap();

        let outcome = compiler(&dir, Arc::default())
            .compile_file(&path, CompileOptions::default())
            .await
            .unwrap();
        assert!(outcome.result.is_valid(), "{:?}", outcome.result.errors);
        assert_eq!(outcome.imports, 1);

        let text = std::fs::read_to_string(&outcome.lock_path).unwrap();
        assert!(text.contains("Bash(make test)"));
        let lock: Value = serde_yaml::from_str(&text).unwrap();
        let run = lock["jobs"]["agent"]["steps"][1]["run"].as_str().unwrap();
        assert!(run.contains("Fix the bug.\n\nRun the tests first."));
    }

    #[tokio::test]
    async fn imported_github_toolset_warns_about_missing_scope() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("github.md"),
            "---\ntools:\n  github:\n    toolsets: [issues]\n---\n",
        )
        .unwrap();
        let path = dir.path().join("wf.md");
        std::fs::write(
            &path,
            "---\non:\n  workflow_dispatch:\npermissions:\n  contents: read\nimports:\n  - github.md\n---\nTriage.\n",
        )
        .unwrap();

        let outcome = compiler(&dir, Arc::default())
            .compile_file(&path, CompileOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.lock, LockStatus::Written);
        assert_eq!(outcome.result.warnings.len(), 1);
        assert!(matches!(
            &outcome.result.warnings[0],
            crate::errors::Violation::MissingImpliedPermission { scope, .. } if scope == "issues"
        ));
        assert!(outcome.result.warnings[0]
            .location()
            .ends_with("github.md:tools.github"));
    }

    #[tokio::test]
    async fn failed_optional_import_still_compiles() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wf.md");
        std::fs::write(
            &path,
            "---\non:\n  workflow_dispatch:\nimports:\n  - repo: acme/x\n    path: a.md\n    ref: v1\n    optional: true\n---\nBody\n",
        )
        .unwrap();

        let outcome = compiler(&dir, Arc::default())
            .compile_file(&path, CompileOptions::default())
            .await
            .unwrap();
        assert!(outcome.result.is_valid(), "{:?}", outcome.result.errors);
        assert_eq!(outcome.result.warnings.len(), 1);
        assert_eq!(outcome.lock, LockStatus::Written);
        assert_eq!(outcome.imports, 0);
    }

    #[tokio::test]
    async fn fragment_shape_errors_block_compile() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("frag.md"), "---\ntools:\n  edit: true\n---\n").unwrap();
        let path = dir.path().join("wf.md");
        std::fs::write(&path, "---\non: push\nimports:\n  - frag.md\n---\n").unwrap();

        let outcome = compiler(&dir, Arc::default())
            .compile_file(&path, CompileOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.lock, LockStatus::Skipped);
        assert!(outcome.result.errors[0].location().ends_with("frag.md:tools.edit"));
    }

    #[test]
    fn main_document_wins_merge() {
        let doc = MarkdownDocument::parse("---\ntools:\n  bash: [\"ls\"]\n---\nMain\n", "main.md").unwrap();
        let frag_doc =
            MarkdownDocument::parse("---\ntools:\n  bash:\n  edit:\n---\nShared\n", "f.md").unwrap();
        let fragment = Fragment {
            source: crate::imports::ImportSource::Local(PathBuf::from("f.md")),
            location: "imports[0]".to_string(),
            config: WorkflowConfig::lift(&frag_doc.frontmatter),
            document: frag_doc,
            depth: 1,
        };

        let merged = merge(&doc, &[fragment]);
        assert!(merged.tools.get("bash").unwrap().is_sequence());
        assert!(merged.tools.contains_key("edit"));
        assert_eq!(merged.prompt, "Main\n\nShared");
    }

    #[test]
    fn lock_path_replaces_extension() {
        assert_eq!(
            lock_path_for(Path::new(".github/workflows/triage.md")),
            PathBuf::from(".github/workflows/triage.lock.yml")
        );
    }

    #[test]
    fn status_of_workflows() {
        let dir = TempDir::new().unwrap();
        let validator = Validator::with_builtin_rules().unwrap();

        let good = dir.path().join("good.md");
        std::fs::write(&good, VALID).unwrap();
        assert_eq!(workflow_status(&validator, &good).state, LockState::NotCompiled);

        std::fs::write(lock_path_for(&good), "x").unwrap();
        assert_eq!(workflow_status(&validator, &good).state, LockState::Compiled);

        let bad = dir.path().join("bad.md");
        std::fs::write(&bad, "no frontmatter").unwrap();
        assert_eq!(workflow_status(&validator, &bad).state, LockState::Invalid);

        let files = workflow_files(dir.path()).unwrap();
        assert_eq!(files, vec![bad, good]);
    }

    #[test]
    fn find_by_name() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("triage.md"), VALID).unwrap();
        assert!(find_workflow(dir.path(), "triage").is_ok());
        assert!(find_workflow(dir.path(), "triage.md").is_ok());
        assert!(matches!(
            find_workflow(dir.path(), "nope"),
            Err(AwcError::WorkflowNotFound { .. })
        ));
    }
}
