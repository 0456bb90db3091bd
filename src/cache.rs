//! Import Cache
//!
//! Coordinate-addressed store for fetched fragments:
//! `<root>/<owner>/<repo>/<pin>/<path>`.
//!
//! ## Design
//!
//! - Entries are immutable per coordinate; only a forced resolve rewrites one
//! - Writes go to a temporary sibling then rename, so readers never see a
//!   partial file (last writer wins)
//! - Per-coordinate serialization is the resolver's job

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{AwcError, Result};
use crate::imports::ImportCoordinate;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// On-disk cache of resolved imports
#[derive(Debug, Clone)]
pub struct ImportCache {
    root: PathBuf,
}

impl ImportCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where a coordinate's content lives
    pub fn path_for(&self, coordinate: &ImportCoordinate) -> PathBuf {
        self.root.join(coordinate.cache_path())
    }

    /// Cached content, `None` on a miss
    pub async fn read(&self, coordinate: &ImportCoordinate) -> Result<Option<String>> {
        match tokio::fs::read_to_string(self.path_for(coordinate)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist content for a coordinate
    pub async fn write(&self, coordinate: &ImportCoordinate, content: &str) -> Result<PathBuf> {
        let path = self.path_for(coordinate);
        let cache_err = |e: std::io::Error| AwcError::CacheWrite {
            path: path.display().to_string(),
            reason: e.to_string(),
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(cache_err)?;
        }

        let temp = temp_sibling(&path);
        tokio::fs::write(&temp, content).await.map_err(cache_err)?;
        if let Err(e) = tokio::fs::rename(&temp, &path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(cache_err(e));
        }

        tracing::debug!(coordinate = %coordinate, path = %path.display(), "cache write");
        Ok(path)
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{}.{}-{}.tmp", name, std::process::id(), n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn coordinate(pin: &str) -> ImportCoordinate {
        ImportCoordinate::parse(&format!("acme/shared/agents/tools.md@{}", pin)).unwrap()
    }

    #[tokio::test]
    async fn miss_then_hit() {
        let dir = TempDir::new().unwrap();
        let cache = ImportCache::new(dir.path());
        let coord = coordinate("v1");

        assert!(cache.read(&coord).await.unwrap().is_none());
        let path = cache.write(&coord, "# tools\n").await.unwrap();
        assert_eq!(path, dir.path().join("acme/shared/v1/agents/tools.md"));
        assert_eq!(cache.read(&coord).await.unwrap().as_deref(), Some("# tools\n"));
    }

    #[tokio::test]
    async fn pins_are_separate_entries() {
        let dir = TempDir::new().unwrap();
        let cache = ImportCache::new(dir.path());

        cache.write(&coordinate("v1"), "one").await.unwrap();
        cache.write(&coordinate("v2"), "two").await.unwrap();
        assert_eq!(cache.read(&coordinate("v1")).await.unwrap().as_deref(), Some("one"));
        assert_eq!(cache.read(&coordinate("v2")).await.unwrap().as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn slashed_pin_does_not_alias_nested_path() {
        let dir = TempDir::new().unwrap();
        let cache = ImportCache::new(dir.path());
        let slashed = ImportCoordinate::parse("acme/x/a.md@release/v1").unwrap();
        let nested = ImportCoordinate::parse("acme/x/v1/a.md@release").unwrap();

        cache.write(&slashed, "slashed").await.unwrap();
        assert!(cache.read(&nested).await.unwrap().is_none());
        assert!(cache.path_for(&slashed).starts_with(dir.path()));
    }

    #[tokio::test]
    async fn rewrite_replaces_and_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let cache = ImportCache::new(dir.path());
        let coord = coordinate("main");

        cache.write(&coord, "old").await.unwrap();
        let path = cache.write(&coord, "new").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");

        let siblings: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(siblings.len(), 1);
    }

    #[tokio::test]
    async fn unwritable_root_is_cache_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "").unwrap();
        let cache = ImportCache::new(&blocker);

        let err = cache.write(&coordinate("v1"), "x").await.unwrap_err();
        assert!(matches!(err, AwcError::CacheWrite { .. }));
    }
}
