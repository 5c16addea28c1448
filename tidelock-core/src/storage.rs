//! Storage driver traits for the commit coordinator
//!
//! This module defines the narrow storage contract the commit protocol
//! consumes. The traits are runtime-agnostic and use `async_trait` for async
//! support.
//!
//! ## Traits
//!
//! - `StorageRead`: Non-mutating operations (existence check, listing)
//! - `StorageWrite`: Mutating operations (directory creation, file write,
//!   delete)
//! - `Storage`: Marker trait combining both capabilities
//!
//! ## Required ordering guarantees
//!
//! The commit protocol is safe only on backends providing:
//!
//! 1. **Read-your-writes** within a single client for files it wrote.
//! 2. **Monotonic listing**: once a filename is visible to any listing it
//!    stays visible until explicitly deleted.
//! 3. **No silent rename/merge**: distinct filenames never collide.
//!
//! Writes need **not** be atomic — `write_without_guarantees` is explicit
//! about this. Filenames, never file contents, carry protocol meaning, so a
//! torn write of a marker file still means the marker exists.
//!
//! ## Implementations
//!
//! - [`MemoryStorage`]: in-memory backend for tests, with an injected clock
//!   so virtual time drives `last_modified`.
//! - [`FileStorage`]: local-filesystem backend over `tokio::fs`.

use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use std::sync::{Arc, RwLock};
use std::time::UNIX_EPOCH;

// ============================================================================
// Listing entries
// ============================================================================

/// A single entry returned by [`StorageRead::list_files`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Last path segment of the file (no directory components).
    pub file_name: String,
    /// Modification time as milliseconds since the Unix epoch.
    pub last_modified: i64,
}

impl FileEntry {
    /// Create an entry from a name and mtime.
    pub fn new(file_name: impl Into<String>, last_modified: i64) -> Self {
        Self {
            file_name: file_name.into(),
            last_modified,
        }
    }
}

// ============================================================================
// Core Traits
// ============================================================================

/// Read-only storage operations
#[async_trait]
pub trait StorageRead: Debug + Send + Sync {
    /// Check if a file or directory exists at the given path.
    async fn exists(&self, path: &str) -> Result<bool>;

    /// List files under a directory.
    ///
    /// Returns one [`FileEntry`] per file. With `recursive` set, descends
    /// into subdirectories; otherwise only direct children are returned.
    /// A missing directory yields an empty listing, not an error. Order is
    /// not required to be stable.
    async fn list_files(&self, dir: &str, recursive: bool) -> Result<Vec<FileEntry>>;
}

/// Mutating storage operations
#[async_trait]
pub trait StorageWrite: Debug + Send + Sync {
    /// Create a directory (and any missing parents).
    ///
    /// Idempotent: succeeds if the directory already exists.
    async fn create_dir(&self, path: &str) -> Result<()>;

    /// Whole-file put of small text content.
    ///
    /// Atomicity is explicitly NOT guaranteed; overwrite is allowed. Callers
    /// must encode meaning in filenames rather than contents.
    async fn write_without_guarantees(&self, path: &str, content: &str) -> Result<()>;

    /// Delete a file, or a whole subtree when `recursive` is set.
    ///
    /// Idempotent: a missing target is success.
    async fn delete(&self, path: &str, recursive: bool) -> Result<()>;
}

/// Full storage capability marker
///
/// Single bound for backends supporting all operations the commit protocol
/// needs.
pub trait Storage: StorageRead + StorageWrite {}
impl<T: StorageRead + StorageWrite> Storage for T {}

// ============================================================================
// MemoryStorage Implementation
// ============================================================================

#[derive(Debug)]
struct FileRecord {
    content: String,
    last_modified: i64,
}

#[derive(Debug, Default)]
struct MemoryState {
    files: BTreeMap<String, FileRecord>,
    dirs: BTreeSet<String>,
}

/// A simple in-memory storage for testing
///
/// Stores files in a `BTreeMap` behind `Arc<RwLock<...>>` so cloned handles
/// share state, the way concurrent clients share a backend. Writes stamp
/// `last_modified` from the injected [`Clock`], so tests driving a
/// `ManualClock` control the timestamps the adjudicator sees.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    state: Arc<RwLock<MemoryState>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    /// Create a new empty memory storage stamping mtimes from the wall clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a memory storage stamping mtimes from the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(RwLock::new(MemoryState::default())),
            clock,
        }
    }

    /// Read back a file's content (test helper).
    pub fn content(&self, path: &str) -> Option<String> {
        self.state
            .read()
            .expect("RwLock poisoned")
            .files
            .get(&normalize(path))
            .map(|r| r.content.clone())
    }

    /// Insert a file with an explicit mtime, bypassing the clock.
    ///
    /// Lets tests plant debris whose `last_modified` disagrees with the
    /// committer's clock (backend clock skew).
    pub fn insert_with_mtime(&self, path: &str, content: impl Into<String>, last_modified: i64) {
        self.state
            .write()
            .expect("RwLock poisoned")
            .files
            .insert(
                normalize(path),
                FileRecord {
                    content: content.into(),
                    last_modified,
                },
            );
    }

}

/// Strip any trailing slash so `"a/b/"` and `"a/b"` address the same node.
fn normalize(path: &str) -> String {
    path.trim_end_matches('/').to_string()
}

#[async_trait]
impl StorageRead for MemoryStorage {
    async fn exists(&self, path: &str) -> Result<bool> {
        let path = normalize(path);
        let state = self.state.read().expect("RwLock poisoned");
        if state.files.contains_key(&path) || state.dirs.contains(&path) {
            return Ok(true);
        }
        let child_prefix = format!("{}/", path);
        Ok(state.files.keys().any(|k| k.starts_with(&child_prefix)))
    }

    async fn list_files(&self, dir: &str, recursive: bool) -> Result<Vec<FileEntry>> {
        let prefix = format!("{}/", normalize(dir));
        let state = self.state.read().expect("RwLock poisoned");
        let mut entries = Vec::new();
        for (path, record) in state.files.range(prefix.clone()..) {
            let Some(rest) = path.strip_prefix(&prefix) else {
                break;
            };
            if !recursive && rest.contains('/') {
                continue;
            }
            let file_name = rest.rsplit('/').next().unwrap_or(rest);
            entries.push(FileEntry::new(file_name, record.last_modified));
        }
        Ok(entries)
    }
}

#[async_trait]
impl StorageWrite for MemoryStorage {
    async fn create_dir(&self, path: &str) -> Result<()> {
        self.state
            .write()
            .expect("RwLock poisoned")
            .dirs
            .insert(normalize(path));
        Ok(())
    }

    async fn write_without_guarantees(&self, path: &str, content: &str) -> Result<()> {
        let now = self.clock.now_millis();
        self.state
            .write()
            .expect("RwLock poisoned")
            .files
            .insert(
                normalize(path),
                FileRecord {
                    content: content.to_string(),
                    last_modified: now,
                },
            );
        Ok(())
    }

    async fn delete(&self, path: &str, recursive: bool) -> Result<()> {
        let path = normalize(path);
        let mut state = self.state.write().expect("RwLock poisoned");
        if recursive {
            let child_prefix = format!("{}/", path);
            state
                .files
                .retain(|k, _| k != &path && !k.starts_with(&child_prefix));
            state
                .dirs
                .retain(|d| d != &path && !d.starts_with(&child_prefix));
        } else {
            state.files.remove(&path);
        }
        Ok(())
    }
}

// ============================================================================
// FileStorage Implementation
// ============================================================================

/// Local-filesystem storage rooted at a base directory.
///
/// `last_modified` comes from filesystem metadata, so timestamps reflect the
/// backend's clock rather than the caller's.
#[derive(Debug, Clone)]
pub struct FileStorage {
    base_path: std::path::PathBuf,
}

impl FileStorage {
    /// Create a new file storage with the given base path.
    pub fn new(base_path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Get the base path for this storage
    pub fn base_path(&self) -> &std::path::Path {
        &self.base_path
    }

    /// Resolve a relative storage path under the base directory.
    ///
    /// Disallows absolute paths and path traversal.
    fn resolve(&self, path: &str) -> Result<std::path::PathBuf> {
        use std::path::Component;
        let p = std::path::Path::new(path);

        if p.is_absolute()
            || p.components().any(|c| {
                matches!(
                    c,
                    Component::ParentDir | Component::RootDir | Component::Prefix(_)
                )
            })
        {
            return Err(Error::invalid_path(format!(
                "'{}': must be a relative path without '..'",
                path
            )));
        }

        Ok(self.base_path.join(p))
    }
}

/// Millisecond epoch mtime from file metadata.
fn mtime_millis(metadata: &std::fs::Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[async_trait]
impl StorageRead for FileStorage {
    async fn exists(&self, path: &str) -> Result<bool> {
        let path = self.resolve(path)?;
        match tokio::fs::metadata(&path).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::io(format!(
                "Failed to stat {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn list_files(&self, dir: &str, recursive: bool) -> Result<Vec<FileEntry>> {
        let root = self.resolve(dir)?;
        let mut results = Vec::new();
        let mut dirs_to_visit = vec![root];

        while let Some(dir) = dirs_to_visit.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(e) => e,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(Error::io(format!(
                        "Failed to list {}: {}",
                        dir.display(),
                        e
                    )));
                }
            };

            while let Some(entry) = entries.next_entry().await.map_err(|e| {
                Error::io(format!("Failed to read entry in {}: {}", dir.display(), e))
            })? {
                let path = entry.path();
                let metadata = entry.metadata().await.map_err(|e| {
                    Error::io(format!("Failed to stat {}: {}", path.display(), e))
                })?;

                if metadata.is_dir() {
                    if recursive {
                        dirs_to_visit.push(path);
                    }
                } else if metadata.is_file() {
                    let file_name = entry.file_name().to_string_lossy().to_string();
                    results.push(FileEntry::new(file_name, mtime_millis(&metadata)));
                }
            }
        }

        Ok(results)
    }
}

#[async_trait]
impl StorageWrite for FileStorage {
    async fn create_dir(&self, path: &str) -> Result<()> {
        let path = self.resolve(path)?;
        tokio::fs::create_dir_all(&path).await.map_err(|e| {
            Error::io(format!(
                "Failed to create directory {}: {}",
                path.display(),
                e
            ))
        })
    }

    async fn write_without_guarantees(&self, path: &str, content: &str) -> Result<()> {
        let path = self.resolve(path)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::io(format!(
                    "Failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        tokio::fs::write(&path, content.as_bytes())
            .await
            .map_err(|e| Error::io(format!("Failed to write {}: {}", path.display(), e)))
    }

    async fn delete(&self, path: &str, recursive: bool) -> Result<()> {
        let path = self.resolve(path)?;
        let result = if recursive {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        match result {
            Ok(()) => Ok(()),
            // Idempotent: not found is OK
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(format!(
                "Failed to delete {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[tokio::test]
    async fn test_memory_storage_write_and_exists() {
        let storage = MemoryStorage::new();
        storage
            .write_without_guarantees("root/tracker/0.txt", "0")
            .await
            .unwrap();

        assert!(storage.exists("root/tracker/0.txt").await.unwrap());
        assert!(storage.exists("root/tracker").await.unwrap());
        assert!(!storage.exists("root/other").await.unwrap());
        assert_eq!(storage.content("root/tracker/0.txt").unwrap(), "0");
    }

    #[tokio::test]
    async fn test_memory_storage_list_non_recursive() {
        let storage = MemoryStorage::new();
        storage
            .write_without_guarantees("root/a.txt", "a")
            .await
            .unwrap();
        storage
            .write_without_guarantees("root/sub/b.txt", "b")
            .await
            .unwrap();

        let mut names: Vec<_> = storage
            .list_files("root", false)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.file_name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["a.txt"]);

        let mut all: Vec<_> = storage
            .list_files("root", true)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.file_name)
            .collect();
        all.sort();
        assert_eq!(all, vec!["a.txt", "b.txt"]);
    }

    #[tokio::test]
    async fn test_memory_storage_missing_dir_lists_empty() {
        let storage = MemoryStorage::new();
        assert!(storage.list_files("nothing/here", false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_storage_mtime_from_clock() {
        let clock = Arc::new(ManualClock::new(5_000));
        let storage = MemoryStorage::with_clock(clock.clone());

        storage.write_without_guarantees("d/x.txt", "x").await.unwrap();
        clock.advance(2_000);
        storage.write_without_guarantees("d/y.txt", "y").await.unwrap();

        let entries = storage.list_files("d", false).await.unwrap();
        let x = entries.iter().find(|e| e.file_name == "x.txt").unwrap();
        let y = entries.iter().find(|e| e.file_name == "y.txt").unwrap();
        assert_eq!(x.last_modified, 5_000);
        assert_eq!(y.last_modified, 7_000);
    }

    #[tokio::test]
    async fn test_memory_storage_recursive_delete() {
        let storage = MemoryStorage::new();
        storage.write_without_guarantees("c/0/a.txt", "a").await.unwrap();
        storage.write_without_guarantees("c/0/sub/b.txt", "b").await.unwrap();
        storage.write_without_guarantees("c/1/keep.txt", "k").await.unwrap();

        storage.delete("c/0", true).await.unwrap();
        assert!(!storage.exists("c/0/a.txt").await.unwrap());
        assert!(!storage.exists("c/0").await.unwrap());
        assert!(storage.exists("c/1/keep.txt").await.unwrap());

        // Idempotent
        storage.delete("c/0", true).await.unwrap();
        storage.delete("c/1/missing.txt", false).await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_storage_clone_shares_state() {
        let a = MemoryStorage::new();
        let b = a.clone();
        a.write_without_guarantees("shared.txt", "v").await.unwrap();
        assert!(b.exists("shared.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_file_storage_roundtrip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let storage = FileStorage::new(tmp.path());

        storage.create_dir("root/tracker").await.unwrap();
        storage
            .write_without_guarantees("root/tracker/0.txt", "0")
            .await
            .unwrap();

        assert!(storage.exists("root/tracker/0.txt").await.unwrap());

        let entries = storage.list_files("root/tracker", false).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].file_name, "0.txt");
        assert!(entries[0].last_modified > 0);
    }

    #[tokio::test]
    async fn test_file_storage_missing_dir_lists_empty() {
        let tmp = tempfile::TempDir::new().unwrap();
        let storage = FileStorage::new(tmp.path());
        assert!(storage.list_files("absent", true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_storage_non_recursive_skips_subdirs() {
        let tmp = tempfile::TempDir::new().unwrap();
        let storage = FileStorage::new(tmp.path());
        storage.write_without_guarantees("d/a.txt", "a").await.unwrap();
        storage.write_without_guarantees("d/sub/b.txt", "b").await.unwrap();

        let names: Vec<_> = storage
            .list_files("d", false)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.file_name)
            .collect();
        assert_eq!(names, vec!["a.txt"]);
    }

    #[tokio::test]
    async fn test_file_storage_delete_idempotent() {
        let tmp = tempfile::TempDir::new().unwrap();
        let storage = FileStorage::new(tmp.path());
        storage.write_without_guarantees("d/a.txt", "a").await.unwrap();

        storage.delete("d", true).await.unwrap();
        assert!(!storage.exists("d").await.unwrap());
        storage.delete("d", true).await.unwrap();
        storage.delete("d/a.txt", false).await.unwrap();
    }

    #[tokio::test]
    async fn test_file_storage_rejects_traversal() {
        let tmp = tempfile::TempDir::new().unwrap();
        let storage = FileStorage::new(tmp.path());
        assert!(storage.exists("../escape").await.is_err());
        assert!(storage
            .write_without_guarantees("/absolute", "x")
            .await
            .is_err());
    }
}
