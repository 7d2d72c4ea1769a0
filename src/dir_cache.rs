//! Deduplicated directory creation
//!
//! Restore fans out over siblings concurrently, and many of them ask for the
//! same directories to exist. [`DirectoryCache`] maps each absolute path to a
//! single creation operation: the first caller runs it, every concurrent or
//! later caller for the same path waits on that same operation instead of
//! issuing another filesystem call.
//!
//! Entries live until cleared and a cached success is never checked against
//! the disk again. The restorer [`clear`](DirectoryCache::clear)s the cache
//! at the start of every run; other callers reusing one instance across
//! runs should do the same or [`remove`](DirectoryCache::remove) single paths.
//!
//! ```rust
//! use filesnap::dir_cache::DirectoryCache;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let temp = tempfile::TempDir::new()?;
//! let cache = DirectoryCache::new();
//! let dir = temp.path().join("a/b");
//!
//! cache.ensure_exists(&dir)?;
//! cache.ensure_exists(&dir)?;
//! assert!(dir.is_dir());
//! assert_eq!(cache.creations(), 1);
//! # Ok(())
//! # }
//! ```

use crate::collections::GxBuildHasher;
use crate::error::{Result, SnapError};
use dashmap::DashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::trace;

/// Outcome of one creation operation, shared by everyone waiting on it
type CreateOutcome = std::result::Result<(), (io::ErrorKind, String)>;

/// Concurrent "ensure this directory exists" cache
#[derive(Debug, Default)]
pub struct DirectoryCache {
    entries: DashMap<PathBuf, Arc<OnceLock<CreateOutcome>>, GxBuildHasher>,
    creations: AtomicUsize,
}

impl DirectoryCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure `path` exists as a directory
    ///
    /// The first request for a path registers and runs a create-if-absent
    /// operation; every other request for it, in flight or later, waits on
    /// that operation and shares its outcome, failures included.
    ///
    /// # Errors
    ///
    /// - [`SnapError::InvalidArgument`] if `path` is empty
    /// - [`SnapError::Io`] if the directory could not be created
    pub fn ensure_exists(&self, path: &Path) -> Result<()> {
        check_path(path)?;

        let operation = Arc::clone(
            &*self
                .entries
                .entry(path.to_path_buf())
                .or_insert_with(|| Arc::new(OnceLock::new())),
        );

        let outcome = operation.get_or_init(|| {
            if path.is_dir() {
                return Ok(());
            }
            self.creations.fetch_add(1, Ordering::Relaxed);
            trace!("Creating directory {:?}", path);
            fs::create_dir_all(path).map_err(|e| (e.kind(), e.to_string()))
        });

        outcome
            .clone()
            .map_err(|(kind, message)| SnapError::io(path, io::Error::new(kind, message)))
    }

    /// Forget every registered operation
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Forget the operation registered for `path`
    ///
    /// Returns whether an operation was registered.
    pub fn remove(&self, path: &Path) -> Result<bool> {
        check_path(path)?;
        Ok(self.entries.remove(path).is_some())
    }

    /// Forget `path` and every registered path below it
    pub(crate) fn remove_tree(&self, path: &Path) {
        self.entries.retain(|key, _| !key.starts_with(path));
    }

    /// Whether an operation is registered for `path`
    pub fn contains(&self, path: &Path) -> Result<bool> {
        check_path(path)?;
        Ok(self.entries.contains_key(path))
    }

    /// Number of registered paths
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no path is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of filesystem create calls actually issued
    pub fn creations(&self) -> usize {
        self.creations.load(Ordering::Relaxed)
    }
}

fn check_path(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(SnapError::invalid_argument(
            "Directory path cannot be empty",
        ));
    }
    Ok(())
}
