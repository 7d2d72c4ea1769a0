//! Filesystem capture
//!
//! [`SnapshotCapturer`] walks a live directory into an owned
//! [`DirectoryEntry`] tree. For every directory it:
//!
//! 1. lists the direct children (files and subdirectories)
//! 2. reads and hashes child files in batches of `batch_size`, each batch in parallel
//! 3. captures child directories in parallel with each other
//! 4. sorts both child lists by path and computes the aggregate size
//!
//! All fan-out runs inside one bounded rayon pool, so the number of files
//! read at once never exceeds the pool size regardless of tree width.
//!
//! ## Consistency
//!
//! Capture is not atomic. If the tree is mutated while it is being walked,
//! the snapshot may mix states from before and after the mutation.

use crate::cancel::CancellationToken;
use crate::compare::Comparator;
use crate::error::{Result, SnapError};
use crate::hashing::ContentHasher;
use crate::types::{Changeset, DirectoryEntry, FileContent, FileEntry, Snapshot, SnapshotConfig};
use crate::utils;
use chrono::Utc;
use globset::{Glob, GlobSet, GlobSetBuilder};
use rayon::prelude::*;
use rayon::ThreadPool;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;
use walkdir::WalkDir;

/// Captures directory trees into snapshots
#[derive(Debug)]
pub struct SnapshotCapturer {
    hasher: Arc<dyn ContentHasher>,
    pool: Arc<ThreadPool>,
    batch_size: usize,
    follow_symlinks: bool,
    ignore: GlobSet,
}

/// Direct children of one directory, split by kind
#[derive(Default)]
struct Listing {
    files: Vec<PathBuf>,
    directories: Vec<PathBuf>,
}

impl SnapshotCapturer {
    /// Create a capturer
    ///
    /// # Errors
    ///
    /// - [`SnapError::InvalidPattern`] if an ignore pattern does not compile
    pub fn new(
        config: &SnapshotConfig,
        hasher: Arc<dyn ContentHasher>,
        pool: Arc<ThreadPool>,
    ) -> Result<Self> {
        Ok(Self {
            hasher,
            pool,
            batch_size: config.batch_size.max(1),
            follow_symlinks: config.follow_symlinks,
            ignore: build_ignore_set(&config.ignore_patterns)?,
        })
    }

    /// Capture the directory at `path`
    ///
    /// The snapshot's base path is `path` as given; entry paths are relative
    /// to it. Host information is recorded in the snapshot metadata.
    ///
    /// # Errors
    ///
    /// - [`SnapError::NotFound`] if `path` is not an existing directory
    /// - [`SnapError::Io`] if a file or directory cannot be read
    /// - [`SnapError::Cancelled`] if `token` is cancelled mid-walk
    pub fn capture(&self, path: &Path, token: &CancellationToken) -> Result<Snapshot> {
        if !path.is_dir() {
            return Err(SnapError::NotFound(path.to_path_buf()));
        }

        let start = Instant::now();
        let root = self
            .pool
            .install(|| self.capture_directory(path, PathBuf::new(), Vec::new(), token))?;

        let mut snapshot = Snapshot::new(path.to_path_buf(), root);
        snapshot.metadata = host_metadata();

        info!(
            "Captured snapshot {} of {:?}: {} files, {} directories, {} in {:?}",
            snapshot.short_id(),
            path,
            snapshot.root.as_ref().map_or(0, |r| r.file_count()),
            snapshot.root.as_ref().map_or(0, |r| r.directory_count()),
            utils::format_bytes(snapshot.root.as_ref().map_or(0, |r| r.size)),
            start.elapsed()
        );

        Ok(snapshot)
    }

    /// Capture `path` again and keep only what changed since `previous`
    ///
    /// Returns a flat [`Changeset`]: new files, modified files (after state)
    /// and deletion markers, plus the same three groups for directories.
    /// Modified directories are carried without children; new directories
    /// carry their full subtree.
    ///
    /// # Errors
    ///
    /// Everything [`capture`](Self::capture) can fail with, plus
    /// [`SnapError::InvalidArgument`] if `previous` has no root.
    pub fn capture_incremental(
        &self,
        path: &Path,
        previous: &Snapshot,
        token: &CancellationToken,
    ) -> Result<Changeset> {
        let current = self.capture(path, token)?;
        let diff = Comparator.compare(previous, &current)?;

        let mut files = diff.new_files;
        files.extend(diff.modified_files.into_iter().map(|(_, after)| after));
        files.extend(diff.deleted_files);

        let mut directories = diff.new_directories;
        directories.extend(diff.modified_directories.into_iter().map(|(_, after)| after));
        directories.extend(diff.deleted_directories);

        debug!(
            "Incremental capture of {:?} against {}: {} files, {} directories changed",
            path,
            previous.short_id(),
            files.len(),
            directories.len()
        );

        Ok(Changeset {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            base_path: path.to_path_buf(),
            previous_snapshot_id: previous.id,
            files,
            directories,
        })
    }

    fn capture_directory(
        &self,
        base: &Path,
        relative: PathBuf,
        mut ancestors: Vec<PathBuf>,
        token: &CancellationToken,
    ) -> Result<DirectoryEntry> {
        token.check()?;

        let absolute = base.join(&relative);
        let metadata = fs::metadata(&absolute).map_err(|e| SnapError::io(&absolute, e))?;

        if self.follow_symlinks {
            let canonical = fs::canonicalize(&absolute).map_err(|e| SnapError::io(&absolute, e))?;
            ancestors.push(canonical);
        }

        let listing = self.list_children(&absolute, &relative, &ancestors)?;

        let mut files = Vec::with_capacity(listing.files.len());
        for batch in listing.files.chunks(self.batch_size) {
            let captured = batch
                .par_iter()
                .map(|file| self.capture_file(base, file, token))
                .collect::<Result<Vec<_>>>()?;
            files.extend(captured);
        }

        let directories = listing
            .directories
            .into_par_iter()
            .map(|dir| self.capture_directory(base, dir, ancestors.clone(), token))
            .collect::<Result<Vec<_>>>()?;

        let mut entry = DirectoryEntry {
            path: relative,
            created_at: utils::created_time(&metadata),
            modified_at: utils::modified_time(&metadata),
            attributes: utils::attributes_of(&metadata),
            size: 0,
            files,
            directories,
            is_deleted: false,
        };
        entry.normalize();

        debug!(
            "Captured directory {:?}: {} files, {} subdirectories, {} bytes",
            absolute,
            entry.files.len(),
            entry.directories.len(),
            entry.size
        );

        Ok(entry)
    }

    fn list_children(
        &self,
        absolute: &Path,
        relative: &Path,
        ancestors: &[PathBuf],
    ) -> Result<Listing> {
        let mut listing = Listing::default();

        let walker = WalkDir::new(absolute)
            .min_depth(1)
            .max_depth(1)
            .follow_links(self.follow_symlinks);

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.loop_ancestor().is_some() => {
                    warn!("Skipping symlink cycle at {:?}", e.path());
                    continue;
                }
                Err(e) => {
                    let path = e.path().map_or_else(|| absolute.to_path_buf(), Path::to_path_buf);
                    return Err(SnapError::io(path, io::Error::from(e)));
                }
            };

            let child = relative.join(entry.file_name());
            if self.ignore.is_match(&child) {
                trace!("Ignoring {:?}", child);
                continue;
            }

            let file_type = entry.file_type();
            if file_type.is_dir() {
                if entry.path_is_symlink() && is_cycle(entry.path(), ancestors) {
                    warn!("Skipping symlink cycle at {:?}", entry.path());
                    continue;
                }
                listing.directories.push(child);
            } else if file_type.is_file() {
                listing.files.push(child);
            } else if file_type.is_symlink() && fs::metadata(entry.path()).is_ok_and(|m| m.is_file()) {
                // Links to regular files are captured by content
                listing.files.push(child);
            } else {
                trace!("Skipping {:?}: not a regular file or directory", entry.path());
            }
        }

        Ok(listing)
    }

    fn capture_file(
        &self,
        base: &Path,
        relative: &Path,
        token: &CancellationToken,
    ) -> Result<FileEntry> {
        token.check()?;

        let absolute = base.join(relative);
        let content = fs::read(&absolute).map_err(|e| SnapError::io(&absolute, e))?;
        let metadata = fs::metadata(&absolute).map_err(|e| SnapError::io(&absolute, e))?;
        let hash = self.hasher.hash_bytes(&content);

        trace!("Captured {:?} ({} bytes)", relative, content.len());

        Ok(FileEntry {
            path: relative.to_path_buf(),
            size: content.len() as u64,
            hash,
            created_at: utils::created_time(&metadata),
            modified_at: utils::modified_time(&metadata),
            attributes: utils::attributes_of(&metadata),
            is_deleted: false,
            content: FileContent::Raw(content),
            metadata: BTreeMap::new(),
        })
    }
}

fn build_ignore_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| SnapError::InvalidPattern(format!("{}: {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| SnapError::InvalidPattern(e.to_string()))
}

fn is_cycle(path: &Path, ancestors: &[PathBuf]) -> bool {
    fs::canonicalize(path)
        .map(|target| ancestors.contains(&target))
        .unwrap_or(false)
}

/// Host information recorded with every capture
fn host_metadata() -> BTreeMap<String, String> {
    let hostname = hostname::get()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    BTreeMap::from([
        ("hostname".to_string(), hostname),
        ("os".to_string(), std::env::consts::OS.to_string()),
        ("arch".to_string(), std::env::consts::ARCH.to_string()),
    ])
}
