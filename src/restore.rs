//! Snapshot restoration
//!
//! [`Restorer`] walks a snapshot tree and a target directory together,
//! writing and deleting filesystem entries:
//!
//! - a deleted directory entry removes the target directory recursively and
//!   its recorded children are not visited
//! - a live directory is ensured through the [`DirectoryCache`], then its
//!   files and subdirectories are restored in parallel; the directory is done
//!   once every child is done
//! - a deleted file entry removes the target file if present
//! - a live file has its full content written, then its timestamps and
//!   attribute bits applied
//!
//! Content failures abort the restore. Metadata failures do not: each of the
//! three metadata calls is attempted on its own and failures are collected as
//! [`RestoreWarning`]s on the [`RestoreResult`].
//!
//! A missing target directory is created. Each run starts from an empty
//! [`DirectoryCache`]: creation is deduplicated within a run, never across
//! runs.

use crate::cancel::CancellationToken;
use crate::compression::Compressor;
use crate::dir_cache::DirectoryCache;
use crate::error::{Result, SnapError};
use crate::types::{
    Changeset, DirectoryEntry, FileContent, FileEntry, MetadataKind, RestoreResult,
    RestoreWarning, Snapshot,
};
use crate::utils;
use parking_lot::Mutex;
use rayon::prelude::*;
use rayon::ThreadPool;
use std::borrow::Cow;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

/// Restores snapshots and changesets onto the filesystem
#[derive(Debug)]
pub struct Restorer {
    cache: Arc<DirectoryCache>,
    compressor: Arc<dyn Compressor>,
    pool: Arc<ThreadPool>,
}

/// Counters shared by every worker of one restore run
#[derive(Default)]
struct Progress {
    files_restored: AtomicUsize,
    files_deleted: AtomicUsize,
    directories_restored: AtomicUsize,
    directories_deleted: AtomicUsize,
    bytes_written: AtomicU64,
    warnings: Mutex<Vec<RestoreWarning>>,
}

impl Progress {
    fn record(&self, path: &Path, kind: MetadataKind, outcome: io::Result<()>) {
        if let Err(e) = outcome {
            warn!("Failed to restore {:?} of {:?}: {}", kind, path, e);
            self.warnings.lock().push(RestoreWarning {
                path: path.to_path_buf(),
                kind,
                message: e.to_string(),
            });
        }
    }

    fn finish(self, start: Instant) -> RestoreResult {
        let mut warnings = self.warnings.into_inner();
        warnings.sort_by(|a, b| a.path.cmp(&b.path));

        RestoreResult {
            files_restored: self.files_restored.into_inner(),
            files_deleted: self.files_deleted.into_inner(),
            directories_restored: self.directories_restored.into_inner(),
            directories_deleted: self.directories_deleted.into_inner(),
            bytes_written: self.bytes_written.into_inner(),
            duration_ms: start.elapsed().as_millis() as u64,
            warnings,
        }
    }
}

impl Restorer {
    /// Create a restorer sharing `cache` for directory creation
    pub fn new(
        cache: Arc<DirectoryCache>,
        compressor: Arc<dyn Compressor>,
        pool: Arc<ThreadPool>,
    ) -> Self {
        Self {
            cache,
            compressor,
            pool,
        }
    }

    /// Directory cache used by this restorer
    pub fn cache(&self) -> &DirectoryCache {
        &self.cache
    }

    /// Restore `snapshot` into `target`
    ///
    /// The snapshot root maps onto `target` itself; every other entry is
    /// written at `target` joined with its relative path. Files already at
    /// the target are overwritten, other files are left alone.
    ///
    /// # Errors
    ///
    /// - [`SnapError::InvalidState`] if the snapshot has no root
    /// - [`SnapError::InvalidArgument`] if `target` is empty or an entry path
    ///   would escape it
    /// - [`SnapError::Io`] if content cannot be written or deleted
    /// - [`SnapError::Decompression`] if compressed content is damaged
    /// - [`SnapError::Cancelled`] if `token` is cancelled mid-restore
    pub fn restore(
        &self,
        snapshot: &Snapshot,
        target: &Path,
        token: &CancellationToken,
    ) -> Result<RestoreResult> {
        let root = snapshot.root.as_ref().ok_or_else(|| {
            SnapError::invalid_state(format!("Snapshot {} has no root directory", snapshot.id))
        })?;

        let start = Instant::now();
        self.prepare_target(target)?;

        let progress = Progress::default();
        self.pool
            .install(|| self.restore_directory(root, target, &progress, token))?;
        let result = progress.finish(start);

        info!(
            "Restored snapshot {} to {:?}: {} files ({}), {} directories, {} deleted, {} warnings in {}ms",
            snapshot.short_id(),
            target,
            result.files_restored,
            utils::format_bytes(result.bytes_written),
            result.directories_restored,
            result.files_deleted + result.directories_deleted,
            result.warnings.len(),
            result.duration_ms
        );
        Ok(result)
    }

    /// Apply a flat changeset to `target`
    ///
    /// Every entry is applied at its recorded relative path, parents created
    /// as needed. Phases run in order, each one in parallel:
    ///
    /// 1. deleted files, then deleted directories
    /// 2. new and modified files
    /// 3. new subtrees and metadata of modified directories
    ///
    /// Deletions go first so that a path that changed kind (a directory
    /// replaced by a file or the reverse) is free before it is written.
    ///
    /// # Errors
    ///
    /// Same as [`restore`](Self::restore), minus the missing-root case.
    pub fn apply_changeset(
        &self,
        changeset: &Changeset,
        target: &Path,
        token: &CancellationToken,
    ) -> Result<RestoreResult> {
        let start = Instant::now();
        self.prepare_target(target)?;

        let (deleted_files, live_files): (Vec<&FileEntry>, Vec<&FileEntry>) =
            changeset.files.iter().partition(|f| f.is_deleted);
        let (deleted_dirs, live_dirs): (Vec<&DirectoryEntry>, Vec<&DirectoryEntry>) =
            changeset.directories.iter().partition(|d| d.is_deleted);

        let progress = Progress::default();
        self.pool.install(|| -> Result<()> {
            deleted_files
                .par_iter()
                .try_for_each(|file| self.restore_file(file, target, &progress, token))?;
            deleted_dirs
                .par_iter()
                .try_for_each(|dir| self.restore_directory(dir, target, &progress, token))?;
            live_files
                .par_iter()
                .try_for_each(|file| self.restore_file(file, target, &progress, token))?;
            live_dirs
                .par_iter()
                .try_for_each(|dir| self.restore_directory(dir, target, &progress, token))
        })?;
        let result = progress.finish(start);

        info!(
            "Applied changeset against {} to {:?}: {} files written, {} entries deleted, {} warnings",
            changeset.previous_snapshot_id,
            target,
            result.files_restored,
            result.files_deleted + result.directories_deleted,
            result.warnings.len()
        );
        Ok(result)
    }

    fn prepare_target(&self, target: &Path) -> Result<()> {
        if target.as_os_str().is_empty() {
            return Err(SnapError::invalid_argument("Restore target cannot be empty"));
        }
        // Directories seen by an earlier run may have been removed since
        self.cache.clear();
        if !target.is_dir() {
            debug!("Creating missing restore target {:?}", target);
        }
        self.cache.ensure_exists(target)
    }

    fn restore_directory(
        &self,
        dir: &DirectoryEntry,
        target: &Path,
        progress: &Progress,
        token: &CancellationToken,
    ) -> Result<()> {
        token.check()?;
        let path = resolve(target, &dir.path)?;

        if dir.is_deleted {
            match fs::remove_dir_all(&path) {
                Ok(()) => {
                    trace!("Removed directory {:?}", path);
                    progress.directories_deleted.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(SnapError::io(&path, e)),
            }
            self.cache.remove_tree(&path);
            return Ok(());
        }

        self.cache.ensure_exists(&path)?;
        progress.directories_restored.fetch_add(1, Ordering::Relaxed);

        let (files, directories) = rayon::join(
            || {
                dir.files
                    .par_iter()
                    .try_for_each(|file| self.restore_file(file, target, progress, token))
            },
            || {
                dir.directories
                    .par_iter()
                    .try_for_each(|child| self.restore_directory(child, target, progress, token))
            },
        );
        files?;
        directories?;

        // Applied after the children so their writes don't bump the mtime again
        progress.record(
            &path,
            MetadataKind::ModifiedTime,
            utils::set_modified_time(&path, dir.modified_at),
        );
        progress.record(
            &path,
            MetadataKind::Attributes,
            utils::set_attributes(&path, dir.attributes),
        );
        Ok(())
    }

    fn restore_file(
        &self,
        file: &FileEntry,
        target: &Path,
        progress: &Progress,
        token: &CancellationToken,
    ) -> Result<()> {
        token.check()?;
        let path = resolve(target, &file.path)?;

        if file.is_deleted {
            match fs::remove_file(&path) {
                Ok(()) => {
                    trace!("Removed file {:?}", path);
                    progress.files_deleted.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(SnapError::io(&path, e)),
            }
            return Ok(());
        }

        let content: Cow<'_, [u8]> = match &file.content {
            FileContent::Raw(bytes) => Cow::Borrowed(bytes),
            FileContent::Compressed(bytes) => Cow::Owned(self.compressor.decompress(bytes)?),
            FileContent::Empty if file.size == 0 => Cow::Borrowed(&[]),
            FileContent::Empty => {
                return Err(SnapError::invalid_state(format!(
                    "File {:?} carries no content",
                    file.path
                )))
            }
        };

        if let Some(parent) = path.parent() {
            self.cache.ensure_exists(parent)?;
        }
        fs::write(&path, &content).map_err(|e| SnapError::io(&path, e))?;
        trace!("Wrote {:?} ({} bytes)", path, content.len());

        progress.files_restored.fetch_add(1, Ordering::Relaxed);
        progress
            .bytes_written
            .fetch_add(content.len() as u64, Ordering::Relaxed);

        // Timestamps before attributes: a read-only file may refuse new times
        progress.record(
            &path,
            MetadataKind::CreatedTime,
            utils::set_created_time(&path, file.created_at),
        );
        progress.record(
            &path,
            MetadataKind::ModifiedTime,
            utils::set_modified_time(&path, file.modified_at),
        );
        progress.record(
            &path,
            MetadataKind::Attributes,
            utils::set_attributes(&path, file.attributes),
        );
        Ok(())
    }
}

/// Target path of an entry; entry paths may not leave the target
fn resolve(target: &Path, relative: &Path) -> Result<PathBuf> {
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return Err(SnapError::invalid_argument(format!(
            "Entry path {:?} escapes the restore target",
            relative
        )));
    }
    if relative.as_os_str().is_empty() {
        Ok(target.to_path_buf())
    } else {
        Ok(target.join(relative))
    }
}
