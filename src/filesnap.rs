//! Main FileSnap implementation
//!
//! [`FileSnap`] is the entry point that wires the collaborators together:
//! one bounded rayon pool, one content hasher, one compressor and one
//! directory cache shared by the capture, persistence and restore engines.
//!
//! ## Examples
//!
//! ```rust,no_run
//! use filesnap::FileSnap;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let snap = FileSnap::new()?;
//!
//! let before = snap.capture(Path::new("./my_project"))?;
//! let written = snap.save(&before, Path::new("./backups/before"))?;
//!
//! // ... files change ...
//!
//! let after = snap.capture(Path::new("./my_project"))?;
//! let diff = snap.compare(&before, &after)?;
//! println!("{} changes", diff.change_count());
//!
//! let restored = snap.load(&written)?;
//! let result = snap.restore(&restored, Path::new("./my_project"))?;
//! for warning in &result.warnings {
//!     eprintln!("metadata not restored: {}", warning);
//! }
//! # Ok(())
//! # }
//! ```

use crate::analysis;
use crate::cancel::CancellationToken;
use crate::capture::SnapshotCapturer;
use crate::compare::Comparator;
use crate::compression::{Compressor, Lz4Compressor};
use crate::dir_cache::DirectoryCache;
use crate::error::{Result, SnapError};
use crate::hashing::{ContentHasher, Sha256Hasher};
use crate::persistence::SnapshotStore;
use crate::restore::Restorer;
use crate::types::{Changeset, Difference, RestoreResult, Snapshot, SnapshotConfig};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument};

/// Capture, persist, compare and restore directory snapshots
///
/// All operations take `&self` and may be called from several threads at
/// once; they share the worker pool and the directory cache.
///
/// # Examples
///
/// ```rust,no_run
/// use filesnap::{FileSnap, FileSnapBuilder};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// // Defaults: SHA-256, LZ4, one worker per CPU
/// let snap = FileSnap::new()?;
///
/// // Custom configuration
/// let snap = FileSnapBuilder::new()
///     .parallel_workers(4)
///     .ignore_patterns(vec!["target".to_string(), "*.log".to_string()])
///     .verify_on_load(true)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct FileSnap {
    config: SnapshotConfig,
    capturer: SnapshotCapturer,
    store: SnapshotStore,
    restorer: Restorer,
    cache: Arc<DirectoryCache>,
}

impl FileSnap {
    /// Create an instance with the default configuration
    ///
    /// # Errors
    ///
    /// - [`SnapError::ThreadPool`] if the worker pool cannot be started
    pub fn new() -> Result<Self> {
        FileSnapBuilder::new().build()
    }

    /// Start configuring an instance
    pub fn builder() -> FileSnapBuilder {
        FileSnapBuilder::new()
    }

    /// Effective configuration
    pub fn config(&self) -> &SnapshotConfig {
        &self.config
    }

    /// Directory cache used by restores of this instance
    ///
    /// Every restore clears it before starting, so it reflects the
    /// directories ensured by the most recent run.
    pub fn directory_cache(&self) -> &DirectoryCache {
        &self.cache
    }

    /// Capture the directory at `path`
    ///
    /// # Errors
    ///
    /// - [`SnapError::NotFound`] if `path` is not an existing directory
    /// - [`SnapError::Io`] if an entry cannot be read
    #[instrument(skip(self))]
    pub fn capture(&self, path: &Path) -> Result<Snapshot> {
        self.capturer.capture(path, &CancellationToken::new())
    }

    /// Capture the directory at `path`, stopping early once `token` is cancelled
    #[instrument(skip(self, token))]
    pub fn capture_cancellable(&self, path: &Path, token: &CancellationToken) -> Result<Snapshot> {
        self.capturer.capture(path, token)
    }

    /// Capture `path` and attach [`analysis::analyze`] insights to the snapshot
    #[instrument(skip(self))]
    pub fn capture_with_insights(&self, path: &Path) -> Result<Snapshot> {
        let mut snapshot = self.capturer.capture(path, &CancellationToken::new())?;
        snapshot.insights = Some(analysis::analyze(&snapshot)?);
        Ok(snapshot)
    }

    /// Capture `path` and keep only what changed since `previous`
    ///
    /// # Errors
    ///
    /// Everything [`capture`](Self::capture) can fail with, plus
    /// [`SnapError::InvalidArgument`] if `previous` has no root.
    #[instrument(skip(self, previous), fields(previous = %previous.short_id()))]
    pub fn capture_incremental(&self, path: &Path, previous: &Snapshot) -> Result<Changeset> {
        self.capturer
            .capture_incremental(path, previous, &CancellationToken::new())
    }

    /// Save `snapshot`, returning the path actually written
    ///
    /// The configured default extension is appended when `output` has none.
    ///
    /// # Errors
    ///
    /// - [`SnapError::InvalidState`] if the snapshot has no root
    /// - [`SnapError::Io`] if the file cannot be written
    #[instrument(skip(self, snapshot), fields(snapshot = %snapshot.short_id()))]
    pub fn save(&self, snapshot: &Snapshot, output: &Path) -> Result<PathBuf> {
        self.store.save(snapshot, output)
    }

    /// Load a snapshot saved by [`save`](Self::save)
    ///
    /// # Errors
    ///
    /// - [`SnapError::NotFound`] if `path` does not exist
    /// - [`SnapError::CorruptData`] if the file does not hold a snapshot
    /// - [`SnapError::HashMismatch`] if verification is enabled and fails
    #[instrument(skip(self))]
    pub fn load(&self, path: &Path) -> Result<Snapshot> {
        self.store.load(path)
    }

    /// Compute the differences between `before` and `after`
    ///
    /// # Errors
    ///
    /// - [`SnapError::InvalidArgument`] if either snapshot has no root
    #[instrument(skip(self, before, after), fields(before = %before.short_id(), after = %after.short_id()))]
    pub fn compare(&self, before: &Snapshot, after: &Snapshot) -> Result<Difference> {
        Comparator.compare(before, after)
    }

    /// Restore `snapshot` into `target`, creating it if missing
    ///
    /// Metadata failures do not fail the restore; they are listed in
    /// [`RestoreResult::warnings`].
    ///
    /// # Errors
    ///
    /// - [`SnapError::InvalidState`] if the snapshot has no root
    /// - [`SnapError::Io`] if content cannot be written or removed
    #[instrument(skip(self, snapshot), fields(snapshot = %snapshot.short_id()))]
    pub fn restore(&self, snapshot: &Snapshot, target: &Path) -> Result<RestoreResult> {
        self.restorer
            .restore(snapshot, target, &CancellationToken::new())
    }

    /// Restore `snapshot` into `target`, stopping early once `token` is cancelled
    ///
    /// Entries written before cancellation stay on disk.
    #[instrument(skip(self, snapshot, token), fields(snapshot = %snapshot.short_id()))]
    pub fn restore_cancellable(
        &self,
        snapshot: &Snapshot,
        target: &Path,
        token: &CancellationToken,
    ) -> Result<RestoreResult> {
        self.restorer.restore(snapshot, target, token)
    }

    /// Apply a changeset from [`capture_incremental`](Self::capture_incremental) to `target`
    #[instrument(skip(self, changeset), fields(changeset = %changeset.id))]
    pub fn apply_changeset(&self, changeset: &Changeset, target: &Path) -> Result<RestoreResult> {
        self.restorer
            .apply_changeset(changeset, target, &CancellationToken::new())
    }

    /// Headline insights for `snapshot`
    pub fn analyze(&self, snapshot: &Snapshot) -> Result<BTreeMap<String, String>> {
        analysis::analyze(snapshot)
    }
}

/// Builder for configuring [`FileSnap`] instances
///
/// # Examples
///
/// ```rust
/// use filesnap::FileSnapBuilder;
/// use filesnap::compression::NoCompression;
/// use std::sync::Arc;
///
/// let snap = FileSnapBuilder::new()
///     .batch_size(50)
///     .parallel_workers(2)
///     .compressor(Arc::new(NoCompression))
///     .build()
///     .unwrap();
/// assert_eq!(snap.config().batch_size, 50);
/// ```
#[derive(Debug, Default)]
pub struct FileSnapBuilder {
    config: SnapshotConfig,
    hasher: Option<Arc<dyn ContentHasher>>,
    compressor: Option<Arc<dyn Compressor>>,
}

impl FileSnapBuilder {
    /// Create a builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: SnapshotConfig) -> Self {
        self.config = config;
        self
    }

    /// Set how many files are read and hashed at once per directory
    ///
    /// Values less than 1 are set to 1.
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size.max(1);
        self
    }

    /// Set number of parallel workers
    ///
    /// Controls the size of the one pool all capture, persistence and
    /// restore fan-out runs on. Defaults to the number of CPU cores; values
    /// less than 1 are set to 1.
    pub fn parallel_workers(mut self, count: usize) -> Self {
        self.config.parallel_workers = count.max(1);
        self
    }

    /// Enable or disable per-file content compression on save and load
    pub fn compression(mut self, enabled: bool) -> Self {
        self.config.compression_enabled = enabled;
        self
    }

    /// Pass the whole persisted document through the compressor
    pub fn compress_stream(mut self, enabled: bool) -> Self {
        self.config.compress_stream = enabled;
        self
    }

    /// Extension appended on save when the output path has none
    pub fn default_extension(mut self, extension: impl Into<String>) -> Self {
        self.config.default_extension = extension.into();
        self
    }

    /// Recompute every file hash after load
    pub fn verify_on_load(mut self, verify: bool) -> Self {
        self.config.verify_on_load = verify;
        self
    }

    /// Set whether capture follows symbolic links
    ///
    /// Symlinks that lead back to a directory being captured are skipped.
    /// Links to regular files are always captured by their target's content;
    /// this setting decides whether directory links are descended into.
    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.config.follow_symlinks = follow;
        self
    }

    /// Set ignore patterns
    ///
    /// Glob patterns matched against paths relative to the captured
    /// directory. A matching directory is skipped with everything below it.
    pub fn ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.config.ignore_patterns = patterns;
        self
    }

    /// Use a custom content hasher (default: SHA-256)
    pub fn hasher(mut self, hasher: Arc<dyn ContentHasher>) -> Self {
        self.hasher = Some(hasher);
        self
    }

    /// Use a custom compressor (default: LZ4)
    pub fn compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.compressor = Some(compressor);
        self
    }

    /// Build the [`FileSnap`] instance
    ///
    /// # Errors
    ///
    /// - [`SnapError::InvalidPattern`] if an ignore pattern does not compile
    /// - [`SnapError::ThreadPool`] if the worker pool cannot be started
    pub fn build(self) -> Result<FileSnap> {
        let mut config = self.config;
        config.batch_size = config.batch_size.max(1);
        config.parallel_workers = config.parallel_workers.max(1);

        let hasher = self.hasher.unwrap_or_else(|| Arc::new(Sha256Hasher));
        let compressor = self
            .compressor
            .unwrap_or_else(|| Arc::new(Lz4Compressor::default()));
        let pool = build_pool(config.parallel_workers)?;
        let cache = Arc::new(DirectoryCache::new());

        let capturer = SnapshotCapturer::new(&config, Arc::clone(&hasher), Arc::clone(&pool))?;
        let store = SnapshotStore::new(
            &config,
            Arc::clone(&compressor),
            hasher,
            Arc::clone(&pool),
        );
        let restorer = Restorer::new(Arc::clone(&cache), compressor, pool);

        info!(
            "FileSnap ready: {} workers, batch size {}, compression {}",
            config.parallel_workers,
            config.batch_size,
            if config.compression_enabled { "on" } else { "off" }
        );

        Ok(FileSnap {
            config,
            capturer,
            store,
            restorer,
            cache,
        })
    }
}

fn build_pool(workers: usize) -> Result<Arc<ThreadPool>> {
    ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("filesnap-worker-{}", i))
        .build()
        .map(Arc::new)
        .map_err(|e| SnapError::ThreadPool(e.to_string()))
}
