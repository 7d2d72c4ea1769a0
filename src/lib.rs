//! # FileSnap - Content-addressed directory snapshots
//!
//! A library to capture a directory tree into an in-memory snapshot, persist
//! it, compare two snapshots and restore a tree from one.
//!
//! ## Overview
//!
//! FileSnap freezes a directory's structure, metadata and content at capture
//! time, allowing you to:
//! - Capture full snapshots, or flat changesets against an earlier snapshot
//! - Save snapshots as human-diffable JSON, optionally compressed
//! - Compute new/deleted/modified files and directories between two snapshots
//! - Restore a snapshot (or apply a changeset) onto any target directory
//! - Derive insights such as file counts, sizes and extension breakdowns
//!
//! ## Architecture
//!
//! - **Capture**: walks the tree, reading and hashing files in bounded
//!   parallel batches and capturing subdirectories in parallel
//! - **Persistence**: JSON with hex-encoded content, per-file compression
//!   and an optional compressed stream envelope, written atomically
//! - **Comparator**: a single pass path-keyed set difference per directory level
//! - **Restoration**: parallel fan-out over the tree with deduplicated
//!   directory creation and best-effort metadata
//! - **Collaborators**: [`ContentHasher`] and [`Compressor`] traits, injected
//!   through [`FileSnapBuilder`]
//!
//! All fan-out runs in one rayon pool whose size is configurable, so wide or
//! deep trees never spawn unbounded work.
//!
//! ## Quick Start
//!
//! ```rust
//! use filesnap::FileSnap;
//! use std::fs;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let source = tempfile::TempDir::new()?;
//! fs::write(source.path().join("a.txt"), "hello")?;
//!
//! let snap = FileSnap::new()?;
//! let snapshot = snap.capture(source.path())?;
//!
//! let saved = snap.save(&snapshot, &source.path().join("backup"))?;
//! assert_eq!(saved.extension().unwrap(), "fsnap");
//! let loaded = snap.load(&saved)?;
//! assert_eq!(loaded.id, snapshot.id);
//!
//! let target = tempfile::TempDir::new()?;
//! let result = snap.restore(&loaded, target.path())?;
//! assert_eq!(result.files_restored, 1);
//! assert_eq!(fs::read_to_string(target.path().join("a.txt"))?, "hello");
//! # Ok(())
//! # }
//! ```
//!
//! ## Incremental Capture
//!
//! ```rust,no_run
//! # use filesnap::FileSnap;
//! # use std::path::Path;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let snap = FileSnap::new()?;
//! let base = snap.capture(Path::new("./project"))?;
//! // ... files change ...
//! let changes = snap.capture_incremental(Path::new("./project"), &base)?;
//! println!("{} files changed", changes.files.len());
//!
//! // Bring a copy of the base state up to date
//! snap.apply_changeset(&changes, Path::new("./mirror"))?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Key Concepts
//!
//! ### Snapshots
//!
//! A [`Snapshot`] owns a tree of [`DirectoryEntry`] nodes and [`FileEntry`]
//! leaves. Entry paths are relative to the snapshot base path, and children
//! are sorted by path so that two captures of the same state are identical
//! regardless of enumeration order.
//!
//! ### Deletion Markers
//!
//! Entries flagged `is_deleted` carry metadata but no content. Restoring
//! them removes the corresponding path if it exists.
//!
//! ### Changesets
//!
//! A [`Changeset`] is the flat result of incremental capture: every changed
//! entry sits directly in the changeset, keyed by its full relative path.
//!
//! ## Consistency
//!
//! - Capture is not atomic; concurrent mutation of the tree may be observed
//!   partially
//! - Restore writes content or fails; metadata (attributes, timestamps) is
//!   best-effort and reported as [`RestoreWarning`]s
//! - There are no automatic retries
//!
//! ## Error Handling
//!
//! All operations return `Result<T, SnapError>`. See [`SnapError`] for the
//! failure kinds.
//!
//! ## Module Organization
//!
//! - [`filesnap`]: the [`FileSnap`] facade and its builder
//! - [`capture`]: filesystem capture and incremental capture
//! - [`persistence`]: save and load
//! - [`compare`]: snapshot comparison
//! - [`restore`]: snapshot and changeset restoration
//! - [`dir_cache`]: deduplicated directory creation
//! - [`analysis`]: derived insights
//! - [`hashing`], [`compression`]: pluggable collaborators
//! - [`cancel`]: cooperative cancellation
//! - [`types`]: common types and data structures
//! - [`error`]: error types and handling

// Public API modules
pub mod analysis;
pub mod cancel;
pub mod capture;
pub mod compare;
pub mod compression;
pub mod dir_cache;
pub mod error;
pub mod filesnap;
pub mod hashing;
pub mod persistence;
pub mod restore;
pub mod types;
pub mod utils;

// Internal modules (not part of public API)
mod collections;

// Re-export main types for convenience
pub use cancel::CancellationToken;
pub use compare::Comparator;
pub use compression::{Compressor, Lz4Compressor, NoCompression};
pub use dir_cache::DirectoryCache;
pub use error::{Result, SnapError};
pub use filesnap::{FileSnap, FileSnapBuilder};
pub use hashing::{ContentHasher, Sha256Hasher};
pub use types::*;
