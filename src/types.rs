//! Core data types used throughout the FileSnap library
//!
//! This module contains the snapshot tree model and the results of the
//! operations that work on it.
//!
//! ## Overview
//!
//! - **Tree**: [`FileEntry`] leaves owned by [`DirectoryEntry`] nodes. A node
//!   exclusively owns its children; the tree is acyclic and finite.
//! - **Snapshots**: [`Snapshot`] (a full frozen tree) and [`Changeset`] (the
//!   flat delta produced by incremental capture)
//! - **Results**: [`Difference`], [`RestoreResult`], [`RestoreWarning`]
//! - **Configuration**: [`SnapshotConfig`]
//!
//! Entry paths are relative to the snapshot base path. The root directory
//! has an empty path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Default number of files read and hashed concurrently per directory batch
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Extension appended by `save` when the output path has none
pub const DEFAULT_EXTENSION: &str = "fsnap";

/// Content carried by a [`FileEntry`]
///
/// Raw and compressed content are mutually exclusive: the persistence layer
/// swaps one for the other in place, and deleted entries carry neither.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "encoding", content = "data", rename_all = "snake_case")]
pub enum FileContent {
    /// No content (deletion markers, metadata-only copies)
    #[default]
    Empty,
    /// Raw file bytes
    Raw(#[serde(with = "hex")] Vec<u8>),
    /// Bytes transformed by the configured compressor
    Compressed(#[serde(with = "hex")] Vec<u8>),
}

impl FileContent {
    /// Whether the bytes are held in compressed form
    pub fn is_compressed(&self) -> bool {
        matches!(self, FileContent::Compressed(_))
    }

    /// Whether any bytes are held at all
    pub fn is_empty(&self) -> bool {
        matches!(self, FileContent::Empty)
    }
}

/// A file in a snapshot tree
///
/// Contains everything needed to restore the file: its bytes, content
/// fingerprint, timestamps and platform attribute bits.
///
/// # Examples
///
/// ```rust
/// # use filesnap::types::FileEntry;
/// # use std::path::PathBuf;
/// let entry = FileEntry::new(PathBuf::from("docs/a.txt"), b"hello".to_vec(), "abc123".to_string());
/// assert_eq!(entry.size, 5);
/// assert_eq!(entry.content(), Some(&b"hello"[..]));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path relative to the snapshot base
    #[serde(with = "os_path")]
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Content fingerprint produced by the hashing collaborator
    pub hash: String,
    /// Creation timestamp (falls back to the modification time where the
    /// platform does not record one)
    pub created_at: DateTime<Utc>,
    /// Last modified timestamp
    pub modified_at: DateTime<Utc>,
    /// Platform attribute bits (Unix mode or Windows file attributes)
    pub attributes: u32,
    /// Marks a deletion; such entries carry metadata but no content
    #[serde(default)]
    pub is_deleted: bool,
    /// File content, raw or compressed
    #[serde(default)]
    pub content: FileContent,
    /// Free-form key/value metadata
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl FileEntry {
    /// Create an entry holding raw content, timestamps set to now
    pub fn new(path: PathBuf, content: Vec<u8>, hash: String) -> Self {
        let now = Utc::now();
        Self {
            path,
            size: content.len() as u64,
            hash,
            created_at: now,
            modified_at: now,
            attributes: 0,
            is_deleted: false,
            content: FileContent::Raw(content),
            metadata: BTreeMap::new(),
        }
    }

    /// Raw content bytes, if held uncompressed
    pub fn content(&self) -> Option<&[u8]> {
        match &self.content {
            FileContent::Raw(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Compressed content bytes, if held compressed
    pub fn compressed_content(&self) -> Option<&[u8]> {
        match &self.content {
            FileContent::Compressed(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// File name component of the path
    pub fn name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }

    /// Lowercased extension, empty when the file has none
    pub fn extension(&self) -> String {
        self.path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    }

    /// Copy of this entry turned into a deletion marker
    pub fn to_deletion_marker(&self) -> Self {
        Self {
            is_deleted: true,
            content: FileContent::Empty,
            ..self.clone()
        }
    }
}

/// A directory in a snapshot tree
///
/// Children are kept sorted by path so that trees captured from the same
/// directory state are identical regardless of enumeration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Path relative to the snapshot base (empty for the root)
    #[serde(with = "os_path")]
    pub path: PathBuf,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last modified timestamp
    pub modified_at: DateTime<Utc>,
    /// Platform attribute bits
    pub attributes: u32,
    /// Sum of all descendant file sizes
    pub size: u64,
    /// Direct child files
    #[serde(default)]
    pub files: Vec<FileEntry>,
    /// Direct child directories
    #[serde(default)]
    pub directories: Vec<DirectoryEntry>,
    /// Marks a deletion; restore removes the directory and stops there
    #[serde(default)]
    pub is_deleted: bool,
}

impl DirectoryEntry {
    /// Create an empty directory entry, timestamps set to now
    pub fn new(path: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            path,
            created_at: now,
            modified_at: now,
            attributes: 0,
            size: 0,
            files: Vec::new(),
            directories: Vec::new(),
            is_deleted: false,
        }
    }

    /// Copy of this directory's own metadata without its children
    pub fn shallow_clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            created_at: self.created_at,
            modified_at: self.modified_at,
            attributes: self.attributes,
            size: self.size,
            files: Vec::new(),
            directories: Vec::new(),
            is_deleted: self.is_deleted,
        }
    }

    /// Childless copy of this directory turned into a deletion marker
    pub fn to_deletion_marker(&self) -> Self {
        Self {
            is_deleted: true,
            ..self.shallow_clone()
        }
    }

    /// Sort children by path and recompute the aggregate size
    pub fn normalize(&mut self) {
        self.files.sort_by(|a, b| a.path.cmp(&b.path));
        self.directories.sort_by(|a, b| a.path.cmp(&b.path));
        self.size = self.files.iter().map(|f| f.size).sum::<u64>()
            + self.directories.iter().map(|d| d.size).sum::<u64>();
    }

    /// Visit every file in this subtree, depth first
    pub fn for_each_file<'a>(&'a self, f: &mut impl FnMut(&'a FileEntry)) {
        for file in &self.files {
            f(file);
        }
        for dir in &self.directories {
            dir.for_each_file(f);
        }
    }

    /// Mutable references to every file in this subtree, depth first
    ///
    /// Handy for handing the whole tree to a parallel iterator.
    pub fn files_mut(&mut self) -> Vec<&mut FileEntry> {
        fn collect<'a>(dir: &'a mut DirectoryEntry, out: &mut Vec<&'a mut FileEntry>) {
            let DirectoryEntry {
                files, directories, ..
            } = dir;
            out.extend(files.iter_mut());
            for child in directories.iter_mut() {
                collect(child, out);
            }
        }

        let mut out = Vec::new();
        collect(self, &mut out);
        out
    }

    /// Number of files in this subtree
    pub fn file_count(&self) -> usize {
        self.files.len() + self.directories.iter().map(|d| d.file_count()).sum::<usize>()
    }

    /// Number of directories below this one
    pub fn directory_count(&self) -> usize {
        self.directories.len()
            + self
                .directories
                .iter()
                .map(|d| d.directory_count())
                .sum::<usize>()
    }

    /// Find a file anywhere in this subtree by its relative path
    pub fn find_file(&self, path: &Path) -> Option<&FileEntry> {
        if let Some(file) = self.files.iter().find(|f| f.path == path) {
            return Some(file);
        }
        self.directories
            .iter()
            .filter(|d| path.starts_with(&d.path))
            .find_map(|d| d.find_file(path))
    }
}

/// A point-in-time copy of a directory tree
///
/// Immutable once captured, except for the in-place raw/compressed content
/// swap performed around persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Unique identifier
    pub id: Uuid,
    /// Capture timestamp
    pub created_at: DateTime<Utc>,
    /// Directory the snapshot was captured from
    #[serde(with = "os_path")]
    pub base_path: PathBuf,
    /// Root of the captured tree
    pub root: Option<DirectoryEntry>,
    /// Derived insights (see [`crate::analysis`])
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insights: Option<BTreeMap<String, String>>,
    /// Arbitrary metadata (host information is recorded at capture)
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Snapshot {
    /// Create a snapshot around an already built tree
    pub fn new(base_path: PathBuf, root: DirectoryEntry) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            base_path,
            root: Some(root),
            insights: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Short form of the id for log lines
    pub fn short_id(&self) -> String {
        self.id.simple().to_string()[..8].to_string()
    }
}

/// Structural and content differences between two snapshots
///
/// Derived by the comparator and never mutated afterwards. Deleted entries
/// carry the last known `before` state marked as deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Difference {
    /// Unique identifier
    pub id: Uuid,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Id of the `before` snapshot
    pub before_snapshot_id: Uuid,
    /// Id of the `after` snapshot
    pub after_snapshot_id: Uuid,
    /// Files only present in `after`
    pub new_files: Vec<FileEntry>,
    /// Files only present in `before`
    pub deleted_files: Vec<FileEntry>,
    /// Files whose hash changed (before, after)
    pub modified_files: Vec<(FileEntry, FileEntry)>,
    /// Directories only present in `after`, with their full subtree
    pub new_directories: Vec<DirectoryEntry>,
    /// Directories only present in `before`
    pub deleted_directories: Vec<DirectoryEntry>,
    /// Directories whose creation time or attributes changed (before, after),
    /// without children; nested changes are reported in the other lists
    pub modified_directories: Vec<(DirectoryEntry, DirectoryEntry)>,
}

impl Difference {
    pub(crate) fn between(before: Uuid, after: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            before_snapshot_id: before,
            after_snapshot_id: after,
            new_files: Vec::new(),
            deleted_files: Vec::new(),
            modified_files: Vec::new(),
            new_directories: Vec::new(),
            deleted_directories: Vec::new(),
            modified_directories: Vec::new(),
        }
    }

    /// Check if there are any changes
    pub fn is_empty(&self) -> bool {
        self.change_count() == 0
    }

    /// Total number of entries across all six lists
    pub fn change_count(&self) -> usize {
        self.new_files.len()
            + self.deleted_files.len()
            + self.modified_files.len()
            + self.new_directories.len()
            + self.deleted_directories.len()
            + self.modified_directories.len()
    }
}

/// Flat set of changed entries produced by incremental capture
///
/// Every new, modified (after-state) and deleted entry is a direct member of
/// the changeset regardless of where it sat in the tree. Entries keep their
/// base-relative paths, so the nesting can still be recovered from them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Changeset {
    /// Unique identifier
    pub id: Uuid,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Directory the changeset was captured from
    #[serde(with = "os_path")]
    pub base_path: PathBuf,
    /// Snapshot the fresh capture was compared against
    pub previous_snapshot_id: Uuid,
    /// Changed files: new, modified (after-state), then deleted markers
    pub files: Vec<FileEntry>,
    /// Changed directories: new, modified (after-state), then deleted markers
    pub directories: Vec<DirectoryEntry>,
}

impl Changeset {
    /// Check if the changeset carries no entries
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.directories.is_empty()
    }

    /// Synthetic root directory holding every changed entry as a direct child
    pub fn to_directory(&self) -> DirectoryEntry {
        let mut root = DirectoryEntry::new(self.base_path.clone());
        root.created_at = self.created_at;
        root.modified_at = self.created_at;
        root.files = self.files.clone();
        root.directories = self.directories.clone();
        root.size = root.files.iter().map(|f| f.size).sum::<u64>()
            + root.directories.iter().map(|d| d.size).sum::<u64>();
        root
    }
}

/// Metadata that restore applies on a best-effort basis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetadataKind {
    /// Attribute bits / permissions
    Attributes,
    /// Creation timestamp
    CreatedTime,
    /// Last modified timestamp
    ModifiedTime,
}

/// A metadata failure absorbed during restore
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreWarning {
    /// Target path the metadata was applied to
    #[serde(with = "os_path")]
    pub path: PathBuf,
    /// Which piece of metadata failed
    pub kind: MetadataKind,
    /// Error text from the platform
    pub message: String,
}

impl std::fmt::Display for RestoreWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} on {:?}: {}", self.kind, self.path, self.message)
    }
}

/// Result of a restore operation
///
/// A successful restore may still carry warnings for metadata that the
/// target platform or permission model refused.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestoreResult {
    /// Files written
    pub files_restored: usize,
    /// Files removed because of deletion markers
    pub files_deleted: usize,
    /// Directories ensured to exist
    pub directories_restored: usize,
    /// Directories removed because of deletion markers
    pub directories_deleted: usize,
    /// Total content bytes written
    pub bytes_written: u64,
    /// Time taken in milliseconds
    pub duration_ms: u64,
    /// Absorbed metadata failures
    pub warnings: Vec<RestoreWarning>,
}

impl RestoreResult {
    /// Check if every piece of metadata was applied
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Configuration shared by capture, persistence and restore
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Files read and hashed concurrently per batch
    pub batch_size: usize,
    /// Worker threads for all fan-out
    pub parallel_workers: usize,
    /// Swap file content for compressed content on save (and back on load)
    pub compression_enabled: bool,
    /// Pass the whole persisted stream through the compressor
    pub compress_stream: bool,
    /// Extension appended on save when the path has none
    pub default_extension: String,
    /// Recompute every file hash after load
    pub verify_on_load: bool,
    /// Descend into symlinked directories during capture
    ///
    /// Links to regular files are captured as ordinary files holding the
    /// target's content either way. Dangling links are skipped.
    pub follow_symlinks: bool,
    /// Glob patterns for entries to leave out of captures
    pub ignore_patterns: Vec<String>,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            parallel_workers: num_cpus::get(),
            compression_enabled: true,
            compress_stream: false,
            default_extension: DEFAULT_EXTENSION.to_string(),
            verify_on_load: false,
            follow_symlinks: false,
            ignore_patterns: Vec::new(),
        }
    }
}

/// Lossless serde form for paths
///
/// UTF-8 paths are written as plain strings. Anything else is written as
/// `{"os_bytes": "<hex>"}` holding the raw Unix bytes, or
/// `{"os_wide": "<hex>"}` holding little-endian UTF-16 units on Windows.
pub(crate) mod os_path {
    use serde::de::Error as _;
    use serde::ser::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::path::{Path, PathBuf};

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        Bytes { os_bytes: String },
        Wide { os_wide: String },
    }

    pub fn serialize<S: Serializer>(path: &Path, serializer: S) -> Result<S::Ok, S::Error> {
        let repr = match path.to_str() {
            Some(text) => Repr::Text(text.to_string()),
            None => encode(path).map_err(S::Error::custom)?,
        };
        repr.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<PathBuf, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Text(text) => Ok(PathBuf::from(text)),
            Repr::Bytes { os_bytes } => {
                let bytes = hex::decode(os_bytes).map_err(D::Error::custom)?;
                from_bytes(bytes).map_err(D::Error::custom)
            }
            Repr::Wide { os_wide } => {
                let bytes = hex::decode(os_wide).map_err(D::Error::custom)?;
                from_wide(bytes).map_err(D::Error::custom)
            }
        }
    }

    #[cfg(unix)]
    fn encode(path: &Path) -> Result<Repr, &'static str> {
        use std::os::unix::ffi::OsStrExt;
        Ok(Repr::Bytes {
            os_bytes: hex::encode(path.as_os_str().as_bytes()),
        })
    }

    #[cfg(windows)]
    fn encode(path: &Path) -> Result<Repr, &'static str> {
        use std::os::windows::ffi::OsStrExt;
        let bytes: Vec<u8> = path
            .as_os_str()
            .encode_wide()
            .flat_map(u16::to_le_bytes)
            .collect();
        Ok(Repr::Wide {
            os_wide: hex::encode(bytes),
        })
    }

    #[cfg(not(any(unix, windows)))]
    fn encode(_path: &Path) -> Result<Repr, &'static str> {
        Err("path is not valid UTF-8")
    }

    #[cfg(unix)]
    fn from_bytes(bytes: Vec<u8>) -> Result<PathBuf, &'static str> {
        use std::os::unix::ffi::OsStringExt;
        Ok(PathBuf::from(std::ffi::OsString::from_vec(bytes)))
    }

    #[cfg(not(unix))]
    fn from_bytes(_bytes: Vec<u8>) -> Result<PathBuf, &'static str> {
        Err("raw Unix path bytes cannot be restored on this platform")
    }

    #[cfg(windows)]
    fn from_wide(bytes: Vec<u8>) -> Result<PathBuf, &'static str> {
        use std::os::windows::ffi::OsStringExt;
        if bytes.len() % 2 != 0 {
            return Err("UTF-16 path has an odd number of bytes");
        }
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Ok(PathBuf::from(std::ffi::OsString::from_wide(&units)))
    }

    #[cfg(not(windows))]
    fn from_wide(_bytes: Vec<u8>) -> Result<PathBuf, &'static str> {
        Err("UTF-16 path units cannot be restored on this platform")
    }
}
