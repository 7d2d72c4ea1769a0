//! Snapshot persistence
//!
//! [`SnapshotStore`] writes snapshots to disk as pretty-printed JSON and reads
//! them back. Content bytes are hex-encoded, so persisted snapshots stay
//! human-diffable.
//!
//! ## Content transform
//!
//! With compression enabled, save swaps every file's raw content for its
//! compressed form (on a copy; the caller's snapshot is untouched) and load
//! swaps it back. With compression disabled, content is persisted as held
//! and load leaves compressed content compressed.
//!
//! ## Stream envelope
//!
//! With `compress_stream` set, the whole JSON document is passed through the
//! compressor and prefixed with the `FSNZ` magic. Load recognizes the
//! envelope by its magic regardless of configuration.
//!
//! ## Atomicity
//!
//! Writes go to a temporary file next to the target and are renamed into
//! place, so a crash mid-save never leaves a truncated snapshot behind.

use crate::compression::Compressor;
use crate::error::{Result, SnapError};
use crate::hashing::ContentHasher;
use crate::types::{FileContent, Snapshot, SnapshotConfig};
use crate::utils;
use rayon::prelude::*;
use rayon::ThreadPool;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Magic prefix of a compressed persisted stream
const STREAM_MAGIC: &[u8] = b"FSNZ";

/// Saves and loads snapshots
#[derive(Debug)]
pub struct SnapshotStore {
    compressor: Arc<dyn Compressor>,
    hasher: Arc<dyn ContentHasher>,
    pool: Arc<ThreadPool>,
    compression_enabled: bool,
    compress_stream: bool,
    default_extension: String,
    verify_on_load: bool,
}

impl SnapshotStore {
    /// Create a store
    pub fn new(
        config: &SnapshotConfig,
        compressor: Arc<dyn Compressor>,
        hasher: Arc<dyn ContentHasher>,
        pool: Arc<ThreadPool>,
    ) -> Self {
        Self {
            compressor,
            hasher,
            pool,
            compression_enabled: config.compression_enabled,
            compress_stream: config.compress_stream,
            default_extension: config.default_extension.trim_start_matches('.').to_string(),
            verify_on_load: config.verify_on_load,
        }
    }

    /// Path `save` writes to for `output`
    ///
    /// The default extension is appended when `output` has none; an explicit
    /// extension is kept as given.
    pub fn resolve_path(&self, output: &Path) -> PathBuf {
        if output.extension().is_some() || self.default_extension.is_empty() {
            output.to_path_buf()
        } else {
            output.with_extension(&self.default_extension)
        }
    }

    /// Save `snapshot` to `output`
    ///
    /// Returns the path actually written (see [`resolve_path`](Self::resolve_path)).
    /// Missing parent directories are created.
    ///
    /// # Errors
    ///
    /// - [`SnapError::InvalidState`] if the snapshot has no root
    /// - [`SnapError::InvalidArgument`] if `output` is empty
    /// - [`SnapError::Compression`] if content cannot be compressed
    /// - [`SnapError::Internal`] if the snapshot cannot be encoded as JSON
    /// - [`SnapError::Io`] if the file cannot be written
    pub fn save(&self, snapshot: &Snapshot, output: &Path) -> Result<PathBuf> {
        if snapshot.root.is_none() {
            return Err(SnapError::invalid_state(format!(
                "Snapshot {} has no root directory",
                snapshot.id
            )));
        }
        if output.as_os_str().is_empty() {
            return Err(SnapError::invalid_argument("Output path cannot be empty"));
        }

        let path = self.resolve_path(output);

        let mut json = if self.compression_enabled {
            let mut persisted = snapshot.clone();
            self.compress_content(&mut persisted)?;
            encode_json(&persisted)?
        } else {
            encode_json(snapshot)?
        };

        if self.compress_stream {
            let compressed = self.compressor.compress(&json)?;
            json = Vec::with_capacity(STREAM_MAGIC.len() + compressed.len());
            json.extend_from_slice(STREAM_MAGIC);
            json.extend_from_slice(&compressed);
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| SnapError::io(parent, e))?;
        }
        utils::atomic_write(&path, &json)?;

        info!(
            "Saved snapshot {} to {:?} ({})",
            snapshot.short_id(),
            path,
            utils::format_bytes(json.len() as u64)
        );
        Ok(path)
    }

    /// Load a snapshot from `path`
    ///
    /// # Errors
    ///
    /// - [`SnapError::NotFound`] if `path` does not exist
    /// - [`SnapError::CorruptData`] if the document does not parse or has no root
    /// - [`SnapError::Decompression`] if compressed content is damaged
    /// - [`SnapError::HashMismatch`] if verification is enabled and content
    ///   does not match its recorded hash
    pub fn load(&self, path: &Path) -> Result<Snapshot> {
        if !path.is_file() {
            return Err(SnapError::NotFound(path.to_path_buf()));
        }

        let bytes = fs::read(path).map_err(|e| SnapError::io(path, e))?;
        let json = if bytes.starts_with(STREAM_MAGIC) {
            trace!("Unwrapping compressed stream of {} bytes", bytes.len());
            self.compressor.decompress(&bytes[STREAM_MAGIC.len()..])?
        } else {
            bytes
        };

        let mut snapshot: Snapshot = serde_json::from_slice(&json)
            .map_err(|e| SnapError::corrupt(format!("{:?}: {}", path, e)))?;
        if snapshot.root.is_none() {
            return Err(SnapError::corrupt(format!("{:?}: snapshot has no root directory", path)));
        }

        if self.compression_enabled {
            self.decompress_content(&mut snapshot)?;
        }
        if self.verify_on_load {
            self.verify(&snapshot)?;
        }

        info!("Loaded snapshot {} from {:?}", snapshot.short_id(), path);
        Ok(snapshot)
    }

    /// Swap raw content for compressed content throughout the tree
    pub fn compress_content(&self, snapshot: &mut Snapshot) -> Result<()> {
        let Some(root) = snapshot.root.as_mut() else {
            return Ok(());
        };
        let files = root.files_mut();
        debug!("Compressing content of {} files", files.len());

        self.pool.install(|| {
            files.into_par_iter().try_for_each(|file| -> Result<()> {
                if let FileContent::Raw(bytes) = &file.content {
                    let compressed = self.compressor.compress(bytes)?;
                    file.content = FileContent::Compressed(compressed);
                }
                Ok(())
            })
        })
    }

    /// Swap compressed content back to raw content throughout the tree
    pub fn decompress_content(&self, snapshot: &mut Snapshot) -> Result<()> {
        let Some(root) = snapshot.root.as_mut() else {
            return Ok(());
        };
        let files = root.files_mut();
        debug!("Decompressing content of {} files", files.len());

        self.pool.install(|| {
            files.into_par_iter().try_for_each(|file| -> Result<()> {
                if let FileContent::Compressed(bytes) = &file.content {
                    let raw = self.compressor.decompress(bytes)?;
                    file.content = FileContent::Raw(raw);
                }
                Ok(())
            })
        })
    }

    /// Recompute every live file's hash and compare it to the recorded one
    ///
    /// # Errors
    ///
    /// - [`SnapError::HashMismatch`] for the first file that disagrees
    pub fn verify(&self, snapshot: &Snapshot) -> Result<()> {
        let Some(root) = snapshot.root.as_ref() else {
            return Ok(());
        };
        let mut files = Vec::new();
        root.for_each_file(&mut |f| {
            if !f.is_deleted {
                files.push(f);
            }
        });

        self.pool.install(|| {
            files.par_iter().try_for_each(|file| -> Result<()> {
                let actual = match &file.content {
                    FileContent::Raw(bytes) => self.hasher.hash_bytes(bytes),
                    FileContent::Compressed(bytes) => {
                        self.hasher.hash_bytes(&self.compressor.decompress(bytes)?)
                    }
                    FileContent::Empty => self.hasher.hash_bytes(&[]),
                };
                if actual != file.hash {
                    return Err(SnapError::HashMismatch {
                        path: file.path.clone(),
                        expected: file.hash.clone(),
                        actual,
                    });
                }
                Ok(())
            })
        })?;

        debug!("Verified {} files of snapshot {}", files.len(), snapshot.short_id());
        Ok(())
    }
}

// `Json` is reserved for load-side decoding failures
fn encode_json(snapshot: &Snapshot) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(snapshot)
        .map_err(|e| SnapError::internal(format!("Cannot encode snapshot {}: {}", snapshot.id, e)))
}
