//! Content fingerprinting
//!
//! Capture asks a [`ContentHasher`] for each file's fingerprint. The default
//! [`Sha256Hasher`] produces a 64-character lowercase hex SHA-256 digest.
//!
//! ```rust
//! use filesnap::hashing::{ContentHasher, Sha256Hasher};
//!
//! let hasher = Sha256Hasher;
//! let hash = hasher.hash_bytes(b"hello");
//! assert_eq!(hash.len(), 64);
//! assert_eq!(hash, hasher.hash_bytes(b"hello"));
//! ```

use crate::error::{Result, SnapError};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Produces a deterministic fingerprint of file content
///
/// `hash_bytes` and `hash_file` must agree: hashing a file's bytes in memory
/// yields the same string as streaming the file from disk.
pub trait ContentHasher: Send + Sync + std::fmt::Debug {
    /// Fingerprint of bytes already in memory
    fn hash_bytes(&self, data: &[u8]) -> String;

    /// Fingerprint of a file on disk
    ///
    /// # Errors
    ///
    /// - [`SnapError::Io`] if the file cannot be opened or read
    fn hash_file(&self, path: &Path) -> Result<String>;
}

/// SHA-256 content hasher
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl ContentHasher for Sha256Hasher {
    fn hash_bytes(&self, data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }

    fn hash_file(&self, path: &Path) -> Result<String> {
        let mut file = File::open(path).map_err(|e| SnapError::io(path, e))?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; 8192];

        loop {
            let bytes_read = file.read(&mut buffer).map_err(|e| SnapError::io(path, e))?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(hex::encode(hasher.finalize()))
    }
}
