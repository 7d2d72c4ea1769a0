//! Utility functions for FileSnap
//!
//! Platform-specific metadata handling (attribute bits and timestamps),
//! atomic file writes and human-readable byte formatting.
//!
//! ## Cross-Platform Behavior
//!
//! - **Unix**: attributes are the file mode bits; creation time is read where
//!   the filesystem records it and can only be restored on macOS
//! - **Windows**: attributes are the `FILE_ATTRIBUTE_*` bits; only the
//!   read-only bit can be restored through std

use crate::error::{Result, SnapError};
use chrono::{DateTime, Utc};
use filetime::FileTime;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::time::SystemTime;

/// Attribute bits of a file or directory
#[cfg(unix)]
pub fn attributes_of(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode()
}

/// Attribute bits of a file or directory
#[cfg(windows)]
pub fn attributes_of(metadata: &fs::Metadata) -> u32 {
    use std::os::windows::fs::MetadataExt;
    metadata.file_attributes()
}

/// Apply recorded attribute bits
///
/// Zero means nothing was recorded and leaves the entry untouched.
#[cfg(unix)]
pub fn set_attributes(path: &Path, attributes: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    if attributes == 0 {
        return Ok(());
    }
    fs::set_permissions(path, fs::Permissions::from_mode(attributes & 0o7777))
}

/// Apply recorded attribute bits
///
/// Std only exposes the read-only bit (`FILE_ATTRIBUTE_READONLY`), so the
/// remaining attributes are left as the filesystem chose them. Zero means
/// nothing was recorded and leaves the entry untouched.
#[cfg(windows)]
pub fn set_attributes(path: &Path, attributes: u32) -> io::Result<()> {
    const FILE_ATTRIBUTE_READONLY: u32 = 0x1;
    if attributes == 0 {
        return Ok(());
    }
    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_readonly(attributes & FILE_ATTRIBUTE_READONLY != 0);
    fs::set_permissions(path, permissions)
}

/// Last modification time of an entry
pub fn modified_time(metadata: &fs::Metadata) -> DateTime<Utc> {
    metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| DateTime::<Utc>::from(SystemTime::UNIX_EPOCH))
}

/// Creation time of an entry, or its modification time where the platform
/// does not record one
pub fn created_time(metadata: &fs::Metadata) -> DateTime<Utc> {
    metadata
        .created()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| modified_time(metadata))
}

/// Set the last modification time of a file or directory
pub fn set_modified_time(path: &Path, time: DateTime<Utc>) -> io::Result<()> {
    filetime::set_file_mtime(path, FileTime::from_system_time(time.into()))
}

/// Set the creation time of a file
#[cfg(any(windows, target_os = "macos"))]
pub fn set_created_time(path: &Path, time: DateTime<Utc>) -> io::Result<()> {
    #[cfg(target_os = "macos")]
    use std::os::macos::fs::FileTimesExt;
    #[cfg(windows)]
    use std::os::windows::fs::FileTimesExt;

    let file = fs::OpenOptions::new().write(true).open(path)?;
    file.set_times(fs::FileTimes::new().set_created(time.into()))
}

/// Set the creation time of a file
///
/// Other Unix systems offer no call to change the birth time; this is a no-op there.
#[cfg(not(any(windows, target_os = "macos")))]
pub fn set_created_time(_path: &Path, _time: DateTime<Utc>) -> io::Result<()> {
    Ok(())
}

/// Atomic file write (write to a temp file in the same directory, then rename)
///
/// The target is either fully written or left untouched.
///
/// # Errors
///
/// - [`SnapError::Io`] if the temp file cannot be created, written or persisted
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(|e| SnapError::io(parent, e))?;
    temp.write_all(content).map_err(|e| SnapError::io(temp.path(), e))?;
    temp.as_file().sync_all().map_err(|e| SnapError::io(temp.path(), e))?;
    temp.persist(path).map_err(|e| SnapError::io(path, e.error))?;
    Ok(())
}

/// Format bytes in human-readable form
///
/// Uses 1024 as the conversion factor.
///
/// ```rust
/// use filesnap::utils::format_bytes;
///
/// assert_eq!(format_bytes(1023), "1023 B");
/// assert_eq!(format_bytes(1536), "1.50 KB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}
