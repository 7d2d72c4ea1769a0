//! Snapshot comparison
//!
//! [`Comparator`] computes a [`Difference`] between two in-memory trees in a
//! single synchronous pass. At each directory level it keys the direct
//! children of both sides by their relative path and classifies them:
//!
//! | before | after | hash / metadata         | result                 |
//! |--------|-------|-------------------------|------------------------|
//! | absent | file  |                         | new file               |
//! | file   | file  | hash differs            | modified file          |
//! | file   | absent|                         | deleted file           |
//! | absent | dir   |                         | new directory (deep)   |
//! | dir    | dir   | created/attributes differ | modified directory   |
//! | dir    | absent|                         | deleted directory      |
//!
//! Directories present on both sides are always descended into, so nested
//! changes surface even below a directory that is itself reported modified.
//!
//! Lists are filled in `after` order for new and modified entries and in
//! `before` order for deletions, which makes the result deterministic for
//! normalized trees.
//!
//! ```rust
//! use filesnap::compare::Comparator;
//! use filesnap::types::{DirectoryEntry, FileEntry, Snapshot};
//! use std::path::PathBuf;
//!
//! let before = Snapshot::new(PathBuf::from("/data"), DirectoryEntry::new(PathBuf::new()));
//! let mut root = DirectoryEntry::new(PathBuf::new());
//! root.files.push(FileEntry::new(PathBuf::from("a.txt"), b"a".to_vec(), "h1".into()));
//! let after = Snapshot::new(PathBuf::from("/data"), root);
//!
//! let diff = Comparator.compare(&before, &after).unwrap();
//! assert_eq!(diff.new_files.len(), 1);
//! assert!(Comparator.compare(&after, &after).unwrap().is_empty());
//! ```

use crate::collections::HashMap;
#[cfg(feature = "gxhash")]
use crate::collections::HashMapExt;
use crate::error::{Result, SnapError};
use crate::types::{DirectoryEntry, Difference, FileEntry, Snapshot};
use std::path::Path;
use tracing::{debug, trace};

/// Pure structural and content diff between two snapshots
#[derive(Debug, Clone, Copy, Default)]
pub struct Comparator;

impl Comparator {
    /// Compare `before` against `after`
    ///
    /// # Errors
    ///
    /// - [`SnapError::InvalidArgument`] if either snapshot has no root
    pub fn compare(&self, before: &Snapshot, after: &Snapshot) -> Result<Difference> {
        let before_root = before.root.as_ref().ok_or_else(|| {
            SnapError::invalid_argument(format!("Snapshot {} has no root directory", before.id))
        })?;
        let after_root = after.root.as_ref().ok_or_else(|| {
            SnapError::invalid_argument(format!("Snapshot {} has no root directory", after.id))
        })?;

        let mut diff = Difference::between(before.id, after.id);
        compare_directories(before_root, after_root, &mut diff);

        debug!(
            "Compared {} -> {}: {} new, {} modified, {} deleted files; {} new, {} modified, {} deleted directories",
            before.short_id(),
            after.short_id(),
            diff.new_files.len(),
            diff.modified_files.len(),
            diff.deleted_files.len(),
            diff.new_directories.len(),
            diff.modified_directories.len(),
            diff.deleted_directories.len()
        );

        Ok(diff)
    }
}

fn compare_directories(before: &DirectoryEntry, after: &DirectoryEntry, diff: &mut Difference) {
    compare_files(&before.files, &after.files, diff);

    let before_dirs = key_by_path(&before.directories, |d| d.path.as_path());
    let after_dirs = key_by_path(&after.directories, |d| d.path.as_path());
    let mut common = Vec::new();

    for dir in after.directories.iter().filter(|d| has_key(&d.path)) {
        match before_dirs.get(dir.path.as_path()) {
            None => diff.new_directories.push(dir.clone()),
            Some(old) => {
                if old.created_at != dir.created_at || old.attributes != dir.attributes {
                    diff.modified_directories
                        .push((old.shallow_clone(), dir.shallow_clone()));
                }
                common.push((*old, dir));
            }
        }
    }

    for dir in before.directories.iter().filter(|d| has_key(&d.path)) {
        if !after_dirs.contains_key(dir.path.as_path()) {
            diff.deleted_directories.push(dir.to_deletion_marker());
        }
    }

    for (old, new) in common {
        compare_directories(old, new, diff);
    }
}

fn compare_files(before: &[FileEntry], after: &[FileEntry], diff: &mut Difference) {
    let before_files = key_by_path(before, |f| f.path.as_path());
    let after_files = key_by_path(after, |f| f.path.as_path());

    for file in after.iter().filter(|f| has_key(&f.path)) {
        match before_files.get(file.path.as_path()) {
            None => diff.new_files.push(file.clone()),
            Some(old) if old.hash != file.hash => {
                diff.modified_files.push(((*old).clone(), file.clone()))
            }
            Some(_) => {}
        }
    }

    for file in before.iter().filter(|f| has_key(&f.path)) {
        if !after_files.contains_key(file.path.as_path()) {
            diff.deleted_files.push(file.to_deletion_marker());
        }
    }
}

fn key_by_path<'a, T>(entries: &'a [T], path: impl Fn(&'a T) -> &'a Path) -> HashMap<&'a Path, &'a T> {
    let mut map = HashMap::with_capacity(entries.len());
    for entry in entries {
        let key = path(entry);
        if has_key(key) {
            map.insert(key, entry);
        }
    }
    map
}

fn has_key(path: &Path) -> bool {
    if path.as_os_str().is_empty() {
        trace!("Skipping entry without a path");
        return false;
    }
    true
}
