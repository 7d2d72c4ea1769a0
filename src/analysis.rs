//! Derived insights over snapshots and differences
//!
//! Read-only statistics computed from an in-memory tree: counts, sizes,
//! extension and attribute breakdowns. Deletion markers are not counted.
//!
//! [`analyze`] bundles the headline figures into the string map stored in
//! [`Snapshot::insights`]:
//!
//! | Key                   | Value                                  |
//! |-----------------------|----------------------------------------|
//! | `FileCount`           | number of files                        |
//! | `DirectoryCount`      | number of directories below the root   |
//! | `TotalSize`           | sum of file sizes in bytes             |
//! | `AverageFileSize`     | mean file size, two decimals           |
//! | `LargestFile`         | relative path (only if files exist)    |
//! | `SmallestFile`        | relative path (only if files exist)    |
//! | `MostCommonExtension` | lowercased extension (only if files exist) |

use crate::error::{Result, SnapError};
use crate::types::{DirectoryEntry, Difference, FileEntry, Snapshot};
use std::collections::BTreeMap;

/// Headline insights for a snapshot
///
/// # Errors
///
/// - [`SnapError::InvalidArgument`] if the snapshot has no root
pub fn analyze(snapshot: &Snapshot) -> Result<BTreeMap<String, String>> {
    let (files, directories) = file_and_directory_count(snapshot)?;
    let mut insights = BTreeMap::new();

    insights.insert("FileCount".to_string(), files.to_string());
    insights.insert("DirectoryCount".to_string(), directories.to_string());
    insights.insert("TotalSize".to_string(), total_file_size(snapshot)?.to_string());
    insights.insert(
        "AverageFileSize".to_string(),
        format!("{:.2}", average_file_size(snapshot)?),
    );

    if let Some((largest, smallest)) = largest_and_smallest_files(snapshot)? {
        insights.insert("LargestFile".to_string(), largest.path.display().to_string());
        insights.insert("SmallestFile".to_string(), smallest.path.display().to_string());
    }
    if let Some(extension) = most_common_file_type(snapshot)? {
        insights.insert("MostCommonExtension".to_string(), extension);
    }

    Ok(insights)
}

/// Number of live files and of directories below the root
pub fn file_and_directory_count(snapshot: &Snapshot) -> Result<(usize, usize)> {
    let root = root_of(snapshot)?;
    Ok((live_files(root).len(), count_directories(root)))
}

/// Sum of all live file sizes
pub fn total_file_size(snapshot: &Snapshot) -> Result<u64> {
    Ok(live_files(root_of(snapshot)?).iter().map(|f| f.size).sum())
}

/// Mean live file size, 0.0 when there are no files
pub fn average_file_size(snapshot: &Snapshot) -> Result<f64> {
    let files = live_files(root_of(snapshot)?);
    if files.is_empty() {
        return Ok(0.0);
    }
    let total: u64 = files.iter().map(|f| f.size).sum();
    Ok(total as f64 / files.len() as f64)
}

/// Largest and smallest live file
///
/// Ties go to the file visited first (depth first, sorted order).
pub fn largest_and_smallest_files(snapshot: &Snapshot) -> Result<Option<(&FileEntry, &FileEntry)>> {
    let files = live_files(root_of(snapshot)?);
    let Some(first) = files.first().copied() else {
        return Ok(None);
    };

    let (mut largest, mut smallest) = (first, first);
    for file in files {
        if file.size > largest.size {
            largest = file;
        }
        if file.size < smallest.size {
            smallest = file;
        }
    }
    Ok(Some((largest, smallest)))
}

/// Number of live files per lowercased extension (empty key for none)
pub fn file_type_counts(snapshot: &Snapshot) -> Result<BTreeMap<String, usize>> {
    let mut counts = BTreeMap::new();
    for file in live_files(root_of(snapshot)?) {
        *counts.entry(file.extension()).or_insert(0) += 1;
    }
    Ok(counts)
}

/// Total live file size per lowercased extension
pub fn file_type_sizes(snapshot: &Snapshot) -> Result<BTreeMap<String, u64>> {
    let mut sizes = BTreeMap::new();
    for file in live_files(root_of(snapshot)?) {
        *sizes.entry(file.extension()).or_insert(0) += file.size;
    }
    Ok(sizes)
}

/// Extension shared by the most files; ties go to the alphabetically first
pub fn most_common_file_type(snapshot: &Snapshot) -> Result<Option<String>> {
    let counts = file_type_counts(snapshot)?;
    let mut best: Option<(&String, usize)> = None;
    for (extension, &count) in &counts {
        if best.map_or(true, |(_, top)| count > top) {
            best = Some((extension, count));
        }
    }
    Ok(best.map(|(extension, _)| extension.clone()))
}

/// Number of live files per exact size
pub fn file_size_distribution(snapshot: &Snapshot) -> Result<BTreeMap<u64, usize>> {
    let mut distribution = BTreeMap::new();
    for file in live_files(root_of(snapshot)?) {
        *distribution.entry(file.size).or_insert(0) += 1;
    }
    Ok(distribution)
}

/// Number of directories (root included) per sum of their direct file sizes
pub fn directory_size_distribution(snapshot: &Snapshot) -> Result<BTreeMap<u64, usize>> {
    fn visit(dir: &DirectoryEntry, distribution: &mut BTreeMap<u64, usize>) {
        if dir.is_deleted {
            return;
        }
        let direct: u64 = dir.files.iter().filter(|f| !f.is_deleted).map(|f| f.size).sum();
        *distribution.entry(direct).or_insert(0) += 1;
        for child in &dir.directories {
            visit(child, distribution);
        }
    }

    let mut distribution = BTreeMap::new();
    visit(root_of(snapshot)?, &mut distribution);
    Ok(distribution)
}

/// Number of live files per attribute bitmask
pub fn attribute_distribution(snapshot: &Snapshot) -> Result<BTreeMap<u32, usize>> {
    let mut distribution = BTreeMap::new();
    for file in live_files(root_of(snapshot)?) {
        *distribution.entry(file.attributes).or_insert(0) += 1;
    }
    Ok(distribution)
}

/// (new, deleted, modified) file counts of a difference
pub fn file_changes(diff: &Difference) -> (usize, usize, usize) {
    (
        diff.new_files.len(),
        diff.deleted_files.len(),
        diff.modified_files.len(),
    )
}

/// (new, deleted, modified) directory counts of a difference
pub fn directory_changes(diff: &Difference) -> (usize, usize, usize) {
    (
        diff.new_directories.len(),
        diff.deleted_directories.len(),
        diff.modified_directories.len(),
    )
}

fn root_of(snapshot: &Snapshot) -> Result<&DirectoryEntry> {
    snapshot.root.as_ref().ok_or_else(|| {
        SnapError::invalid_argument(format!("Snapshot {} has no root directory", snapshot.id))
    })
}

fn live_files(root: &DirectoryEntry) -> Vec<&FileEntry> {
    let mut files = Vec::new();
    root.for_each_file(&mut |f| {
        if !f.is_deleted {
            files.push(f);
        }
    });
    files
}

fn count_directories(dir: &DirectoryEntry) -> usize {
    dir.directories
        .iter()
        .filter(|d| !d.is_deleted)
        .map(|d| 1 + count_directories(d))
        .sum()
}
