//! Property-based testing for FileSnap
//!
//! Uses proptest to verify invariants across randomly generated trees
//! and byte strings.

use ::filesnap::*;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Generate random relative file paths
///
/// Directory names never contain a dot and file names always do, so a path
/// can never be used as both a file and a directory.
fn path_strategy() -> impl Strategy<Value = PathBuf> {
    let dir_strategy = prop::collection::vec("(src|docs|dir[0-9])", 0..=3);
    let filename_strategy = prop_oneof![
        "file[0-9]{1,3}\\.txt",
        "[a-z]{1,8}\\.(txt|rs|md)",
    ];

    (dir_strategy, filename_strategy).prop_map(|(dirs, filename)| {
        let mut path = PathBuf::new();
        for dir in dirs {
            path = path.join(dir);
        }
        path.join(filename)
    })
}

/// Generate random file content
fn content_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        Just(Vec::new()),
        "[a-zA-Z0-9 \n]{1,500}".prop_map(|s| s.into_bytes()),
        prop::collection::vec(any::<u8>(), 1..4000),
        (any::<u8>(), 1..2000usize).prop_map(|(byte, count)| vec![byte; count]),
    ]
}

/// Generate a tree as a map from relative path to content
fn tree_strategy() -> impl Strategy<Value = BTreeMap<PathBuf, Vec<u8>>> {
    prop::collection::btree_map(path_strategy(), content_strategy(), 0..30)
}

fn write_tree(root: &Path, tree: &BTreeMap<PathBuf, Vec<u8>>) -> anyhow::Result<()> {
    for (path, content) in tree {
        let full_path = root.join(path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(full_path, content)?;
    }
    Ok(())
}

fn read_tree(root: &Path) -> anyhow::Result<BTreeMap<PathBuf, Vec<u8>>> {
    let mut tree = BTreeMap::new();
    for entry in walkdir::WalkDir::new(root) {
        let entry = entry?;
        if entry.file_type().is_file() {
            let relative = entry.path().strip_prefix(root)?.to_path_buf();
            tree.insert(relative, fs::read(entry.path())?);
        }
    }
    Ok(tree)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Restoring a capture reproduces the captured tree exactly
    #[test]
    fn capture_restore_identity(tree in tree_strategy()) {
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        write_tree(source.path(), &tree).unwrap();

        let snap = FileSnap::new().unwrap();
        let snapshot = snap.capture(source.path()).unwrap();
        prop_assert_eq!(snapshot.root.as_ref().unwrap().file_count(), tree.len());

        snap.restore(&snapshot, target.path()).unwrap();
        prop_assert_eq!(read_tree(target.path()).unwrap(), tree);
    }

    /// A snapshot survives save and load with identical content and hashes
    #[test]
    fn save_load_preserves_files(tree in tree_strategy(), compress_stream in any::<bool>()) {
        let source = TempDir::new().unwrap();
        let storage = TempDir::new().unwrap();
        write_tree(source.path(), &tree).unwrap();

        let snap = FileSnapBuilder::new().compress_stream(compress_stream).build().unwrap();
        let snapshot = snap.capture(source.path()).unwrap();
        let saved = snap.save(&snapshot, &storage.path().join("snapshot")).unwrap();
        let loaded = snap.load(&saved).unwrap();

        prop_assert_eq!(loaded.id, snapshot.id);
        prop_assert_eq!(&loaded.base_path, &snapshot.base_path);

        let mut expected = BTreeMap::new();
        snapshot.root.as_ref().unwrap().for_each_file(&mut |f| {
            expected.insert(f.path.clone(), (f.hash.clone(), f.content().unwrap_or_default().to_vec()));
        });
        let mut actual = BTreeMap::new();
        loaded.root.as_ref().unwrap().for_each_file(&mut |f| {
            actual.insert(f.path.clone(), (f.hash.clone(), f.content().unwrap_or_default().to_vec()));
        });
        prop_assert_eq!(actual, expected);
    }

    /// Comparing a snapshot with itself reports nothing
    #[test]
    fn self_compare_is_empty(tree in tree_strategy()) {
        let source = TempDir::new().unwrap();
        write_tree(source.path(), &tree).unwrap();

        let snap = FileSnap::new().unwrap();
        let snapshot = snap.capture(source.path()).unwrap();
        let diff = snap.compare(&snapshot, &snapshot).unwrap();
        prop_assert!(diff.is_empty());
        prop_assert_eq!(diff.change_count(), 0);
    }

    /// Difference between two trees matches the set difference of their files
    #[test]
    fn compare_matches_tree_difference(before in tree_strategy(), after in tree_strategy()) {
        let before_dir = TempDir::new().unwrap();
        let after_dir = TempDir::new().unwrap();
        write_tree(before_dir.path(), &before).unwrap();
        write_tree(after_dir.path(), &after).unwrap();

        let snap = FileSnap::new().unwrap();
        let diff = snap
            .compare(&snap.capture(before_dir.path()).unwrap(), &snap.capture(after_dir.path()).unwrap())
            .unwrap();

        let expected_modified = after
            .iter()
            .filter(|(path, content)| before.get(*path).is_some_and(|old| old != *content))
            .count();
        prop_assert_eq!(diff.modified_files.len(), expected_modified);
        for (old, new) in &diff.modified_files {
            prop_assert_eq!(&old.path, &new.path);
            prop_assert_ne!(&old.hash, &new.hash);
        }
        for file in &diff.deleted_files {
            prop_assert!(file.is_deleted);
            prop_assert!(!after.contains_key(&file.path));
        }
        for file in &diff.new_files {
            prop_assert!(!before.contains_key(&file.path));
        }
    }

    /// Compressors restore exactly what they were given
    #[test]
    fn compression_round_trip(data in prop::collection::vec(any::<u8>(), 0..8192), min_size in 0usize..256) {
        let compressor = Lz4Compressor::new(min_size);
        let compressed = compressor.compress(&data).unwrap();
        prop_assert_eq!(compressor.decompress(&compressed).unwrap(), data.clone());

        let passthrough = NoCompression;
        prop_assert_eq!(passthrough.decompress(&passthrough.compress(&data).unwrap()).unwrap(), data);
    }
}
