//! Main test module for FileSnap
//!
//! This module includes all test suites:
//! - Integration tests for end-to-end workflows over generated trees
//! - Property-based tests for invariants
//! - Edge cases for unusual names, permissions and concurrency

pub mod integration;
pub mod property;

#[cfg(test)]
mod edge_cases {
    use ::filesnap::*;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_empty_directory() {
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        let snap = FileSnap::new().unwrap();

        let snapshot = snap.capture(source.path()).unwrap();
        let root = snapshot.root.as_ref().unwrap();
        assert_eq!(root.path, PathBuf::new());
        assert!(root.files.is_empty());
        assert!(root.directories.is_empty());
        assert_eq!(root.size, 0);
        assert_eq!(snapshot.base_path, source.path());

        let result = snap.restore(&snapshot, target.path()).unwrap();
        assert_eq!(result.files_restored, 0);
        assert_eq!(result.directories_restored, 1);
        assert!(target.path().is_dir());
    }

    #[test]
    fn test_single_file_snapshot() {
        let source = TempDir::new().unwrap();
        fs::write(source.path().join("a.txt"), "hello").unwrap();

        let snap = FileSnap::new().unwrap();
        let snapshot = snap.capture(source.path()).unwrap();
        let root = snapshot.root.as_ref().unwrap();

        assert_eq!(root.files.len(), 1);
        let file = &root.files[0];
        assert_eq!(file.path, PathBuf::from("a.txt"));
        assert_eq!(file.size, 5);
        assert_eq!(
            file.hash,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(file.content(), Some(&b"hello"[..]));
        assert_eq!(root.size, 5);
        assert_eq!(snapshot.base_path, source.path());
    }

    #[test]
    fn test_special_filenames() {
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();

        let names = [
            "file with spaces.txt",
            "file-with-dashes.txt",
            "file_with_underscores.txt",
            "file.multiple.dots.txt",
            ".hidden_file",
            "UPPERCASE.TXT",
            "no_extension",
            "文件.txt",
            "файл.txt",
            "αρχείο.txt",
        ];
        for name in &names {
            fs::write(source.path().join(name), name.as_bytes()).unwrap();
        }

        let snap = FileSnap::new().unwrap();
        let snapshot = snap.capture(source.path()).unwrap();
        assert_eq!(snapshot.root.as_ref().unwrap().file_count(), names.len());

        snap.restore(&snapshot, target.path()).unwrap();
        for name in &names {
            let restored = fs::read(target.path().join(name)).unwrap();
            assert_eq!(restored, name.as_bytes(), "content mismatch for {}", name);
        }
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_non_utf8_file_names_survive_save_and_load() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        let name = OsStr::from_bytes(b"bad\xffname.txt");
        fs::create_dir(source.path().join("sub")).unwrap();
        fs::write(source.path().join("sub").join(name), "latin1").unwrap();

        let snap = FileSnap::new().unwrap();
        let snapshot = snap.capture(source.path()).unwrap();
        let saved = snap.save(&snapshot, &target.path().join("snapshot")).unwrap();
        let loaded = snap.load(&saved).unwrap();
        assert_eq!(loaded.root, snapshot.root);

        let restore_dir = target.path().join("restored");
        snap.restore(&loaded, &restore_dir).unwrap();
        assert_eq!(
            fs::read_to_string(restore_dir.join("sub").join(name)).unwrap(),
            "latin1"
        );
    }

    #[test]
    fn test_zero_byte_and_binary_files() {
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();

        let binary: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        fs::write(source.path().join("empty.bin"), b"").unwrap();
        fs::write(source.path().join("data.bin"), &binary).unwrap();

        let snap = FileSnap::new().unwrap();
        let snapshot = snap.capture(source.path()).unwrap();
        let saved = snap.save(&snapshot, &target.path().join("snapshot")).unwrap();
        let loaded = snap.load(&saved).unwrap();

        let restore_dir = target.path().join("restored");
        snap.restore(&loaded, &restore_dir).unwrap();
        assert_eq!(fs::read(restore_dir.join("empty.bin")).unwrap(), b"");
        assert_eq!(fs::read(restore_dir.join("data.bin")).unwrap(), binary);
    }

    #[test]
    #[cfg(unix)]
    fn test_permission_preservation() {
        use std::os::unix::fs::PermissionsExt;

        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();

        let script = source.path().join("run.sh");
        fs::write(&script, "#!/bin/sh\necho hi\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let private = source.path().join("secret.txt");
        fs::write(&private, "secret").unwrap();
        fs::set_permissions(&private, fs::Permissions::from_mode(0o600)).unwrap();

        let snap = FileSnap::new().unwrap();
        let snapshot = snap.capture(source.path()).unwrap();
        let result = snap.restore(&snapshot, target.path()).unwrap();
        assert!(result.is_clean(), "unexpected warnings: {:?}", result.warnings);

        let mode = |path: &Path| fs::metadata(path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&target.path().join("run.sh")), 0o755);
        assert_eq!(mode(&target.path().join("secret.txt")), 0o600);
    }

    #[test]
    fn test_deletion_markers_remove_existing_entries() {
        let target = TempDir::new().unwrap();
        fs::write(target.path().join("stale.txt"), "stale").unwrap();
        fs::create_dir_all(target.path().join("old_dir/nested")).unwrap();
        fs::write(target.path().join("old_dir/nested/x.txt"), "x").unwrap();

        let mut root = DirectoryEntry::new(PathBuf::new());
        root.files.push(
            FileEntry::new(PathBuf::from("stale.txt"), Vec::new(), String::new())
                .to_deletion_marker(),
        );
        root.directories
            .push(DirectoryEntry::new(PathBuf::from("old_dir")).to_deletion_marker());
        let snapshot = Snapshot::new(target.path().to_path_buf(), root);

        let snap = FileSnap::new().unwrap();
        let result = snap.restore(&snapshot, target.path()).unwrap();
        assert_eq!(result.files_deleted, 1);
        assert_eq!(result.directories_deleted, 1);
        assert!(!target.path().join("stale.txt").exists());
        assert!(!target.path().join("old_dir").exists());

        // Absent paths are a no-op
        let again = snap.restore(&snapshot, target.path()).unwrap();
        assert_eq!(again.files_deleted, 0);
        assert_eq!(again.directories_deleted, 0);
    }

    #[test]
    fn test_concurrent_directory_creation_is_deduplicated() {
        let temp = TempDir::new().unwrap();
        let cache = Arc::new(DirectoryCache::new());
        let dir = temp.path().join("shared/deeply/nested");

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let dir = dir.clone();
                std::thread::spawn(move || cache.ensure_exists(&dir))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        assert!(dir.is_dir());
        assert_eq!(cache.creations(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&dir).unwrap());
    }

    #[test]
    fn test_directory_cache_rejects_empty_path() {
        let cache = DirectoryCache::new();
        assert!(matches!(
            cache.ensure_exists(Path::new("")),
            Err(SnapError::InvalidArgument(_))
        ));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_deep_nesting() {
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();

        let mut deep = source.path().to_path_buf();
        for level in 0..24 {
            deep = deep.join(format!("level_{}", level));
        }
        fs::create_dir_all(&deep).unwrap();
        fs::write(deep.join("bottom.txt"), "bottom").unwrap();

        let snap = FileSnap::new().unwrap();
        let snapshot = snap.capture(source.path()).unwrap();
        assert_eq!(snapshot.root.as_ref().unwrap().directory_count(), 24);

        snap.restore(&snapshot, target.path()).unwrap();
        let relative = deep.strip_prefix(source.path()).unwrap();
        assert_eq!(
            fs::read_to_string(target.path().join(relative).join("bottom.txt")).unwrap(),
            "bottom"
        );
    }
}
