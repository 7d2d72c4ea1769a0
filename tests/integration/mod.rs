//! Integration testing framework for FileSnap
//!
//! Provides a harness that generates realistic project trees with a seeded
//! RNG, mutates them, and drives full capture/save/compare/restore cycles.

use ::filesnap::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Test harness for complex scenarios
pub struct SnapTestHarness {
    pub source_dir: TempDir,
    pub storage_dir: TempDir,
    pub snap: FileSnap,
    pub file_generator: FileGenerator,
}

impl SnapTestHarness {
    pub fn new() -> Self {
        Self::with_builder(FileSnapBuilder::new().parallel_workers(4).batch_size(8))
    }

    pub fn with_builder(builder: FileSnapBuilder) -> Self {
        Self {
            source_dir: TempDir::new().unwrap(),
            storage_dir: TempDir::new().unwrap(),
            snap: builder.build().unwrap(),
            file_generator: FileGenerator::new(42),
        }
    }

    pub fn root(&self) -> &Path {
        self.source_dir.path()
    }

    /// Generate a project tree below the source directory
    pub fn generate_project(&mut self, config: ProjectConfig) -> anyhow::Result<usize> {
        let root = self.source_dir.path().to_path_buf();
        self.generate_level(&root, 0, &config)
    }

    fn generate_level(&mut self, dir: &Path, depth: usize, config: &ProjectConfig) -> anyhow::Result<usize> {
        fs::create_dir_all(dir)?;
        let mut created = 0;

        for i in 0..config.files_per_dir {
            let content = if i % 4 == 3 {
                let size = self.file_generator.rng.random_range(config.file_size_range.clone());
                self.file_generator.generate_binary_content(size)
            } else {
                self.file_generator.generate_file_content(config.file_size_range.clone())
            };
            let extension = ["txt", "rs", "md", "bin"][i % 4];
            fs::write(dir.join(format!("file_{}.{}", i, extension)), content)?;
            created += 1;
        }

        if depth < config.max_depth {
            for i in 0..config.dirs_per_level {
                created += self.generate_level(&dir.join(format!("dir_{}", i)), depth + 1, config)?;
            }
        }

        Ok(created)
    }

    /// Apply random mutations to files, returning what changed
    pub fn mutate_files(&mut self, config: MutationConfig) -> anyhow::Result<Vec<FileChange>> {
        let root = self.source_dir.path().to_path_buf();
        let mut all_files = list_files(&root)?;
        let mut changes = Vec::new();

        for mutation_idx in 0..config.num_mutations {
            if all_files.is_empty() {
                break;
            }

            match self.file_generator.rng.random_range(0..3) {
                0 => {
                    let idx = self.file_generator.rng.random_range(0..all_files.len());
                    let path = all_files[idx].clone();
                    let mut content = self
                        .file_generator
                        .generate_file_content(config.file_size_range.clone());
                    // Guarantee the content differs from whatever was there
                    content.extend_from_slice(format!(" mutation {}", mutation_idx).as_bytes());
                    fs::write(root.join(&path), content)?;
                    changes.push(FileChange::Modified(path));
                }
                1 => {
                    let idx = self.file_generator.rng.random_range(0..all_files.len());
                    let path = all_files.remove(idx);
                    fs::remove_file(root.join(&path))?;
                    changes.push(FileChange::Deleted(path));
                }
                _ => {
                    let path = PathBuf::from(format!("mutated_file_{}.txt", mutation_idx));
                    let content = self
                        .file_generator
                        .generate_file_content(config.file_size_range.clone());
                    fs::write(root.join(&path), content)?;
                    all_files.push(path.clone());
                    changes.push(FileChange::Added(path));
                }
            }
        }

        Ok(changes)
    }
}

/// Relative paths of every regular file under `root`, sorted
pub fn list_files(root: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() {
            files.push(entry.path().strip_prefix(root)?.to_path_buf());
        }
    }
    Ok(files)
}

/// Relative path to content for every regular file under `root`
pub fn read_tree(root: &Path) -> anyhow::Result<BTreeMap<PathBuf, Vec<u8>>> {
    let mut tree = BTreeMap::new();
    for path in list_files(root)? {
        let content = fs::read(root.join(&path))?;
        tree.insert(path, content);
    }
    Ok(tree)
}

/// File generator for test data
pub struct FileGenerator {
    rng: StdRng,
}

impl FileGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Generate realistic text content
    pub fn generate_file_content(&mut self, size_range: std::ops::Range<usize>) -> Vec<u8> {
        let size = self.rng.random_range(size_range);
        let mut content = Vec::with_capacity(size);

        let words = ["the", "quick", "brown", "fox", "jumps", "over", "lazy", "dog", "lorem", "ipsum"];
        while content.len() < size {
            let word = words[self.rng.random_range(0..words.len())];
            content.extend_from_slice(word.as_bytes());
            content.push(b' ');
        }

        content.truncate(size);
        content
    }

    /// Generate binary content
    pub fn generate_binary_content(&mut self, size: usize) -> Vec<u8> {
        let mut content = vec![0u8; size];
        self.rng.fill(&mut content[..]);
        content
    }
}

#[derive(Debug, Clone)]
pub struct ProjectConfig {
    pub max_depth: usize,
    pub dirs_per_level: usize,
    pub files_per_dir: usize,
    pub file_size_range: std::ops::Range<usize>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            max_depth: 2,
            dirs_per_level: 3,
            files_per_dir: 6,
            file_size_range: 1..4_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MutationConfig {
    pub num_mutations: usize,
    pub file_size_range: std::ops::Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    Added(PathBuf),
    Modified(PathBuf),
    Deleted(PathBuf),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn test_generated_project_round_trip() {
        let mut harness = SnapTestHarness::new();
        let created = harness.generate_project(ProjectConfig::default()).unwrap();

        let snapshot = harness.snap.capture(harness.root()).unwrap();
        let root = snapshot.root.as_ref().unwrap();
        assert_eq!(root.file_count(), created);
        // 3 + 9 directories below the root
        assert_eq!(root.directory_count(), 12);

        let saved = harness
            .snap
            .save(&snapshot, &harness.storage_dir.path().join("project"))
            .unwrap();
        let loaded = harness.snap.load(&saved).unwrap();

        assert_eq!(loaded.id, snapshot.id);
        assert_eq!(loaded.base_path, snapshot.base_path);
        let loaded_root = loaded.root.as_ref().unwrap();
        assert_eq!(loaded_root.file_count(), root.file_count());
        assert_eq!(loaded_root.directory_count(), root.directory_count());

        let mut hashes = BTreeMap::new();
        root.for_each_file(&mut |f| {
            hashes.insert(f.path.clone(), (f.hash.clone(), f.content().map(<[u8]>::to_vec)));
        });
        loaded_root.for_each_file(&mut |f| {
            let (hash, content) = &hashes[&f.path];
            assert_eq!(&f.hash, hash);
            assert_eq!(&f.content().map(<[u8]>::to_vec), content);
        });

        let target = TempDir::new().unwrap();
        let result = harness.snap.restore(&loaded, target.path()).unwrap();
        assert_eq!(result.files_restored, created);
        assert_eq!(read_tree(target.path()).unwrap(), read_tree(harness.root()).unwrap());
    }

    #[test]
    fn test_mutations_show_up_in_difference() {
        let mut harness = SnapTestHarness::new();
        harness.generate_project(ProjectConfig::default()).unwrap();
        let before = harness.snap.capture(harness.root()).unwrap();

        let changes = harness
            .mutate_files(MutationConfig {
                num_mutations: 20,
                file_size_range: 10..500,
            })
            .unwrap();
        let after = harness.snap.capture(harness.root()).unwrap();
        let diff = harness.snap.compare(&before, &after).unwrap();

        // Replay the change log to find the net effect per path
        let original: BTreeSet<PathBuf> = {
            let mut set = BTreeSet::new();
            before.root.as_ref().unwrap().for_each_file(&mut |f| {
                set.insert(f.path.clone());
            });
            set
        };
        let mut expected_new = BTreeSet::new();
        let mut expected_deleted = BTreeSet::new();
        let mut expected_modified = BTreeSet::new();
        for change in &changes {
            match change {
                FileChange::Added(path) => {
                    expected_new.insert(path.clone());
                }
                FileChange::Modified(path) => {
                    if original.contains(path) {
                        expected_modified.insert(path.clone());
                    }
                }
                FileChange::Deleted(path) => {
                    if !expected_new.remove(path) {
                        expected_modified.remove(path);
                        expected_deleted.insert(path.clone());
                    }
                }
            }
        }

        let actual_new: BTreeSet<PathBuf> = diff.new_files.iter().map(|f| f.path.clone()).collect();
        let actual_deleted: BTreeSet<PathBuf> =
            diff.deleted_files.iter().map(|f| f.path.clone()).collect();
        let actual_modified: BTreeSet<PathBuf> =
            diff.modified_files.iter().map(|(_, f)| f.path.clone()).collect();

        assert_eq!(actual_new, expected_new);
        assert_eq!(actual_deleted, expected_deleted);
        assert_eq!(actual_modified, expected_modified);
        assert!(diff.deleted_files.iter().all(|f| f.is_deleted && f.content.is_empty()));
    }

    #[test]
    fn test_incremental_changesets_keep_mirror_in_sync() {
        let mut harness = SnapTestHarness::new();
        harness.generate_project(ProjectConfig {
            max_depth: 1,
            dirs_per_level: 2,
            files_per_dir: 5,
            file_size_range: 1..1_000,
        }).unwrap();

        let mirror = TempDir::new().unwrap();
        let mut base = harness.snap.capture(harness.root()).unwrap();
        harness.snap.restore(&base, mirror.path()).unwrap();

        for round in 0..3 {
            harness
                .mutate_files(MutationConfig {
                    num_mutations: 5,
                    file_size_range: 1..200,
                })
                .unwrap();
            fs::create_dir_all(harness.root().join(format!("round_{}/inner", round))).unwrap();
            fs::write(
                harness.root().join(format!("round_{}/inner/note.md", round)),
                format!("round {}", round),
            )
            .unwrap();

            let changes = harness.snap.capture_incremental(harness.root(), &base).unwrap();
            assert_eq!(changes.previous_snapshot_id, base.id);
            assert!(!changes.is_empty());
            harness.snap.apply_changeset(&changes, mirror.path()).unwrap();

            assert_eq!(
                read_tree(mirror.path()).unwrap(),
                read_tree(harness.root()).unwrap(),
                "mirror diverged after round {}",
                round
            );
            base = harness.snap.capture(harness.root()).unwrap();
        }
    }

    #[test]
    fn test_changeset_handles_paths_that_change_kind() {
        let harness = SnapTestHarness::new();
        let root = harness.root();
        fs::create_dir_all(root.join("x")).unwrap();
        fs::write(root.join("x/y"), "inside x").unwrap();
        fs::write(root.join("z"), "plain file").unwrap();

        let mirror = TempDir::new().unwrap();
        let base = harness.snap.capture(root).unwrap();
        harness.snap.restore(&base, mirror.path()).unwrap();

        // Directory x becomes a file, file z becomes a directory
        fs::remove_dir_all(root.join("x")).unwrap();
        fs::write(root.join("x"), "x is a file now").unwrap();
        fs::remove_file(root.join("z")).unwrap();
        fs::create_dir(root.join("z")).unwrap();
        fs::write(root.join("z/w.txt"), "inside z").unwrap();

        let changes = harness.snap.capture_incremental(root, &base).unwrap();
        let result = harness.snap.apply_changeset(&changes, mirror.path()).unwrap();
        assert_eq!(result.files_deleted, 1);
        assert_eq!(result.directories_deleted, 1);

        assert_eq!(read_tree(mirror.path()).unwrap(), read_tree(root).unwrap());
        assert!(mirror.path().join("x").is_file());
        assert!(mirror.path().join("z").is_dir());
    }

    #[test]
    fn test_restore_overwrites_modified_files_only_from_snapshot() {
        let mut harness = SnapTestHarness::new();
        harness.generate_project(ProjectConfig {
            max_depth: 1,
            dirs_per_level: 1,
            files_per_dir: 4,
            file_size_range: 10..100,
        }).unwrap();
        let snapshot = harness.snap.capture(harness.root()).unwrap();
        let original = read_tree(harness.root()).unwrap();

        harness
            .mutate_files(MutationConfig {
                num_mutations: 6,
                file_size_range: 10..100,
            })
            .unwrap();
        harness.snap.restore(&snapshot, harness.root()).unwrap();

        // Every captured file is back; files added since are left in place
        let current = read_tree(harness.root()).unwrap();
        for (path, content) in &original {
            assert_eq!(current.get(path), Some(content), "{} not restored", path.display());
        }
    }

    #[test]
    fn test_cancelled_operations() {
        let mut harness = SnapTestHarness::new();
        harness.generate_project(ProjectConfig::default()).unwrap();
        let snapshot = harness.snap.capture(harness.root()).unwrap();

        let token = CancellationToken::new();
        token.cancel();

        assert!(matches!(
            harness.snap.capture_cancellable(harness.root(), &token),
            Err(SnapError::Cancelled)
        ));

        let target = TempDir::new().unwrap();
        assert!(matches!(
            harness.snap.restore_cancellable(&snapshot, target.path(), &token),
            Err(SnapError::Cancelled)
        ));
        assert!(list_files(target.path()).unwrap().is_empty());
    }

    #[test]
    fn test_uncompressed_store_and_insights() {
        let mut harness = SnapTestHarness::with_builder(
            FileSnapBuilder::new()
                .compression(false)
                .default_extension("snapshot")
                .ignore_patterns(vec!["**/*.bin".to_string()]),
        );
        harness.generate_project(ProjectConfig {
            max_depth: 1,
            dirs_per_level: 2,
            files_per_dir: 4,
            file_size_range: 1..300,
        }).unwrap();

        let snapshot = harness.snap.capture_with_insights(harness.root()).unwrap();
        let insights = snapshot.insights.as_ref().unwrap();
        // One of every four generated files is a .bin
        assert_eq!(insights["FileCount"], "9");
        assert_eq!(insights["DirectoryCount"], "2");

        let saved = harness
            .snap
            .save(&snapshot, &harness.storage_dir.path().join("plain"))
            .unwrap();
        assert_eq!(saved.extension().unwrap(), "snapshot");
        let json = fs::read_to_string(&saved).unwrap();
        assert!(json.contains("\"encoding\": \"raw\""));

        let loaded = harness.snap.load(&saved).unwrap();
        assert_eq!(loaded.insights, snapshot.insights);
    }
}
