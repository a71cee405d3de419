//! Directory Scanner (§4.4)
//!
//! Walks a root directory with `walkdir::WalkDir`, following the traversal
//! idiom the pack's streaming-pipeline scanner uses, then applies the fixed
//! exclusion and classification rules and shards the ordered result into
//! fixed-size batches. Restartable but not incremental: every job re-walks.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::core::constants::{
    CONFIG_FILENAME_PATTERNS, EXCLUDED_FILENAME_MARKERS, EXCLUDED_PATH_SUBSTRINGS,
    EXCLUDED_SUFFIX_DECLARATION,
};

/// Classifier tag assigned to a file surviving the exclusion pass. Consumed
/// by the Isolated Worker, not by the scanner itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClassification {
    Regular,
    PotentialBarrel,
    Config,
}

/// A file that survived exclusion, tagged for the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub classification: FileClassification,
}

/// Walks `root`, applies the default exclusion policy, and sorts the
/// surviving files lexicographically by path for a deterministic ordering
/// across runs on an identical tree.
pub struct DirectoryScanner;

impl DirectoryScanner {
    pub fn new() -> Self {
        Self
    }

    /// Scan `root`, returning the ordered, classified file list.
    pub fn scan(&self, root: &Path) -> std::io::Result<Vec<ScannedFile>> {
        if !root.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("not a directory: {}", root.display()),
            ));
        }

        let mut files: Vec<PathBuf> = WalkDir::new(root)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| !is_excluded(path))
            .collect();

        files.sort();

        Ok(files
            .into_iter()
            .map(|path| {
                let classification = classify(&path);
                ScannedFile { path, classification }
            })
            .collect())
    }

    /// Partition `files` into batches of `batch_size`, preserving order. The
    /// final batch may be short. Sharding is the unit of enqueue (§4.4).
    pub fn shard(files: &[ScannedFile], batch_size: usize) -> Vec<Vec<PathBuf>> {
        debug_assert!(batch_size > 0, "batch_size must be positive");
        files
            .chunks(batch_size.max(1))
            .map(|chunk| chunk.iter().map(|f| f.path.clone()).collect())
            .collect()
    }
}

impl Default for DirectoryScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Default exclusion policy (§4.4): `node_modules`, test-marker segments,
/// and declaration-only files are filtered out before classification.
fn is_excluded(path: &Path) -> bool {
    let path_str = path.to_string_lossy();
    if EXCLUDED_PATH_SUBSTRINGS
        .iter()
        .any(|marker| path_str.contains(marker))
    {
        return true;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    if EXCLUDED_FILENAME_MARKERS
        .iter()
        .any(|marker| file_name.contains(marker))
    {
        return true;
    }

    if file_name.ends_with(EXCLUDED_SUFFIX_DECLARATION) {
        return true;
    }

    false
}

/// Classify a surviving file: `index.<ext>` is a potential barrel file,
/// fixed config filenames are `CONFIG`, everything else is `REGULAR`.
fn classify(path: &Path) -> FileClassification {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    if CONFIG_FILENAME_PATTERNS
        .iter()
        .any(|pattern| file_name == *pattern || file_name.starts_with(pattern))
    {
        return FileClassification::Config;
    }

    let stem = path.file_stem().map(|s| s.to_string_lossy().to_string());
    if stem.as_deref() == Some("index") {
        return FileClassification::PotentialBarrel;
    }

    FileClassification::Regular
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(dir: &Path, rel: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, "// content").unwrap();
    }

    #[test]
    fn excludes_node_modules_and_test_markers() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        touch(root, "src/lib.rs");
        touch(root, "node_modules/pkg/index.js");
        touch(root, "src/foo.test.ts");
        touch(root, "src/__tests__/bar.ts");
        touch(root, "src/types.d.ts");

        let files = DirectoryScanner::new().scan(root).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|f| f.path.strip_prefix(root).unwrap().to_string_lossy().to_string())
            .collect();

        assert_eq!(names, vec!["src/lib.rs".to_string()]);
    }

    #[test]
    fn classifies_barrel_and_config_files() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        touch(root, "src/index.ts");
        touch(root, "package.json");
        touch(root, "src/util.ts");

        let files = DirectoryScanner::new().scan(root).unwrap();
        let by_name = |name: &str| {
            files
                .iter()
                .find(|f| f.path.file_name().unwrap() == name)
                .unwrap()
        };

        assert_eq!(
            by_name("index.ts").classification,
            FileClassification::PotentialBarrel
        );
        assert_eq!(
            by_name("package.json").classification,
            FileClassification::Config
        );
        assert_eq!(by_name("util.ts").classification, FileClassification::Regular);
    }

    #[test]
    fn ordering_is_lexicographic_and_deterministic() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        touch(root, "b.rs");
        touch(root, "a.rs");
        touch(root, "c/d.rs");

        let first = DirectoryScanner::new().scan(root).unwrap();
        let second = DirectoryScanner::new().scan(root).unwrap();
        assert_eq!(first, second);

        let names: Vec<_> = first
            .iter()
            .map(|f| f.path.strip_prefix(root).unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.rs".to_string(), "b.rs".to_string(), "c/d.rs".to_string()]);
    }

    #[test]
    fn shard_splits_into_fixed_size_batches_with_short_final_batch() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        for i in 0..5 {
            touch(root, &format!("file{i}.rs"));
        }
        let files = DirectoryScanner::new().scan(root).unwrap();
        let batches = DirectoryScanner::shard(&files, 2);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[1].len(), 2);
        assert_eq!(batches[2].len(), 1);
    }

    #[test]
    fn scan_of_nonexistent_directory_errors() {
        let result = DirectoryScanner::new().scan(Path::new("/no/such/directory"));
        assert!(result.is_err());
    }
}
