//! # File Management Module
//!
//! Questo modulo gestisce la discovery dei file nell'albero di input.
//!
//! ## Responsabilità:
//! - Discovery ricorsiva e lazy di tutti i file regolari in una directory
//! - Preservazione del path relativo alla radice di input
//! - Esclusione della directory di output quando è annidata nell'input
//! - Utilità per la formattazione human-readable delle dimensioni
//!
//! ## Ordinamento:
//! Depth-first, con le voci di ogni directory ordinate lessicograficamente
//! per nome. L'ordine è stabile tra un run e l'altro sullo stesso albero.
//!
//! ## Link simbolici:
//! Non vengono mai seguiti. Un link viene restituito come `FileEntry` con
//! `is_symlink = true` e il classifier lo marca come Skip.
//!
//! ## Errori:
//! - Radice inesistente o illeggibile: `DirectoryAccess`, prima di restituire
//!   qualsiasi voce (il run viene abortito)
//! - Voce illeggibile sotto la radice: `Unreadable` come elemento dell'iteratore
//!
//! ## Esempio:
//! ```rust,ignore
//! for entry in FileManager::walk(&input_dir, None)? {
//!     let entry = entry?;
//!     println!("{}", entry.relative_path.display());
//! }
//! ```

use crate::error::OptimizeError;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// A file discovered under the input root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Path relative to the input root
    pub relative_path: PathBuf,
    /// Absolute path of the source file
    pub source_path: PathBuf,
    pub size: u64,
    pub is_symlink: bool,
}

/// Manages file discovery
pub struct FileManager;

impl FileManager {
    /// Lazily walk every regular file (and symlink) under `root`.
    ///
    /// `exclude` is a canonical subtree that is never entered, used for an
    /// output directory nested inside the input.
    pub fn walk(
        root: &Path,
        exclude: Option<PathBuf>,
    ) -> Result<impl Iterator<Item = Result<FileEntry, OptimizeError>>, OptimizeError> {
        let root_error = |source| OptimizeError::DirectoryAccess {
            path: root.to_path_buf(),
            source,
        };

        let canonical_root = root.canonicalize().map_err(root_error)?;
        if !canonical_root.is_dir() {
            return Err(root_error(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                "not a directory",
            )));
        }
        // Check readability up front so a permission problem aborts the run
        std::fs::read_dir(&canonical_root).map_err(root_error)?;

        let base = canonical_root.clone();
        let walker = WalkDir::new(&canonical_root)
            .follow_links(false)
            .sort_by_file_name()
            .min_depth(1)
            .into_iter()
            .filter_entry(move |e| match exclude {
                Some(ref excluded) => e.path() != excluded.as_path(),
                None => true,
            });

        Ok(walker.filter_map(move |item| match item {
            Ok(entry) => Self::to_file_entry(&base, entry),
            Err(err) => {
                let path = err
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| base.clone());
                let source = err
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
                Some(Err(OptimizeError::Unreadable { path, source }))
            }
        }))
    }

    /// Path of a walk failure relative to `root`, for summaries and JSON events
    pub fn failure_path(root: &Path, error: &OptimizeError) -> PathBuf {
        let path = match error {
            OptimizeError::Unreadable { path, .. } => path.as_path(),
            _ => return PathBuf::new(),
        };
        let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        path.strip_prefix(&root).unwrap_or(path).to_path_buf()
    }

    fn to_file_entry(
        base: &Path,
        entry: walkdir::DirEntry,
    ) -> Option<Result<FileEntry, OptimizeError>> {
        let file_type = entry.file_type();
        if file_type.is_dir() {
            return None;
        }
        if !file_type.is_file() && !file_type.is_symlink() {
            debug!("Ignoring special file: {}", entry.path().display());
            return None;
        }

        let relative_path = entry.path().strip_prefix(base).ok()?.to_path_buf();
        let size = match entry.metadata() {
            Ok(metadata) => metadata.len(),
            Err(err) => {
                let source = err
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("metadata unavailable"));
                // Removed since the directory was listed (e.g. a sidecar already cleaned up)
                if source.kind() == std::io::ErrorKind::NotFound {
                    debug!("Vanished during walk: {}", entry.path().display());
                    return None;
                }
                return Some(Err(OptimizeError::Unreadable {
                    path: entry.path().to_path_buf(),
                    source,
                }));
            }
        };

        Some(Ok(FileEntry {
            source_path: entry.path().to_path_buf(),
            relative_path,
            size,
            is_symlink: file_type.is_symlink(),
        }))
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }

    /// Calculate percentage reduction
    pub fn calculate_reduction(original_size: u64, new_size: u64) -> f64 {
        if original_size == 0 {
            0.0
        } else {
            ((original_size as f64 - new_size as f64) / original_size as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn relative_paths(root: &Path, exclude: Option<PathBuf>) -> Vec<String> {
        FileManager::walk(root, exclude)
            .unwrap()
            .map(|e| e.unwrap().relative_path.to_string_lossy().replace('\\', "/"))
            .collect()
    }

    #[test]
    fn test_walk_is_lexical_depth_first() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("b/inner")).unwrap();
        fs::create_dir_all(root.join("a")).unwrap();
        fs::write(root.join("z.txt"), b"z").unwrap();
        fs::write(root.join("b/inner/c.jpg"), b"c").unwrap();
        fs::write(root.join("b/a.mov"), b"a").unwrap();
        fs::write(root.join("a/1.txt"), b"1").unwrap();

        assert_eq!(
            relative_paths(root, None),
            vec!["a/1.txt", "b/a.mov", "b/inner/c.jpg", "z.txt"]
        );
    }

    #[test]
    fn test_walk_reports_size_and_absolute_path() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), b"hello").unwrap();

        let entries: Vec<_> = FileManager::walk(temp.path(), None)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].size, 5);
        assert!(entries[0].source_path.is_absolute());
        assert!(!entries[0].is_symlink);
    }

    #[test]
    fn test_walk_excludes_nested_output() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("out")).unwrap();
        fs::write(root.join("a.txt"), b"a").unwrap();
        fs::write(root.join("out/a.txt"), b"a").unwrap();

        let excluded = root.join("out").canonicalize().unwrap();
        assert_eq!(relative_paths(root, Some(excluded)), vec!["a.txt"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_walk_does_not_follow_symlinks() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("in");
        let elsewhere = temp.path().join("elsewhere");
        fs::create_dir_all(&root).unwrap();
        fs::create_dir_all(&elsewhere).unwrap();
        fs::write(elsewhere.join("secret.txt"), b"s").unwrap();
        std::os::unix::fs::symlink(&elsewhere, root.join("link")).unwrap();

        let entries: Vec<_> = FileManager::walk(&root, None)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_symlink);
        assert_eq!(entries[0].relative_path, PathBuf::from("link"));
    }

    #[test]
    fn test_walk_missing_root_fails() {
        let temp = TempDir::new().unwrap();
        let result = FileManager::walk(&temp.path().join("missing"), None);
        assert!(matches!(result, Err(OptimizeError::DirectoryAccess { .. })));
    }

    #[test]
    fn test_walk_file_root_fails() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a.txt");
        fs::write(&file, b"a").unwrap();
        assert!(matches!(
            FileManager::walk(&file, None),
            Err(OptimizeError::DirectoryAccess { .. })
        ));
    }

    #[test]
    fn test_failure_path_is_relative_to_root() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let canonical = root.canonicalize().unwrap();
        let error = OptimizeError::Unreadable {
            path: canonical.join("album/locked"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert_eq!(
            FileManager::failure_path(root, &error),
            PathBuf::from("album/locked")
        );
    }

    #[test]
    fn test_format_size() {
        assert_eq!(FileManager::format_size(512), "512 B");
        assert_eq!(FileManager::format_size(1536), "1.50 KB");
        assert_eq!(FileManager::format_size(5 * 1024 * 1024), "5.00 MB");
    }

    #[test]
    fn test_calculate_reduction() {
        assert_eq!(FileManager::calculate_reduction(0, 10), 0.0);
        assert_eq!(FileManager::calculate_reduction(200, 50), 75.0);
    }
}
