//! # Output Writer Module
//!
//! Materializza i risultati nell'albero di output.
//!
//! ## Responsabilità:
//! - Creazione idempotente delle directory parent (tollera race concorrenti)
//! - Applicazione della politica di collisione sulla destinazione
//! - Copia PassThrough con disciplina rename-into-place
//! - Promozione atomica dei file temporanei prodotti dal transcoder
//!
//! ## Rename-into-place:
//! Ogni output viene scritto in un file temporaneo `.takeout-*` nella stessa
//! directory della destinazione, sincronizzato su disco e poi rinominato.
//! Un file presente al path finale è quindi sempre completo. Se qualcosa
//! fallisce il `TempPath` viene droppato e il temporaneo rimosso.

use crate::cancel::CancelToken;
use crate::classifier::TEMP_PREFIX;
use crate::config::ConflictPolicy;
use crate::error::OptimizeError;
use std::fs::{File, FileTimes, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::TempPath;
use tracing::debug;

const COPY_CHUNK_BYTES: usize = 1024 * 1024;

/// State of a destination path before writing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// Nothing there yet
    Vacant,
    /// A file exists and will be replaced
    Replace,
    /// A file exists and must be kept
    KeepExisting,
}

/// Writes results into the output tree
pub struct OutputWriter;

impl OutputWriter {
    /// Create the parent directories of `path` if needed
    pub async fn ensure_parent_dirs(path: &Path) -> Result<(), OptimizeError> {
        if let Some(parent) = path.parent() {
            match tokio::fs::create_dir_all(parent).await {
                Ok(()) => {}
                // Another worker won the race
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists && parent.is_dir() => {}
                Err(e) => return Err(OptimizeError::output_write(parent, e)),
            }
        }
        Ok(())
    }

    /// Apply the collision policy to `path`
    pub async fn check_destination(
        path: &Path,
        policy: ConflictPolicy,
    ) -> Result<Destination, OptimizeError> {
        let metadata = match tokio::fs::symlink_metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Destination::Vacant),
            Err(e) => return Err(OptimizeError::output_write(path, e)),
        };

        if !metadata.is_file() {
            return Err(OptimizeError::OutputCollision {
                path: path.to_path_buf(),
                reason: "a directory or link occupies the destination".to_string(),
            });
        }

        match policy {
            ConflictPolicy::Overwrite => Ok(Destination::Replace),
            ConflictPolicy::Skip => Ok(Destination::KeepExisting),
            ConflictPolicy::Error => Err(OptimizeError::OutputCollision {
                path: path.to_path_buf(),
                reason: "file already exists".to_string(),
            }),
        }
    }

    /// Reserve a temporary path next to `destination` with the given extension
    pub fn temp_path_beside(destination: &Path, extension: &str) -> Result<TempPath, OptimizeError> {
        let dir = destination.parent().unwrap_or_else(|| Path::new("."));
        let suffix = if extension.is_empty() {
            String::new()
        } else {
            format!(".{}", extension)
        };
        tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(&suffix)
            .tempfile_in(dir)
            .map(|file| file.into_temp_path())
            .map_err(|e| OptimizeError::output_write(destination, e))
    }

    /// Flush a finished temporary file and rename it onto `destination`
    pub fn persist(temp: TempPath, destination: &Path) -> Result<(), OptimizeError> {
        // FlushFileBuffers needs a writable handle on Windows
        OpenOptions::new()
            .write(true)
            .open(&temp)
            .and_then(|file| file.sync_all())
            .map_err(|e| OptimizeError::output_write(destination, e))?;
        Self::rename_into_place(temp, destination)
    }

    fn rename_into_place(temp: TempPath, destination: &Path) -> Result<(), OptimizeError> {
        temp.persist(destination)
            .map_err(|e| OptimizeError::output_write(destination, e.error))?;
        debug!("Renamed into place: {}", destination.display());
        Ok(())
    }

    /// Copy `source` byte-for-byte to `destination`, returning the bytes written.
    ///
    /// The copy runs on the blocking pool and keeps going if the calling
    /// future is dropped, so it polls `cancel` between chunks and never
    /// renames into place once the run was cancelled.
    pub async fn copy_into_place(
        source: &Path,
        destination: &Path,
        cancel: &CancelToken,
    ) -> Result<u64, OptimizeError> {
        Self::ensure_parent_dirs(destination).await?;

        let source = source.to_path_buf();
        let destination = destination.to_path_buf();
        let cancelled = cancel.flag();
        tokio::task::spawn_blocking(move || Self::copy_blocking(&source, &destination, &cancelled))
            .await
            .map_err(|e| OptimizeError::Io(io::Error::other(e)))?
    }

    fn copy_blocking(
        source: &Path,
        destination: &Path,
        cancelled: &AtomicBool,
    ) -> Result<u64, OptimizeError> {
        let unreadable = |e| OptimizeError::Unreadable {
            path: source.to_path_buf(),
            source: e,
        };
        let mut input = File::open(source).map_err(unreadable)?;
        let modified = input.metadata().and_then(|m| m.modified()).ok();

        let dir = destination.parent().unwrap_or_else(|| Path::new("."));
        let mut temp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(dir)
            .map_err(|e| OptimizeError::output_write(destination, e))?;

        let mut buffer = vec![0u8; COPY_CHUNK_BYTES];
        let mut bytes = 0u64;
        loop {
            if cancelled.load(Ordering::SeqCst) {
                debug!("Copy cancelled, discarding temp for {}", destination.display());
                return Err(OptimizeError::Cancelled);
            }
            let read = match input.read(&mut buffer) {
                Ok(0) => break,
                Ok(read) => read,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(unreadable(e)),
            };
            temp.as_file_mut()
                .write_all(&buffer[..read])
                .map_err(|e| OptimizeError::output_write(destination, e))?;
            bytes += read as u64;
        }

        if let Some(modified) = modified {
            let times = FileTimes::new().set_modified(modified);
            if let Err(e) = temp.as_file().set_times(times) {
                debug!("Cannot preserve mtime for {}: {}", destination.display(), e);
            }
        }
        temp.as_file()
            .sync_all()
            .map_err(|e| OptimizeError::output_write(destination, e))?;

        if cancelled.load(Ordering::SeqCst) {
            return Err(OptimizeError::Cancelled);
        }
        Self::rename_into_place(temp.into_temp_path(), destination)?;
        Ok(bytes)
    }

    /// True when `dir` lives on a filesystem that ignores file name case
    pub fn is_case_insensitive(dir: &Path) -> bool {
        let marker = match tempfile::Builder::new()
            .prefix(".takeout-case-check-")
            .tempfile_in(dir)
        {
            Ok(marker) => marker,
            Err(e) => {
                debug!("Cannot check case sensitivity of {}: {}", dir.display(), e);
                return false;
            }
        };
        let upper = marker
            .path()
            .file_name()
            .map(|name| name.to_string_lossy().to_uppercase());
        match upper {
            Some(upper) => dir.join(upper).exists(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_copy_creates_parents_and_is_identical() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("a.txt");
        fs::write(&source, b"takeout bytes").unwrap();
        let destination = temp.path().join("out/nested/a.txt");

        let bytes = OutputWriter::copy_into_place(&source, &destination, &CancelToken::new()).await.unwrap();
        assert_eq!(bytes, 13);
        assert_eq!(fs::read(&destination).unwrap(), b"takeout bytes");
    }

    #[tokio::test]
    async fn test_copy_twice_is_byte_identical() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("a.bin");
        fs::write(&source, (0u8..=255).collect::<Vec<_>>()).unwrap();
        let destination = temp.path().join("out/a.bin");

        OutputWriter::copy_into_place(&source, &destination, &CancelToken::new()).await.unwrap();
        let first = fs::read(&destination).unwrap();
        OutputWriter::copy_into_place(&source, &destination, &CancelToken::new()).await.unwrap();
        let second = fs::read(&destination).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, fs::read(&source).unwrap());
    }

    #[tokio::test]
    async fn test_copy_preserves_mtime() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("a.txt");
        fs::write(&source, b"a").unwrap();
        let old = std::time::SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_000_000_000);
        File::options()
            .write(true)
            .open(&source)
            .unwrap()
            .set_times(FileTimes::new().set_modified(old))
            .unwrap();

        let destination = temp.path().join("out/a.txt");
        OutputWriter::copy_into_place(&source, &destination, &CancelToken::new()).await.unwrap();
        assert_eq!(fs::metadata(&destination).unwrap().modified().unwrap(), old);
    }

    #[tokio::test]
    async fn test_copy_leaves_no_temp_files() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("a.txt");
        fs::write(&source, b"a").unwrap();
        let out = temp.path().join("out");
        OutputWriter::copy_into_place(&source, &out.join("a.txt"), &CancelToken::new()).await.unwrap();

        let names: Vec<_> = fs::read_dir(&out)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.txt"]);
    }

    #[tokio::test]
    async fn test_missing_source_is_unreadable() {
        let temp = TempDir::new().unwrap();
        let result =
            OutputWriter::copy_into_place(
                &temp.path().join("nope"),
                &temp.path().join("out/nope"),
                &CancelToken::new(),
            )
            .await;
        assert!(matches!(result, Err(OptimizeError::Unreadable { .. })));
        assert!(!temp.path().join("out/nope").exists());
    }

    #[tokio::test]
    async fn test_check_destination_policies() {
        let temp = TempDir::new().unwrap();
        let existing = temp.path().join("a.txt");
        fs::write(&existing, b"a").unwrap();
        let vacant = temp.path().join("b.txt");

        assert_eq!(
            OutputWriter::check_destination(&vacant, ConflictPolicy::Error).await.unwrap(),
            Destination::Vacant
        );
        assert_eq!(
            OutputWriter::check_destination(&existing, ConflictPolicy::Overwrite).await.unwrap(),
            Destination::Replace
        );
        assert_eq!(
            OutputWriter::check_destination(&existing, ConflictPolicy::Skip).await.unwrap(),
            Destination::KeepExisting
        );
        assert!(matches!(
            OutputWriter::check_destination(&existing, ConflictPolicy::Error).await,
            Err(OptimizeError::OutputCollision { .. })
        ));
    }

    #[tokio::test]
    async fn test_directory_at_destination_is_collision() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("a.txt");
        fs::create_dir(&dir).unwrap();
        assert!(matches!(
            OutputWriter::check_destination(&dir, ConflictPolicy::Overwrite).await,
            Err(OptimizeError::OutputCollision { .. })
        ));
    }

    #[tokio::test]
    async fn test_dropped_temp_path_is_removed() {
        let temp = TempDir::new().unwrap();
        let destination = temp.path().join("b.mp4");
        let temp_path = OutputWriter::temp_path_beside(&destination, "mp4").unwrap();
        let path = temp_path.to_path_buf();
        assert!(path.exists());
        assert!(path.file_name().unwrap().to_string_lossy().starts_with(TEMP_PREFIX));
        assert_eq!(path.extension().unwrap(), "mp4");
        drop(temp_path);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_cancelled_copy_is_never_renamed_into_place() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("big.bin");
        File::create(&source).unwrap().set_len(64 * 1024 * 1024).unwrap();
        let out = temp.path().join("out");
        let destination = out.join("big.bin");

        let cancel = CancelToken::new();
        cancel.cancel();
        let result = OutputWriter::copy_into_place(&source, &destination, &cancel).await;

        assert!(matches!(result, Err(OptimizeError::Cancelled)));
        assert!(!destination.exists());
        assert_eq!(fs::read_dir(&out).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_persist_flushes_and_renames() {
        let temp = TempDir::new().unwrap();
        let destination = temp.path().join("b.mp4");
        let temp_path = OutputWriter::temp_path_beside(&destination, "mp4").unwrap();
        fs::write(&temp_path, b"encoded").unwrap();

        OutputWriter::persist(temp_path, &destination).unwrap();
        assert_eq!(fs::read(&destination).unwrap(), b"encoded");
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_case_check_leaves_nothing_behind() {
        let temp = TempDir::new().unwrap();
        let insensitive = OutputWriter::is_case_insensitive(temp.path());
        if cfg!(target_os = "linux") {
            assert!(!insensitive);
        }
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
    }
}
