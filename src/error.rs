//! # Error Types Module
//!
//! Questo modulo definisce la tassonomia degli errori della pipeline.
//!
//! ## Responsabilità:
//! - Definisce `OptimizeError` enum per categorizzare tutti gli errori possibili
//! - Distingue errori fatali (abortiscono il run) da errori per singolo file
//! - Mappa gli errori fatali sui codici di uscita del processo
//!
//! ## Categorie di errori:
//! - `DirectoryAccess`: Directory di input inesistente o illeggibile (fatale)
//! - `Unreadable`: Voce dell'albero di input non leggibile (per file)
//! - `MissingDependency`: Encoder esterno mancante (fatale, prima di iniziare)
//! - `Validation`: Configurazione non valida (fatale)
//! - `Transcode` / `TranscodeTimeout`: Encoder fallito o scaduto (per file)
//! - `OutputWrite` / `OutputCollision`: Scrittura output fallita (per file,
//!   fatale solo se il disco è pieno)
//! - `Deletion`: Cancellazione originale fallita (per file, non cambia l'exit code)
//! - `Cancelled`: Interruzione da parte dell'utente
//!
//! ## Esempio:
//! ```rust,ignore
//! if !tool_exists {
//!     return Err(OptimizeError::MissingDependency("ffmpeg".to_string()));
//! }
//! ```

use std::io;
use std::path::PathBuf;

/// Exit codes of the command line driver
pub mod exit_code {
    pub const SUCCESS: u8 = 0;
    pub const DIR_ERROR: u8 = 1;
    pub const DIR_WRITE_ERROR: u8 = 2;
    pub const FILE_ERROR: u8 = 3;
    pub const DEPENDENCY_ERROR: u8 = 4;
    pub const CANCELLED: u8 = 130;
}

/// Custom error types for the organize/optimize pipeline
#[derive(thiserror::Error, Debug)]
pub enum OptimizeError {
    #[error("Cannot access input directory {}: {source}", .path.display())]
    DirectoryAccess {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot read {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Encoder failed on {} (exit code {}): {stderr}", .path.display(), display_code(.code))]
    Transcode {
        path: PathBuf,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Encoder timed out after {secs}s on {}", .path.display())]
    TranscodeTimeout { path: PathBuf, secs: u64 },

    #[error("Cannot write {}: {source}", .path.display())]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Output collision at {}: {reason}", .path.display())]
    OutputCollision { path: PathBuf, reason: String },

    #[error("Cannot delete original {}: {source}", .path.display())]
    Deletion {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Dependency missing: {0}")]
    MissingDependency(String),

    #[error("Invalid configuration: {0}")]
    Validation(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "none, killed by signal".to_string(),
    }
}

impl OptimizeError {
    /// Wrap an IO error raised while producing `path`
    pub fn output_write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::OutputWrite {
            path: path.into(),
            source,
        }
    }

    /// True when the error comes from the output filesystem running out of space
    pub fn is_disk_full(&self) -> bool {
        match self {
            Self::OutputWrite { source, .. } | Self::Io(source) => is_storage_full(source),
            _ => false,
        }
    }

    /// Errors that invalidate the whole run rather than a single entry
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::DirectoryAccess { .. }
                | Self::MissingDependency(_)
                | Self::Validation(_)
                | Self::Cancelled
        ) || self.is_disk_full()
    }

    /// Process exit code for a run aborted by this error
    pub fn exit_code(&self) -> u8 {
        if self.is_disk_full() {
            return exit_code::DIR_WRITE_ERROR;
        }
        match self {
            Self::DirectoryAccess { .. } | Self::Validation(_) => exit_code::DIR_ERROR,
            Self::MissingDependency(_) => exit_code::DEPENDENCY_ERROR,
            Self::Cancelled => exit_code::CANCELLED,
            Self::OutputWrite { .. } => exit_code::DIR_WRITE_ERROR,
            _ => exit_code::FILE_ERROR,
        }
    }
}

fn is_storage_full(error: &io::Error) -> bool {
    // ENOSPC on unix, ERROR_DISK_FULL on windows
    const ENOSPC: i32 = 28;
    const ERROR_DISK_FULL: i32 = 112;

    if error.kind() == io::ErrorKind::StorageFull {
        return true;
    }
    match error.raw_os_error() {
        Some(code) if cfg!(windows) => code == ERROR_DISK_FULL,
        Some(code) => code == ENOSPC,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_full_detection() {
        let err = OptimizeError::output_write("/out/a.txt", io::Error::from_raw_os_error(28));
        if cfg!(unix) {
            assert!(err.is_disk_full());
            assert!(err.is_fatal());
            assert_eq!(err.exit_code(), exit_code::DIR_WRITE_ERROR);
        }

        let err = OptimizeError::output_write(
            "/out/a.txt",
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert!(!err.is_disk_full());
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            OptimizeError::MissingDependency("ffmpeg".into()).exit_code(),
            exit_code::DEPENDENCY_ERROR
        );
        assert_eq!(OptimizeError::Cancelled.exit_code(), exit_code::CANCELLED);
        let err = OptimizeError::DirectoryAccess {
            path: "/nope".into(),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert!(err.is_fatal());
        assert_eq!(err.exit_code(), exit_code::DIR_ERROR);
    }

    #[test]
    fn test_transcode_message_includes_exit_code() {
        let err = OptimizeError::Transcode {
            path: "b.mov".into(),
            code: Some(1),
            stderr: "Invalid data found".into(),
        };
        let message = err.to_string();
        assert!(message.contains("exit code 1"));
        assert!(message.contains("Invalid data found"));
        assert!(!err.is_fatal());
    }
}
