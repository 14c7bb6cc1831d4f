//! # Cleanup Step Module
//!
//! Cancella gli originali dopo una scrittura riuscita.
//!
//! ## Regole:
//! - Solo se `delete_original_files` è attivo e non siamo in dry run
//! - Solo per risultati `Transcoded` o `Copied`, mai per Skip o errori
//! - Un errore di cancellazione viene registrato sul risultato e loggato,
//!   ma non interrompe il run e non cambia l'exit code

use crate::config::Config;
use crate::error::OptimizeError;
use crate::results::{DeletionOutcome, ProcessingResult};
use std::path::Path;
use tracing::{debug, warn};

pub struct Cleanup;

impl Cleanup {
    /// Delete `source` (and `companions`, e.g. a metadata sidecar) when allowed
    pub async fn apply(
        result: &mut ProcessingResult,
        source: &Path,
        companions: &[&Path],
        config: &Config,
    ) {
        if !config.delete_original_files || config.dry_run || !result.deletion_eligible() {
            return;
        }

        result.deletion = match tokio::fs::remove_file(source).await {
            Ok(()) => {
                debug!("Deleted original: {}", source.display());
                DeletionOutcome::Deleted
            }
            Err(e) => {
                let error = OptimizeError::Deletion {
                    path: source.to_path_buf(),
                    source: e,
                };
                warn!("{}", error);
                DeletionOutcome::Failed(error.to_string())
            }
        };

        if result.deletion != DeletionOutcome::Deleted {
            return;
        }
        for companion in companions {
            if let Err(e) = tokio::fs::remove_file(companion).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Cannot delete {}: {}", companion.display(), e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::SkipReason;
    use crate::results::Outcome;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn deleting_config() -> Config {
        Config {
            delete_original_files: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_deletes_after_success() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("a.txt");
        fs::write(&source, b"a").unwrap();

        let mut result = ProcessingResult::new(PathBuf::from("a.txt"), Outcome::Copied);
        Cleanup::apply(&mut result, &source, &[], &deleting_config()).await;

        assert_eq!(result.deletion, DeletionOutcome::Deleted);
        assert!(!source.exists());
    }

    #[tokio::test]
    async fn test_never_deletes_failed_or_skipped() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("b.mov");
        fs::write(&source, b"b").unwrap();

        let mut failed = ProcessingResult::failed(PathBuf::from("b.mov"), "boom");
        Cleanup::apply(&mut failed, &source, &[], &deleting_config()).await;
        let mut skipped = ProcessingResult::skipped(PathBuf::from("b.mov"), SkipReason::Hidden);
        Cleanup::apply(&mut skipped, &source, &[], &deleting_config()).await;

        assert!(source.exists());
        assert_eq!(failed.deletion, DeletionOutcome::NotRequested);
        assert_eq!(skipped.deletion, DeletionOutcome::NotRequested);
    }

    #[tokio::test]
    async fn test_respects_flag_and_dry_run() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("a.txt");
        fs::write(&source, b"a").unwrap();

        let mut result = ProcessingResult::new(PathBuf::from("a.txt"), Outcome::Copied);
        Cleanup::apply(&mut result, &source, &[], &Config::default()).await;
        assert!(source.exists());

        let dry = Config {
            dry_run: true,
            ..deleting_config()
        };
        Cleanup::apply(&mut result, &source, &[], &dry).await;
        assert!(source.exists());
        assert_eq!(result.deletion, DeletionOutcome::NotRequested);
    }

    #[tokio::test]
    async fn test_deletion_failure_is_recorded() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("gone.txt");

        let mut result = ProcessingResult::new(PathBuf::from("gone.txt"), Outcome::Copied);
        Cleanup::apply(&mut result, &missing, &[], &deleting_config()).await;

        assert!(matches!(result.deletion, DeletionOutcome::Failed(_)));
        assert!(result.outcome.is_success());
    }

    #[tokio::test]
    async fn test_companions_deleted_with_original() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("a.jpg");
        let sidecar = temp.path().join("a.jpg.json");
        fs::write(&source, b"a").unwrap();
        fs::write(&sidecar, b"{}").unwrap();

        let mut result = ProcessingResult::new(PathBuf::from("a.jpg"), Outcome::Copied);
        Cleanup::apply(&mut result, &source, &[&sidecar], &deleting_config()).await;

        assert!(!source.exists());
        assert!(!sidecar.exists());
    }
}
