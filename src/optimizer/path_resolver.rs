//! # Path Resolution Module
//!
//! Centralizza tutta la logica di calcolo dei path di output.
//! L'albero di output rispecchia quello di input: stesso path relativo,
//! con l'estensione del file transcodificato per i media.
//!
//! `DestinationClaims` tiene traccia delle destinazioni già assegnate in un
//! run, confrontate senza distinzione di maiuscole se il filesystem di
//! output la ignora.

use crate::classifier::FileKind;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Utility per calcolare i path di output in modo centralizzato
pub struct PathResolver;

impl PathResolver {
    /// Destination of `relative_path` under `output_dir`, or `None` for skipped entries
    pub fn output_path(output_dir: &Path, relative_path: &Path, kind: FileKind) -> Option<PathBuf> {
        let mirrored = output_dir.join(relative_path);
        match kind {
            FileKind::Skip(_) => None,
            FileKind::PassThrough => Some(mirrored),
            FileKind::Media(media) => {
                let source_ext = relative_path
                    .extension()
                    .map(|ext| ext.to_string_lossy().to_string())
                    .unwrap_or_default();
                Some(mirrored.with_extension(media.target_extension(&source_ext)))
            }
        }
    }
}

/// Destinations already handed to a worker during one run.
///
/// On case-insensitive output filesystems `IMG.jpg` and `img.jpg` are the
/// same file, so claims are compared case-folded there.
#[derive(Debug, Default)]
pub struct DestinationClaims {
    fold_case: bool,
    claimed: HashSet<PathBuf>,
}

impl DestinationClaims {
    pub fn new(fold_case: bool) -> Self {
        Self {
            fold_case,
            claimed: HashSet::new(),
        }
    }

    /// Returns false when another entry already owns `destination`
    pub fn claim(&mut self, destination: &Path) -> bool {
        let key = if self.fold_case {
            PathBuf::from(destination.to_string_lossy().to_lowercase())
        } else {
            destination.to_path_buf()
        };
        self.claimed.insert(key)
    }
}
