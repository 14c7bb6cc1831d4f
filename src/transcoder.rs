//! # Transcoder Adapter Module
//!
//! Esegue l'encoder su un singolo file media rispettando la disciplina
//! rename-into-place.
//!
//! ## Pipeline:
//! 1. Crea la directory di destinazione (idempotente)
//! 2. Riserva un path temporaneo `.takeout-XXXX.<ext>` accanto alla destinazione
//! 3. Esegue l'encoder verso il temporaneo, con timeout
//! 4. Se l'output è completo e non vuoto lo rinomina sul path finale
//!
//! ## Garanzie:
//! - In caso di errore, timeout o cancellazione il temporaneo viene rimosso
//!   e il processo figlio terminato: al path finale non compare mai un file
//!   parziale
//! - Un file al path finale implica un encode completato con successo

use crate::classifier::MediaKind;
use crate::encoder::{EncodeJob, Encoder};
use crate::error::OptimizeError;
use crate::output_writer::OutputWriter;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Runs the encoder for one file and promotes its output atomically
#[derive(Clone)]
pub struct Transcoder {
    encoder: Arc<dyn Encoder>,
    timeout: Duration,
}

impl Transcoder {
    pub fn new(encoder: Arc<dyn Encoder>, timeout: Duration) -> Self {
        Self { encoder, timeout }
    }

    pub fn encoder(&self) -> &Arc<dyn Encoder> {
        &self.encoder
    }

    /// Transcode `source` into `destination`, returning the output size
    pub async fn transcode(
        &self,
        source: &Path,
        destination: &Path,
        kind: MediaKind,
    ) -> Result<u64, OptimizeError> {
        OutputWriter::ensure_parent_dirs(destination).await?;

        let extension = destination
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_default();
        let temp = OutputWriter::temp_path_beside(destination, &extension)?;

        let job = EncodeJob {
            source,
            target: &temp,
            kind,
        };
        debug!(
            "Transcoding {} with {} -> {}",
            source.display(),
            self.encoder.name(),
            temp.display()
        );

        match tokio::time::timeout(self.timeout, self.encoder.encode(&job)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(OptimizeError::TranscodeTimeout {
                    path: source.to_path_buf(),
                    secs: self.timeout.as_secs(),
                })
            }
        }

        let size = tokio::fs::metadata(&temp)
            .await
            .map(|m| m.len())
            .map_err(|e| OptimizeError::output_write(destination, e))?;
        if size == 0 {
            return Err(OptimizeError::Transcode {
                path: source.to_path_buf(),
                code: Some(0),
                stderr: format!("{} produced an empty file", self.encoder.name()),
            });
        }

        OutputWriter::persist(temp, destination)?;
        Ok(size)
    }
}
