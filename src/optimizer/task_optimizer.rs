//! # Task Optimizer Module
//!
//! Worker per l'elaborazione di singoli file.
//! Separato dal orchestratore principale per maggiore modularità.
//!
//! ## Flusso per file:
//! 1. Applica la politica di collisione sulla destinazione
//! 2. In dry run riporta solo l'esito pianificato
//! 3. Transcodifica (media) o copia (pass-through) con rename-into-place
//! 4. Cancella l'originale solo dopo una scrittura riuscita

use crate::{
    cancel::CancelToken,
    classifier::{FileKind, MediaKind, SkipReason},
    cleanup::Cleanup,
    config::Config,
    error::OptimizeError,
    file_manager::FileEntry,
    output_writer::{Destination, OutputWriter},
    results::{Outcome, ProcessingResult},
    transcoder::Transcoder,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// What a worker hands back to the orchestrator
#[derive(Debug)]
pub struct TaskOutcome {
    pub result: ProcessingResult,
    /// Set when the failure must stop the whole run (disk full)
    pub fatal: Option<OptimizeError>,
}

/// Worker per elaborazione singoli file
#[derive(Clone)]
pub struct TaskOptimizer {
    config: Arc<Config>,
    transcoder: Transcoder,
    cancel: CancelToken,
}

impl TaskOptimizer {
    pub fn new(config: Arc<Config>, transcoder: Transcoder, cancel: CancelToken) -> Self {
        Self {
            config,
            transcoder,
            cancel,
        }
    }

    /// Process one entry whose destination has already been claimed
    pub async fn process_entry(&self, entry: FileEntry, destination: PathBuf, kind: FileKind) -> TaskOutcome {
        match self.try_process(&entry, &destination, kind).await {
            Ok(mut result) => {
                Cleanup::apply(&mut result, &entry.source_path, &[], &self.config).await;
                TaskOutcome { result, fatal: None }
            }
            Err(e) => {
                warn!("{}", e);
                let result = ProcessingResult::failed(entry.relative_path.clone(), &e)
                    .with_sizes(entry.size, 0);
                let fatal = e.is_fatal().then_some(e);
                TaskOutcome { result, fatal }
            }
        }
    }

    async fn try_process(
        &self,
        entry: &FileEntry,
        destination: &Path,
        kind: FileKind,
    ) -> Result<ProcessingResult, OptimizeError> {
        let relative = entry.relative_path.clone();

        let planned = match kind {
            FileKind::Media(_) => Outcome::Transcoded,
            FileKind::PassThrough => Outcome::Copied,
            FileKind::Skip(reason) => return Ok(ProcessingResult::skipped(relative, reason)),
        };

        let state = OutputWriter::check_destination(destination, self.config.on_conflict).await?;
        if state == Destination::KeepExisting {
            debug!("Keeping existing output: {}", destination.display());
            return Ok(ProcessingResult::skipped(relative, SkipReason::ExistingOutput)
                .with_output(destination.to_path_buf()));
        }

        if self.config.dry_run {
            debug!("[DRY RUN] {} -> {}", entry.source_path.display(), destination.display());
            return Ok(ProcessingResult::new(relative, planned)
                .with_output(destination.to_path_buf())
                .with_sizes(entry.size, 0));
        }

        let written = match kind {
            FileKind::Media(media) => self.transcode(entry, destination, media).await?,
            _ => OutputWriter::copy_into_place(&entry.source_path, destination, &self.cancel).await?,
        };

        Ok(ProcessingResult::new(relative, planned)
            .with_output(destination.to_path_buf())
            .with_sizes(entry.size, written))
    }

    async fn transcode(&self, entry: &FileEntry, destination: &Path, media: MediaKind) -> Result<u64, OptimizeError> {
        // Surface unreadable sources as such instead of as an encoder failure
        tokio::fs::File::open(&entry.source_path)
            .await
            .map_err(|source| OptimizeError::Unreadable {
                path: entry.source_path.clone(),
                source,
            })?;
        self.transcoder.transcode(&entry.source_path, destination, media).await
    }
}
