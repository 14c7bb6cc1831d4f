//! # Media Optimizer Main Orchestrator
//!
//! Orchestratore principale che delega le responsabilità ai moduli
//! specializzati.
//!
//! ## Flusso:
//! 1. Verifica che l'encoder sia disponibile (errore fatale, nessun file toccato)
//! 2. Walk lazy dell'input, escludendo l'output se annidato
//! 3. Classificazione e risoluzione della destinazione per ogni entry
//! 4. Dispatch ai worker con un `Semaphore` di `workers` permessi
//! 5. Attesa dei worker e riepilogo finale
//!
//! ## Concorrenza:
//! Le destinazioni vengono "prenotate" dal dispatcher nell'ordine del walk,
//! quindi due input che mappano sullo stesso output non vengono mai scritti
//! in parallelo: il secondo fallisce con `OutputCollision`. Su filesystem
//! case-insensitive il confronto ignora maiuscole e minuscole.
//!
//! ## Cancellazione:
//! Un `CancelToken` ferma il dispatch; i worker in volo vengono droppati,
//! il che termina il processo encoder e rimuove i file temporanei. Le copie
//! bloccanti controllano lo stesso token tra un chunk e l'altro e non
//! vengono mai rinominate al loro posto dopo la cancellazione.
//!
//! ## Disco pieno:
//! Anche ffmpeg che segnala ENOSPC conta come disco pieno: il dispatch si
//! ferma, i worker in volo terminano e il run fallisce con exit code 2.

use crate::{
    classifier::{classify, FileKind},
    config::Config,
    encoder::Encoder,
    error::OptimizeError,
    file_manager::FileManager,
    json_output::JsonMessage,
    optimizer::{
        path_resolver::{DestinationClaims, PathResolver},
        progress_tracker::ProgressTracker,
        task_optimizer::{TaskOptimizer, TaskOutcome},
        CancelToken,
    },
    output_writer::OutputWriter,
    progress::RunSummary,
    results::ProcessingResult,
    transcoder::Transcoder,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Orchestratore principale
pub struct MediaOptimizer {
    config: Arc<Config>,
    transcoder: Transcoder,
    cancel: CancelToken,
}

impl MediaOptimizer {
    /// Crea nuova istanza dell'ottimizzatore
    pub fn new(config: Config, encoder: Arc<dyn Encoder>) -> Result<Self, OptimizeError> {
        config.validate()?;
        let transcoder = Transcoder::new(encoder, Duration::from_secs(config.timeout_secs));

        Ok(Self {
            config: Arc::new(config),
            transcoder,
            cancel: CancelToken::new(),
        })
    }

    /// Handle to stop the run from elsewhere (e.g. Ctrl+C)
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Esegue il processo di ottimizzazione
    pub async fn run(&self) -> Result<RunSummary, OptimizeError> {
        let start_time = Instant::now();

        self.check_dependencies().await?;
        if !self.config.dry_run {
            tokio::fs::create_dir_all(&self.config.output_dir)
                .await
                .map_err(|e| OptimizeError::output_write(&self.config.output_dir, e))?;
        }

        let walker = FileManager::walk(&self.config.input_dir, self.config.nested_output_dir())?;

        self.emit_start_message();
        let tracker = ProgressTracker::new(&self.config);
        let fatal = self.dispatch(walker, &tracker).await;

        let summary = tracker.finish(start_time.elapsed().as_secs_f64()).await;
        match fatal {
            Some(e) => {
                error!("Run aborted: {}", e);
                Err(e)
            }
            None => {
                info!("{}", summary.format_summary());
                Ok(summary)
            }
        }
    }

    /// Controlla dipendenze prima di toccare qualunque file
    async fn check_dependencies(&self) -> Result<(), OptimizeError> {
        let encoder = self.transcoder.encoder();
        encoder.check_available().await?;
        debug!("Encoder '{}' is available", encoder.name());
        Ok(())
    }

    fn emit_start_message(&self) {
        if self.config.json_output {
            JsonMessage::start("optimize", &self.config).emit();
            return;
        }

        info!(
            "Optimizing {} -> {}",
            self.config.input_dir.display(),
            self.config.output_dir.display()
        );
        info!(
            "Workers: {} | JPEG quality: {} | Video CRF: {} | Max size: {}x{}",
            self.config.workers,
            self.config.jpeg_quality,
            self.config.video_crf,
            self.config.max_width,
            self.config.max_height
        );
        if self.config.dry_run {
            info!("Dry run mode: No files will be modified");
        }
        if self.config.delete_original_files {
            info!("Originals will be deleted after a successful write");
        }
    }

    /// Walk, classify and hand entries to the workers. Returns the error that stopped the run, if any.
    async fn dispatch(
        &self,
        walker: impl Iterator<Item = Result<crate::file_manager::FileEntry, OptimizeError>>,
        tracker: &ProgressTracker,
    ) -> Option<OptimizeError> {
        let semaphore = Arc::new(Semaphore::new(self.config.workers));
        let worker = TaskOptimizer::new(
            self.config.clone(),
            self.transcoder.clone(),
            self.cancel.clone(),
        );
        let abort = Arc::new(AtomicBool::new(false));
        let disk_full: Arc<Mutex<Option<OptimizeError>>> = Arc::new(Mutex::new(None));

        let fold_case = !self.config.dry_run && OutputWriter::is_case_insensitive(&self.config.output_dir);
        let mut claims = DestinationClaims::new(fold_case);
        let mut tasks: Vec<JoinHandle<()>> = Vec::new();
        let mut stopped: Option<OptimizeError> = None;

        for (index, item) in walker.enumerate() {
            if self.cancel.is_cancelled() {
                stopped = Some(OptimizeError::Cancelled);
                break;
            }
            if abort.load(Ordering::SeqCst) {
                break;
            }

            let entry = match item {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("{}", e);
                    let relative = FileManager::failure_path(&self.config.input_dir, &e);
                    tracker.record_undispatched(&ProcessingResult::failed(relative, &e)).await;
                    continue;
                }
            };

            let kind = classify(&entry, &self.config);
            let destination = match PathResolver::output_path(&self.config.output_dir, &entry.relative_path, kind) {
                Some(destination) => destination,
                None => {
                    if let FileKind::Skip(reason) = kind {
                        debug!("Skipping {}: {}", entry.relative_path.display(), reason);
                        tracker
                            .record_undispatched(&ProcessingResult::skipped(entry.relative_path.clone(), reason))
                            .await;
                    }
                    continue;
                }
            };

            if !claims.claim(&destination) {
                let e = OptimizeError::OutputCollision {
                    path: destination,
                    reason: "another input maps to the same output".to_string(),
                };
                warn!("{}: {}", entry.relative_path.display(), e);
                tracker
                    .record_undispatched(&ProcessingResult::failed(entry.relative_path.clone(), &e))
                    .await;
                continue;
            }

            let permit = tokio::select! {
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = self.cancel.cancelled() => {
                    stopped = Some(OptimizeError::Cancelled);
                    break;
                }
            };
            if abort.load(Ordering::SeqCst) {
                break;
            }

            tracker.file_started(&entry.relative_path, index);

            let worker = worker.clone();
            let tracker = tracker.clone();
            let cancel = self.cancel.clone();
            let abort = abort.clone();
            let disk_full = disk_full.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = permit;
                let relative = entry.relative_path.clone();

                let outcome = tokio::select! {
                    outcome = worker.process_entry(entry, destination, kind) => outcome,
                    _ = cancel.cancelled() => TaskOutcome {
                        result: ProcessingResult::failed(relative, OptimizeError::Cancelled),
                        fatal: None,
                    },
                };

                tracker.record(&outcome.result).await;
                if let Some(e) = outcome.fatal {
                    abort.store(true, Ordering::SeqCst);
                    disk_full.lock().await.get_or_insert(e);
                }
            }));
        }

        for joined in futures::future::join_all(tasks).await {
            if let Err(e) = joined {
                error!("Worker task panicked: {}", e);
            }
        }

        if stopped.is_none() && self.cancel.is_cancelled() {
            stopped = Some(OptimizeError::Cancelled);
        }
        if stopped.is_some() {
            return stopped;
        }
        let fatal = disk_full.lock().await.take();
        fatal
    }
}
