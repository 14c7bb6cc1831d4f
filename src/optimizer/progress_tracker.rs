//! # Progress Tracking Module
//!
//! Unifica il riepilogo del run e la `ProgressManager` in un singolo
//! tracker thread-safe, condiviso tra orchestratore e worker.
//! Gestisce sia output JSON che progress bar tradizionale.

use crate::{
    config::Config,
    json_output::JsonMessage,
    progress::{ProgressManager, RunSummary},
    results::{Outcome, ProcessingResult},
};
use std::io::IsTerminal;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Tracker progress unificato
#[derive(Clone)]
pub struct ProgressTracker {
    summary: Arc<Mutex<RunSummary>>,
    progress_manager: ProgressManager,
    json_output: bool,
}

impl ProgressTracker {
    pub fn new(config: &Config) -> Self {
        let visible = !config.json_output && std::io::stderr().is_terminal();
        Self {
            summary: Arc::new(Mutex::new(RunSummary::new())),
            progress_manager: ProgressManager::new(visible),
            json_output: config.json_output,
        }
    }

    /// Un file è stato assegnato a un worker
    pub fn file_started(&self, relative_path: &Path, index: usize) {
        self.progress_manager.add_pending();
        if self.json_output {
            JsonMessage::file_start(relative_path.to_path_buf(), index).emit();
        }
    }

    /// Registra l'esito di un file (anche skip ed errori che non passano da un worker)
    pub async fn record(&self, result: &ProcessingResult) {
        self.summary.lock().await.record(result);

        if self.json_output {
            JsonMessage::file_complete(result).emit();
        }

        let name = result
            .relative_path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy();
        let label = result.outcome.label().to_uppercase();
        let message = match &result.outcome {
            Outcome::Skipped(reason) => format!("[{}] {}: {}", label, name, reason),
            _ => format!("[{}] {}", label, name),
        };
        self.progress_manager.update(&message);
    }

    /// Registra un file che non è mai stato assegnato a un worker
    pub async fn record_undispatched(&self, result: &ProcessingResult) {
        self.progress_manager.add_pending();
        self.record(result).await;
    }

    /// Snapshot of the counts so far
    pub async fn snapshot(&self) -> RunSummary {
        self.summary.lock().await.clone()
    }

    /// Chiude la barra ed emette il messaggio finale
    pub async fn finish(&self, duration_seconds: f64) -> RunSummary {
        let summary = self.snapshot().await;
        self.progress_manager.finish(&summary.format_summary());
        if self.json_output {
            JsonMessage::complete(&summary, duration_seconds).emit();
        }
        summary
    }
}
