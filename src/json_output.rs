//! # JSON Output Module
//!
//! Questo modulo gestisce l'output strutturato in JSON per l'uso programmatico.
//!
//! ## Responsabilità:
//! - Emette un messaggio JSON per riga su stdout per ogni evento del run
//! - Riusa `ProcessingResult` e `RunSummary` senza duplicarne i campi
//! - Lascia stderr libero per i log di `tracing`
//!
//! ## Tipi di messaggi:
//! - `start`: Inizio del run
//! - `file_start`: Un file è stato assegnato a un worker
//! - `file_complete`: Esito di un file
//! - `complete`: Fine del run con il riepilogo
//! - `error`: Errore fatale

use crate::config::Config;
use crate::progress::RunSummary;
use crate::results::ProcessingResult;
use serde::Serialize;
use std::path::PathBuf;

/// One newline-delimited JSON event
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JsonMessage {
    Start {
        command: String,
        input_dir: PathBuf,
        output_dir: PathBuf,
        dry_run: bool,
        config: JsonConfig,
    },
    FileStart {
        path: PathBuf,
        index: usize,
    },
    FileComplete {
        #[serde(flatten)]
        result: ProcessingResult,
    },
    Complete {
        #[serde(flatten)]
        summary: RunSummary,
        duration_seconds: f64,
    },
    Error {
        message: String,
        details: Option<String>,
    },
}

/// Subset of the configuration echoed in the start event
#[derive(Debug, Serialize)]
pub struct JsonConfig {
    pub workers: usize,
    pub delete_original_files: bool,
    pub max_width: u32,
    pub max_height: u32,
    pub jpeg_quality: u8,
    pub video_crf: u8,
    pub on_conflict: crate::config::ConflictPolicy,
}

impl From<&Config> for JsonConfig {
    fn from(config: &Config) -> Self {
        Self {
            workers: config.workers,
            delete_original_files: config.delete_original_files,
            max_width: config.max_width,
            max_height: config.max_height,
            jpeg_quality: config.jpeg_quality,
            video_crf: config.video_crf,
            on_conflict: config.on_conflict,
        }
    }
}

impl JsonMessage {
    /// Emette il messaggio JSON su stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    pub fn start(command: &str, config: &Config) -> Self {
        Self::Start {
            command: command.to_string(),
            input_dir: config.input_dir.clone(),
            output_dir: config.output_dir.clone(),
            dry_run: config.dry_run,
            config: JsonConfig::from(config),
        }
    }

    pub fn file_start(path: PathBuf, index: usize) -> Self {
        Self::FileStart { path, index }
    }

    pub fn file_complete(result: &ProcessingResult) -> Self {
        Self::FileComplete {
            result: result.clone(),
        }
    }

    pub fn complete(summary: &RunSummary, duration_seconds: f64) -> Self {
        Self::Complete {
            summary: summary.clone(),
            duration_seconds,
        }
    }

    pub fn error(message: String, details: Option<String>) -> Self {
        Self::Error { message, details }
    }
}
