//! Outcome of processing one discovered file.

use crate::classifier::SkipReason;
use serde::Serialize;
use std::path::PathBuf;

/// What happened to an entry
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum Outcome {
    Transcoded,
    Copied,
    Skipped(SkipReason),
    Failed(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Transcoded | Self::Copied)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Transcoded => "transcoded",
            Self::Copied => "copied",
            Self::Skipped(_) => "skipped",
            Self::Failed(_) => "failed",
        }
    }
}

/// What happened to the original after processing
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum DeletionOutcome {
    #[default]
    NotRequested,
    Deleted,
    Failed(String),
}

/// Result of handling one entry, consumed by cleanup and reporting
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingResult {
    /// Path of the input relative to the input root
    pub relative_path: PathBuf,
    /// Final output path, when one was (or would be) written
    pub output_path: Option<PathBuf>,
    pub outcome: Outcome,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub deletion: DeletionOutcome,
}

impl ProcessingResult {
    pub fn new(relative_path: PathBuf, outcome: Outcome) -> Self {
        Self {
            relative_path,
            output_path: None,
            outcome,
            bytes_read: 0,
            bytes_written: 0,
            deletion: DeletionOutcome::NotRequested,
        }
    }

    pub fn failed(relative_path: PathBuf, error: impl ToString) -> Self {
        Self::new(relative_path, Outcome::Failed(error.to_string()))
    }

    pub fn skipped(relative_path: PathBuf, reason: SkipReason) -> Self {
        Self::new(relative_path, Outcome::Skipped(reason))
    }

    pub fn with_output(mut self, output_path: PathBuf) -> Self {
        self.output_path = Some(output_path);
        self
    }

    pub fn with_sizes(mut self, bytes_read: u64, bytes_written: u64) -> Self {
        self.bytes_read = bytes_read;
        self.bytes_written = bytes_written;
        self
    }

    /// The source may only be deleted after a successful write
    pub fn deletion_eligible(&self) -> bool {
        self.outcome.is_success()
    }
}
