//! # Progress Tracking and Statistics Module
//!
//! Questo modulo gestisce il progress tracking e il riepilogo finale del run.
//!
//! ## Responsabilità:
//! - Progress bar visual con `indicatif` per feedback real-time
//! - Conteggio degli esiti per categoria (transcoded, copied, skipped, failed, deleted)
//! - Elenco dei path falliti con il relativo messaggio di errore
//! - Report finale con byte letti e scritti
//!
//! ## Componenti principali:
//! - `ProgressManager`: Gestisce la progress bar principale
//! - `RunSummary`: Aggrega i `ProcessingResult` del run
//!
//! ## Progress tracking:
//! Il walker è lazy, quindi la lunghezza della barra cresce man mano che i
//! file vengono scoperti e assegnati ai worker.
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:02:15] [=========================>--------------] 150/230 (65%) [OK] photo.jpg
//! ```

use crate::file_manager::FileManager;
use crate::results::{DeletionOutcome, Outcome, ProcessingResult};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// Manages progress reporting for a run
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    /// Create a progress bar, hidden when `visible` is false
    pub fn new(visible: bool) -> Self {
        if !visible {
            return Self {
                bar: ProgressBar::hidden(),
            };
        }

        let bar = ProgressBar::new(0);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
            .map(|style| style.progress_chars("=>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// A new entry was dispatched
    pub fn add_pending(&self) {
        self.bar.inc_length(1);
    }

    /// Update progress with a message
    pub fn update(&self, message: &str) {
        self.bar.inc(1);
        self.bar.set_message(message.to_string());
    }

    /// Finish with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

/// Aggregated outcome of a run
#[derive(Debug, Default, Clone, Serialize)]
pub struct RunSummary {
    pub transcoded: usize,
    pub copied: usize,
    pub skipped: usize,
    pub failed: usize,
    pub deleted: usize,
    pub deletion_failures: usize,
    pub bytes_read: u64,
    pub bytes_written: u64,
    /// Failed entries with their error message
    pub failures: Vec<(PathBuf, String)>,
    /// Originals that could not be deleted
    pub deletion_errors: Vec<(PathBuf, String)>,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, result: &ProcessingResult) {
        match &result.outcome {
            Outcome::Transcoded => self.transcoded += 1,
            Outcome::Copied => self.copied += 1,
            Outcome::Skipped(_) => self.skipped += 1,
            Outcome::Failed(message) => {
                self.failed += 1;
                self.failures
                    .push((result.relative_path.clone(), message.clone()));
            }
        }

        match &result.deletion {
            DeletionOutcome::NotRequested => {}
            DeletionOutcome::Deleted => self.deleted += 1,
            DeletionOutcome::Failed(message) => {
                self.deletion_failures += 1;
                self.deletion_errors
                    .push((result.relative_path.clone(), message.clone()));
            }
        }

        self.bytes_read += result.bytes_read;
        self.bytes_written += result.bytes_written;
    }

    /// Number of entries accounted for
    pub fn total(&self) -> usize {
        self.transcoded + self.copied + self.skipped + self.failed
    }

    /// True when at least one entry failed irrecoverably
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    pub fn reduction_percent(&self) -> f64 {
        FileManager::calculate_reduction(self.bytes_read, self.bytes_written)
    }

    pub fn format_summary(&self) -> String {
        let mut summary = format!(
            "{} transcoded, {} copied, {} skipped, {} failed, {} deleted",
            self.transcoded, self.copied, self.skipped, self.failed, self.deleted
        );
        if self.deletion_failures > 0 {
            summary.push_str(&format!(" ({} could not be deleted)", self.deletion_failures));
        }
        summary
    }

    /// Multi-line report: counts, sizes, then every failure
    pub fn format_report(&self) -> String {
        let mut lines = vec![
            "=== Run Complete ===".to_string(),
            self.format_summary(),
            format!(
                "Read {} | Wrote {} ({:.2}% reduction)",
                FileManager::format_size(self.bytes_read),
                FileManager::format_size(self.bytes_written),
                self.reduction_percent()
            ),
        ];

        if !self.failures.is_empty() {
            lines.push("Failed entries:".to_string());
            for (path, message) in &self.failures {
                lines.push(format!("  {}: {}", path.display(), message));
            }
        }
        if !self.deletion_errors.is_empty() {
            lines.push("Originals not deleted:".to_string());
            for (path, message) in &self.deletion_errors {
                lines.push(format!("  {}: {}", path.display(), message));
            }
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::SkipReason;

    #[test]
    fn test_summary_counts() {
        let mut summary = RunSummary::new();
        summary.record(&ProcessingResult::new("a.txt".into(), Outcome::Copied).with_sizes(10, 10));
        summary.record(&ProcessingResult::new("b.mov".into(), Outcome::Transcoded).with_sizes(100, 40));
        summary.record(&ProcessingResult::skipped(".DS_Store".into(), SkipReason::Hidden));

        assert_eq!(summary.total(), 3);
        assert!(!summary.has_failures());
        assert_eq!(
            summary.format_summary(),
            "1 transcoded, 1 copied, 1 skipped, 0 failed, 0 deleted"
        );
        assert_eq!(summary.bytes_read, 110);
        assert_eq!(summary.bytes_written, 50);
    }

    #[test]
    fn test_failures_are_listed() {
        let mut summary = RunSummary::new();
        summary.record(&ProcessingResult::failed("b.mov".into(), "encoder exploded"));

        assert!(summary.has_failures());
        let report = summary.format_report();
        assert!(report.contains("b.mov: encoder exploded"));
    }

    #[test]
    fn test_deletion_failures_do_not_count_as_failures() {
        let mut summary = RunSummary::new();
        let mut result = ProcessingResult::new("a.txt".into(), Outcome::Copied);
        result.deletion = DeletionOutcome::Failed("permission denied".into());
        summary.record(&result);

        assert!(!summary.has_failures());
        assert_eq!(summary.deletion_failures, 1);
        assert!(summary.format_summary().contains("1 could not be deleted"));
        assert!(summary.format_report().contains("Originals not deleted"));
    }
}
