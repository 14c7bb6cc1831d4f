//! # Organizer Module
//!
//! Appiattisce un export Google Takeout in una singola directory ordinata
//! per data di scatto.
//!
//! ## Responsabilità:
//! - Lettura del sidecar JSON di Takeout (`photoTakenTime.timestamp`)
//! - Calcolo del nome `<YYYY-MM-DD_HH-MM-SS>-<nome originale>`
//! - Copia atomica nella root di output, con mtime impostato alla data di scatto
//! - Cancellazione opzionale di originale e sidecar dopo la copia
//!
//! ## Sidecar:
//! Takeout tronca il nome del sidecar a 46 caratteri prima di `.json`;
//! come fallback viene provato anche `<nome>.json`.
//! Senza sidecar o timestamp viene letta la data incorporata nel file
//! (`creation_time` per i video, EXIF per le immagini); se manca anche
//! quella la data usata è `1900-01-01_00-00-00`.

use crate::{
    classifier::{classify, FileKind, MediaKind, SkipReason},
    cleanup::Cleanup,
    config::Config,
    embedded_date::{CaptureDateReader, EmbeddedDate, ToolDateReader},
    error::OptimizeError,
    file_manager::{FileEntry, FileManager},
    json_output::JsonMessage,
    optimizer::{CancelToken, DestinationClaims, ProgressTracker},
    output_writer::{Destination, OutputWriter},
    progress::RunSummary,
    results::{Outcome, ProcessingResult},
};
use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use tracing::{debug, error, info, warn};

const SIDECAR_SUFFIX: &str = ".supplemental-metadata";
const SIDECAR_STEM_MAX_CHARS: usize = 46;
const FALLBACK_DATE: &str = "1900-01-01_00-00-00";
const DATE_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Renames and flattens Takeout media by capture date
pub struct Organizer {
    config: Config,
    offset: FixedOffset,
    cancel: CancelToken,
    date_reader: Arc<dyn CaptureDateReader>,
}

impl Organizer {
    pub fn new(config: Config, utc_offset_minutes: i32) -> Result<Self, OptimizeError> {
        config.validate()?;
        let offset = utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                OptimizeError::Validation(format!(
                    "UTC offset of {} minutes is out of range",
                    utc_offset_minutes
                ))
            })?;

        Ok(Self {
            config,
            offset,
            cancel: CancelToken::new(),
            date_reader: Arc::new(ToolDateReader::new()),
        })
    }

    /// Replace the reader used when a file has no sidecar timestamp
    pub fn with_date_reader(mut self, date_reader: Arc<dyn CaptureDateReader>) -> Self {
        self.date_reader = date_reader;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub async fn run(&self) -> Result<RunSummary, OptimizeError> {
        let start_time = Instant::now();

        if !self.config.dry_run {
            tokio::fs::create_dir_all(&self.config.output_dir)
                .await
                .map_err(|e| OptimizeError::output_write(&self.config.output_dir, e))?;
        }
        let walker = FileManager::walk(&self.config.input_dir, self.config.nested_output_dir())?;

        if self.config.json_output {
            JsonMessage::start("organize", &self.config).emit();
        } else {
            info!(
                "Organizing {} -> {} (UTC offset {})",
                self.config.input_dir.display(),
                self.config.output_dir.display(),
                self.offset
            );
        }

        let tracker = ProgressTracker::new(&self.config);
        let fold_case = !self.config.dry_run && OutputWriter::is_case_insensitive(&self.config.output_dir);
        let mut claims = DestinationClaims::new(fold_case);
        let mut fatal = None;

        for (index, item) in walker.enumerate() {
            if self.cancel.is_cancelled() {
                fatal = Some(OptimizeError::Cancelled);
                break;
            }

            let entry = match item {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("{}", e);
                    let path = FileManager::failure_path(&self.config.input_dir, &e);
                    tracker.record_undispatched(&ProcessingResult::failed(path, &e)).await;
                    continue;
                }
            };

            let kind = match classify(&entry, &self.config) {
                FileKind::Media(kind @ (MediaKind::Image | MediaKind::Video)) => kind,
                FileKind::Skip(reason) => {
                    tracker
                        .record_undispatched(&ProcessingResult::skipped(entry.relative_path, reason))
                        .await;
                    continue;
                }
                _ => {
                    tracker
                        .record_undispatched(&ProcessingResult::skipped(entry.relative_path, SkipReason::NotMedia))
                        .await;
                    continue;
                }
            };

            tracker.file_started(&entry.relative_path, index);
            let result = tokio::select! {
                result = self.organize_entry(&entry, kind, &mut claims) => result,
                _ = self.cancel.cancelled() => {
                    fatal = Some(OptimizeError::Cancelled);
                    break;
                }
            };

            match result {
                Ok(result) => tracker.record(&result).await,
                Err(e) => {
                    warn!("{}", e);
                    tracker
                        .record(
                            &ProcessingResult::failed(entry.relative_path.clone(), &e)
                                .with_sizes(entry.size, 0),
                        )
                        .await;
                    if e.is_disk_full() {
                        fatal = Some(e);
                        break;
                    }
                }
            }
        }

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

    async fn organize_entry(
        &self,
        entry: &FileEntry,
        kind: MediaKind,
        claims: &mut DestinationClaims,
    ) -> Result<ProcessingResult, OptimizeError> {
        let relative = entry.relative_path.clone();
        let file_name = entry
            .source_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let sidecar = find_sidecar(&entry.source_path).await;
        let taken = match &sidecar {
            Some(path) => match read_capture_time(path).await {
                Ok(taken) => taken,
                Err(e) => {
                    warn!("Ignoring sidecar {}: {:#}", path.display(), e);
                    None
                }
            },
            None => None,
        };
        let taken = match taken {
            Some(taken) => Some(taken),
            None => self.embedded_capture_time(&entry.source_path, kind).await,
        };
        if taken.is_none() {
            debug!("No capture time for {}", entry.relative_path.display());
        }

        let destination = self
            .config
            .output_dir
            .join(format!("{}-{}", self.date_prefix(taken), file_name));
        if !claims.claim(&destination) {
            return Err(OptimizeError::OutputCollision {
                path: destination,
                reason: "another input maps to the same output".to_string(),
            });
        }

        if OutputWriter::check_destination(&destination, self.config.on_conflict).await?
            == Destination::KeepExisting
        {
            return Ok(ProcessingResult::skipped(relative, SkipReason::ExistingOutput)
                .with_output(destination));
        }

        if self.config.dry_run {
            return Ok(ProcessingResult::new(relative, Outcome::Copied)
                .with_output(destination)
                .with_sizes(entry.size, 0));
        }

        let written = OutputWriter::copy_into_place(&entry.source_path, &destination, &self.cancel).await?;
        if let Some(taken) = taken {
            if let Err(e) = set_modified(&destination, taken.into()).await {
                warn!("Cannot set modification time of {}: {}", destination.display(), e);
            }
        }

        let mut result = ProcessingResult::new(relative, Outcome::Copied)
            .with_output(destination)
            .with_sizes(entry.size, written);
        let companions: Vec<&Path> = sidecar.iter().map(|p| p.as_path()).collect();
        Cleanup::apply(&mut result, &entry.source_path, &companions, &self.config).await;
        Ok(result)
    }

    /// Date stored inside the file; camera wall-clock times are read in the configured offset
    async fn embedded_capture_time(&self, path: &Path, kind: MediaKind) -> Option<DateTime<Utc>> {
        match self.date_reader.read(path, kind).await? {
            EmbeddedDate::Utc(taken) => Some(taken),
            EmbeddedDate::Local(naive) => self
                .offset
                .from_local_datetime(&naive)
                .single()
                .map(|taken| taken.with_timezone(&Utc)),
        }
    }

    fn date_prefix(&self, taken: Option<DateTime<Utc>>) -> String {
        match taken {
            Some(taken) => taken.with_timezone(&self.offset).format(DATE_FORMAT).to_string(),
            None => FALLBACK_DATE.to_string(),
        }
    }
}

/// Candidate sidecar paths for a media file, in lookup order
pub fn sidecar_candidates(media: &Path) -> Vec<PathBuf> {
    let name = media
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let truncated: String = format!("{}{}", name, SIDECAR_SUFFIX)
        .chars()
        .take(SIDECAR_STEM_MAX_CHARS)
        .collect();

    vec![
        media.with_file_name(format!("{}.json", truncated)),
        media.with_file_name(format!("{}.json", name)),
    ]
}

async fn find_sidecar(media: &Path) -> Option<PathBuf> {
    for candidate in sidecar_candidates(media) {
        if tokio::fs::metadata(&candidate).await.map(|m| m.is_file()).unwrap_or(false) {
            return Some(candidate);
        }
    }
    None
}

/// Capture time from a Takeout sidecar; the timestamp may be a string or a number
pub async fn read_capture_time(sidecar: &Path) -> Result<Option<DateTime<Utc>>> {
    let content = tokio::fs::read_to_string(sidecar)
        .await
        .with_context(|| format!("Failed to read {}", sidecar.display()))?;
    let json: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Invalid JSON in {}", sidecar.display()))?;

    let timestamp = &json["photoTakenTime"]["timestamp"];
    let seconds = match timestamp {
        serde_json::Value::String(text) => text.trim().parse::<i64>().ok(),
        serde_json::Value::Number(number) => number.as_i64(),
        _ => None,
    };
    Ok(seconds.and_then(|s| DateTime::from_timestamp(s, 0)))
}

async fn set_modified(path: &Path, time: SystemTime) -> std::io::Result<()> {
    let file = tokio::fs::OpenOptions::new().write(true).open(path).await?;
    let file = file.into_std().await;
    tokio::task::spawn_blocking(move || file.set_modified(time))
        .await
        .map_err(std::io::Error::other)?
}
