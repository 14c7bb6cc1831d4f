//! # Embedded Date Module
//!
//! Legge la data di scatto salvata dentro il file stesso, usata da
//! `organize` quando manca il sidecar di Takeout.
//!
//! ## Responsabilità:
//! - Video: tag `creation_time` del container via `ffprobe` (UTC)
//! - Immagini: `DateTimeOriginal` / `CreateDate` / `ModifyDate` via `exiftool`
//!   (ora locale della fotocamera, senza fuso)
//! - Degrado silenzioso: tool mancante o tag assente equivale a "nessuna data"
//!
//! ## Note:
//! `exiftool` resta aperto in modalità `-stay_open` e viene creato alla prima
//! immagine; se non è installato le immagini senza sidecar usano la data di
//! fallback.

use crate::classifier::MediaKind;
use crate::tool_resolver::ToolPathResolver;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use exiftool::ExifTool;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::process::Command;
use tracing::{debug, warn};

/// Image tags in lookup order
const IMAGE_DATE_TAGS: &[&str] = &["DateTimeOriginal", "CreateDate", "ModifyDate"];
const EXIF_DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// A capture date found inside a media file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddedDate {
    /// Absolute instant (container metadata)
    Utc(DateTime<Utc>),
    /// Wall-clock time of the camera, no zone recorded
    Local(NaiveDateTime),
}

/// Source of embedded capture dates
#[async_trait]
pub trait CaptureDateReader: Send + Sync {
    async fn read(&self, path: &Path, kind: MediaKind) -> Option<EmbeddedDate>;
}

/// Reads dates with the external `ffprobe` and `exiftool` binaries
pub struct ToolDateReader {
    ffprobe: Option<PathBuf>,
    exiftool_path: Option<PathBuf>,
    exiftool: Arc<Mutex<Option<ExifTool>>>,
}

impl ToolDateReader {
    pub fn new() -> Self {
        let resolver = ToolPathResolver::new();
        Self {
            ffprobe: resolver.resolve_tool("ffprobe"),
            exiftool_path: resolver.resolve_tool("exiftool"),
            exiftool: Arc::new(Mutex::new(None)),
        }
    }

    async fn video_date(&self, path: &Path) -> Option<EmbeddedDate> {
        let ffprobe = self.ffprobe.as_ref()?;
        let output = Command::new(ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format_tags=creation_time",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                parse_creation_time(&String::from_utf8_lossy(&output.stdout))
            }
            Ok(output) => {
                debug!("ffprobe exited with {} for {}", output.status, path.display());
                None
            }
            Err(e) => {
                warn!("Cannot run {}: {}", ffprobe.display(), e);
                None
            }
        }
    }

    async fn image_date(&self, path: &Path) -> Option<EmbeddedDate> {
        let executable = self.exiftool_path.clone()?;
        let exiftool = self.exiftool.clone();
        let path = path.to_path_buf();

        let tags = tokio::task::spawn_blocking(move || {
            let mut guard = exiftool.lock().ok()?;
            if guard.is_none() {
                match ExifTool::with_executable(&executable) {
                    Ok(tool) => *guard = Some(tool),
                    Err(e) => {
                        warn!("Cannot start {}: {}", executable.display(), e);
                        return None;
                    }
                }
            }
            let args: Vec<String> = IMAGE_DATE_TAGS.iter().map(|t| format!("-{}", t)).collect();
            let args: Vec<&str> = args.iter().map(String::as_str).collect();
            match guard.as_mut()?.json(&path, &args) {
                Ok(tags) => Some(tags),
                Err(e) => {
                    debug!("exiftool cannot read {}: {}", path.display(), e);
                    None
                }
            }
        })
        .await
        .ok()??;

        exif_date(&tags)
    }
}

impl Default for ToolDateReader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptureDateReader for ToolDateReader {
    async fn read(&self, path: &Path, kind: MediaKind) -> Option<EmbeddedDate> {
        match kind {
            MediaKind::Video => self.video_date(path).await,
            MediaKind::Image => self.image_date(path).await,
            MediaKind::Audio => None,
        }
    }
}

/// `creation_time` as printed by ffprobe, e.g. `2019-07-04T18:35:12.000000Z`
pub fn parse_creation_time(output: &str) -> Option<EmbeddedDate> {
    let text = output.lines().map(str::trim).find(|l| !l.is_empty())?;
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| EmbeddedDate::Utc(dt.with_timezone(&Utc)))
}

/// First usable date tag from exiftool JSON output
pub fn exif_date(tags: &serde_json::Value) -> Option<EmbeddedDate> {
    IMAGE_DATE_TAGS.iter().find_map(|tag| {
        let text = tags.get(*tag)?.as_str()?;
        // Cameras without a clock write all zeros
        let head = text.get(..19)?;
        NaiveDateTime::parse_from_str(head, EXIF_DATE_FORMAT)
            .ok()
            .map(EmbeddedDate::Local)
    })
}
