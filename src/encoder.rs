//! # Encoder Module
//!
//! Questo modulo astrae l'encoder esterno dietro il trait `Encoder`.
//!
//! ## Responsabilità:
//! - Definisce la capability `Encoder` (verifica disponibilità + encode)
//! - Implementa `FfmpegEncoder`, che invoca ffmpeg come processo figlio
//! - Costruisce il template fisso di argomenti per immagini, video e audio
//! - Cattura exit code e stderr del processo figlio in caso di errore
//!
//! ## Template argomenti ffmpeg:
//! - Prefisso comune: `-hide_banner -nostdin -loglevel error -y -i <src> -map_metadata 0`
//! - **Video**: `-c:v libx264 -preset <preset> -crf <crf> -c:a aac -b:a <bitrate>
//!   -movflags +faststart+use_metadata_tags <dst>`
//! - **Immagini**: `[-vf scale=W:H] [-q:v <qscale>] -frames:v 1 -update 1 <dst>`
//!   (ridimensiona solo se l'immagine supera `max_width`×`max_height`)
//! - **Audio**: `-vn -c:a aac -b:a <bitrate> <dst>`
//!
//! ## Cancellazione:
//! Il processo figlio viene creato con `kill_on_drop(true)`: se il future
//! di encode viene droppato (timeout o Ctrl+C) ffmpeg viene terminato.
//!
//! ## Esempio:
//! ```rust,ignore
//! let encoder = FfmpegEncoder::from_config(&config)?;
//! encoder.check_available().await?;
//! encoder.encode(&EncodeJob { source, target, kind: MediaKind::Video }).await?;
//! ```

use crate::classifier::MediaKind;
use crate::config::Config;
use crate::error::OptimizeError;
use crate::tool_resolver::ToolPathResolver;
use async_trait::async_trait;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Keep only the tail of the encoder diagnostics in errors
const MAX_STDERR_CHARS: usize = 2000;

/// strerror texts for ENOSPC / EDQUOT as printed by ffmpeg
const DISK_FULL_MESSAGES: &[&str] = &["No space left on device", "Disk quota exceeded"];

/// One encode request
#[derive(Debug, Clone, Copy)]
pub struct EncodeJob<'a> {
    pub source: &'a Path,
    pub target: &'a Path,
    pub kind: MediaKind,
}

/// Capability to turn one media file into an optimized one
#[async_trait]
pub trait Encoder: Send + Sync {
    fn name(&self) -> &str;

    /// Fails with `MissingDependency` when the encoder cannot run at all
    async fn check_available(&self) -> Result<(), OptimizeError>;

    /// Write the optimized version of `job.source` to `job.target`
    async fn encode(&self, job: &EncodeJob<'_>) -> Result<(), OptimizeError>;
}

/// Encoding knobs taken from the run configuration
#[derive(Debug, Clone)]
pub struct EncoderSettings {
    pub max_width: u32,
    pub max_height: u32,
    pub jpeg_quality: u8,
    pub video_crf: u8,
    pub video_preset: String,
    pub audio_bitrate: String,
}

impl From<&Config> for EncoderSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_width: config.max_width,
            max_height: config.max_height,
            jpeg_quality: config.jpeg_quality,
            video_crf: config.video_crf,
            video_preset: config.video_preset.clone(),
            audio_bitrate: config.audio_bitrate.clone(),
        }
    }
}

/// Encoder backed by the ffmpeg binary
pub struct FfmpegEncoder {
    program: PathBuf,
    settings: EncoderSettings,
}

impl FfmpegEncoder {
    /// Resolve ffmpeg from the environment
    pub fn from_config(config: &Config) -> Result<Self, OptimizeError> {
        let program = ToolPathResolver::new().ffmpeg().ok_or_else(|| {
            OptimizeError::MissingDependency(format!(
                "ffmpeg is required for media optimization (install with: {})",
                ToolPathResolver::install_instructions("ffmpeg")
            ))
        })?;
        Ok(Self::with_program(program, EncoderSettings::from(config)))
    }

    pub fn with_program(program: impl Into<PathBuf>, settings: EncoderSettings) -> Self {
        Self {
            program: program.into(),
            settings,
        }
    }

    /// Full argument list for one job
    pub fn build_args(&self, job: &EncodeJob<'_>, dimensions: Option<(u32, u32)>) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-hide_banner", "-nostdin", "-loglevel", "error", "-y", "-i"]
            .iter()
            .map(OsString::from)
            .collect();
        args.push(job.source.as_os_str().to_owned());
        push_all(&mut args, &["-map_metadata", "0"]);

        let s = &self.settings;
        match job.kind {
            MediaKind::Video => {
                push_all(&mut args, &["-c:v", "libx264", "-preset", &s.video_preset]);
                push_all(&mut args, &["-crf", &s.video_crf.to_string()]);
                push_all(&mut args, &["-c:a", "aac", "-b:a", &s.audio_bitrate]);
                push_all(&mut args, &["-movflags", "+faststart+use_metadata_tags"]);
            }
            MediaKind::Audio => {
                push_all(&mut args, &["-vn", "-c:a", "aac", "-b:a", &s.audio_bitrate]);
            }
            MediaKind::Image => {
                if let Some(filter) = scale_filter(dimensions, s.max_width, s.max_height) {
                    push_all(&mut args, &["-vf", &filter]);
                }
                let target_ext = extension_of(job.target);
                if target_ext == "jpg" || target_ext == "jpeg" {
                    push_all(&mut args, &["-q:v", &jpeg_qscale(s.jpeg_quality).to_string()]);
                } else if target_ext == "webp" {
                    push_all(&mut args, &["-quality", &s.jpeg_quality.to_string()]);
                }
                push_all(&mut args, &["-frames:v", "1", "-update", "1"]);
            }
        }

        args.push(job.target.as_os_str().to_owned());
        args
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn check_available(&self) -> Result<(), OptimizeError> {
        let output = Command::new(&self.program)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await;

        match output {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => Err(OptimizeError::MissingDependency(format!(
                "{} -version exited with {}",
                self.program.display(),
                status
            ))),
            Err(e) => Err(OptimizeError::MissingDependency(format!(
                "cannot run {}: {}",
                self.program.display(),
                e
            ))),
        }
    }

    async fn encode(&self, job: &EncodeJob<'_>) -> Result<(), OptimizeError> {
        let dimensions = match job.kind {
            MediaKind::Image => read_dimensions(job.source).await,
            _ => None,
        };
        let args = self.build_args(job, dimensions);
        debug!("Running {} {:?}", self.program.display(), args);

        let start_time = std::time::Instant::now();
        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| OptimizeError::Transcode {
                path: job.source.to_path_buf(),
                code: None,
                stderr: format!("failed to start {}: {}", self.program.display(), e),
            })?;

        if !output.status.success() {
            return Err(encode_failure(
                job,
                output.status.code(),
                &String::from_utf8_lossy(&output.stderr),
            ));
        }

        debug!(
            "Encoded {} in {:.1}s",
            job.source.display(),
            start_time.elapsed().as_secs_f64()
        );
        Ok(())
    }
}

fn push_all(args: &mut Vec<OsString>, items: &[&str]) {
    args.extend(items.iter().map(OsString::from));
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Read the pixel dimensions of an image from its header
async fn read_dimensions(path: &Path) -> Option<(u32, u32)> {
    let path = path.to_path_buf();
    match tokio::task::spawn_blocking(move || image::image_dimensions(&path)).await {
        Ok(Ok(dimensions)) => Some(dimensions),
        Ok(Err(e)) => {
            debug!("Cannot read image header, letting ffmpeg bound the size: {}", e);
            None
        }
        Err(_) => None,
    }
}

/// Scale filter that fits the image inside `max_w`×`max_h`, never upscaling
pub fn scale_filter(dimensions: Option<(u32, u32)>, max_w: u32, max_h: u32) -> Option<String> {
    match dimensions {
        Some((w, h)) => fit_within(w, h, max_w, max_h).map(|(w, h)| format!("scale={}:{}", w, h)),
        None => Some(format!(
            "scale=w='min(iw,{})':h='min(ih,{})':force_original_aspect_ratio=decrease",
            max_w, max_h
        )),
    }
}

/// Target size preserving aspect ratio, `None` when already within bounds
pub fn fit_within(width: u32, height: u32, max_w: u32, max_h: u32) -> Option<(u32, u32)> {
    if width == 0 || height == 0 || (width <= max_w && height <= max_h) {
        return None;
    }
    let scale = f64::min(max_w as f64 / width as f64, max_h as f64 / height as f64);
    let w = ((width as f64 * scale).round() as u32).clamp(1, max_w);
    let h = ((height as f64 * scale).round() as u32).clamp(1, max_h);
    Some((w, h))
}

/// Map JPEG quality 1-100 onto ffmpeg's qscale 31-2
pub fn jpeg_qscale(quality: u8) -> u8 {
    let quality = quality.clamp(1, 100) as f64;
    (31.0 - ((quality - 1.0) * 29.0 / 99.0).round()) as u8
}

/// Classify a failed encode. ffmpeg reports a full output volume only on
/// stderr, and that has to stop the run like any other disk-full write.
fn encode_failure(job: &EncodeJob<'_>, code: Option<i32>, stderr: &str) -> OptimizeError {
    let stderr = tail(stderr, MAX_STDERR_CHARS);
    if DISK_FULL_MESSAGES.iter().any(|m| stderr.contains(m)) {
        return OptimizeError::output_write(
            job.target,
            io::Error::new(io::ErrorKind::StorageFull, stderr),
        );
    }
    OptimizeError::Transcode {
        path: job.source.to_path_buf(),
        code,
        stderr,
    }
}

fn tail(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    let count = text.chars().count();
    if count <= max_chars {
        text.to_string()
    } else {
        text.chars().skip(count - max_chars).collect()
    }
}
