//! # Configuration Management Module
//!
//! Questo modulo gestisce la configurazione immutabile di un run.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con tutti i parametri del run
//! - Fornisce validazione robusta dei parametri di input
//! - Supporta caricamento/salvataggio di un profilo da/verso file JSON
//! - Fornisce valori di default sensati per tutti i parametri
//!
//! ## Parametri di configurazione:
//! - `input_dir` / `output_dir`: Radici dell'albero di input e di output
//! - `delete_original_files`: Cancella gli originali dopo una scrittura riuscita
//! - `workers`: Numero di worker paralleli (default: 4)
//! - `max_width` / `max_height`: Limite di ridimensionamento immagini (default: 2000)
//! - `jpeg_quality`: Qualità JPEG (1-100, default: 80)
//! - `video_crf`: CRF video (0-51, default: 26)
//! - `timeout_secs`: Timeout per singolo transcode (default: 900)
//! - `on_conflict`: Politica per file già presenti nell'output (default: overwrite)
//! - `image_extensions` / `video_extensions` / `audio_extensions`: Formati media
//!
//! ## Profilo su file:
//! Il profilo JSON contiene solo i parametri di encoding e di policy; le
//! directory e i flag del singolo run arrivano sempre dalla command line.
//!
//! ## Esempio:
//! ```rust,ignore
//! let config = Config {
//!     input_dir: "takeout".into(),
//!     output_dir: "library".into(),
//!     workers: 8,
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use crate::error::OptimizeError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What to do when the destination of an entry already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Atomically replace the existing file
    #[default]
    Overwrite,
    /// Leave the existing file alone and report the entry as skipped
    Skip,
    /// Report the entry as failed
    Error,
}

/// Run configuration, built once and shared read-only by every component
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the exported archive
    #[serde(skip)]
    pub input_dir: PathBuf,
    /// Root of the mirrored output tree
    #[serde(skip)]
    pub output_dir: PathBuf,
    /// Delete each original once its output is durably written
    #[serde(skip)]
    pub delete_original_files: bool,
    /// Plan only, never touch the filesystem
    #[serde(skip)]
    pub dry_run: bool,
    /// Emit newline-delimited JSON events on stdout
    #[serde(skip)]
    pub json_output: bool,
    /// Number of parallel workers
    pub workers: usize,
    /// Maximum image width after optimization
    pub max_width: u32,
    /// Maximum image height after optimization
    pub max_height: u32,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
    /// Video CRF value (0-51, lower = better quality)
    pub video_crf: u8,
    /// x264 preset
    pub video_preset: String,
    /// Audio bitrate for videos and audio files
    pub audio_bitrate: String,
    /// Per-file encoder timeout
    pub timeout_secs: u64,
    pub on_conflict: ConflictPolicy,
    pub image_extensions: Vec<String>,
    pub video_extensions: Vec<String>,
    pub audio_extensions: Vec<String>,
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::new(),
            output_dir: PathBuf::new(),
            delete_original_files: false,
            dry_run: false,
            json_output: false,
            workers: 4,
            max_width: 2000,
            max_height: 2000,
            jpeg_quality: 80,
            video_crf: 26,
            video_preset: "slow".to_string(),
            audio_bitrate: "128k".to_string(),
            timeout_secs: 900,
            on_conflict: ConflictPolicy::Overwrite,
            image_extensions: owned(&["jpg", "jpeg", "png", "bmp", "tif", "tiff", "webp"]),
            video_extensions: owned(&["mp4", "mov", "avi", "mkv", "3gp", "m4v", "webm"]),
            audio_extensions: owned(&["mp3", "wav", "flac", "ogg", "m4a", "aac"]),
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), OptimizeError> {
        let invalid = |msg: &str| Err(OptimizeError::Validation(msg.to_string()));

        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return invalid("JPEG quality must be between 1 and 100");
        }
        if self.video_crf > 51 {
            return invalid("Video CRF must be between 0 and 51");
        }
        if self.workers == 0 {
            return invalid("Number of workers must be greater than 0");
        }
        if self.max_width == 0 || self.max_height == 0 {
            return invalid("Maximum image dimensions must be greater than 0");
        }
        if self.timeout_secs == 0 {
            return invalid("Transcode timeout must be greater than 0");
        }
        if self.video_preset.trim().is_empty() || self.audio_bitrate.trim().is_empty() {
            return invalid("Video preset and audio bitrate must not be empty");
        }
        if self.input_dir.as_os_str().is_empty() || self.output_dir.as_os_str().is_empty() {
            return invalid("Input and output directories are required");
        }
        if same_location(&self.input_dir, &self.output_dir) {
            return invalid("Input and output directories cannot be the same");
        }

        Ok(())
    }

    /// Output root when it lives inside the input root, so the walker can exclude it
    pub fn nested_output_dir(&self) -> Option<PathBuf> {
        let input = self.input_dir.canonicalize().ok()?;
        let output = self.output_dir.canonicalize().ok()?;
        output.starts_with(&input).then_some(output)
    }

    /// Default location of the profile file
    pub fn default_profile_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("takeout-organizer").join("config.json"))
    }

    /// Load a profile from file, falling back to defaults when it does not exist
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid profile {}: {}", path.display(), e))?;
        Ok(config)
    }

    /// Save the profile part of the configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

fn same_location(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio_test::{assert_err, assert_ok};

    fn config_in(temp: &TempDir) -> Config {
        Config {
            input_dir: temp.path().join("in"),
            output_dir: temp.path().join("out"),
            ..Default::default()
        }
    }

    #[test]
    fn test_config_validation() {
        let temp = TempDir::new().unwrap();
        let mut config = config_in(&temp);
        assert_ok!(config.validate());

        config.jpeg_quality = 0;
        assert_err!(config.validate());

        config.jpeg_quality = 80;
        config.video_crf = 52;
        assert_err!(config.validate());

        config.video_crf = 26;
        config.workers = 0;
        assert_err!(config.validate());

        config.workers = 4;
        config.timeout_secs = 0;
        assert_err!(config.validate());
    }

    #[test]
    fn test_input_and_output_must_differ() {
        let temp = TempDir::new().unwrap();
        let config = Config {
            input_dir: temp.path().to_path_buf(),
            output_dir: temp.path().join("."),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(OptimizeError::Validation(_))));
    }

    #[test]
    fn test_nested_output_dir() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("in/out")).unwrap();
        let config = Config {
            input_dir: temp.path().join("in"),
            output_dir: temp.path().join("in/out"),
            ..Default::default()
        };
        assert!(config.nested_output_dir().is_some());

        let sibling = config_in(&temp);
        std::fs::create_dir_all(&sibling.output_dir).unwrap();
        assert!(sibling.nested_output_dir().is_none());
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.jpeg_quality, 80);
        assert_eq!(config.video_crf, 26);
        assert_eq!(config.audio_bitrate, "128k");
        assert_eq!(config.workers, 4);
        assert_eq!(config.max_width, 2000);
        assert_eq!(config.on_conflict, ConflictPolicy::Overwrite);
        assert!(!config.delete_original_files);
        assert!(!config.dry_run);
    }

    #[tokio::test]
    async fn test_profile_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let profile_path = temp_dir.path().join("profile").join("config.json");

        let original = Config {
            input_dir: "ignored".into(),
            jpeg_quality: 85,
            video_crf: 24,
            audio_bitrate: "192k".to_string(),
            workers: 8,
            on_conflict: ConflictPolicy::Skip,
            delete_original_files: true,
            ..Default::default()
        };

        original.save_to_file(&profile_path).await.unwrap();
        let loaded = Config::from_file(&profile_path).await.unwrap();

        assert_eq!(loaded.jpeg_quality, 85);
        assert_eq!(loaded.video_crf, 24);
        assert_eq!(loaded.audio_bitrate, "192k");
        assert_eq!(loaded.workers, 8);
        assert_eq!(loaded.on_conflict, ConflictPolicy::Skip);
        // Run-specific fields never come from a profile
        assert!(loaded.input_dir.as_os_str().is_empty());
        assert!(!loaded.delete_original_files);
    }

    #[tokio::test]
    async fn test_missing_profile_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let loaded = Config::from_file(&temp_dir.path().join("nope.json")).await.unwrap();
        assert_eq!(loaded.workers, 4);
    }

    #[tokio::test]
    async fn test_partial_profile_keeps_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        tokio::fs::write(&path, r#"{ "video_crf": 20, "on_conflict": "error" }"#)
            .await
            .unwrap();
        let loaded = Config::from_file(&path).await.unwrap();
        assert_eq!(loaded.video_crf, 20);
        assert_eq!(loaded.on_conflict, ConflictPolicy::Error);
        assert_eq!(loaded.jpeg_quality, 80);
    }
}
