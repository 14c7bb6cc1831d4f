//! # Path Classifier Module
//!
//! Decide come trattare ogni file scoperto dal walker.
//!
//! ## Categorie:
//! - **Media**: immagini, video e audio da ricodificare con l'encoder esterno
//! - **PassThrough**: tutti gli altri file regolari, copiati byte per byte
//! - **Skip**: file esclusi esplicitamente
//!
//! ## Politica di esclusione:
//! 1. Link simbolici (mai seguiti)
//! 2. File nascosti (nome che inizia con `.`, include `.DS_Store` e i file
//!    temporanei `.takeout-*` della pipeline)
//! 3. File di sistema noti: `Thumbs.db`, `desktop.ini`, `Icon\r`
//!
//! La classificazione è pura: nessun accesso al filesystem.

use crate::config::Config;
use crate::file_manager::FileEntry;
use serde::Serialize;
use std::fmt;
use std::path::Path;

/// Prefix of every temporary artifact written next to a final output
pub const TEMP_PREFIX: &str = ".takeout-";

const SYSTEM_FILES: &[&str] = &["thumbs.db", "desktop.ini", "icon\r"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
}

impl MediaKind {
    /// Extension of the transcoded output for a source with extension `source_ext`
    pub fn target_extension(&self, source_ext: &str) -> String {
        match self {
            Self::Video => "mp4".to_string(),
            Self::Audio => "m4a".to_string(),
            Self::Image => source_ext.to_lowercase(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Symlink,
    Hidden,
    SystemFile,
    /// The destination already exists and the conflict policy is `skip`
    ExistingOutput,
    /// Not handled by the organize command
    NotMedia,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Symlink => "symbolic link",
            Self::Hidden => "hidden file",
            Self::SystemFile => "system file",
            Self::ExistingOutput => "output already exists",
            Self::NotMedia => "not a photo or video",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Media(MediaKind),
    PassThrough,
    Skip(SkipReason),
}

/// Classify a discovered entry
pub fn classify(entry: &FileEntry, config: &Config) -> FileKind {
    if entry.is_symlink {
        return FileKind::Skip(SkipReason::Symlink);
    }

    let name = entry
        .relative_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    if name.starts_with('.') {
        return FileKind::Skip(SkipReason::Hidden);
    }
    if SYSTEM_FILES.contains(&name.to_lowercase().as_str()) {
        return FileKind::Skip(SkipReason::SystemFile);
    }

    match media_kind(&entry.relative_path, config) {
        Some(kind) => FileKind::Media(kind),
        None => FileKind::PassThrough,
    }
}

/// Media kind of a path based on its extension, if any
pub fn media_kind(path: &Path, config: &Config) -> Option<MediaKind> {
    let ext = path.extension()?.to_string_lossy().to_lowercase();
    let matches = |set: &[String]| set.iter().any(|known| known.eq_ignore_ascii_case(&ext));

    if matches(&config.image_extensions) {
        Some(MediaKind::Image)
    } else if matches(&config.video_extensions) {
        Some(MediaKind::Video)
    } else if matches(&config.audio_extensions) {
        Some(MediaKind::Audio)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn entry(relative: &str, is_symlink: bool) -> FileEntry {
        FileEntry {
            relative_path: PathBuf::from(relative),
            source_path: PathBuf::from("/in").join(relative),
            size: 10,
            is_symlink,
        }
    }

    #[test]
    fn test_media_by_extension() {
        let config = Config::default();
        assert_eq!(
            classify(&entry("Photos/IMG_0001.JPG", false), &config),
            FileKind::Media(MediaKind::Image)
        );
        assert_eq!(
            classify(&entry("b.mov", false), &config),
            FileKind::Media(MediaKind::Video)
        );
        assert_eq!(
            classify(&entry("voice.mp3", false), &config),
            FileKind::Media(MediaKind::Audio)
        );
    }

    #[test]
    fn test_pass_through() {
        let config = Config::default();
        assert_eq!(classify(&entry("a.txt", false), &config), FileKind::PassThrough);
        assert_eq!(
            classify(&entry("Photos/IMG_0001.jpg.json", false), &config),
            FileKind::PassThrough
        );
        assert_eq!(classify(&entry("README", false), &config), FileKind::PassThrough);
    }

    #[test]
    fn test_skip_policy() {
        let config = Config::default();
        assert_eq!(
            classify(&entry("b.mov", true), &config),
            FileKind::Skip(SkipReason::Symlink)
        );
        assert_eq!(
            classify(&entry("dir/.DS_Store", false), &config),
            FileKind::Skip(SkipReason::Hidden)
        );
        assert_eq!(
            classify(&entry(".takeout-abc.mp4", false), &config),
            FileKind::Skip(SkipReason::Hidden)
        );
        assert_eq!(
            classify(&entry("Photos/Thumbs.db", false), &config),
            FileKind::Skip(SkipReason::SystemFile)
        );
    }

    #[test]
    fn test_configured_extensions() {
        let config = Config {
            video_extensions: vec!["mts".to_string()],
            ..Default::default()
        };
        assert_eq!(
            classify(&entry("clip.MTS", false), &config),
            FileKind::Media(MediaKind::Video)
        );
        assert_eq!(classify(&entry("clip.mov", false), &config), FileKind::PassThrough);
    }

    #[test]
    fn test_target_extension() {
        assert_eq!(MediaKind::Video.target_extension("MOV"), "mp4");
        assert_eq!(MediaKind::Audio.target_extension("flac"), "m4a");
        assert_eq!(MediaKind::Image.target_extension("JPG"), "jpg");
    }
}
