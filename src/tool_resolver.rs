//! # Tool Path Resolver
//!
//! This module finds the external encoder binary:
//! - Explicit override through an environment variable (`TAKEOUT_FFMPEG`)
//! - Tools directory shipped next to the application (`TOOLS_DIR`)
//! - System PATH

use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable pointing directly at the ffmpeg binary
pub const FFMPEG_ENV: &str = "TAKEOUT_FFMPEG";
/// Environment variable pointing at a directory of bundled tools
pub const TOOLS_DIR_ENV: &str = "TOOLS_DIR";

/// Tool path resolver for different deployment environments
pub struct ToolPathResolver {
    /// Directory where tools are bundled, if any
    tools_dir: Option<PathBuf>,
    /// Value of PATH captured at construction
    search_path: Option<std::ffi::OsString>,
}

impl ToolPathResolver {
    /// Create a resolver from the current process environment
    pub fn new() -> Self {
        Self {
            tools_dir: env::var_os(TOOLS_DIR_ENV).map(PathBuf::from),
            search_path: env::var_os("PATH"),
        }
    }

    /// Create a resolver with an explicit search path and no tools directory
    pub fn with_search_path(search_path: impl Into<std::ffi::OsString>) -> Self {
        Self {
            tools_dir: None,
            search_path: Some(search_path.into()),
        }
    }

    /// Resolve the path to ffmpeg, honouring the explicit override first
    pub fn ffmpeg(&self) -> Option<PathBuf> {
        if let Some(explicit) = env::var_os(FFMPEG_ENV) {
            let explicit = PathBuf::from(explicit);
            if is_executable_file(&explicit) {
                debug!("Using ffmpeg from {}: {}", FFMPEG_ENV, explicit.display());
                return Some(explicit);
            }
            warn!("{} points to a missing binary: {}", FFMPEG_ENV, explicit.display());
        }
        self.resolve_tool("ffmpeg")
    }

    /// Resolve the path to a specific tool
    pub fn resolve_tool(&self, tool_name: &str) -> Option<PathBuf> {
        let file_name = executable_name(tool_name);

        if let Some(ref tools_dir) = self.tools_dir {
            let bundled = tools_dir.join(&file_name);
            if is_executable_file(&bundled) {
                debug!("Using bundled tool: {} -> {}", tool_name, bundled.display());
                return Some(bundled);
            }
            debug!("Bundled path does not exist: {}", bundled.display());
        }

        let found = self
            .search_path
            .as_ref()
            .and_then(|path| {
                env::split_paths(path)
                    .map(|dir| dir.join(&file_name))
                    .find(|candidate| is_executable_file(candidate))
            });

        match found {
            Some(path) => {
                debug!("Using system tool: {} -> {}", tool_name, path.display());
                Some(path)
            }
            None => {
                warn!("Tool not found: {}", tool_name);
                None
            }
        }
    }

    /// Installation hint for a missing tool
    pub fn install_instructions(tool_name: &str) -> String {
        if cfg!(target_os = "linux") {
            format!("sudo apt-get install {}", tool_name)
        } else if cfg!(target_os = "macos") {
            format!("brew install {}", tool_name)
        } else {
            format!("install {} and add it to PATH", tool_name)
        }
    }
}

impl Default for ToolPathResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn executable_name(tool_name: &str) -> String {
    if cfg!(windows) {
        format!("{}.exe", tool_name)
    } else {
        tool_name.to_string()
    }
}

fn is_executable_file(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        path.metadata()
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}
