//! Settings constructed once at startup and handed to the app.

use std::path::{Path, PathBuf};

use directories::{ProjectDirs, UserDirs};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::DownloadRequest;
use crate::progress::DEFAULT_STEP;

const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Destination folder for downloads
    pub download_dir: PathBuf,
    /// yt-dlp executable; a bare name is looked up on PATH
    pub ytdlp_path: PathBuf,
    /// Progress bar granularity in percent
    pub progress_step: u8,
    /// Last state of the audio-only checkbox
    pub audio_only: bool,
    /// Last state of the certificate check checkbox
    pub verify_tls: bool,
    /// Target format when extracting audio
    pub audio_format: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            ytdlp_path: PathBuf::from(if cfg!(target_os = "windows") { "yt-dlp.exe" } else { "yt-dlp" }),
            progress_step: DEFAULT_STEP,
            audio_only: false,
            verify_tls: false,
            audio_format: "mp3".to_string(),
        }
    }
}

impl AppConfig {
    /// Loads the settings file, falling back to defaults when it is missing
    /// or unreadable.
    pub fn load() -> Self {
        match config_file().and_then(|path| Self::load_from(&path)) {
            Ok(config) => config,
            Err(e) => {
                log::info!("using default settings: {e}");
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Records the options of a dispatched request so the next launch starts
    /// from them.
    pub fn remember(&mut self, request: &DownloadRequest) {
        self.audio_only = request.audio_only;
        self.verify_tls = request.verify_tls;
        self.download_dir = request.destination.clone();
    }

    /// Creates the download folder if needed. Failure is ignored; the folder
    /// is then assumed to exist already.
    pub fn ensure_download_dir(&self) {
        if let Err(e) = std::fs::create_dir_all(&self.download_dir) {
            log::debug!("could not create {}: {e}", self.download_dir.display());
        }
    }
}

fn config_file() -> Result<PathBuf, ConfigError> {
    ProjectDirs::from("", "", "yt-dl-frontend")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
        .ok_or(ConfigError::NoConfigDir)
}

/// Platform default for the download folder.
pub fn default_download_dir() -> PathBuf {
    if cfg!(target_os = "android") {
        return PathBuf::from("/sdcard/download");
    }
    if cfg!(target_os = "windows") {
        return std::path::absolute("/download").unwrap_or_else(|_| PathBuf::from(r"C:\download"));
    }
    UserDirs::new()
        .and_then(|dirs| dirs.download_dir().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("./downloads"))
}
