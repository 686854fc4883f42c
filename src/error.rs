use std::path::PathBuf;
use thiserror::Error;

/// Failures while loading or saving the settings file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no config directory available on this platform")]
    NoConfigDir,
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("could not serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Failures reported by a downloader backend.
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("could not start {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },
    #[error("i/o error while downloading: {0}")]
    Io(#[from] std::io::Error),
    #[error("yt-dlp exited with code {0}")]
    Exit(i32),
    #[error("yt-dlp was terminated by a signal")]
    Killed,
}

/// Reasons a download request is refused before any work starts.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Please enter a URL")]
    EmptyUrl,
    #[error("A download is already running")]
    AlreadyRunning,
}
