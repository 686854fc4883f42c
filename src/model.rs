use std::path::PathBuf;

/// Longest slice of a downloader message shown in the status line.
pub const MAX_ERROR_CHARS: usize = 100;

/// One user-initiated download, frozen once dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    /// Page or media URL handed to yt-dlp
    pub url: String,
    /// Keep audio only instead of the combined stream
    pub audio_only: bool,
    /// Check TLS certificates of the remote host
    pub verify_tls: bool,
    /// Folder the file is written to
    pub destination: PathBuf,
}

/// Represents the current state of a download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DownloadStatus {
    /// Nothing has been started yet
    #[default]
    Idle,
    /// Download is in progress
    Downloading,
    /// Download has completed successfully
    Finished,
    /// The downloader reported a failure
    Error,
}

/// What the worker publishes to the UI thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressUpdate {
    /// New high-water mark, already rounded down to the progress step
    Percent(u8),
    /// The downloader reported a finished file
    Finished,
    /// The downloader failed; carries the untruncated message
    Failed(String),
}

/// State read by the UI each frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressState {
    pub status: DownloadStatus,
    /// Progress percentage (0 to 100)
    pub percent: u8,
    /// Human-readable status line
    pub message: String,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self {
            status: DownloadStatus::Idle,
            percent: 0,
            message: "Waiting for URL".to_string(),
        }
    }
}

impl ProgressState {
    /// Clears the previous attempt before a new one is dispatched.
    pub fn reset_for_attempt(&mut self) {
        self.status = DownloadStatus::Downloading;
        self.percent = 0;
        self.message = "Downloading...".to_string();
    }

    /// Folds one published update into the state.
    ///
    /// Percent never moves backwards within an attempt, even when yt-dlp
    /// starts a second file (separate audio and video streams) after a
    /// `Finished`.
    pub fn apply(&mut self, update: ProgressUpdate) {
        match update {
            ProgressUpdate::Percent(p) => {
                if p > self.percent {
                    self.percent = p.min(100);
                }
                // A late percent must not hide a terminal status
                if self.status == DownloadStatus::Idle {
                    self.status = DownloadStatus::Downloading;
                }
            }
            ProgressUpdate::Finished => {
                self.status = DownloadStatus::Finished;
                self.percent = 100;
                self.message = "Finished...".to_string();
            }
            ProgressUpdate::Failed(msg) => {
                self.status = DownloadStatus::Error;
                self.message = format!("Oops something went wrong...{}", truncate_message(&msg));
            }
        }
    }

    pub fn fail(&mut self, msg: impl Into<String>) {
        self.status = DownloadStatus::Error;
        self.message = msg.into();
    }
}

/// First [`MAX_ERROR_CHARS`] characters of `msg`, cut on a char boundary.
pub fn truncate_message(msg: &str) -> &str {
    match msg.char_indices().nth(MAX_ERROR_CHARS) {
        Some((idx, _)) => &msg[..idx],
        None => msg,
    }
}
