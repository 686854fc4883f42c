//! Starts downloads off the UI thread and hands their progress back to it.

use std::sync::Arc;

use tokio::{
    runtime::Handle,
    sync::mpsc::{error::TryRecvError, unbounded_channel, UnboundedReceiver},
};
use crate::config::AppConfig;
use crate::downloader::{run_download, DownloadJob, Downloader};
use crate::error::DispatchError;
use crate::model::{DownloadRequest, ProgressState, ProgressUpdate};
use crate::platform::PlatformServices;

/// Owned by the UI thread. The worker only ever writes into the channel;
/// the state is mutated here, in [`DownloadController::poll`].
pub struct DownloadController<D: Downloader> {
    runtime: Handle,
    downloader: Arc<D>,
    platform: Arc<dyn PlatformServices>,
    state: ProgressState,
    /// Present while an attempt is in flight
    progress_rx: Option<UnboundedReceiver<ProgressUpdate>>,
}

impl<D: Downloader> DownloadController<D> {
    pub fn new(runtime: Handle, downloader: Arc<D>, platform: Arc<dyn PlatformServices>) -> Self {
        Self {
            runtime,
            downloader,
            platform,
            state: ProgressState::default(),
            progress_rx: None,
        }
    }

    pub fn state(&self) -> &ProgressState {
        &self.state
    }

    /// True from a successful `start` until the worker has finished.
    pub fn is_busy(&self) -> bool {
        self.progress_rx.is_some()
    }

    /// Spawns the worker for `request`. A second call while an attempt is
    /// running is refused rather than raced.
    ///
    /// Only an empty URL is rejected here. Anything else, including
    /// scheme-less links and bare video ids, goes to yt-dlp as is and a bad
    /// one comes back as an `ERROR:` line.
    pub fn start(&mut self, request: DownloadRequest, config: &AppConfig) -> Result<(), DispatchError> {
        // One attempt at a time; the disabled button is only a hint
        if self.is_busy() {
            return Err(DispatchError::AlreadyRunning);
        }
        let url = request.url.trim();
        if url.is_empty() {
            return Err(DispatchError::EmptyUrl);
        }

        // Freeze the trimmed request before handing it to the worker
        let request = DownloadRequest {
            url: url.to_string(),
            ..request
        };
        log::info!(
            "starting download of {} (audio only: {}, verify tls: {})",
            request.url,
            request.audio_only,
            request.verify_tls
        );

        // Reset progress to 0 before the first event can arrive
        self.state.reset_for_attempt();

        // Fresh channel per attempt; its disconnect marks the end of the worker
        let (tx, rx) = unbounded_channel();
        self.progress_rx = Some(rx);
        self.runtime.spawn(run_download(
            Arc::clone(&self.downloader),
            DownloadJob::new(request, config),
            Arc::clone(&self.platform),
            tx,
        ));
        Ok(())
    }

    /// Drains pending updates into the state. Call once per frame.
    pub fn poll(&mut self) {
        let Some(rx) = self.progress_rx.as_mut() else {
            return;
        };
        // Drain everything the worker sent since the last frame
        loop {
            match rx.try_recv() {
                Ok(update) => self.state.apply(update),
                Err(TryRecvError::Empty) => return,
                Err(TryRecvError::Disconnected) => {
                    self.progress_rx = None;
                    return;
                }
            }
        }
    }

    /// Shows a dispatch failure in the status line. A refused second start
    /// leaves the running attempt's state alone.
    pub fn report(&mut self, error: &DispatchError) {
        if matches!(error, DispatchError::AlreadyRunning) {
            log::debug!("{error}");
            return;
        }
        self.state.fail(error.to_string());
    }
}
