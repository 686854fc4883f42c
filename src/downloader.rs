use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::Command,
    sync::mpsc::UnboundedSender,
};

use crate::config::AppConfig;
use crate::error::DownloadError;
use crate::model::{truncate_message, DownloadRequest, ProgressUpdate};
use crate::platform::{LifecycleShim, PlatformServices};
use crate::progress::{parse_progress_line, ProgressRelay, RawProgress, PROGRESS_PREFIX};

/// Which stream yt-dlp should pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatSelector {
    /// Best audio-only stream, falling back to the best combined one
    BestAudio,
    /// Best single file with both audio and video
    Best,
}

impl FormatSelector {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormatSelector::BestAudio => "bestaudio/best",
            FormatSelector::Best => "best",
        }
    }
}

/// Configuration record handed to the downloader for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOptions {
    pub output_template: String,
    pub format: FormatSelector,
    pub check_certificate: bool,
    /// Convert to this audio format after download (audio-only mode)
    pub audio_format: Option<String>,
    /// Keep going past per-entry errors in playlists
    pub ignore_errors: bool,
    /// Set the file mtime from the server's Last-Modified header
    pub update_mtime: bool,
}

impl DownloadOptions {
    pub fn from_request(request: &DownloadRequest, config: &AppConfig) -> Self {
        let output_template = request
            .destination
            .join("%(title)s.%(ext)s")
            .to_string_lossy()
            .into_owned();
        let (format, audio_format) = if request.audio_only {
            (FormatSelector::BestAudio, Some(config.audio_format.clone()))
        } else {
            (FormatSelector::Best, None)
        };
        Self {
            output_template,
            format,
            check_certificate: request.verify_tls,
            audio_format,
            ignore_errors: true,
            update_mtime: false,
        }
    }

    /// Command-line arguments for yt-dlp, ending with `url`.
    pub fn to_args(&self, url: &str) -> Vec<String> {
        let mut args = vec![
            "--newline".to_owned(),
            "--no-colors".to_owned(),
            "--progress-template".to_owned(),
            format!("download:{PROGRESS_PREFIX}%(progress.status)s:%(progress._percent_str)s"),
            "-f".to_owned(),
            self.format.as_str().to_owned(),
            "-o".to_owned(),
            self.output_template.clone(),
        ];
        if !self.check_certificate {
            args.push("--no-check-certificates".to_owned());
        }
        if let Some(audio_format) = &self.audio_format {
            args.push("-x".to_owned());
            args.push("--audio-format".to_owned());
            args.push(audio_format.clone());
        }
        if self.ignore_errors {
            args.push("--ignore-errors".to_owned());
        }
        if !self.update_mtime {
            args.push("--no-mtime".to_owned());
        }
        args.push("--".to_owned());
        args.push(url.to_owned());
        args
    }
}

/// Logger and progress hook given to a [`Downloader`].
///
/// Raw progress goes through the relay; only decimated values reach the
/// UI channel. A send error means the UI is gone and is ignored.
pub struct DownloadHooks {
    relay: ProgressRelay,
    shim: Arc<LifecycleShim>,
    tx: UnboundedSender<ProgressUpdate>,
    error_reported: bool,
}

impl DownloadHooks {
    pub fn new(relay: ProgressRelay, shim: Arc<LifecycleShim>, tx: UnboundedSender<ProgressUpdate>) -> Self {
        Self {
            relay,
            shim,
            tx,
            error_reported: false,
        }
    }

    pub fn progress(&mut self, event: RawProgress) {
        match event {
            RawProgress::Downloading(raw) => {
                // Same-step repeats are swallowed by the relay
                if let Some(percent) = self.relay.on_downloading(raw) {
                    log::info!("{raw:.1} percent downloaded");
                    let _ = self.tx.send(ProgressUpdate::Percent(percent));
                }
            }
            RawProgress::Finished => {
                // Publish 100 and release the foreground guard
                self.relay.on_finished();
                let _ = self.tx.send(ProgressUpdate::Finished);
                self.shim.end();
            }
        }
    }

    pub fn debug(&mut self, msg: &str) {
        log::debug!("{msg}");
    }

    pub fn warning(&mut self, msg: &str) {
        log::warn!("{msg}");
    }

    pub fn error(&mut self, msg: &str) {
        log::error!("{msg}");
        // Remembered so the process exit code is not reported a second time
        self.error_reported = true;
        let _ = self.tx.send(ProgressUpdate::Failed(truncate_message(msg).to_owned()));
    }

    pub fn error_reported(&self) -> bool {
        self.error_reported
    }
}

/// A media downloader with a single blocking-until-done entry point.
pub trait Downloader: Send + Sync + 'static {
    fn download<'a>(
        &'a self,
        options: &'a DownloadOptions,
        url: &'a str,
        hooks: &'a mut DownloadHooks,
    ) -> impl Future<Output = Result<(), DownloadError>> + Send + 'a;
}

/// Runs the external yt-dlp program.
#[derive(Debug, Clone)]
pub struct YtDlp {
    binary: PathBuf,
}

impl YtDlp {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }
}

impl Downloader for YtDlp {
    fn download<'a>(
        &'a self,
        options: &'a DownloadOptions,
        url: &'a str,
        hooks: &'a mut DownloadHooks,
    ) -> impl Future<Output = Result<(), DownloadError>> + Send + 'a {
        async move {
            // Build the yt-dlp command line from the options record
            let args = options.to_args(url);
            log::info!("output template: {}", options.output_template);
            log::debug!("{} {}", self.binary.display(), args.join(" "));

            // Spawn yt-dlp with both output streams piped back to us
            let mut child = Command::new(&self.binary)
                .args(&args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|source| DownloadError::Spawn {
                    binary: self.binary.display().to_string(),
                    source,
                })?;

            // Take ownership of the pipes so they can be read line by line
            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| std::io::Error::other("stdout not captured"))?;
            let stderr = child
                .stderr
                .take()
                .ok_or_else(|| std::io::Error::other("stderr not captured"))?;
            let mut out_lines = BufReader::new(stdout).lines();
            let mut err_lines = BufReader::new(stderr).lines();
            let (mut out_open, mut err_open) = (true, true);

            // stdout carries progress, stderr carries the log; drain both until closed
            while out_open || err_open {
                tokio::select! {
                    line = out_lines.next_line(), if out_open => match line? {
                        Some(line) => handle_stdout(hooks, &line),
                        None => out_open = false,
                    },
                    line = err_lines.next_line(), if err_open => match line? {
                        Some(line) => handle_stderr(hooks, &line),
                        None => err_open = false,
                    },
                }
            }

            // Exit status decides between success and a generic failure
            let status = child.wait().await?;
            if status.success() {
                Ok(())
            } else {
                Err(status.code().map_or(DownloadError::Killed, DownloadError::Exit))
            }
        }
    }
}

fn handle_stdout(hooks: &mut DownloadHooks, line: &str) {
    match parse_progress_line(line) {
        Some(event) => hooks.progress(event),
        None => hooks.debug(line),
    }
}

fn handle_stderr(hooks: &mut DownloadHooks, line: &str) {
    if line.starts_with("ERROR:") {
        hooks.error(line);
    } else if line.starts_with("WARNING:") {
        hooks.warning(line);
    } else {
        hooks.debug(line);
    }
}

/// Everything the worker needs for one attempt.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub request: DownloadRequest,
    pub options: DownloadOptions,
    pub progress_step: u8,
}

impl DownloadJob {
    pub fn new(request: DownloadRequest, config: &AppConfig) -> Self {
        let options = DownloadOptions::from_request(&request, config);
        Self {
            request,
            options,
            progress_step: config.progress_step,
        }
    }
}

/// Worker body. Never returns an error: failures are published as
/// [`ProgressUpdate::Failed`] and the channel closes when this returns.
pub async fn run_download<D: Downloader>(
    downloader: Arc<D>,
    job: DownloadJob,
    platform: Arc<dyn PlatformServices>,
    tx: UnboundedSender<ProgressUpdate>,
) {
    // Permission prompts may block, so keep them off the async worker threads
    let shim = Arc::new(LifecycleShim::new(platform));
    let guard = Arc::clone(&shim);
    let title = job.request.url.clone();
    if let Err(e) = tokio::task::spawn_blocking(move || guard.begin(&title)).await {
        log::warn!("permission request did not complete: {e}");
    }

    // Hooks own the relay and the channel end the UI listens on
    let mut hooks = DownloadHooks::new(ProgressRelay::new(job.progress_step), Arc::clone(&shim), tx);

    // Errors never escape the worker; they become a Failed update instead
    match downloader.download(&job.options, &job.request.url, &mut hooks).await {
        Ok(()) => log::info!("download of {} complete", job.request.url),
        Err(e) => {
            if !hooks.error_reported() {
                hooks.error(&e.to_string());
            } else {
                log::debug!("downloader exited after reporting an error: {e}");
            }
        }
    }
    // Tear down the guard even when no finished event arrived
    shim.end();
}


#[cfg(test)]
mod tests {
    use super::testing::{StubDownloader, StubEvent};
    use super::*;
    use crate::platform::testing::RecordingPlatform;
    use crate::platform::{DesktopPlatform, PermissionStatus};
    use tokio::sync::mpsc::unbounded_channel;

    fn request(audio_only: bool, verify_tls: bool) -> DownloadRequest {
        DownloadRequest {
            url: "https://example.com/v".to_string(),
            audio_only,
            verify_tls,
            destination: PathBuf::from("/tmp/media"),
        }
    }

    async fn collect(stub: StubDownloader, platform: Arc<dyn PlatformServices>) -> Vec<ProgressUpdate> {
        let job = DownloadJob::new(request(false, false), &AppConfig::default());
        let (tx, mut rx) = unbounded_channel();
        run_download(Arc::new(stub), job, platform, tx).await;
        let mut updates = Vec::new();
        while let Some(update) = rx.recv().await {
            updates.push(update);
        }
        updates
    }

    #[test]
    fn audio_only_selects_audio_format() {
        let options = DownloadOptions::from_request(&request(true, false), &AppConfig::default());
        assert_eq!(options.format, FormatSelector::BestAudio);
        assert_eq!(options.format.as_str(), "bestaudio/best");
        assert_eq!(options.audio_format.as_deref(), Some("mp3"));

        let args = options.to_args("https://example.com/v");
        assert!(args.windows(2).any(|w| w == ["--audio-format", "mp3"]));
    }

    #[test]
    fn full_video_selects_best() {
        let options = DownloadOptions::from_request(&request(false, false), &AppConfig::default());
        assert_eq!(options.format, FormatSelector::Best);
        assert_eq!(options.audio_format, None);
        assert!(!options.to_args("u").contains(&"-x".to_owned()));
    }

    #[test]
    fn certificate_check_follows_verify_flag() {
        let config = AppConfig::default();
        let off = DownloadOptions::from_request(&request(false, false), &config);
        assert!(!off.check_certificate);
        assert!(off.to_args("u").contains(&"--no-check-certificates".to_owned()));

        let on = DownloadOptions::from_request(&request(false, true), &config);
        assert!(on.check_certificate);
        assert!(!on.to_args("u").contains(&"--no-check-certificates".to_owned()));
    }

    #[test]
    fn template_is_rooted_at_destination() {
        let options = DownloadOptions::from_request(&request(false, false), &AppConfig::default());
        assert_eq!(
            PathBuf::from(&options.output_template),
            PathBuf::from("/tmp/media").join("%(title)s.%(ext)s")
        );
        let args = options.to_args("https://example.com/v");
        assert_eq!(args.last().map(String::as_str), Some("https://example.com/v"));
        assert_eq!(args[args.len() - 2], "--");
        assert!(args.contains(&"--no-mtime".to_owned()));
        assert!(args.contains(&"--ignore-errors".to_owned()));
    }

    #[tokio::test]
    async fn publishes_decimated_sequence() {
        let stub = StubDownloader::new(vec![
            StubEvent::Progress(5.0),
            StubEvent::Progress(12.0),
            StubEvent::Progress(27.0),
            StubEvent::Finished,
        ]);
        let updates = collect(stub, Arc::new(DesktopPlatform)).await;
        assert_eq!(
            updates,
            vec![
                ProgressUpdate::Percent(10),
                ProgressUpdate::Percent(20),
                ProgressUpdate::Finished,
            ]
        );
    }

    #[tokio::test]
    async fn downloader_error_is_reported_once() {
        let mut stub = StubDownloader::new(vec![StubEvent::Error("ERROR: Unsupported URL")]);
        stub.result = || Err(DownloadError::Exit(1));
        let updates = collect(stub, Arc::new(DesktopPlatform)).await;
        assert_eq!(
            updates,
            vec![ProgressUpdate::Failed("ERROR: Unsupported URL".to_string())]
        );
    }

    #[tokio::test]
    async fn silent_failure_still_surfaces() {
        let mut stub = StubDownloader::new(vec![StubEvent::Progress(50.0)]);
        stub.result = || Err(DownloadError::Killed);
        let updates = collect(stub, Arc::new(DesktopPlatform)).await;
        assert_eq!(
            updates,
            vec![
                ProgressUpdate::Percent(50),
                ProgressUpdate::Failed("yt-dlp was terminated by a signal".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn guard_is_torn_down_on_finish() {
        let platform = Arc::new(RecordingPlatform::new(PermissionStatus::Granted));
        let stub = StubDownloader::new(vec![StubEvent::Progress(30.0), StubEvent::Finished]);
        collect(stub, platform.clone()).await;
        assert_eq!(
            platform.calls(),
            vec![
                "request_permissions",
                "show_persistent_notification",
                "start_background_guard",
                "clear_notification",
                "stop_background_guard",
            ]
        );
    }

    #[tokio::test]
    async fn denied_permissions_still_download() {
        let platform = Arc::new(RecordingPlatform::new(PermissionStatus::Denied));
        let stub = StubDownloader::new(vec![StubEvent::Progress(60.0), StubEvent::Finished]);
        let updates = collect(stub, platform.clone()).await;
        assert_eq!(updates, vec![ProgressUpdate::Percent(60), ProgressUpdate::Finished]);
        assert_eq!(platform.calls(), vec!["request_permissions"]);
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let downloader = YtDlp::new("/nonexistent/yt-dlp-binary");
        let job = DownloadJob::new(request(false, false), &AppConfig::default());
        let (tx, mut rx) = unbounded_channel();
        run_download(Arc::new(downloader), job, Arc::new(DesktopPlatform), tx).await;
        match rx.recv().await {
            Some(ProgressUpdate::Failed(msg)) => assert!(msg.starts_with("could not start")),
            other => panic!("unexpected update: {other:?}"),
        }
    }
}
