//! Main application for the yt-dlp downloader GUI

// Settings file and platform defaults
mod config;
// Background worker dispatch and UI-side progress state
mod dispatcher;
// External downloader spawning logic (yt-dlp)
mod downloader;
// Error enums
mod error;
// Data models for requests and progress
mod model;
// Foreground guard / notification plumbing
mod platform;
// Progress parsing and decimation
mod progress;
// Thumbnail fetching module
mod thumbnail;

use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
};

use eframe::{egui, App, Frame};
use egui::{ColorImage, TextureOptions, Visuals};
use rfd::FileDialog;
use tokio::runtime::Runtime;

use config::AppConfig;
use dispatcher::DownloadController;
use downloader::YtDlp;
use model::{DownloadRequest, DownloadStatus};
use platform::DesktopPlatform;

/// Program entry point: initializes logging, settings and runtime, then
/// launches the GUI
fn main() -> Result<(), eframe::Error> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let config = AppConfig::load();
    config.ensure_download_dir();
    log::info!("downloads go to {}", config.download_dir.display());

    let runtime = match Runtime::new() {
        Ok(rt) => Arc::new(rt),
        Err(e) => {
            log::error!("could not start the async runtime: {e}");
            std::process::exit(1);
        }
    };

    let options = eframe::NativeOptions::default();
    eframe::run_native(
        "yt-dl frontend",
        options,
        Box::new(move |cc| {
            cc.egui_ctx.set_visuals(Visuals::dark());
            Box::new(DownloaderApp::new(config, runtime))
        }),
    )
}

/// Application state for the GUI
struct DownloaderApp {
    config: AppConfig,
    /// Kept alive for the lifetime of the window
    runtime: Arc<Runtime>,
    controller: DownloadController<YtDlp>,
    /// Input field for the media URL
    url_input: String,
    /// Destination folder for downloads
    download_folder: String,
    audio_only: bool,
    verify_tls: bool,
    /// Video id whose preview is shown (or being fetched)
    preview_id: Option<String>,
    preview: Option<egui::TextureHandle>,
    /// Incoming thumbnail fetch results (video_id, image)
    thumbnail_results: Arc<Mutex<Vec<(String, ColorImage)>>>,
}

impl DownloaderApp {
    fn new(config: AppConfig, runtime: Arc<Runtime>) -> Self {
        let controller = DownloadController::new(
            runtime.handle().clone(),
            Arc::new(YtDlp::new(config.ytdlp_path.clone())),
            Arc::new(DesktopPlatform),
        );
        Self {
            url_input: String::new(),
            download_folder: config.download_dir.display().to_string(),
            audio_only: config.audio_only,
            verify_tls: config.verify_tls,
            config,
            runtime,
            controller,
            preview_id: None,
            preview: None,
            thumbnail_results: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn start_download(&mut self) {
        let request = DownloadRequest {
            url: self.url_input.trim().to_string(),
            audio_only: self.audio_only,
            verify_tls: self.verify_tls,
            destination: PathBuf::from(self.download_folder.trim()),
        };

        // Settings and folders are only touched once the request is accepted
        let accepted = request.clone();
        match self.controller.start(request, &self.config) {
            Ok(()) => {
                self.config.remember(&accepted);
                self.config.ensure_download_dir();
                if let Err(e) = self.config.save() {
                    log::warn!("could not save settings: {e}");
                }
            }
            Err(e) => {
                log::warn!("download not started: {e}");
                self.controller.report(&e);
            }
        }
    }

    /// Starts a thumbnail fetch when the URL points at a new YouTube video.
    fn refresh_preview(&mut self, ctx: &egui::Context) {
        let id = thumbnail::youtube_video_id(&self.url_input);
        if id == self.preview_id {
            return;
        }
        self.preview = None;
        self.preview_id = id.clone();
        let Some(id) = id else {
            return;
        };

        let results = Arc::clone(&self.thumbnail_results);
        let ctx = ctx.clone();
        self.runtime.spawn_blocking(move || {
            if let Some(img) = thumbnail::fetch_thumbnail(&id) {
                if let Ok(mut pending) = results.lock() {
                    pending.push((id, img));
                }
                ctx.request_repaint();
            }
        });
    }

    fn collect_previews(&mut self, ctx: &egui::Context) {
        let Ok(mut pending) = self.thumbnail_results.lock() else {
            return;
        };
        for (vid, img) in pending.drain(..) {
            // Stale results for a URL the user already replaced are dropped
            if self.preview_id.as_deref() == Some(vid.as_str()) {
                self.preview = Some(ctx.load_texture(&vid, img, TextureOptions::default()));
            }
        }
    }
}

/// GUI update loop: called each frame to redraw and handle interactions
impl App for DownloaderApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        self.controller.poll();
        self.collect_previews(ctx);

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("yt-dl frontend");

            ui.label("Paste video URL:");
            ui.horizontal(|ui| {
                ui.text_edit_singleline(&mut self.url_input);
                if ui.button("Clear").clicked() {
                    self.url_input.clear();
                }
            });

            ui.horizontal(|ui| {
                ui.label("Save to:");
                ui.text_edit_singleline(&mut self.download_folder);
                if ui.button("Browse…").clicked() {
                    if let Some(folder) = FileDialog::new().set_directory(&self.download_folder).pick_folder() {
                        self.download_folder = folder.display().to_string();
                    }
                }
            });

            ui.checkbox(&mut self.audio_only, "Audio only");
            ui.checkbox(&mut self.verify_tls, "Verify SSL certificates");

            if let Some(tex) = &self.preview {
                ui.image((tex.id(), tex.size_vec2() * 0.5));
            }

            let busy = self.controller.is_busy();
            if ui.add_enabled(!busy, egui::Button::new("Download")).clicked() {
                self.start_download();
            }

            let state = self.controller.state();
            if state.status != DownloadStatus::Idle {
                ui.add(egui::ProgressBar::new(f32::from(state.percent) / 100.0).show_percentage());
            }
            ui.label(&state.message);
        });

        self.refresh_preview(ctx);

        // Request periodic repaint for progress updates
        ctx.request_repaint_after(std::time::Duration::from_millis(100));
    }
}
