use eframe::egui::ColorImage;
use url::Url;

/// Module for downloading and decoding video thumbnails from YouTube.
///
/// Only YouTube URLs have a predictable thumbnail location; other sites get
/// no preview.
pub fn youtube_video_id(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?.trim_start_matches("www.").trim_start_matches("m.");
    let id = match host {
        "youtu.be" => parsed.path_segments()?.next()?.to_string(),
        "youtube.com" | "music.youtube.com" => {
            let mut segments = parsed.path_segments()?;
            match segments.next()? {
                "watch" => parsed
                    .query_pairs()
                    .find(|(key, _)| key == "v")
                    .map(|(_, value)| value.into_owned())?,
                "shorts" | "embed" | "live" => segments.next()?.to_string(),
                _ => return None,
            }
        }
        _ => return None,
    };
    let valid = !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    valid.then_some(id)
}

pub fn thumbnail_url(video_id: &str) -> String {
    format!("https://img.youtube.com/vi/{}/hqdefault.jpg", video_id)
}

/// Blocking fetch; run it off the UI thread.
pub fn fetch_thumbnail(video_id: &str) -> Option<ColorImage> {
    let resp = match reqwest::blocking::get(thumbnail_url(video_id)).and_then(|r| r.error_for_status()) {
        Ok(resp) => resp.bytes().ok()?,
        Err(e) => {
            log::debug!("no thumbnail for {video_id}: {e}");
            return None;
        }
    };
    decode_thumbnail(&resp)
}

/// Decodes image bytes into an egui-ready RGBA image.
pub fn decode_thumbnail(bytes: &[u8]) -> Option<ColorImage> {
    let img = image::load_from_memory(bytes).ok()?.to_rgba8();
    let size = [img.width() as usize, img.height() as usize];
    Some(ColorImage::from_rgba_unmultiplied(size, &img))
}
