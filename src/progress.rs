//! Parsing of yt-dlp progress output and the decimating relay.

/// Prefix printed by the `--progress-template` we pass to yt-dlp.
pub const PROGRESS_PREFIX: &str = "dl-progress:";

/// Default publishing granularity, in percent.
pub const DEFAULT_STEP: u8 = 10;

/// A raw event as reported by the downloader, before decimation.
#[derive(Debug, Clone, PartialEq)]
pub enum RawProgress {
    /// Completion percentage, 0.0 to 100.0
    Downloading(f64),
    Finished,
}

/// Parses one stdout line. Anything that is not a progress line yields `None`.
pub fn parse_progress_line(line: &str) -> Option<RawProgress> {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix(PROGRESS_PREFIX) {
        let (status, percent) = rest.split_once(':').unwrap_or((rest, ""));
        return match status.trim() {
            "downloading" => parse_percent(percent).map(RawProgress::Downloading),
            "finished" => Some(RawProgress::Finished),
            _ => None,
        };
    }
    if line.starts_with("[download]") && line.ends_with("has already been downloaded") {
        return Some(RawProgress::Finished);
    }
    None
}

/// Parses yt-dlp's `_percent_str`, e.g. `" 12.3%"`. `N/A` yields `None`.
pub fn parse_percent(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    let number = trimmed.strip_suffix('%').unwrap_or(trimmed).trim();
    number
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(0.0, 100.0))
}

/// Decimates raw progress to `step` granularity.
///
/// Only values above the last published one (the high-water mark) get
/// through. A finished event always publishes 100 and resets the mark.
#[derive(Debug, Clone)]
pub struct ProgressRelay {
    step: u8,
    high_water: u8,
}

impl Default for ProgressRelay {
    fn default() -> Self {
        Self::new(DEFAULT_STEP)
    }
}

impl ProgressRelay {
    pub fn new(step: u8) -> Self {
        Self {
            step: step.clamp(1, 100),
            high_water: 0,
        }
    }

    #[cfg(test)]
    pub fn step(&self) -> u8 {
        self.step
    }

    #[cfg(test)]
    pub fn high_water(&self) -> u8 {
        self.high_water
    }

    /// Returns the value to publish, if any.
    pub fn on_downloading(&mut self, raw_percent: f64) -> Option<u8> {
        let whole = raw_percent.clamp(0.0, 100.0).floor() as u8;
        let stepped = whole / self.step * self.step;
        if stepped > self.high_water {
            self.high_water = stepped;
            Some(stepped)
        } else {
            None
        }
    }

    pub fn on_finished(&mut self) -> u8 {
        self.high_water = 0;
        100
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_template_lines() {
        assert_eq!(
            parse_progress_line("dl-progress:downloading:  12.3%"),
            Some(RawProgress::Downloading(12.3))
        );
        assert_eq!(
            parse_progress_line("dl-progress:finished:100.0%"),
            Some(RawProgress::Finished)
        );
        assert_eq!(parse_progress_line("dl-progress:downloading:N/A"), None);
        assert_eq!(parse_progress_line("[youtube] abc: Downloading webpage"), None);
    }

    #[test]
    fn already_downloaded_counts_as_finished() {
        let line = "[download] /tmp/x/Song.mp3 has already been downloaded";
        assert_eq!(parse_progress_line(line), Some(RawProgress::Finished));
    }

    #[test]
    fn floors_to_step_and_keeps_high_water() {
        let mut relay = ProgressRelay::default();
        let published: Vec<u8> = [5.0, 12.0, 19.9, 27.0, 26.0, 99.9]
            .into_iter()
            .filter_map(|p| relay.on_downloading(p))
            .collect();
        assert_eq!(published, vec![10, 20, 90]);
        assert_eq!(relay.high_water(), 90);
    }

    #[test]
    fn every_published_value_is_a_multiple_of_step() {
        let mut relay = ProgressRelay::new(25);
        let mut last = 0;
        for tenth in 0..=1000 {
            if let Some(p) = relay.on_downloading(tenth as f64 / 10.0) {
                assert_eq!(p % 25, 0);
                assert!(p > last);
                last = p;
            }
        }
        assert_eq!(last, 100);
    }

    #[test]
    fn finished_publishes_100_and_resets() {
        let mut relay = ProgressRelay::default();
        relay.on_downloading(55.0);
        assert_eq!(relay.on_finished(), 100);
        assert_eq!(relay.high_water(), 0);
        assert_eq!(relay.on_downloading(10.0), Some(10));
    }

    #[test]
    fn step_is_clamped() {
        assert_eq!(ProgressRelay::new(0).step(), 1);
        assert_eq!(ProgressRelay::new(200).step(), 100);
    }
}
