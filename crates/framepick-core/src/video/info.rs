use std::fmt;
use std::path::Path;

use super::decoder::probe;
use crate::error::Result;

/// Container metadata handed to reporting collaborators alongside a result.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub fps: f64,
    pub total_frames: u64,
    pub width: u32,
    pub height: u32,
    /// Seconds, derived from `total_frames / fps`; 0 when the rate is unknown.
    pub duration_seconds: f64,
}

impl VideoInfo {
    pub fn new(fps: f64, total_frames: u64, width: u32, height: u32) -> Self {
        let duration_seconds = if fps > 0.0 {
            total_frames as f64 / fps
        } else {
            0.0
        };
        Self {
            fps,
            total_frames,
            width,
            height,
            duration_seconds,
        }
    }

    /// "WxH", e.g. "640x480".
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    /// Native frame index nearest to `timestamp_seconds`, truncated.
    pub fn frame_position(&self, timestamp_seconds: f64) -> u64 {
        (timestamp_seconds * self.fps).max(0.0) as u64
    }
}

impl fmt::Display for VideoInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} @ {:.2} fps, {} frames, {:.2}s",
            self.resolution(),
            self.fps,
            self.total_frames,
            self.duration_seconds
        )
    }
}

/// Probe a video file without decoding it. A missing frame count reads as 0.
pub fn probe_info(path: &Path) -> Result<VideoInfo> {
    let probed = probe(path)?;
    Ok(VideoInfo::new(
        probed.fps,
        probed.frame_count.unwrap_or(0),
        probed.width,
        probed.height,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_from_frames_and_rate() {
        let info = VideoInfo::new(30.0, 60, 640, 480);
        assert_eq!(info.duration_seconds, 2.0);
        assert_eq!(info.resolution(), "640x480");
        assert_eq!(info.frame_position(1.0), 30);
    }

    #[test]
    fn unknown_rate_has_zero_duration() {
        let info = VideoInfo::new(0.0, 120, 1920, 1080);
        assert_eq!(info.duration_seconds, 0.0);
        assert_eq!(info.frame_position(3.5), 0);
    }
}
