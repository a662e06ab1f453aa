use std::collections::VecDeque;

use image::RgbImage;

use super::decoder::FrameSource;
use super::frame::Frame;
use crate::error::Result;

/// A [`FrameSource`] over images that are already decoded, e.g. frames
/// produced by another pipeline or generated synthetically.
pub struct MemorySource {
    fps: f64,
    frames: VecDeque<RgbImage>,
    total: u64,
    decoded: u64,
}

impl MemorySource {
    pub fn new(fps: f64, frames: impl IntoIterator<Item = RgbImage>) -> Self {
        let frames: VecDeque<RgbImage> = frames.into_iter().collect();
        let total = frames.len() as u64;
        Self {
            fps,
            frames,
            total,
            decoded: 0,
        }
    }
}

impl FrameSource for MemorySource {
    fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_count(&self) -> Option<u64> {
        Some(self.total)
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(image) = self.frames.pop_front() else {
            return Ok(None);
        };
        let frame_number = self.decoded;
        self.decoded += 1;
        let timestamp_seconds = if self.fps > 0.0 {
            frame_number as f64 / self.fps
        } else {
            0.0
        };
        Ok(Some(Frame::new(image, frame_number, timestamp_seconds)))
    }
}
