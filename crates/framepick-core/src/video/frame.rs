use image::RgbImage;

/// A single decoded video frame with its position in the source.
///
/// Frames are owned buffers; metrics only ever borrow them.
#[derive(Debug, Clone)]
pub struct Frame {
    /// The frame's pixels, RGB order.
    pub image: RgbImage,
    /// Native frame index from the start of the source (0-based).
    pub frame_number: u64,
    /// Elapsed seconds from the start of the source.
    pub timestamp_seconds: f64,
}

impl Frame {
    pub fn new(image: RgbImage, frame_number: u64, timestamp_seconds: f64) -> Self {
        Self {
            image,
            frame_number,
            timestamp_seconds,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}
