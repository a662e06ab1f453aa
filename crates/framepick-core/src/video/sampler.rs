use std::path::Path;

use tracing::{debug, info};

use super::decoder::{FrameSource, VideoDecoder};
use super::frame::Frame;
use crate::error::{Error, Result};

/// A kept frame: its pixels plus its native index and timestamp.
pub type Sample = Frame;

/// Decode-skip factor for sampling a `fps` stream at `rate` samples per second.
pub fn stride_for(fps: f64, rate: f64) -> u64 {
    let ratio = (fps / rate).round();
    if ratio >= 1.0 {
        ratio as u64
    } else {
        1
    }
}

fn check_rate(rate: f64) -> Result<()> {
    if rate.is_finite() && rate > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidRate { rate })
    }
}

/// Open `path` and keep roughly `rate` frames per second of video.
///
/// The decoder is released before returning, whether extraction succeeded
/// or not.
pub fn extract(path: &Path, rate: f64) -> Result<Vec<Sample>> {
    check_rate(rate)?;
    let mut decoder = VideoDecoder::open(path)?;
    extract_from(&mut decoder, rate)
}

/// Sample an already-open source from its current position to end-of-stream.
///
/// Native frame `k` is kept iff `k % stride == 0` and stamped `k / fps`.
pub fn extract_from<S: FrameSource + ?Sized>(source: &mut S, rate: f64) -> Result<Vec<Sample>> {
    check_rate(rate)?;

    let fps = source.fps();
    if !fps.is_finite() || fps <= 0.0 {
        return Err(Error::RateIndeterminate { fps });
    }

    let stride = stride_for(fps, rate);
    info!(
        fps,
        rate,
        stride,
        native_frames = ?source.frame_count(),
        "sampling video"
    );

    let mut samples = Vec::new();
    let mut native_index: u64 = 0;

    // Every decoded frame owns its buffer, so kept frames need no extra copy.
    while let Some(mut frame) = source.next_frame()? {
        if native_index % stride == 0 {
            frame.frame_number = native_index;
            frame.timestamp_seconds = native_index as f64 / fps;
            debug!(
                frame_number = frame.frame_number,
                timestamp_seconds = frame.timestamp_seconds,
                "kept sample"
            );
            samples.push(frame);
        }
        native_index += 1;
    }

    if samples.is_empty() {
        return Err(Error::NoFramesExtracted);
    }

    info!(
        decoded = native_index,
        kept = samples.len(),
        "extraction complete"
    );
    Ok(samples)
}
