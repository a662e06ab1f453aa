use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by extraction, detection and scoring.
///
/// Every variant is fatal for the call that produced it: there is no
/// partial-success mode and nothing is retried.
#[derive(Debug, Error)]
pub enum Error {
    /// The video container could not be opened.
    #[error("cannot open video source {}: {reason}", path.display())]
    SourceUnreadable { path: PathBuf, reason: String },

    /// The container reported a frame rate that cannot drive sampling.
    #[error("video frame rate is indeterminate (reported {fps})")]
    RateIndeterminate { fps: f64 },

    /// Decoding finished without keeping a single sample.
    #[error("no frames were extracted from the video")]
    NoFramesExtracted,

    /// Selection or scoring was asked to work on zero samples.
    #[error("no samples provided")]
    EmptyInput,

    /// The requested sampling rate is not a positive finite number.
    #[error("sampling rate must be positive, got {rate}")]
    InvalidRate { rate: f64 },

    /// The decoder failed after the container was opened.
    #[error("decode failed: {0}")]
    Decode(String),

    /// A frame buffer is too small for the metric reading it.
    #[error("frame is unusable for analysis ({width}x{height})")]
    InvalidFrame { width: u32, height: u32 },

    /// No face cascade could be located or read.
    #[error("face cascade unavailable: {0}")]
    CascadeUnavailable(String),

    /// The cascade file was found but is not a valid Haar cascade.
    #[error("malformed face cascade: {0}")]
    CascadeFormat(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
