//! Per-frame image-quality metrics.
//!
//! Each metric is a pure function of one frame: it converts to luminance,
//! builds its own working buffers and never writes to the input.

pub mod brightness;
pub mod cascade;
pub mod common;
pub mod composition;
pub mod edges;
pub mod face;
pub mod sharpness;

pub use brightness::{brightness, brightness_stats, BrightnessStats};
pub use cascade::{DetectParams, HaarCascade};
pub use composition::{composition, composition_detail, CompositionDetail};
pub use face::{default_detector, face_regions, score_faces, FaceDetector, FaceScore};
pub use sharpness::{is_sharp, sharpness};
