//! Picks the most aesthetically pleasing frame of a video.
//!
//! Frames are sampled at a fixed rate ([`video::sampler::extract`]), each is
//! scored for sharpness, faces, exposure and composition
//! ([`scorer::Scorer::score`]), and the first frame with the highest weighted
//! score wins ([`scorer::Scorer::find_best`]).

pub mod analysis;
pub mod config;
pub mod error;
pub mod overlay;
pub mod pipeline;
pub mod rect;
pub mod scorer;
pub mod video;

pub use config::{AnalysisConfig, WeightSet};
pub use error::{Error, Result};
pub use scorer::{NoProgress, Progress, ScoreBreakdown, Scorer, SelectionResult};
pub use video::frame::Frame;
pub use video::sampler::{extract, extract_from, Sample};
