mod weights;

use std::path::PathBuf;

pub use weights::WeightSet;

use crate::analysis::DetectParams;

/// Parameters for one extraction + selection run.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Samples kept per second of video.
    pub sample_rate: f64,
    /// Metric weights, used as given.
    pub weights: WeightSet,
    /// Face cascade file, or None for the shared default cascade.
    pub cascade_path: Option<PathBuf>,
    pub detect: DetectParams,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_rate: 1.0,
            weights: WeightSet::default(),
            cascade_path: None,
            detect: DetectParams::default(),
        }
    }
}
