use std::path::Path;

use tracing::info;

use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::scorer::{Progress, ScoreBreakdown, Scorer};
use crate::video::sampler::{extract, Sample};

/// Outcome of a full extraction + selection run.
#[derive(Debug, Clone)]
pub struct Thumbnail {
    /// Position of the winner among the sampled frames.
    pub index: usize,
    pub sample: Sample,
    pub scores: ScoreBreakdown,
    /// Number of samples that were scored.
    pub frames_analyzed: usize,
}

/// Sample `input` at the configured rate and pick its best frame.
pub fn run_pipeline(input: &Path, config: &AnalysisConfig, progress: &dyn Progress) -> Result<Thumbnail> {
    info!(
        ?input,
        sample_rate = config.sample_rate,
        weights = %config.weights,
        "pipeline starting"
    );

    // Resolve the face cascade before paying for a full decode.
    let scorer = Scorer::from_config(config)?;
    let mut samples = extract(input, config.sample_rate)?;
    let frames_analyzed = samples.len();

    let (index, scores) = {
        let best = scorer.find_best_with_progress(&samples, &config.weights, progress)?;
        (best.index, best.scores)
    };
    let sample = samples.swap_remove(index);

    info!(index, frames_analyzed, overall = scores.overall, "pipeline complete");
    Ok(Thumbnail {
        index,
        sample,
        scores,
        frames_analyzed,
    })
}

/// Sample `input` and score every kept frame, in timestamp order.
pub fn score_video(
    input: &Path,
    config: &AnalysisConfig,
    progress: &dyn Progress,
) -> Result<Vec<(f64, ScoreBreakdown)>> {
    let scorer = Scorer::from_config(config)?;
    let samples = extract(input, config.sample_rate)?;
    scorer.score_all_with_progress(&samples, &config.weights, progress)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::scorer::NoProgress;

    #[test]
    fn missing_cascade_file_fails_before_decoding() {
        let config = AnalysisConfig {
            cascade_path: Some("/no/such/cascade.xml".into()),
            ..AnalysisConfig::default()
        };
        let err = run_pipeline(Path::new("/no/such/video.mp4"), &config, &NoProgress).unwrap_err();
        assert!(matches!(err, Error::CascadeUnavailable(_)));
    }
}
