use std::fmt;
use std::sync::Arc;

use image::RgbImage;
use tracing::{debug, info};

use crate::analysis::{
    brightness, composition, default_detector, score_faces, sharpness, DetectParams, FaceDetector,
    HaarCascade,
};
use crate::config::{AnalysisConfig, WeightSet};
use crate::error::{Error, Result};
use crate::video::sampler::Sample;

/// Individual and combined aesthetic scores for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    /// Weighted sum of the four metrics.
    pub overall: f64,
    pub sharpness: f64,
    pub face_clarity: f64,
    pub face_count: usize,
    pub brightness: f64,
    pub composition: f64,
}

impl fmt::Display for ScoreBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "overall={:.2} sharpness={:.2} face_clarity={:.2} faces={} brightness={:.2} composition={:.2}",
            self.overall,
            self.sharpness,
            self.face_clarity,
            self.face_count,
            self.brightness,
            self.composition
        )
    }
}

/// The winning sample of a selection pass.
#[derive(Debug, Clone, Copy)]
pub struct SelectionResult<'a> {
    /// Position in the scanned sample sequence.
    pub index: usize,
    pub sample: &'a Sample,
    pub scores: ScoreBreakdown,
}

impl SelectionResult<'_> {
    pub fn timestamp_seconds(&self) -> f64 {
        self.sample.timestamp_seconds
    }
}

/// Observer notified after each sample is scored.
///
/// Reports are advisory; they never influence scores or ordering.
pub trait Progress {
    fn report(&self, done: usize, total: usize);
}

/// Discards every report.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn report(&self, _done: usize, _total: usize) {}
}

impl<F: Fn(usize, usize)> Progress for F {
    fn report(&self, done: usize, total: usize) {
        self(done, total)
    }
}

/// Scores frames with the four metrics and selects the best of a sequence.
#[derive(Clone)]
pub struct Scorer {
    detector: Arc<dyn FaceDetector>,
    detect: DetectParams,
}

impl Scorer {
    pub fn new(detector: Arc<dyn FaceDetector>) -> Self {
        Self {
            detector,
            detect: DetectParams::default(),
        }
    }

    pub fn with_detect_params(mut self, detect: DetectParams) -> Self {
        self.detect = detect;
        self
    }

    /// Scorer backed by the shared default face cascade.
    pub fn with_default_cascade() -> Result<Self> {
        Ok(Self::new(default_detector()?))
    }

    /// Scorer for `config`: its cascade file if set, else the shared default.
    pub fn from_config(config: &AnalysisConfig) -> Result<Self> {
        let scorer = match &config.cascade_path {
            Some(path) => Self::new(Arc::new(HaarCascade::load(path)?)),
            None => Self::with_default_cascade()?,
        };
        Ok(scorer.with_detect_params(config.detect))
    }

    /// All four metrics for one frame, combined with `weights` as given.
    pub fn score(&self, image: &RgbImage, weights: &WeightSet) -> Result<ScoreBreakdown> {
        let sharpness = sharpness(image)?;
        let faces = score_faces(image, self.detector.as_ref(), &self.detect)?;
        let brightness = brightness(image)?;
        let composition = composition(image)?;

        let overall = sharpness * weights.sharpness
            + faces.score * weights.face_clarity
            + brightness * weights.brightness
            + composition * weights.composition;

        Ok(ScoreBreakdown {
            overall,
            sharpness,
            face_clarity: faces.score,
            face_count: faces.count,
            brightness,
            composition,
        })
    }

    pub fn find_best<'a>(
        &self,
        samples: &'a [Sample],
        weights: &WeightSet,
    ) -> Result<SelectionResult<'a>> {
        self.find_best_with_progress(samples, weights, &NoProgress)
    }

    /// Single left-to-right pass keeping the first sample with the highest
    /// overall score.
    pub fn find_best_with_progress<'a>(
        &self,
        samples: &'a [Sample],
        weights: &WeightSet,
        progress: &dyn Progress,
    ) -> Result<SelectionResult<'a>> {
        if samples.is_empty() {
            return Err(Error::EmptyInput);
        }

        let total = samples.len();
        let mut best: Option<(usize, ScoreBreakdown)> = None;

        for (i, sample) in samples.iter().enumerate() {
            let scores = self.score(&sample.image, weights)?;
            debug!(
                index = i,
                timestamp_seconds = sample.timestamp_seconds,
                overall = scores.overall,
                "scored sample"
            );

            // Strict comparison: ties keep the earlier sample.
            if best.map_or(true, |(_, b)| scores.overall > b.overall) {
                best = Some((i, scores));
            }
            progress.report(i + 1, total);
        }

        let (index, scores) = best.ok_or(Error::EmptyInput)?;
        let sample = &samples[index];
        info!(
            index,
            timestamp_seconds = sample.timestamp_seconds,
            overall = scores.overall,
            candidates = total,
            "best frame selected"
        );

        Ok(SelectionResult {
            index,
            sample,
            scores,
        })
    }

    pub fn score_all(&self, samples: &[Sample], weights: &WeightSet) -> Result<Vec<(f64, ScoreBreakdown)>> {
        self.score_all_with_progress(samples, weights, &NoProgress)
    }

    /// `(timestamp, scores)` for every sample, in input order.
    pub fn score_all_with_progress(
        &self,
        samples: &[Sample],
        weights: &WeightSet,
        progress: &dyn Progress,
    ) -> Result<Vec<(f64, ScoreBreakdown)>> {
        if samples.is_empty() {
            return Err(Error::EmptyInput);
        }

        let total = samples.len();
        let mut results = Vec::with_capacity(total);
        for (i, sample) in samples.iter().enumerate() {
            let scores = self.score(&sample.image, weights)?;
            results.push((sample.timestamp_seconds, scores));
            progress.report(i + 1, total);
        }
        info!(scored = results.len(), "scored all samples");
        Ok(results)
    }
}
