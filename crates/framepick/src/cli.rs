use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use framepick_core::{AnalysisConfig, WeightSet};

#[derive(Parser)]
#[command(name = "framepick", about = "Aesthetic thumbnail frame selector")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Find the most aesthetic frame of a video.
    Best {
        #[command(flatten)]
        analysis: AnalysisArgs,
    },
    /// Score every sampled frame of a video.
    Scores {
        #[command(flatten)]
        analysis: AnalysisArgs,
    },
    /// Print container metadata.
    Info {
        /// Path to the input video file (MP4, MOV, AVI, MKV, ...).
        #[arg(short, long)]
        input: PathBuf,
    },
}

#[derive(Args)]
pub struct AnalysisArgs {
    /// Path to the input video file (MP4, MOV, AVI, MKV, ...).
    #[arg(short, long)]
    pub input: PathBuf,

    /// Frames to analyze per second of video.
    #[arg(short, long, default_value_t = 1.0, value_parser = positive)]
    pub rate: f64,

    /// Weight of the sharpness score.
    #[arg(long, default_value_t = WeightSet::default().sharpness, value_parser = non_negative)]
    pub w_sharpness: f64,

    /// Weight of the face clarity score.
    #[arg(long, default_value_t = WeightSet::default().face_clarity, value_parser = non_negative)]
    pub w_face: f64,

    /// Weight of the brightness score.
    #[arg(long, default_value_t = WeightSet::default().brightness, value_parser = non_negative)]
    pub w_brightness: f64,

    /// Weight of the composition score.
    #[arg(long, default_value_t = WeightSet::default().composition, value_parser = non_negative)]
    pub w_composition: f64,

    /// Rescale the weights to sum to 1 before scoring.
    #[arg(long)]
    pub normalize: bool,

    /// Haar cascade XML for face detection (default: $FRAMEPICK_CASCADE or
    /// the OpenCV install's frontal face cascade). Without OpenCV, fetch
    /// haarcascade_frontalface_default.xml from opencv/data/haarcascades on GitHub.
    #[arg(long)]
    pub cascade: Option<PathBuf>,
}

impl AnalysisArgs {
    pub fn to_config(&self) -> AnalysisConfig {
        let weights = WeightSet {
            sharpness: self.w_sharpness,
            face_clarity: self.w_face,
            brightness: self.w_brightness,
            composition: self.w_composition,
        };
        AnalysisConfig {
            sample_rate: self.rate,
            weights: if self.normalize { weights.normalized() } else { weights },
            cascade_path: self.cascade.clone(),
            ..AnalysisConfig::default()
        }
    }
}

fn parse_f64(raw: &str) -> Result<f64, String> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("{raw:?} is not a number"))
}

fn positive(raw: &str) -> Result<f64, String> {
    let v = parse_f64(raw)?;
    if v > 0.0 {
        Ok(v)
    } else {
        Err(format!("must be greater than 0, got {v}"))
    }
}

fn non_negative(raw: &str) -> Result<f64, String> {
    let v = parse_f64(raw)?;
    if v >= 0.0 {
        Ok(v)
    } else {
        Err(format!("must not be negative, got {v}"))
    }
}
