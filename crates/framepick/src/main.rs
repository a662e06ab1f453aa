mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use framepick_core::pipeline;
use framepick_core::video::info::{probe_info, VideoInfo};
use framepick_core::ScoreBreakdown;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = cli::Cli::parse();

    match cli.command {
        cli::Command::Best { analysis } => {
            let config = analysis.to_config();
            info!(input = ?analysis.input, rate = config.sample_rate, weights = %config.weights, "finding best frame");

            let video = probe_info(&analysis.input).context("failed to probe video")?;
            let bar = scoring_bar();
            let report = |done: usize, total: usize| {
                bar.set_length(total as u64);
                bar.set_position(done as u64);
            };
            let thumb = pipeline::run_pipeline(&analysis.input, &config, &report)
                .context("frame selection failed")?;
            bar.finish_and_clear();

            let ts = thumb.sample.timestamp_seconds;
            println!("source:     {}", analysis.input.display());
            println!("video:      {video}");
            println!("selected:   sample {} of {}", thumb.index, thumb.frames_analyzed);
            println!("timestamp:  {} ({ts:.2} s)", format_mm_ss(ts));
            println!("frame:      {}", video.frame_position(ts));
            print_breakdown(&thumb.scores);
            Ok(())
        }
        cli::Command::Scores { analysis } => {
            let config = analysis.to_config();
            info!(input = ?analysis.input, rate = config.sample_rate, "scoring all sampled frames");

            let bar = scoring_bar();
            let report = |done: usize, total: usize| {
                bar.set_length(total as u64);
                bar.set_position(done as u64);
            };
            let scored = pipeline::score_video(&analysis.input, &config, &report)
                .context("scoring failed")?;
            bar.finish_and_clear();

            for (ts, scores) in &scored {
                println!("{} {ts:>9.2}s  {scores}", format_mm_ss(*ts));
            }
            Ok(())
        }
        cli::Command::Info { input } => {
            let video = probe_info(&input).context("failed to probe video")?;
            print_info(&video);
            Ok(())
        }
    }
}

fn scoring_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        bar.set_style(style.progress_chars("#>-"));
    }
    bar.set_message("scoring frames");
    bar
}

/// `MM:SS`, truncating fractional seconds.
fn format_mm_ss(seconds: f64) -> String {
    let whole = seconds.max(0.0) as u64;
    format!("{:02}:{:02}", whole / 60, whole % 60)
}

fn print_breakdown(scores: &ScoreBreakdown) {
    println!("overall:     {:6.2}/100", scores.overall);
    println!("sharpness:   {:6.2}/100", scores.sharpness);
    println!("face:        {:6.2}/100 ({} detected)", scores.face_clarity, scores.face_count);
    println!("brightness:  {:6.2}/100", scores.brightness);
    println!("composition: {:6.2}/100", scores.composition);
}

fn print_info(video: &VideoInfo) {
    println!("resolution:  {}", video.resolution());
    println!("fps:         {:.2}", video.fps);
    println!("frames:      {}", video.total_frames);
    println!("duration:    {:.2} s", video.duration_seconds);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mm_ss_formatting() {
        assert_eq!(format_mm_ss(0.0), "00:00");
        assert_eq!(format_mm_ss(61.9), "01:01");
        assert_eq!(format_mm_ss(3599.0), "59:59");
    }
}
