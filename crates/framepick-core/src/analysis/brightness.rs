use image::{GrayImage, RgbImage};
use imageproc::stats::histogram;
use tracing::debug;

use super::common::luminance;
use crate::error::Result;

/// Mean luminance that earns the full exposure sub-score.
const MID_GRAY: f64 = 127.0;
/// Bins `[0, DARK_END)` count as crushed shadows.
const DARK_END: usize = 10;
/// Bins `[BRIGHT_START, 256)` count as blown highlights.
const BRIGHT_START: usize = 246;

/// Luminance statistics of one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrightnessStats {
    pub mean: f64,
    /// Population standard deviation.
    pub std: f64,
    pub min: u8,
    pub max: u8,
    /// Percentage of pixels in the dark clipping bins, `[0, 100]`.
    pub dark_percent: f64,
    /// Percentage of pixels in the bright clipping bins, `[0, 100]`.
    pub bright_percent: f64,
}

impl BrightnessStats {
    pub fn of(gray: &GrayImage) -> Self {
        let hist = histogram(gray).channels[0];
        let total = gray.width() as f64 * gray.height() as f64;

        let mean = hist
            .iter()
            .enumerate()
            .map(|(v, &n)| v as f64 * n as f64)
            .sum::<f64>()
            / total;
        let variance = hist
            .iter()
            .enumerate()
            .map(|(v, &n)| n as f64 * (v as f64 - mean).powi(2))
            .sum::<f64>()
            / total;

        let min = hist.iter().position(|&n| n > 0).unwrap_or(0) as u8;
        let max = hist.iter().rposition(|&n| n > 0).unwrap_or(0) as u8;
        let percent = |bins: &[u32]| bins.iter().map(|&n| n as f64).sum::<f64>() / total * 100.0;

        Self {
            mean,
            std: variance.sqrt(),
            min,
            max,
            dark_percent: percent(&hist[..DARK_END]),
            bright_percent: percent(&hist[BRIGHT_START..]),
        }
    }

    /// Clipped share of the frame in `[0, 1]`, as the clipping term uses it.
    pub fn clipped_fraction(&self) -> f64 {
        (self.dark_percent + self.bright_percent) / 100.0
    }
}

pub fn brightness_stats(image: &RgbImage) -> Result<BrightnessStats> {
    Ok(BrightnessStats::of(&luminance(image)?))
}

/// Up to 50 points for a mean near mid-gray, falling to 0 at either extreme.
pub fn exposure_centering(mean: f64) -> f64 {
    50.0 * (1.0 - (mean - MID_GRAY).abs() / MID_GRAY)
}

/// 30 points minus one per clipped percent, floored at 0.
pub fn clipping_score(clipped_fraction: f64) -> f64 {
    (30.0 - clipped_fraction * 100.0).max(0.0)
}

/// Step score for luminance spread. Band edges belong to the better band.
pub fn contrast_band(std: f64) -> f64 {
    if (40.0..=80.0).contains(&std) {
        20.0
    } else if (30.0..40.0).contains(&std) || (std > 80.0 && std <= 100.0) {
        15.0
    } else if (20.0..30.0).contains(&std) || (std > 100.0 && std <= 120.0) {
        10.0
    } else {
        5.0
    }
}

/// Exposure balance in `[0, 100]`.
pub fn brightness(image: &RgbImage) -> Result<f64> {
    let stats = brightness_stats(image)?;
    let centering = exposure_centering(stats.mean);
    let clipping = clipping_score(stats.clipped_fraction());
    let contrast = contrast_band(stats.std);
    let score = (centering + clipping + contrast).clamp(0.0, 100.0);
    debug!(
        mean = stats.mean,
        std = stats.std,
        centering,
        clipping,
        contrast,
        score,
        "brightness"
    );
    Ok(score)
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;

    fn uniform(v: u8) -> RgbImage {
        RgbImage::from_pixel(40, 30, Rgb([v, v, v]))
    }

    #[test]
    fn mid_gray_scores_full_centering_and_low_contrast() {
        let stats = brightness_stats(&uniform(127)).unwrap();
        assert_eq!(stats.mean, 127.0);
        assert_eq!(stats.std, 0.0);
        assert_eq!(exposure_centering(stats.mean), 50.0);
        assert_eq!(contrast_band(stats.std), 5.0);

        let score = brightness(&uniform(127)).unwrap();
        assert_eq!(score, 85.0);
        assert!(score < 100.0);
    }

    #[test]
    fn black_frame_is_fully_clipped() {
        let stats = brightness_stats(&uniform(0)).unwrap();
        assert_eq!(stats.dark_percent, 100.0);
        assert_eq!(stats.bright_percent, 0.0);
        assert_eq!(clipping_score(stats.clipped_fraction()), 0.0);
        assert_eq!(brightness(&uniform(0)).unwrap(), 5.0);
    }

    #[test]
    fn white_frame_is_fully_clipped() {
        let stats = brightness_stats(&uniform(255)).unwrap();
        assert_eq!(stats.bright_percent, 100.0);
        assert_eq!((stats.min, stats.max), (255, 255));
        // Centering is slightly negative at 255 and the total is clamped.
        assert!(exposure_centering(255.0) < 0.0);
        assert!((brightness(&uniform(255)).unwrap() - (5.0 + exposure_centering(255.0))).abs() < 1e-9);
    }

    #[test]
    fn split_frame_statistics() {
        let image = RgbImage::from_fn(40, 30, |x, _| {
            let v = if x < 20 { 0 } else { 255 };
            Rgb([v, v, v])
        });
        let stats = brightness_stats(&image).unwrap();
        assert_eq!(stats.mean, 127.5);
        assert_eq!(stats.std, 127.5);
        assert_eq!((stats.min, stats.max), (0, 255));
        assert_eq!(stats.clipped_fraction(), 1.0);
    }

    #[test]
    fn clipped_shares_are_percentages() {
        // 30 of 40 columns at 5 (dark bins), 10 at 250 (bright bins).
        let image = RgbImage::from_fn(40, 30, |x, _| {
            let v = if x < 30 { 5 } else { 250 };
            Rgb([v, v, v])
        });
        let stats = brightness_stats(&image).unwrap();
        assert_eq!(stats.dark_percent, 75.0);
        assert_eq!(stats.bright_percent, 25.0);
        assert_eq!(stats.clipped_fraction(), 1.0);
    }

    #[test]
    fn clipping_zeroes_above_thirty_percent() {
        assert_eq!(clipping_score(0.0), 30.0);
        assert!((clipping_score(0.1) - 20.0).abs() < 1e-9);
        assert_eq!(clipping_score(0.3), 0.0);
        assert_eq!(clipping_score(0.75), 0.0);
    }

    #[test]
    fn contrast_band_edges() {
        assert_eq!(contrast_band(40.0), 20.0);
        assert_eq!(contrast_band(39.999), 15.0);
        assert_eq!(contrast_band(80.0), 20.0);
        assert_eq!(contrast_band(80.001), 15.0);
        assert_eq!(contrast_band(100.0), 15.0);
        assert_eq!(contrast_band(30.0), 15.0);
        assert_eq!(contrast_band(29.9), 10.0);
        assert_eq!(contrast_band(20.0), 10.0);
        assert_eq!(contrast_band(120.0), 10.0);
        assert_eq!(contrast_band(120.5), 5.0);
        assert_eq!(contrast_band(19.99), 5.0);
        assert_eq!(contrast_band(0.0), 5.0);
    }
}
