use image::{GrayImage, RgbImage};
use tracing::debug;

use super::common::luminance;
use crate::error::Result;

/// Scores at or above this are considered in focus by [`is_sharp`].
pub const DEFAULT_SHARP_THRESHOLD: f64 = 30.0;

/// Focus score in `[0, 100]`: `min(100, var(laplacian) / 10)`.
pub fn sharpness(image: &RgbImage) -> Result<f64> {
    let gray = luminance(image)?;
    let variance = laplacian_variance(&gray);
    let score = (variance / 10.0).min(100.0);
    debug!(variance, score, "sharpness");
    Ok(score)
}

pub fn is_sharp(image: &RgbImage, threshold: f64) -> Result<bool> {
    Ok(sharpness(image)? >= threshold)
}

/// Mirror an out-of-range index back inside `0..len` without repeating the
/// border sample.
#[inline]
fn reflect(i: i64, len: i64) -> i64 {
    if len == 1 {
        return 0;
    }
    if i < 0 {
        -i
    } else if i >= len {
        2 * len - 2 - i
    } else {
        i
    }
}

/// Population variance of the 4-neighbour Laplacian
/// `[0 1 0; 1 -4 1; 0 1 0]`, accumulated in `f64`.
pub fn laplacian_variance(gray: &GrayImage) -> f64 {
    let (width, height) = gray.dimensions();
    let (w, h) = (width as i64, height as i64);
    if w == 0 || h == 0 {
        return 0.0;
    }

    let px = |x: i64, y: i64| -> f64 {
        gray.get_pixel(reflect(x, w) as u32, reflect(y, h) as u32)[0] as f64
    };

    let mut response = Vec::with_capacity((w * h) as usize);
    for y in 0..h {
        for x in 0..w {
            let lap = px(x, y - 1) + px(x, y + 1) + px(x - 1, y) + px(x + 1, y) - 4.0 * px(x, y);
            response.push(lap);
        }
    }

    let n = response.len() as f64;
    let mean = response.iter().sum::<f64>() / n;
    response.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;

    fn stripes(width: u32, height: u32, amplitude: u8) -> RgbImage {
        RgbImage::from_fn(width, height, |x, _| {
            let v = if x % 2 == 0 { 128 - amplitude / 2 } else { 128 + amplitude / 2 };
            Rgb([v, v, v])
        })
    }

    #[test]
    fn flat_frame_scores_zero() {
        let image = RgbImage::from_pixel(32, 24, Rgb([90, 90, 90]));
        assert_eq!(sharpness(&image).unwrap(), 0.0);
        assert!(!is_sharp(&image, DEFAULT_SHARP_THRESHOLD).unwrap());
    }

    #[test]
    fn single_spike_variance() {
        // Centre -36, edge midpoints +18 through reflection, corners 0.
        let mut image = RgbImage::new(3, 3);
        image.put_pixel(1, 1, Rgb([9, 9, 9]));
        let gray = luminance(&image).unwrap();
        assert!((laplacian_variance(&gray) - 272.0).abs() < 1e-9);
        assert!((sharpness(&image).unwrap() - 27.2).abs() < 1e-9);
    }

    #[test]
    fn stronger_detail_never_scores_lower() {
        let mut last = 0.0;
        for amplitude in [0u8, 4, 8, 16, 32, 64, 128, 200] {
            let score = sharpness(&stripes(40, 30, amplitude)).unwrap();
            assert!(score >= last, "amplitude {amplitude}: {score} < {last}");
            last = score;
        }
    }

    #[test]
    fn score_caps_at_hundred() {
        let score = sharpness(&stripes(40, 30, 200)).unwrap();
        assert_eq!(score, 100.0);
        assert!(is_sharp(&stripes(40, 30, 200), DEFAULT_SHARP_THRESHOLD).unwrap());
    }

    #[test]
    fn single_pixel_frame() {
        let image = RgbImage::from_pixel(1, 1, Rgb([255, 0, 0]));
        assert_eq!(sharpness(&image).unwrap(), 0.0);
    }

    #[test]
    fn metric_does_not_touch_input() {
        let image = stripes(10, 10, 50);
        let before = image.clone();
        sharpness(&image).unwrap();
        assert_eq!(image, before);
    }
}
