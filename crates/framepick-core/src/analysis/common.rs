use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::integral_image::{integral_image, integral_squared_image};
use imageproc::map::map_colors;

use crate::error::{Error, Result};

/// BT.601 luma in 14-bit fixed point. The coefficients sum to 1 << 14, so
/// gray pixels map to themselves exactly.
const R_TO_Y: u32 = 4899;
const G_TO_Y: u32 = 9617;
const B_TO_Y: u32 = 1868;
const Y_SHIFT: u32 = 14;

pub fn luma(rgb: Rgb<u8>) -> u8 {
    let [r, g, b] = rgb.0;
    let y = r as u32 * R_TO_Y + g as u32 * G_TO_Y + b as u32 * B_TO_Y + (1 << (Y_SHIFT - 1));
    (y >> Y_SHIFT) as u8
}

/// Single-channel luminance copy of a frame.
pub fn luminance(image: &RgbImage) -> Result<GrayImage> {
    ensure_non_empty(image.width(), image.height())?;
    Ok(map_colors(image, |p| Luma([luma(p)])))
}

pub fn ensure_non_empty(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(Error::InvalidFrame { width, height });
    }
    Ok(())
}

/// Fractional bits of the resampling weights.
const WEIGHT_BITS: u32 = 8;
const WEIGHT_ONE: u32 = 1 << WEIGHT_BITS;

/// Two-tap sampling positions along one axis: `(lo, hi, w_lo, w_hi)`.
fn linear_taps(dst_len: u32, src_len: u32) -> Vec<(usize, usize, u32, u32)> {
    let scale = src_len as f64 / dst_len as f64;
    let last = src_len as usize - 1;
    (0..dst_len)
        .map(|d| {
            // Pixel centres line up; samples past either edge clamp to it.
            let pos = (d as f64 + 0.5) * scale - 0.5;
            let mut lo = pos.floor();
            let mut frac = pos - lo;
            if lo < 0.0 {
                lo = 0.0;
                frac = 0.0;
            }
            let mut lo = lo as usize;
            if lo >= last {
                lo = last;
                frac = 0.0;
            }
            let w_hi = (frac * WEIGHT_ONE as f64).round() as u32;
            (lo, (lo + 1).min(last), WEIGHT_ONE - w_hi, w_hi)
        })
        .collect()
}

/// Bilinear resize in fixed point, for downscaling detection pyramids.
/// Weights carry 8 fractional bits per axis and the result is rounded once.
pub fn resize_bilinear(image: &GrayImage, width: u32, height: u32) -> GrayImage {
    let (src_w, src_h) = image.dimensions();
    if width == 0 || height == 0 || src_w == 0 || src_h == 0 {
        return GrayImage::new(width, height);
    }

    let cols = linear_taps(width, src_w);
    let rows = linear_taps(height, src_h);
    let src = image.as_raw();
    let stride = src_w as usize;
    let px = |x: usize, y: usize| src[y * stride + x] as u32;
    let round = 1u32 << (2 * WEIGHT_BITS - 1);

    let mut out = Vec::with_capacity(width as usize * height as usize);
    for &(y0, y1, wy0, wy1) in &rows {
        for &(x0, x1, wx0, wx1) in &cols {
            let top = px(x0, y0) * wx0 + px(x1, y0) * wx1;
            let bottom = px(x0, y1) * wx0 + px(x1, y1) * wx1;
            let v = (top * wy0 + bottom * wy1 + round) >> (2 * WEIGHT_BITS);
            out.push(v.min(255) as u8);
        }
    }
    GrayImage::from_raw(width, height, out).unwrap_or_else(|| GrayImage::new(width, height))
}

/// Summed-area table over a grayscale image, for O(1) rectangle sums.
pub struct SummedArea {
    stride: usize,
    table: Vec<u64>,
}

impl SummedArea {
    pub fn of(image: &GrayImage) -> Self {
        let table: image::ImageBuffer<Luma<u64>, Vec<u64>> = integral_image(image);
        Self {
            stride: table.width() as usize,
            table: table.into_raw(),
        }
    }

    pub fn of_squares(image: &GrayImage) -> Self {
        let table: image::ImageBuffer<Luma<u64>, Vec<u64>> = integral_squared_image(image);
        Self {
            stride: table.width() as usize,
            table: table.into_raw(),
        }
    }

    #[inline]
    fn at(&self, x: u32, y: u32) -> i64 {
        self.table[y as usize * self.stride + x as usize] as i64
    }

    /// Sum of the pixels in `[x, x + w) × [y, y + h)`.
    #[inline]
    pub fn sum(&self, x: u32, y: u32, w: u32, h: u32) -> i64 {
        self.at(x + w, y + h) - self.at(x, y + h) - self.at(x + w, y) + self.at(x, y)
    }
}
