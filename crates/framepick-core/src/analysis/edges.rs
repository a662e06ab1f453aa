//! Canny edge detection straight on the luminance, with no smoothing pass.
//!
//! Gradients come from 3×3 Sobel kernels with replicated borders and the
//! magnitude is the L1 norm `|gx| + |gy|`. Thresholds are floored to whole
//! magnitudes and compared strictly.

use image::{GrayImage, Luma};
use imageproc::gradients::{horizontal_sobel, vertical_sobel};

/// `tan(22.5°)` in Q15 fixed point.
const TAN_22_5_Q15: i64 = 13573;

const SUPPRESSED: u8 = 0;
const WEAK: u8 = 1;
const STRONG: u8 = 2;

/// Edge map of `gray`: 255 on edges, 0 elsewhere.
pub fn canny(gray: &GrayImage, low: f32, high: f32) -> GrayImage {
    let (width, height) = gray.dimensions();
    let (w, h) = (width as usize, height as usize);
    let gx = horizontal_sobel(gray);
    let gy = vertical_sobel(gray);
    let low = low.floor() as i32;
    let high = high.floor() as i32;

    let mag: Vec<i32> = gx
        .pixels()
        .zip(gy.pixels())
        .map(|(dx, dy)| (dx[0] as i32).abs() + (dy[0] as i32).abs())
        .collect();
    // Magnitude outside the image reads as zero.
    let at = |x: isize, y: isize| -> i32 {
        if x < 0 || y < 0 || x >= w as isize || y >= h as isize {
            0
        } else {
            mag[y as usize * w + x as usize]
        }
    };

    let mut state = vec![SUPPRESSED; w * h];
    let mut stack = Vec::new();

    for y in 0..h {
        for x in 0..w {
            let i = y * w + x;
            let m = mag[i];
            if m <= low {
                continue;
            }

            let dx = gx.get_pixel(x as u32, y as u32)[0] as i64;
            let dy = gy.get_pixel(x as u32, y as u32)[0] as i64;
            let (xi, yi) = (x as isize, y as isize);
            let tg22 = dx.abs() * TAN_22_5_Q15;
            let ys = dy.abs() << 15;

            let local_max = if ys < tg22 {
                m > at(xi - 1, yi) && m >= at(xi + 1, yi)
            } else if ys > tg22 + (dx.abs() << 16) {
                m > at(xi, yi - 1) && m >= at(xi, yi + 1)
            } else {
                let s = if (dx < 0) != (dy < 0) { -1 } else { 1 };
                m > at(xi - s, yi - 1) && m > at(xi + s, yi + 1)
            };
            if !local_max {
                continue;
            }

            if m > high {
                state[i] = STRONG;
                stack.push(i);
            } else {
                state[i] = WEAK;
            }
        }
    }

    // Hysteresis: weak maxima survive when 8-connected to a strong one.
    while let Some(i) = stack.pop() {
        let (x, y) = ((i % w) as isize, (i / w) as isize);
        for ny in y - 1..=y + 1 {
            for nx in x - 1..=x + 1 {
                if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                    continue;
                }
                let j = ny as usize * w + nx as usize;
                if state[j] == WEAK {
                    state[j] = STRONG;
                    stack.push(j);
                }
            }
        }
    }

    GrayImage::from_fn(width, height, |x, y| {
        let strong = state[y as usize * w + x as usize] == STRONG;
        Luma([if strong { 255 } else { 0 }])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge_pixels(edges: &GrayImage) -> Vec<(u32, u32)> {
        edges
            .enumerate_pixels()
            .filter(|(_, _, p)| p[0] == 255)
            .map(|(x, y, _)| (x, y))
            .collect()
    }

    #[test]
    fn flat_image_has_no_edges() {
        let gray = GrayImage::from_pixel(32, 24, Luma([90]));
        assert!(edge_pixels(&canny(&gray, 50.0, 150.0)).is_empty());
    }

    #[test]
    fn moderate_step_gives_one_pixel_line() {
        // A 40-level step has an unsmoothed Sobel response of 160.
        let gray = GrayImage::from_fn(300, 300, |x, _| Luma([if x < 100 { 100 } else { 140 }]));
        let found = edge_pixels(&canny(&gray, 50.0, 150.0));
        assert_eq!(found.len(), 300);
        assert!(found.iter().all(|&(x, _)| x == 99));
    }

    #[test]
    fn weak_step_alone_is_dropped() {
        let gray = GrayImage::from_fn(20, 20, |x, _| Luma([if x < 10 { 100 } else { 120 }]));
        assert!(edge_pixels(&canny(&gray, 50.0, 150.0)).is_empty());
    }

    #[test]
    fn weak_step_joined_to_strong_is_kept() {
        // Upper half steps by 40 (strong), lower half by 20 (weak only).
        let gray = GrayImage::from_fn(20, 20, |x, y| {
            Luma([match (x < 10, y < 10) {
                (true, _) => 100,
                (false, true) => 140,
                (false, false) => 120,
            }])
        });
        let edges = canny(&gray, 50.0, 150.0);
        assert_eq!(edges.get_pixel(9, 0)[0], 255);
        assert_eq!(edges.get_pixel(9, 19)[0], 255);
        assert_eq!(edges.get_pixel(5, 19)[0], 0);
    }
}
