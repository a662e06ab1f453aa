//! Annotated copies of frames for previews.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

use crate::rect::PixelRect;

const GRID_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const FACE_COLOR: Rgb<u8> = Rgb([255, 64, 0]);
const DOT_RADIUS: i32 = 8;

/// Copy of `image` with the rule-of-thirds lines and their four intersections.
pub fn rule_of_thirds(image: &RgbImage) -> RgbImage {
    let mut out = image.clone();
    let (width, height) = image.dimensions();
    let third_w = width / 3;
    let third_h = height / 3;
    let (w, h) = (width as f32, height as f32);

    // Lines are two pixels thick.
    for offset in [0.0, 1.0] {
        for y in [third_h, 2 * third_h] {
            let y = y as f32 + offset;
            draw_line_segment_mut(&mut out, (0.0, y), (w, y), GRID_COLOR);
        }
        for x in [third_w, 2 * third_w] {
            let x = x as f32 + offset;
            draw_line_segment_mut(&mut out, (x, 0.0), (x, h), GRID_COLOR);
        }
    }

    for x in [third_w, 2 * third_w] {
        for y in [third_h, 2 * third_h] {
            draw_filled_circle_mut(&mut out, (x as i32, y as i32), DOT_RADIUS, GRID_COLOR);
        }
    }
    out
}

/// Copy of `image` with each face box outlined.
pub fn face_boxes(image: &RgbImage, faces: &[PixelRect]) -> RgbImage {
    let mut out = image.clone();
    for face in faces.iter().filter(|f| f.w > 0 && f.h > 0) {
        let rect = Rect::at(face.x as i32, face.y as i32).of_size(face.w, face.h);
        draw_hollow_rect_mut(&mut out, rect, FACE_COLOR);
    }
    out
}
