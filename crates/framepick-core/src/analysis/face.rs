use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{GrayImage, RgbImage};
use once_cell::sync::OnceCell;
use tracing::{debug, info};

use super::cascade::{DetectParams, HaarCascade};
use super::common::luminance;
use crate::error::{Error, Result};
use crate::rect::PixelRect;

/// Environment variable naming the cascade file to use by default.
pub const CASCADE_ENV: &str = "FRAMEPICK_CASCADE";

const CASCADE_FILE: &str = "haarcascade_frontalface_default.xml";

/// Upstream home of the stock cascades.
pub const CASCADE_SOURCE: &str = "https://github.com/opencv/opencv/tree/4.x/data/haarcascades";

/// Directories OpenCV packages usually install their cascades into.
const CASCADE_DIRS: &[&str] = &[
    "/usr/share/opencv4/haarcascades",
    "/usr/share/opencv/haarcascades",
    "/usr/local/share/opencv4/haarcascades",
    "/usr/local/share/opencv/haarcascades",
    "/opt/homebrew/share/opencv4/haarcascades",
];

/// Finds face bounding boxes in a luminance image.
pub trait FaceDetector: Send + Sync {
    fn detect(&self, gray: &GrayImage, params: &DetectParams) -> Vec<PixelRect>;
}

impl FaceDetector for HaarCascade {
    fn detect(&self, gray: &GrayImage, params: &DetectParams) -> Vec<PixelRect> {
        HaarCascade::detect(self, gray, params)
    }
}

/// Face prominence score for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceScore {
    /// `[0, 100]`.
    pub score: f64,
    pub count: usize,
}

/// Raw face boxes for a frame, as the score sees them.
pub fn face_regions(
    image: &RgbImage,
    detector: &dyn FaceDetector,
    params: &DetectParams,
) -> Result<Vec<PixelRect>> {
    let gray = luminance(image)?;
    Ok(detector.detect(&gray, params))
}

pub fn score_faces(
    image: &RgbImage,
    detector: &dyn FaceDetector,
    params: &DetectParams,
) -> Result<FaceScore> {
    let faces = face_regions(image, detector, params)?;
    let frame_area = image.width() as u64 * image.height() as u64;
    let result = score_face_regions(&faces, frame_area);
    debug!(count = result.count, score = result.score, "face clarity");
    Ok(result)
}

/// Bonus for the number of faces: a few faces suit a thumbnail, crowds do not.
fn count_bonus(count: usize) -> f64 {
    match count {
        0 => 0.0,
        1..=3 => 30.0,
        4 => 20.0,
        5 => 10.0,
        _ => 5.0,
    }
}

/// Score boxes on a frame of `frame_area` pixels. Overlapping boxes are
/// counted in full, so coverage itself is not capped.
pub fn score_face_regions(faces: &[PixelRect], frame_area: u64) -> FaceScore {
    if faces.is_empty() || frame_area == 0 {
        return FaceScore {
            score: 0.0,
            count: 0,
        };
    }

    let covered: u64 = faces.iter().map(PixelRect::area).sum();
    let coverage = covered as f64 / frame_area as f64 * 100.0;
    let base = (coverage * 3.0).min(70.0);
    FaceScore {
        score: (base + count_bonus(faces.len())).min(100.0),
        count: faces.len(),
    }
}

/// Resolve the default cascade: `$FRAMEPICK_CASCADE`, then the usual OpenCV
/// install directories.
pub fn locate_cascade() -> Result<PathBuf> {
    if let Some(path) = env::var_os(CASCADE_ENV) {
        return Ok(PathBuf::from(path));
    }
    CASCADE_DIRS
        .iter()
        .map(|dir| Path::new(dir).join(CASCADE_FILE))
        .find(|p| p.is_file())
        .ok_or_else(cascade_not_found)
}

fn cascade_not_found() -> Error {
    Error::CascadeUnavailable(format!(
        "{CASCADE_FILE} not found; install OpenCV's data files or download it from \
         {CASCADE_SOURCE}, then set {CASCADE_ENV} or pass a cascade path"
    ))
}

static DEFAULT_CASCADE: OnceCell<Arc<HaarCascade>> = OnceCell::new();

/// The process-wide default cascade, loaded on first use and shared after.
pub fn default_detector() -> Result<Arc<HaarCascade>> {
    DEFAULT_CASCADE
        .get_or_try_init(|| {
            let path = locate_cascade()?;
            info!(?path, "initializing shared face cascade");
            HaarCascade::load(&path).map(Arc::new)
        })
        .cloned()
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;
    use crate::analysis::cascade::tests::{block_scene, LEFT_BRIGHT_CASCADE};

    /// Detector returning a fixed set of boxes regardless of input.
    struct Fixed(Vec<PixelRect>);

    impl FaceDetector for Fixed {
        fn detect(&self, _: &GrayImage, _: &DetectParams) -> Vec<PixelRect> {
            self.0.clone()
        }
    }

    fn square(side: u32) -> PixelRect {
        PixelRect { x: 0, y: 0, w: side, h: side }
    }

    #[test]
    fn no_faces_scores_exactly_zero() {
        let frame = RgbImage::from_pixel(64, 48, Rgb([30, 60, 90]));
        let result = score_faces(&frame, &Fixed(Vec::new()), &DetectParams::default()).unwrap();
        assert_eq!(result, FaceScore { score: 0.0, count: 0 });
    }

    #[test]
    fn real_cascade_on_blank_frame_finds_nothing() {
        let cascade = HaarCascade::from_xml(LEFT_BRIGHT_CASCADE).unwrap();
        let frame = RgbImage::from_pixel(120, 90, Rgb([128, 128, 128]));
        let result = score_faces(&frame, &cascade, &DetectParams::default()).unwrap();
        assert_eq!(result, FaceScore { score: 0.0, count: 0 });
    }

    #[test]
    fn real_cascade_scores_one_grouped_face() {
        let cascade = HaarCascade::from_xml(LEFT_BRIGHT_CASCADE).unwrap();
        let gray = block_scene();
        let frame = RgbImage::from_fn(gray.width(), gray.height(), |x, y| {
            let v = gray.get_pixel(x, y)[0];
            Rgb([v, v, v])
        });

        let faces = face_regions(&frame, &cascade, &DetectParams::default()).unwrap();
        assert_eq!(faces, vec![PixelRect { x: 21, y: 6, w: 35, h: 35 }]);

        // 35x35 on 64x48 covers ~39.9%, so the coverage term is capped.
        let result = score_faces(&frame, &cascade, &DetectParams::default()).unwrap();
        assert_eq!(result, FaceScore { score: 100.0, count: 1 });
    }

    #[test]
    fn missing_cascade_says_where_to_get_one() {
        let msg = cascade_not_found().to_string();
        assert!(msg.contains(CASCADE_FILE));
        assert!(msg.contains(CASCADE_SOURCE));
        assert!(msg.contains(CASCADE_ENV));
    }

    #[test]
    fn single_small_face() {
        // 10x10 on 100x100: 1% coverage -> base 3, +30 bonus.
        let result = score_face_regions(&[square(10)], 100 * 100);
        assert_eq!(result.count, 1);
        assert!((result.score - 33.0).abs() < 1e-9);
    }

    #[test]
    fn coverage_base_caps_at_seventy() {
        let result = score_face_regions(&[square(60)], 100 * 100);
        assert_eq!(result.score, 100.0);
    }

    #[test]
    fn count_bonus_steps() {
        let tiny = square(1);
        let area = 1_000_000;
        let score = |n: usize| score_face_regions(&vec![tiny; n], area).score;
        assert!((score(3) - (30.0 + 3.0 * 3e-4)).abs() < 1e-9);
        assert!((score(4) - (20.0 + 4.0 * 3e-4)).abs() < 1e-9);
        assert!((score(5) - (10.0 + 5.0 * 3e-4)).abs() < 1e-9);
        assert!((score(6) - (5.0 + 6.0 * 3e-4)).abs() < 1e-9);
        assert!((score(12) - (5.0 + 12.0 * 3e-4)).abs() < 1e-9);
    }

    #[test]
    fn overlapping_boxes_are_summed() {
        // Two identical boxes each covering the whole frame: 200% coverage.
        let faces = vec![square(10), square(10)];
        let result = score_face_regions(&faces, 100);
        assert_eq!(result.count, 2);
        assert_eq!(result.score, 100.0);
    }

    #[test]
    fn regions_pass_through() {
        let boxes = vec![PixelRect { x: 5, y: 6, w: 30, h: 31 }];
        let frame = RgbImage::new(80, 60);
        let found = face_regions(&frame, &Fixed(boxes.clone()), &DetectParams::default()).unwrap();
        assert_eq!(found, boxes);
    }
}
