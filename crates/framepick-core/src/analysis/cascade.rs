//! Viola–Jones Haar cascade evaluation.
//!
//! Cascades are read from the OpenCV XML storage format
//! (`<opencv_storage><cascade>` with `BOOST` stages over `HAAR` features),
//! the format of the stock `haarcascade_frontalface_default.xml`.

use std::path::Path;

use image::GrayImage;
use roxmltree::{Document, Node};
use tracing::{debug, info, warn};

use super::common::{resize_bilinear, SummedArea};
use crate::error::{Error, Result};
use crate::rect::PixelRect;

/// Knobs for multi-scale detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectParams {
    /// Window growth between pyramid levels.
    pub scale_factor: f64,
    /// A group needs strictly more raw hits than this to be reported.
    pub min_neighbors: u32,
    /// Smallest reported window, `(width, height)`.
    pub min_size: (u32, u32),
}

impl Default for DetectParams {
    fn default() -> Self {
        Self {
            scale_factor: 1.1,
            min_neighbors: 5,
            min_size: (30, 30),
        }
    }
}

/// Relative tolerance used when merging neighbouring hits.
const GROUP_EPS: f64 = 0.2;

#[derive(Debug, Clone, Copy)]
struct WeightedRect {
    x: u32,
    y: u32,
    w: u32,
    h: u32,
    weight: f64,
}

#[derive(Debug, Clone)]
struct Feature {
    rects: Vec<WeightedRect>,
}

#[derive(Debug, Clone, Copy)]
struct TreeNode {
    /// `> 0` is a child node index, `<= 0` is `-leaf_index`.
    left: i32,
    right: i32,
    feature: usize,
    threshold: f64,
}

#[derive(Debug, Clone)]
struct WeakClassifier {
    nodes: Vec<TreeNode>,
    leaves: Vec<f64>,
}

#[derive(Debug, Clone)]
struct Stage {
    threshold: f64,
    classifiers: Vec<WeakClassifier>,
}

/// A boosted cascade of Haar-feature classifiers over a fixed base window.
#[derive(Debug, Clone)]
pub struct HaarCascade {
    window: (u32, u32),
    stages: Vec<Stage>,
    features: Vec<Feature>,
}

fn format_err(msg: impl Into<String>) -> Error {
    Error::CascadeFormat(msg.into())
}

fn child<'a, 'i>(node: Node<'a, 'i>, name: &str) -> Result<Node<'a, 'i>> {
    node.children()
        .find(|n| n.has_tag_name(name))
        .ok_or_else(|| format_err(format!("missing <{name}> in <{}>", node.tag_name().name())))
}

fn text<'a>(node: Node<'a, '_>, name: &str) -> Result<&'a str> {
    Ok(child(node, name)?.text().unwrap_or_default().trim())
}

/// `<_>` list items of a sequence element.
fn items<'a, 'i>(node: Node<'a, 'i>) -> impl Iterator<Item = Node<'a, 'i>> {
    node.children().filter(|n| n.has_tag_name("_"))
}

fn numbers(raw: &str) -> Result<Vec<f64>> {
    raw.split_whitespace()
        .map(|t| t.parse::<f64>().map_err(|_| format_err(format!("bad number {t:?}"))))
        .collect()
}

fn parse_u32(raw: &str, what: &str) -> Result<u32> {
    raw.parse()
        .map_err(|_| format_err(format!("bad {what} {raw:?}")))
}

impl HaarCascade {
    pub fn load(path: &Path) -> Result<Self> {
        let xml = std::fs::read_to_string(path).map_err(|e| {
            Error::CascadeUnavailable(format!("cannot read {}: {e}", path.display()))
        })?;
        let cascade = Self::from_xml(&xml)?;
        info!(
            ?path,
            stages = cascade.stages.len(),
            features = cascade.features.len(),
            window_w = cascade.window.0,
            window_h = cascade.window.1,
            "loaded face cascade"
        );
        Ok(cascade)
    }

    pub fn from_xml(xml: &str) -> Result<Self> {
        let doc = Document::parse(xml).map_err(|e| format_err(e.to_string()))?;
        let cascade = doc
            .descendants()
            .find(|n| n.has_tag_name("cascade"))
            .ok_or_else(|| format_err("no <cascade> element"))?;

        let stage_type = text(cascade, "stageType")?;
        let feature_type = text(cascade, "featureType")?;
        if stage_type != "BOOST" || feature_type != "HAAR" {
            return Err(format_err(format!(
                "unsupported cascade {stage_type}/{feature_type}, expected BOOST/HAAR"
            )));
        }

        let width = parse_u32(text(cascade, "width")?, "width")?;
        let height = parse_u32(text(cascade, "height")?, "height")?;
        if width < 3 || height < 3 {
            return Err(format_err(format!("window {width}x{height} is too small")));
        }

        let features = items(child(cascade, "features")?)
            .map(|f| parse_feature(f, width, height))
            .collect::<Result<Vec<_>>>()?;

        let stages = items(child(cascade, "stages")?)
            .map(|s| parse_stage(s, features.len()))
            .collect::<Result<Vec<_>>>()?;
        if stages.is_empty() {
            return Err(format_err("cascade has no stages"));
        }

        Ok(Self {
            window: (width, height),
            stages,
            features,
        })
    }

    /// Base window size, `(width, height)`.
    pub fn window(&self) -> (u32, u32) {
        self.window
    }

    /// Run the cascade over an image pyramid and merge overlapping hits.
    ///
    /// Levels grow the window by `scale_factor` until it no longer fits the
    /// image; the image is shrunk instead of the features.
    pub fn detect(&self, gray: &GrayImage, params: &DetectParams) -> Vec<PixelRect> {
        let (img_w, img_h) = gray.dimensions();
        let (win_w, win_h) = self.window;
        let mut candidates = Vec::new();
        let mut factor = 1.0_f64;

        if !(params.scale_factor > 1.0) {
            warn!(scale_factor = params.scale_factor, "scale factor must exceed 1, skipping detection");
            return candidates;
        }

        loop {
            let size_w = (win_w as f64 * factor).round() as u32;
            let size_h = (win_h as f64 * factor).round() as u32;
            if size_w > img_w || size_h > img_h {
                break;
            }

            let scaled_w = (img_w as f64 / factor).round() as u32;
            let scaled_h = (img_h as f64 / factor).round() as u32;
            let wanted = size_w >= params.min_size.0 && size_h >= params.min_size.1;
            if wanted && scaled_w >= win_w && scaled_h >= win_h {
                let resized;
                let level = if scaled_w == img_w && scaled_h == img_h {
                    gray
                } else {
                    resized = resize_bilinear(gray, scaled_w, scaled_h);
                    &resized
                };

                let before = candidates.len();
                self.scan_level(level, factor, (size_w, size_h), &mut candidates);
                debug!(factor, scaled_w, scaled_h, hits = candidates.len() - before, "pyramid level");
            }

            factor *= params.scale_factor;
        }

        group_rectangles(&candidates, params.min_neighbors, GROUP_EPS)
    }

    fn scan_level(
        &self,
        level: &GrayImage,
        factor: f64,
        size: (u32, u32),
        out: &mut Vec<PixelRect>,
    ) {
        let (win_w, win_h) = self.window;
        let sums = SummedArea::of(level);
        let squares = SummedArea::of_squares(level);
        let step: u32 = if factor > 2.0 { 1 } else { 2 };
        let (last_x, last_y) = (level.width() - win_w, level.height() - win_h);

        for y in (0..=last_y).step_by(step as usize) {
            let mut x = 0;
            while x <= last_x {
                match self.rejecting_stage(&sums, &squares, x, y) {
                    None => out.push(PixelRect {
                        x: (x as f64 * factor).round() as u32,
                        y: (y as f64 * factor).round() as u32,
                        w: size.0,
                        h: size.1,
                    }),
                    // Rejected outright: the neighbouring window is skipped too.
                    Some(0) => x += step,
                    Some(_) => {}
                }
                x += step;
            }
        }
    }

    /// Run the stages on the window whose top-left corner is `(x, y)`.
    /// `None` means every stage passed; otherwise the index of the first
    /// stage that rejected the window.
    fn rejecting_stage(&self, sums: &SummedArea, squares: &SummedArea, x: u32, y: u32) -> Option<usize> {
        let (win_w, win_h) = self.window;

        // Variance normalisation over the window shrunk by one pixel per side.
        let (nw, nh) = (win_w - 2, win_h - 2);
        let area = (nw * nh) as f64;
        let s = sums.sum(x + 1, y + 1, nw, nh) as f64;
        let sq = squares.sum(x + 1, y + 1, nw, nh) as f64;
        let nf = area * sq - s * s;
        let nf = if nf > 0.0 { nf.sqrt() } else { 1.0 };
        let inv_norm = 1.0 / nf;

        for (index, stage) in self.stages.iter().enumerate() {
            let mut total = 0.0;
            for weak in &stage.classifiers {
                total += self.eval_tree(weak, sums, x, y, inv_norm);
            }
            if total < stage.threshold {
                return Some(index);
            }
        }
        None
    }

    fn eval_tree(&self, weak: &WeakClassifier, sums: &SummedArea, x: u32, y: u32, inv_norm: f64) -> f64 {
        let mut idx: i32 = 0;
        loop {
            let node = &weak.nodes[idx as usize];
            let value = self.feature_value(node.feature, sums, x, y) * inv_norm;
            let next = if value < node.threshold { node.left } else { node.right };
            if next <= 0 {
                return weak.leaves[(-next) as usize];
            }
            idx = next;
        }
    }

    fn feature_value(&self, feature: usize, sums: &SummedArea, x: u32, y: u32) -> f64 {
        self.features[feature]
            .rects
            .iter()
            .map(|r| r.weight * sums.sum(x + r.x, y + r.y, r.w, r.h) as f64)
            .sum()
    }
}

fn parse_feature(node: Node<'_, '_>, win_w: u32, win_h: u32) -> Result<Feature> {
    if let Ok(tilted) = text(node, "tilted") {
        if tilted != "0" {
            return Err(format_err("tilted Haar features are not supported"));
        }
    }

    let rects = items(child(node, "rects")?)
        .map(|r| {
            let v = numbers(r.text().unwrap_or_default())?;
            let [x, y, w, h, weight] = v[..] else {
                return Err(format_err(format!("feature rect needs 5 values, got {}", v.len())));
            };
            if x < 0.0 || y < 0.0 || w < 0.0 || h < 0.0 {
                return Err(format_err("negative feature rect"));
            }
            let rect = WeightedRect {
                x: x as u32,
                y: y as u32,
                w: w as u32,
                h: h as u32,
                weight,
            };
            if rect.x + rect.w > win_w || rect.y + rect.h > win_h {
                return Err(format_err("feature rect exceeds the detection window"));
            }
            Ok(rect)
        })
        .collect::<Result<Vec<_>>>()?;

    if rects.is_empty() {
        return Err(format_err("feature without rects"));
    }
    Ok(Feature { rects })
}

fn parse_stage(node: Node<'_, '_>, feature_count: usize) -> Result<Stage> {
    let threshold = numbers(text(node, "stageThreshold")?)?
        .first()
        .copied()
        .ok_or_else(|| format_err("empty stageThreshold"))?;

    let classifiers = items(child(node, "weakClassifiers")?)
        .map(|w| parse_weak(w, feature_count))
        .collect::<Result<Vec<_>>>()?;

    Ok(Stage {
        threshold,
        classifiers,
    })
}

fn parse_weak(node: Node<'_, '_>, feature_count: usize) -> Result<WeakClassifier> {
    let raw_nodes = numbers(text(node, "internalNodes")?)?;
    let leaves = numbers(text(node, "leafValues")?)?;
    if raw_nodes.is_empty() || raw_nodes.len() % 4 != 0 {
        return Err(format_err("internalNodes must hold groups of 4 values"));
    }

    let nodes: Vec<TreeNode> = raw_nodes
        .chunks_exact(4)
        .map(|c| TreeNode {
            left: c[0] as i32,
            right: c[1] as i32,
            feature: c[2] as usize,
            threshold: c[3],
        })
        .collect();

    for n in &nodes {
        if n.feature >= feature_count {
            return Err(format_err(format!("feature index {} out of range", n.feature)));
        }
        for next in [n.left, n.right] {
            let in_range = if next > 0 {
                (next as usize) < nodes.len()
            } else {
                ((-next) as usize) < leaves.len()
            };
            if !in_range {
                return Err(format_err("tree link out of range"));
            }
        }
    }

    Ok(WeakClassifier { nodes, leaves })
}

fn similar(a: &PixelRect, b: &PixelRect, eps: f64) -> bool {
    let delta = eps * (a.w.min(b.w) + a.h.min(b.h)) as f64 * 0.5;
    let close = |p: u32, q: u32| (p as f64 - q as f64).abs() <= delta;
    close(a.x, b.x) && close(a.y, b.y) && close(a.right(), b.right()) && close(a.bottom(), b.bottom())
}

fn find_root(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Cluster similar hits, average each cluster and keep clusters with more than
/// `threshold` members, dropping small clusters nested inside stronger ones.
/// A zero threshold returns the hits unmerged.
pub fn group_rectangles(rects: &[PixelRect], threshold: u32, eps: f64) -> Vec<PixelRect> {
    if threshold == 0 || rects.is_empty() {
        return rects.to_vec();
    }

    let mut parent: Vec<usize> = (0..rects.len()).collect();
    for i in 0..rects.len() {
        for j in (i + 1)..rects.len() {
            if similar(&rects[i], &rects[j], eps) {
                let (ri, rj) = (find_root(&mut parent, i), find_root(&mut parent, j));
                if ri != rj {
                    parent[rj] = ri;
                }
            }
        }
    }

    // Classes are numbered in order of their first member.
    let mut class_of_root = vec![usize::MAX; rects.len()];
    let mut sums: Vec<[f64; 4]> = Vec::new();
    let mut counts: Vec<u32> = Vec::new();
    for (i, r) in rects.iter().enumerate() {
        let root = find_root(&mut parent, i);
        if class_of_root[root] == usize::MAX {
            class_of_root[root] = sums.len();
            sums.push([0.0; 4]);
            counts.push(0);
        }
        let c = class_of_root[root];
        sums[c][0] += r.x as f64;
        sums[c][1] += r.y as f64;
        sums[c][2] += r.w as f64;
        sums[c][3] += r.h as f64;
        counts[c] += 1;
    }

    let averaged: Vec<PixelRect> = sums
        .iter()
        .zip(&counts)
        .map(|(s, &n)| {
            let inv = 1.0 / n as f64;
            PixelRect {
                x: (s[0] * inv).round() as u32,
                y: (s[1] * inv).round() as u32,
                w: (s[2] * inv).round() as u32,
                h: (s[3] * inv).round() as u32,
            }
        })
        .collect();

    let mut kept = Vec::new();
    for (i, r1) in averaged.iter().enumerate() {
        let n1 = counts[i];
        if n1 <= threshold {
            continue;
        }
        let nested = averaged.iter().enumerate().any(|(j, r2)| {
            let n2 = counts[j];
            if j == i || n2 <= threshold {
                return false;
            }
            let dx = (r2.w as f64 * eps).round() as i64;
            let dy = (r2.h as f64 * eps).round() as i64;
            r2.contains_within(r1, dx, dy) && (n2 > n1.max(3) || n1 < 3)
        });
        if !nested {
            kept.push(*r1);
        }
    }
    kept
}

#[cfg(test)]
pub(crate) mod tests {
    use image::Luma;
    use tracing_test::traced_test;

    use super::*;

    /// One stump on `left half - right half`, firing when the left half is brighter.
    pub(crate) const LEFT_BRIGHT_CASCADE: &str = r#"<?xml version="1.0"?>
<opencv_storage>
<cascade type_id="opencv-cascade-classifier"><stageType>BOOST</stageType>
  <featureType>HAAR</featureType>
  <height>24</height>
  <width>24</width>
  <stageNum>1</stageNum>
  <stages>
    <_>
      <maxWeakCount>1</maxWeakCount>
      <stageThreshold>0.5</stageThreshold>
      <weakClassifiers>
        <_>
          <internalNodes>
            0 -1 0 0.1</internalNodes>
          <leafValues>
            -1. 1.</leafValues></_></weakClassifiers></_></stages>
  <features>
    <_>
      <rects>
        <_>
          0 0 24 24 -1.</_>
        <_>
          0 0 12 24 2.</_></rects></_></features></cascade>
</opencv_storage>
"#;

    fn half_bright(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, _| Luma([if x < width / 2 { 255 } else { 0 }]))
    }

    /// 64x48 frame, level 30, with a 20x32 block of level 200 at (16, 8).
    pub(crate) fn block_scene() -> GrayImage {
        GrayImage::from_fn(64, 48, |x, y| {
            let inside = (16..36).contains(&x) && (8..40).contains(&y);
            Luma([if inside { 200 } else { 30 }])
        })
    }

    fn exact_params() -> DetectParams {
        DetectParams {
            scale_factor: 1.1,
            min_neighbors: 0,
            min_size: (24, 24),
        }
    }

    #[test]
    fn parses_stock_layout() {
        let cascade = HaarCascade::from_xml(LEFT_BRIGHT_CASCADE).unwrap();
        assert_eq!(cascade.window(), (24, 24));
        assert_eq!(cascade.stages.len(), 1);
        assert_eq!(cascade.features[0].rects.len(), 2);
        assert_eq!(cascade.features[0].rects[1].weight, 2.0);
    }

    #[test]
    fn fires_on_matching_window() {
        let cascade = HaarCascade::from_xml(LEFT_BRIGHT_CASCADE).unwrap();
        let hits = cascade.detect(&half_bright(24, 24), &exact_params());
        assert_eq!(hits, vec![PixelRect { x: 0, y: 0, w: 24, h: 24 }]);
    }

    #[test]
    fn stage_zero_rejection_skips_next_window() {
        // Bright columns 2..24 of 28: x = 0 fails the first stage, so x = 2
        // is never evaluated even though it would pass.
        let cascade = HaarCascade::from_xml(LEFT_BRIGHT_CASCADE).unwrap();
        let image = GrayImage::from_fn(28, 24, |x, _| Luma([if (2..24).contains(&x) { 255 } else { 0 }]));
        let hits = cascade.detect(&image, &exact_params());
        assert_eq!(hits, vec![PixelRect { x: 4, y: 0, w: 24, h: 24 }]);
    }

    #[test]
    fn default_params_merge_neighbouring_hits() {
        let cascade = HaarCascade::from_xml(LEFT_BRIGHT_CASCADE).unwrap();
        let image = block_scene();

        let raw = cascade.detect(
            &image,
            &DetectParams {
                min_neighbors: 0,
                ..DetectParams::default()
            },
        );
        assert!(raw.len() > 5, "expected a cluster of raw hits, got {}", raw.len());
        // Only levels with windows of at least 30 pixels are scanned.
        assert!(raw.iter().all(|r| r.w >= 30 && r.h >= 30));

        let faces = cascade.detect(&image, &DetectParams::default());
        assert_eq!(faces, vec![PixelRect { x: 21, y: 6, w: 35, h: 35 }]);
    }

    #[test]
    fn flat_window_is_rejected() {
        let cascade = HaarCascade::from_xml(LEFT_BRIGHT_CASCADE).unwrap();
        let flat = GrayImage::from_pixel(24, 24, Luma([128]));
        assert!(cascade.detect(&flat, &exact_params()).is_empty());

        let mirrored = GrayImage::from_fn(24, 24, |x, _| Luma([if x < 12 { 0 } else { 255 }]));
        assert!(cascade.detect(&mirrored, &exact_params()).is_empty());
    }

    #[test]
    fn image_smaller_than_window_finds_nothing() {
        let cascade = HaarCascade::from_xml(LEFT_BRIGHT_CASCADE).unwrap();
        assert!(cascade.detect(&half_bright(20, 30), &exact_params()).is_empty());
    }

    #[test]
    fn min_size_skips_small_levels() {
        let cascade = HaarCascade::from_xml(LEFT_BRIGHT_CASCADE).unwrap();
        let params = DetectParams {
            min_size: (30, 30),
            ..exact_params()
        };
        assert!(cascade.detect(&half_bright(24, 24), &params).is_empty());
    }

    #[test]
    fn rejects_non_haar_cascades() {
        let lbp = LEFT_BRIGHT_CASCADE.replace("<featureType>HAAR", "<featureType>LBP");
        assert!(matches!(HaarCascade::from_xml(&lbp), Err(Error::CascadeFormat(_))));
        assert!(matches!(
            HaarCascade::from_xml("<opencv_storage/>"),
            Err(Error::CascadeFormat(_))
        ));
        assert!(matches!(HaarCascade::from_xml("not xml"), Err(Error::CascadeFormat(_))));
    }

    #[test]
    fn rejects_dangling_feature_index() {
        let broken = LEFT_BRIGHT_CASCADE.replace("0 -1 0 0.1", "0 -1 3 0.1");
        assert!(matches!(HaarCascade::from_xml(&broken), Err(Error::CascadeFormat(_))));
    }

    #[test]
    fn missing_file_is_unavailable() {
        let err = HaarCascade::load(Path::new("/no/such/cascade.xml")).unwrap_err();
        assert!(matches!(err, Error::CascadeUnavailable(_)));
    }

    #[test]
    #[traced_test]
    fn non_growing_scale_factor_is_skipped() {
        let cascade = HaarCascade::from_xml(LEFT_BRIGHT_CASCADE).unwrap();
        let params = DetectParams {
            scale_factor: 1.0,
            ..exact_params()
        };
        assert!(cascade.detect(&half_bright(24, 24), &params).is_empty());
        assert!(logs_contain("scale factor must exceed 1"));
    }

    fn rect(x: u32, y: u32, w: u32, h: u32) -> PixelRect {
        PixelRect { x, y, w, h }
    }

    #[test]
    fn grouping_needs_more_than_threshold_hits() {
        let mut hits: Vec<PixelRect> = (0..6).map(|i| rect(100 + i, 50, 40, 40)).collect();
        hits.push(rect(400, 300, 40, 40));

        let grouped = group_rectangles(&hits, 5, GROUP_EPS);
        assert_eq!(grouped, vec![rect(103, 50, 40, 40)]);

        assert!(group_rectangles(&hits[..5], 5, GROUP_EPS).is_empty());
    }

    #[test]
    fn grouping_drops_nested_weaker_cluster() {
        let mut hits: Vec<PixelRect> = (0..10).map(|_| rect(100, 100, 100, 100)).collect();
        hits.extend((0..4).map(|_| rect(130, 130, 30, 30)));

        let grouped = group_rectangles(&hits, 3, GROUP_EPS);
        assert_eq!(grouped, vec![rect(100, 100, 100, 100)]);
    }

    #[test]
    fn zero_threshold_keeps_raw_hits() {
        let hits = vec![rect(0, 0, 30, 30), rect(1, 1, 30, 30)];
        assert_eq!(group_rectangles(&hits, 0, GROUP_EPS), hits);
    }
}
