use image::{GrayImage, RgbImage};
use tracing::debug;

use super::common::{luminance, SummedArea};
use super::edges::canny;
use crate::error::Result;

const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;
/// Side of the square cells in the edge interest grid.
const CELL: u32 = 20;
/// Cap on each rule-of-thirds point's contribution.
const POINT_CAP: f64 = 25.0;

/// Edge density per grid cell, scaled so the densest cell is 1.
#[derive(Debug, Clone, PartialEq)]
pub struct InterestGrid {
    pub rows: u32,
    pub cols: u32,
    /// Row-major, `rows * cols` entries.
    pub cells: Vec<f64>,
}

impl InterestGrid {
    pub fn get(&self, row: u32, col: u32) -> f64 {
        self.cells[(row * self.cols + col) as usize]
    }

    /// `(row, col)` of the densest cell, if any cell has edges.
    pub fn peak(&self) -> Option<(u32, u32)> {
        let (i, &v) = self
            .cells
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))?;
        (v > 0.0).then(|| (i as u32 / self.cols, i as u32 % self.cols))
    }
}

/// Every term that goes into the composition score.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositionDetail {
    /// Sum over the four third points, each capped at 25.
    pub thirds: f64,
    /// `(left/right + top/bottom) * 10`.
    pub balance: f64,
    pub center_penalty: f64,
    pub interest: InterestGrid,
    /// `clamp(thirds + balance - center_penalty, 0, 100)`.
    pub score: f64,
}

/// Composition score in `[0, 100]`.
pub fn composition(image: &RgbImage) -> Result<f64> {
    Ok(composition_detail(image)?.score)
}

pub fn composition_detail(image: &RgbImage) -> Result<CompositionDetail> {
    let gray = luminance(image)?;
    let edges = canny(&gray, CANNY_LOW, CANNY_HIGH);
    let detail = score_edge_map(&edges);
    debug!(
        thirds = detail.thirds,
        balance = detail.balance,
        center_penalty = detail.center_penalty,
        peak = ?detail.interest.peak(),
        score = detail.score,
        "composition"
    );
    Ok(detail)
}

/// `1 - |a - b| / (a + b)`, or 0 when there is no mass at all.
pub fn balance(a: i64, b: i64) -> f64 {
    if a + b > 0 {
        1.0 - (a - b).abs() as f64 / (a + b) as f64
    } else {
        0.0
    }
}

/// Penalty once more than half the edge mass sits in the central cell.
pub fn center_penalty(center_fraction: f64) -> f64 {
    if center_fraction > 0.5 {
        (center_fraction - 0.5) * 20.0
    } else {
        0.0
    }
}

/// Score an edge map whose pixels are 0 (no edge) or 255 (edge).
pub fn score_edge_map(edges: &GrayImage) -> CompositionDetail {
    let (width, height) = edges.dimensions();
    let mass = SummedArea::of(edges);
    let total = mass.sum(0, 0, width, height);

    let third_w = width / 3;
    let third_h = height / 3;
    let radius = width.max(height) / 12;

    let points = [
        (third_w, third_h),
        (2 * third_w, third_h),
        (third_w, 2 * third_h),
        (2 * third_w, 2 * third_h),
    ];

    let mut thirds = 0.0;
    for (px, py) in points {
        let x1 = px.saturating_sub(radius);
        let x2 = (px + radius).min(width);
        let y1 = py.saturating_sub(radius);
        let y2 = (py + radius).min(height);
        let size = (x2 - x1) as u64 * (y2 - y1) as u64;
        if size > 0 {
            let density = mass.sum(x1, y1, x2 - x1, y2 - y1) as f64 / size as f64;
            thirds += (density / 10.0).min(POINT_CAP);
        }
    }

    let half_w = width / 2;
    let half_h = height / 2;
    let left = mass.sum(0, 0, half_w, height);
    let top = mass.sum(0, 0, width, half_h);
    let balance_score = (balance(left, total - left) + balance(top, total - top)) * 10.0;

    let penalty = if total > 0 {
        let center = mass.sum(third_w, third_h, third_w, third_h);
        center_penalty(center as f64 / total as f64)
    } else {
        0.0
    };

    let score = (thirds + balance_score - penalty).clamp(0.0, 100.0);

    CompositionDetail {
        thirds,
        balance: balance_score,
        center_penalty: penalty,
        interest: interest_grid(&mass, width, height),
        score,
    }
}

/// Cells start every `CELL` pixels strictly below `dim - CELL`; trailing
/// partial cells are never scored.
fn interest_grid(mass: &SummedArea, width: u32, height: u32) -> InterestGrid {
    let rows = height / CELL;
    let cols = width / CELL;
    let mut cells = vec![0.0; (rows * cols) as usize];

    for y in (0..height.saturating_sub(CELL)).step_by(CELL as usize) {
        for x in (0..width.saturating_sub(CELL)).step_by(CELL as usize) {
            let idx = ((y / CELL) * cols + x / CELL) as usize;
            cells[idx] = mass.sum(x, y, CELL, CELL) as f64;
        }
    }

    let max = cells.iter().copied().fold(0.0, f64::max);
    if max > 0.0 {
        cells.iter_mut().for_each(|c| *c /= max);
    }

    InterestGrid { rows, cols, cells }
}
