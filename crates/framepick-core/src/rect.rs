/// An axis-aligned rectangle in absolute pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl PixelRect {
    pub fn area(&self) -> u64 {
        self.w as u64 * self.h as u64
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.x + self.w
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.y + self.h
    }

    /// Whether `inner` lies inside this rect grown by `dx`/`dy` on every side.
    pub fn contains_within(&self, inner: &PixelRect, dx: i64, dy: i64) -> bool {
        let (x, y, r, b) = (
            self.x as i64,
            self.y as i64,
            self.right() as i64,
            self.bottom() as i64,
        );
        inner.x as i64 >= x - dx
            && inner.y as i64 >= y - dy
            && inner.right() as i64 <= r + dx
            && inner.bottom() as i64 <= b + dy
    }
}
