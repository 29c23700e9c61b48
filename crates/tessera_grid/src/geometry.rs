//! Axis-aligned rectangles on the integer grid.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-open rectangle `[x, x+w) x [y, y+h)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    /// Left column
    pub x: u32,
    /// Top row
    pub y: u32,
    /// Width in cells
    pub w: u32,
    /// Height in cells
    pub h: u32,
}

impl Rect {
    /// Create a rectangle
    #[must_use]
    pub const fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    /// Exclusive right edge; widened so `x + w` never overflows
    #[must_use]
    pub const fn right(&self) -> u64 {
        self.x as u64 + self.w as u64
    }

    /// Exclusive bottom edge
    #[must_use]
    pub const fn bottom(&self) -> u64 {
        self.y as u64 + self.h as u64
    }

    /// True if the rectangle covers no cells
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    /// Overlap on both axes with non-zero area
    #[must_use]
    pub const fn intersects(&self, other: &Rect) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && (self.x as u64) < other.right()
            && (other.x as u64) < self.right()
            && (self.y as u64) < other.bottom()
            && (other.y as u64) < self.bottom()
    }

    /// True if the rectangle lies inside `[0,width) x [0,height)`
    #[must_use]
    pub const fn fits_within(&self, width: u32, height: u32) -> bool {
        self.right() <= width as u64 && self.bottom() <= height as u64
    }

    /// Same size, new origin
    #[must_use]
    pub const fn at(&self, x: u32, y: u32) -> Self {
        Self::new(x, y, self.w, self.h)
    }

    /// Every `(x, y)` cell covered, column by column
    pub fn cells(&self) -> impl Iterator<Item = (u32, u32)> {
        let (x, y, w, h) = (self.x, self.y, self.w, self.h);
        (x..x.saturating_add(w))
            .flat_map(move |cx| (y..y.saturating_add(h)).map(move |cy| (cx, cy)))
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{} {}x{})", self.x, self.y, self.w, self.h)
    }
}
