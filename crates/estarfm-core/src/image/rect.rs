use serde::{Deserialize, Serialize};

/// Spatial extent of an image in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Size {
    pub width: usize,
    pub height: usize,
}

impl Size {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// An axis-aligned rectangle in pixel coordinates.
///
/// Coordinates are signed so that windows centered near an image border can
/// extend past it before being clipped with [`Rect::intersect`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl Rect {
    pub fn new(x: i64, y: i64, width: i64, height: i64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle covering a whole image of the given size.
    pub fn from_size(size: Size) -> Self {
        Self::new(0, 0, size.width as i64, size.height as i64)
    }

    pub fn right(&self) -> i64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i64 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn area(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            self.width * self.height
        }
    }

    pub fn size(&self) -> Size {
        Size::new(self.width.max(0) as usize, self.height.max(0) as usize)
    }

    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// True if `other` lies completely inside `self`.
    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Overlap of both rectangles. Disjoint rectangles give a zero-sized rect.
    pub fn intersect(&self, other: &Rect) -> Rect {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x1 <= x0 || y1 <= y0 {
            return Rect::new(x0, y0, 0, 0);
        }
        Rect::new(x0, y0, x1 - x0, y1 - y0)
    }

    pub fn translate(&self, dx: i64, dy: i64) -> Rect {
        Rect::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Grow the rectangle by `margin` pixels on every side.
    pub fn expand(&self, margin: i64) -> Rect {
        Rect::new(
            self.x - margin,
            self.y - margin,
            self.width + 2 * margin,
            self.height + 2 * margin,
        )
    }

    /// Clip to the bounds of a parent image of the given size.
    pub fn clipped_to(&self, size: Size) -> Rect {
        self.intersect(&Rect::from_size(size))
    }

    /// Row index range. Only meaningful for non-negative, non-empty rects.
    pub(crate) fn rows(&self) -> std::ops::Range<usize> {
        self.y as usize..self.bottom() as usize
    }

    /// Column index range. Only meaningful for non-negative, non-empty rects.
    pub(crate) fn cols(&self) -> std::ops::Range<usize> {
        self.x as usize..self.right() as usize
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{} {}x{})", self.x, self.y, self.width, self.height)
    }
}
