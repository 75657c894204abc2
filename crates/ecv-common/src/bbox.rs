//! Bounding box types and operations.

use serde::{Deserialize, Serialize};

/// A bounding box in a projected CRS, in metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CrsBounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl CrsBounds {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Build from two arbitrary corners, normalising the order.
    pub fn from_corners(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            min_x: x0.min(x1),
            min_y: y0.min(y1),
            max_x: x0.max(x1),
            max_y: y0.max(y1),
        }
    }

    /// Smallest box containing every point; `None` for an empty iterator.
    pub fn enclosing(points: impl IntoIterator<Item = (f64, f64)>) -> Option<Self> {
        let mut iter = points.into_iter();
        let (x, y) = iter.next()?;
        let mut bounds = Self::new(x, y, x, y);
        for (x, y) in iter {
            bounds.min_x = bounds.min_x.min(x);
            bounds.min_y = bounds.min_y.min(y);
            bounds.max_x = bounds.max_x.max(x);
            bounds.max_y = bounds.max_y.max(y);
        }
        Some(bounds)
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// True if `other` lies entirely inside this box.
    pub fn contains(&self, other: &CrsBounds) -> bool {
        other.min_x >= self.min_x
            && other.max_x <= self.max_x
            && other.min_y >= self.min_y
            && other.max_y <= self.max_y
    }
}

/// A geographic bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl GeoBounds {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }
}

/// A pixel window into a level's plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelRect {
    pub x_start: usize,
    pub y_start: usize,
    pub width: usize,
    pub height: usize,
}

impl PixelRect {
    pub fn new(x_start: usize, y_start: usize, width: usize, height: usize) -> Self {
        Self {
            x_start,
            y_start,
            width,
            height,
        }
    }

    /// Window covering a whole `width x height` plane.
    pub fn full(width: usize, height: usize) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn x_end(&self) -> usize {
        self.x_start + self.width
    }

    pub fn y_end(&self) -> usize {
        self.y_start + self.height
    }

    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// True if this window fully covers `other`.
    pub fn contains(&self, other: &PixelRect) -> bool {
        other.x_start >= self.x_start
            && other.y_start >= self.y_start
            && other.x_end() <= self.x_end()
            && other.y_end() <= self.y_end()
    }

    /// True if the window lies inside a `width x height` plane.
    pub fn fits(&self, width: usize, height: usize) -> bool {
        !self.is_empty() && self.x_end() <= width && self.y_end() <= height
    }
}
