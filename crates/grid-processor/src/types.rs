//! Data carried between the store, the caches and the consumers of slices.

use std::sync::Arc;

use ecv_common::{CrsBounds, LoadWarning, PixelRect};

use crate::cache::RawKey;
use crate::coords::{order, Order};
use crate::store::{LevelHandle, SourceDType};

/// Immutable per-level metadata: the opened array and its coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelMetadata {
    pub handle: LevelHandle,
    /// Pixel-centre x coordinates, one per column.
    pub x: Arc<Vec<f64>>,
    /// Pixel-centre y coordinates, one per row.
    pub y: Arc<Vec<f64>>,
    pub years: Option<Arc<Vec<i32>>>,
    /// True when `x`/`y` were synthesised from the dataset's `aux_bounds`.
    pub synthesized_coords: bool,
}

impl LevelMetadata {
    pub fn width(&self) -> usize {
        self.x.len()
    }

    pub fn height(&self) -> usize {
        self.y.len()
    }

    pub fn plane_pixels(&self) -> usize {
        self.width() * self.height()
    }

    /// Extent of the level's pixel centres.
    pub fn centre_bounds(&self) -> Option<CrsBounds> {
        let (x0, x1) = (*self.x.first()?, *self.x.last()?);
        let (y0, y1) = (*self.y.first()?, *self.y.last()?);
        Some(CrsBounds::from_corners(x0, y0, x1, y1))
    }
}

/// A decoded plane (or window of one) as held in the raw cache.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSlice {
    /// Dense row-major values over `window`.
    pub values: Arc<Vec<f32>>,
    pub width: usize,
    pub height: usize,
    pub dtype: SourceDType,
    pub x_coords: Arc<Vec<f64>>,
    pub y_coords: Arc<Vec<f64>>,
    /// Bounds of the fetched pixel centres.
    pub crs_bounds: CrsBounds,
    /// Where the data sits in the full plane.
    pub window: PixelRect,
    /// Year actually read, for year-month datasets.
    pub year: Option<i32>,
}

impl RawSlice {
    pub fn value_at(&self, col: usize, row: usize) -> Option<f32> {
        if col >= self.width || row >= self.height {
            return None;
        }
        self.values.get(row * self.width + col).copied()
    }
}

/// Result of a slice load.
#[derive(Debug, Clone)]
pub struct LoadedSlice {
    pub key: RawKey,
    pub slice: Arc<RawSlice>,
    pub warning: Option<LoadWarning>,
}

/// A slice re-oriented so row 0 is the northernmost row and column 0 the
/// westernmost column.
#[derive(Debug, Clone, PartialEq)]
pub struct NorthUpSlice {
    pub values: Arc<Vec<f32>>,
    pub width: usize,
    pub height: usize,
    pub crs_bounds: CrsBounds,
}

/// Re-orient `slice` to north-up. Shares the buffer when no flip is needed.
pub fn north_up(slice: &RawSlice) -> NorthUpSlice {
    let flip_cols = order(&slice.x_coords) == Some(Order::Descending);
    let flip_rows = order(&slice.y_coords) == Some(Order::Ascending) && slice.y_coords.len() > 1;

    let values = if !flip_cols && !flip_rows {
        Arc::clone(&slice.values)
    } else {
        let (w, h) = (slice.width, slice.height);
        let mut out = Vec::with_capacity(w * h);
        for row in 0..h {
            let src_row = if flip_rows { h - 1 - row } else { row };
            let line = &slice.values[src_row * w..(src_row + 1) * w];
            if flip_cols {
                out.extend(line.iter().rev());
            } else {
                out.extend_from_slice(line);
            }
        }
        Arc::new(out)
    };

    NorthUpSlice {
        values,
        width: slice.width,
        height: slice.height,
        crs_bounds: slice.crs_bounds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slice(x: Vec<f64>, y: Vec<f64>, values: Vec<f32>) -> RawSlice {
        RawSlice {
            width: x.len(),
            height: y.len(),
            values: Arc::new(values),
            dtype: SourceDType::Float32,
            crs_bounds: CrsBounds::new(0.0, 0.0, 1.0, 1.0),
            window: PixelRect::full(x.len(), y.len()),
            x_coords: Arc::new(x),
            y_coords: Arc::new(y),
            year: None,
        }
    }

    #[test]
    fn test_north_up_shares_buffer_when_oriented() {
        let s = slice(vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 2.0, 3.0, 4.0]);
        let n = north_up(&s);
        assert!(Arc::ptr_eq(&n.values, &s.values));
    }

    #[test]
    fn test_north_up_flips_ascending_y() {
        let s = slice(vec![0.0, 1.0], vec![0.0, 1.0], vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(*north_up(&s).values, vec![3.0, 4.0, 1.0, 2.0]);
    }

    #[test]
    fn test_north_up_flips_descending_x() {
        let s = slice(vec![1.0, 0.0], vec![1.0, 0.0], vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(*north_up(&s).values, vec![2.0, 1.0, 4.0, 3.0]);
    }
}
