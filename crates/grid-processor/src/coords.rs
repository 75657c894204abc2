//! Index resolution on monotonic coordinate arrays.
//!
//! Coordinate arrays may run in either direction; only monotonicity is
//! assumed. All searches are binary searches.

use ecv_common::{CrsBounds, EngineError, EngineResult};

/// Direction of a monotonic coordinate array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Ascending,
    Descending,
}

/// Determine the direction of `coords`, or `None` if it is not monotonic.
///
/// Arrays of length 0 or 1 count as ascending.
pub fn order(coords: &[f64]) -> Option<Order> {
    if coords.len() < 2 {
        return Some(Order::Ascending);
    }
    let ascending = coords.windows(2).all(|w| w[0] < w[1]);
    if ascending {
        return Some(Order::Ascending);
    }
    let descending = coords.windows(2).all(|w| w[0] > w[1]);
    descending.then_some(Order::Descending)
}

/// Half-open index range of the coordinates lying within `[lo, hi]`.
pub fn index_range(coords: &[f64], lo: f64, hi: f64) -> (usize, usize) {
    match order(coords) {
        Some(Order::Descending) => {
            let start = coords.partition_point(|&v| v > hi);
            let end = coords.partition_point(|&v| v >= lo);
            (start, end.max(start))
        }
        _ => {
            let start = coords.partition_point(|&v| v < lo);
            let end = coords.partition_point(|&v| v <= hi);
            (start, end.max(start))
        }
    }
}

/// Index of the coordinate nearest to `value`.
pub fn nearest_index(coords: &[f64], value: f64) -> Option<usize> {
    if coords.is_empty() || !value.is_finite() {
        return None;
    }
    let descending = order(coords) == Some(Order::Descending);
    let pos = if descending {
        coords.partition_point(|&v| v > value)
    } else {
        coords.partition_point(|&v| v < value)
    };
    let candidates = [pos.checked_sub(1), (pos < coords.len()).then_some(pos)];
    candidates
        .into_iter()
        .flatten()
        .min_by(|&a, &b| {
            let da = (coords[a] - value).abs();
            let db = (coords[b] - value).abs();
            da.total_cmp(&db).then(a.cmp(&b))
        })
}

/// Extent covered by pixel centres `coords`, widened by half a pixel on
/// each side.
pub fn pixel_extent(coords: &[f64]) -> Option<(f64, f64)> {
    let first = *coords.first()?;
    let last = *coords.last()?;
    let (lo, hi) = (first.min(last), first.max(last));
    let half = if coords.len() > 1 {
        (hi - lo) / (coords.len() - 1) as f64 / 2.0
    } else {
        0.0
    };
    Some((lo - half, hi + half))
}

/// Evenly spaced pixel centres across `[min, max]`; descending when `descending`.
pub fn synthesize(min: f64, max: f64, count: usize, descending: bool) -> Vec<f64> {
    let step = (max - min) / count.max(1) as f64;
    (0..count)
        .map(|i| {
            let offset = (i as f64 + 0.5) * step;
            if descending {
                max - offset
            } else {
                min + offset
            }
        })
        .collect()
}

/// Synthesise `(x, y)` centres for a `width x height` plane over `bounds`
/// (x ascending, y descending).
pub fn synthesize_xy(bounds: &CrsBounds, width: usize, height: usize) -> (Vec<f64>, Vec<f64>) {
    (
        synthesize(bounds.min_x, bounds.max_x, width, false),
        synthesize(bounds.min_y, bounds.max_y, height, true),
    )
}

/// Locate `year` in a monotonic year array.
///
/// Returns the index used and the year found there. When the year is
/// missing the nearest year wins, the earlier one on ties.
pub fn resolve_year(years: &[i32], year: i32) -> EngineResult<(usize, i32)> {
    if years.is_empty() {
        return Err(EngineError::year_not_found("year array is empty"));
    }
    let ascending = years.windows(2).all(|w| w[0] < w[1]);
    let descending = years.windows(2).all(|w| w[0] > w[1]);
    if !ascending && !descending {
        return Err(EngineError::year_not_found("year array is not monotonic"));
    }
    if let Some(i) = years.iter().position(|&y| y == year) {
        return Ok((i, year));
    }
    years
        .iter()
        .copied()
        .enumerate()
        .min_by_key(|&(_, y)| ((i64::from(y) - i64::from(year)).abs(), y))
        .ok_or_else(|| EngineError::year_not_found(format!("year {}", year)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order() {
        assert_eq!(order(&[1.0, 2.0, 3.0]), Some(Order::Ascending));
        assert_eq!(order(&[3.0, 2.0, 1.0]), Some(Order::Descending));
        assert_eq!(order(&[1.0, 3.0, 2.0]), None);
        assert_eq!(order(&[5.0]), Some(Order::Ascending));
    }

    #[test]
    fn test_index_range_both_orientations() {
        let asc = [0.0, 1.0, 2.0, 3.0, 4.0];
        assert_eq!(index_range(&asc, 0.5, 3.0), (1, 4));
        let desc = [4.0, 3.0, 2.0, 1.0, 0.0];
        assert_eq!(index_range(&desc, 0.5, 3.0), (1, 4));
        assert_eq!(index_range(&asc, 10.0, 11.0), (5, 5));
    }

    #[test]
    fn test_nearest_index() {
        let asc = [0.0, 10.0, 20.0];
        assert_eq!(nearest_index(&asc, 12.0), Some(1));
        assert_eq!(nearest_index(&asc, 16.0), Some(2));
        assert_eq!(nearest_index(&asc, -100.0), Some(0));
        let desc = [20.0, 10.0, 0.0];
        assert_eq!(nearest_index(&desc, 12.0), Some(1));
        assert_eq!(nearest_index(&desc, 1.0), Some(2));
        assert_eq!(nearest_index(&[], 1.0), None);
    }

    #[test]
    fn test_synthesize_descending_y() {
        let bounds = CrsBounds::new(0.0, 0.0, 4.0, 2.0);
        let (x, y) = synthesize_xy(&bounds, 4, 2);
        assert_eq!(x, vec![0.5, 1.5, 2.5, 3.5]);
        assert_eq!(y, vec![1.5, 0.5]);
    }

    #[test]
    fn test_pixel_extent() {
        assert_eq!(pixel_extent(&[0.5, 1.5, 2.5]), Some((0.0, 3.0)));
        assert_eq!(pixel_extent(&[2.5, 1.5, 0.5]), Some((0.0, 3.0)));
    }

    #[test]
    fn test_resolve_year_prefers_earlier_on_tie() {
        let years = [1988, 1992, 1996];
        assert_eq!(resolve_year(&years, 1992).unwrap(), (1, 1992));
        assert_eq!(resolve_year(&years, 1990).unwrap(), (0, 1988));
        assert_eq!(resolve_year(&years, 1995).unwrap(), (2, 1996));
        assert_eq!(resolve_year(&years, 2050).unwrap(), (2, 1996));
    }

    #[test]
    fn test_resolve_year_fatal_cases() {
        assert!(matches!(
            resolve_year(&[], 2000),
            Err(EngineError::YearNotFound(_))
        ));
        assert!(matches!(
            resolve_year(&[2000, 1999, 2001], 2000),
            Err(EngineError::YearNotFound(_))
        ));
    }
}
