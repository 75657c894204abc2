//! Point and region queries against a dataset.
//!
//! Queries run at a fixed, moderately coarse level so that clicks and
//! polygon drags stay cheap regardless of the displayed zoom.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, instrument};

use ecv_common::time::{month_label, time_label};
use ecv_common::{
    CrsBounds, DatasetDescriptor, EngineError, EngineResult, LoadWarning, LonLat, PixelRect,
    TemporalCoord,
};
use projection::{to_crs, to_crs_clamped};

use crate::coords::{index_range, nearest_index, pixel_extent, resolve_year};
use crate::loader::{SliceLoader, SliceRequest, MONTHS_PER_YEAR};

/// Finest level queries read from.
pub const QUERY_LEVEL_CAP: usize = 2;

/// Why a query produced no values. Not an error: the caller shows a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryEmpty {
    /// The point lies outside the CRS's valid range or the dataset extent.
    OutsideExtent,
    /// Every sample at the location is no-data.
    NoValidData,
    /// No valid pixel fell inside the queried area.
    NoValidPixels,
}

impl fmt::Display for QueryEmpty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            QueryEmpty::OutsideExtent => "location outside dataset extent",
            QueryEmpty::NoValidData => "no valid data at this location",
            QueryEmpty::NoValidPixels => "no valid pixels",
        };
        f.write_str(msg)
    }
}

pub type QueryOutcome<T> = Result<T, QueryEmpty>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeseriesPoint {
    pub label: String,
    pub value: Option<f32>,
}

/// Least-squares line through the valid samples, in value units per step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Trend {
    pub slope: f64,
    pub intercept: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Timeseries {
    pub level: usize,
    pub col: usize,
    pub row: usize,
    /// Pixel centre the samples were read at, in CRS units.
    pub x: f64,
    pub y: f64,
    pub year: Option<i32>,
    pub points: Vec<TimeseriesPoint>,
    pub trend: Option<Trend>,
    #[serde(skip)]
    pub warning: Option<LoadWarning>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionAggregate {
    pub mean: Option<f64>,
    pub min: Option<f32>,
    pub max: Option<f32>,
    pub count: usize,
    pub error: Option<String>,
}

impl RegionAggregate {
    fn empty() -> Self {
        Self {
            mean: None,
            min: None,
            max: None,
            count: 0,
            error: Some(QueryEmpty::NoValidPixels.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SliceStats {
    pub mean: f64,
    /// Population standard deviation.
    pub std: f64,
    pub min: f32,
    pub max: f32,
    pub median: f32,
    pub count: usize,
}

/// Level queries read from for `dataset`.
pub fn query_level(dataset: &DatasetDescriptor) -> usize {
    QUERY_LEVEL_CAP.min(dataset.max_level())
}

/// Point, region and whole-slice queries.
#[derive(Clone)]
pub struct QueryService {
    loader: SliceLoader,
}

impl QueryService {
    pub fn new(loader: SliceLoader) -> Self {
        Self { loader }
    }

    /// Values at `at` over every time step, or the 12 months of `year`.
    #[instrument(skip(self, dataset), fields(dataset = %dataset.id))]
    pub async fn point_timeseries(
        &self,
        dataset: &Arc<DatasetDescriptor>,
        at: LonLat,
        year: Option<i32>,
    ) -> EngineResult<QueryOutcome<Timeseries>> {
        let Ok((px, py)) = to_crs(dataset.crs, at.lon, at.lat) else {
            return Ok(Err(QueryEmpty::OutsideExtent));
        };

        let level = query_level(dataset);
        let meta = self.loader.metadata(dataset, level, &dataset.variable).await?;
        if !within(&meta.x, px) || !within(&meta.y, py) {
            return Ok(Err(QueryEmpty::OutsideExtent));
        }
        let (Some(col), Some(row)) = (nearest_index(&meta.x, px), nearest_index(&meta.y, py)) else {
            return Ok(Err(QueryEmpty::OutsideExtent));
        };

        let (leading, used_year, warning) = if dataset.is_multi_year() {
            let requested = year
                .or_else(|| dataset.year_range.map(|r| r.end))
                .ok_or_else(|| EngineError::config(format!("dataset '{}' has no year", dataset.id)))?;
            let years = meta.years.as_deref().map(Vec::as_slice).unwrap_or(&[]);
            let (index, used) = resolve_year(years, requested)?;
            let warning = (used != requested).then_some(LoadWarning::YearSubstituted {
                requested,
                used,
            });
            (vec![index as u64], Some(used), warning)
        } else {
            (Vec::new(), None, None)
        };

        let series = self
            .loader
            .store()
            .read_pixel_series(&meta.handle, &leading, col, row)
            .await?;

        let origin = dataset.time_origin_date()?;
        let policy = dataset.fill_policy;
        let points: Vec<TimeseriesPoint> = series
            .values
            .iter()
            .enumerate()
            .map(|(i, &v)| TimeseriesPoint {
                label: match used_year {
                    Some(y) => month_label(y, i),
                    None => time_label(origin, i),
                },
                value: (!policy.is_no_data(v)).then_some(v),
            })
            .collect();

        if points.iter().all(|p| p.value.is_none()) {
            debug!(col, row, "All samples are no-data");
            return Ok(Err(QueryEmpty::NoValidData));
        }
        let trend = linear_trend(points.iter().enumerate().filter_map(|(i, p)| Some((i, p.value?))));

        Ok(Ok(Timeseries {
            level,
            col,
            row,
            x: meta.x[col],
            y: meta.y[row],
            year: used_year,
            points,
            trend,
            warning,
        }))
    }

    /// Mean, min and max of valid pixels whose centres lie inside `polygon`.
    #[instrument(skip(self, dataset, polygon), fields(dataset = %dataset.id, vertices = polygon.len()))]
    pub async fn region_aggregate(
        &self,
        dataset: &Arc<DatasetDescriptor>,
        polygon: &[LonLat],
        year: Option<i32>,
        time: usize,
    ) -> EngineResult<RegionAggregate> {
        if polygon.len() < 3 {
            return Err(EngineError::config("polygon needs at least 3 vertices"));
        }
        let ring = polygon
            .iter()
            .map(|p| to_crs_clamped(dataset.crs, p.lon, p.lat))
            .collect::<EngineResult<Vec<_>>>()?;
        let Some(bbox) = CrsBounds::enclosing(ring.iter().copied()) else {
            return Ok(RegionAggregate::empty());
        };

        let level = query_level(dataset);
        let meta = self.loader.metadata(dataset, level, &dataset.variable).await?;
        let (xs, xe) = index_range(&meta.x, bbox.min_x, bbox.max_x);
        let (ys, ye) = index_range(&meta.y, bbox.min_y, bbox.max_y);
        if xs >= xe || ys >= ye {
            return Ok(RegionAggregate::empty());
        }

        let request = SliceRequest::new(Arc::clone(dataset), level, coord_for(dataset, year, time)?);
        let loaded = self
            .loader
            .load_rect(&request, PixelRect::new(xs, ys, xe - xs, ye - ys))
            .await?;
        let slice = &loaded.slice;
        let policy = dataset.fill_policy;

        let mut acc = Accumulator::default();
        for (r, &y) in slice.y_coords.iter().enumerate() {
            for (c, &x) in slice.x_coords.iter().enumerate() {
                if !point_in_polygon(&ring, x, y) {
                    continue;
                }
                let v = slice.values[r * slice.width + c];
                if !policy.is_no_data(v) {
                    acc.push(v);
                }
            }
        }

        if acc.count == 0 {
            return Ok(RegionAggregate::empty());
        }
        Ok(RegionAggregate {
            mean: Some(acc.mean()),
            min: Some(acc.min),
            max: Some(acc.max),
            count: acc.count,
            error: None,
        })
    }

    /// Summary statistics over every valid pixel of one slice.
    #[instrument(skip(self, dataset), fields(dataset = %dataset.id))]
    pub async fn slice_stats(
        &self,
        dataset: &Arc<DatasetDescriptor>,
        year: Option<i32>,
        time: usize,
    ) -> EngineResult<QueryOutcome<SliceStats>> {
        let level = query_level(dataset);
        let request = SliceRequest::new(Arc::clone(dataset), level, coord_for(dataset, year, time)?);
        let loaded = self.loader.load_slice(&request, None).await?;
        let policy = dataset.fill_policy;

        let mut valid: Vec<f32> = loaded
            .slice
            .values
            .iter()
            .copied()
            .filter(|&v| !policy.is_no_data(v))
            .collect();
        if valid.is_empty() {
            return Ok(Err(QueryEmpty::NoValidPixels));
        }
        valid.sort_by(f32::total_cmp);

        let n = valid.len();
        let mean = valid.iter().map(|&v| f64::from(v)).sum::<f64>() / n as f64;
        let var = valid
            .iter()
            .map(|&v| (f64::from(v) - mean).powi(2))
            .sum::<f64>()
            / n as f64;
        let median = if n % 2 == 1 {
            valid[n / 2]
        } else {
            (valid[n / 2 - 1] + valid[n / 2]) / 2.0
        };

        Ok(Ok(SliceStats {
            mean,
            std: var.sqrt(),
            min: valid[0],
            max: valid[n - 1],
            median,
            count: n,
        }))
    }
}

/// Temporal coordinate for a query on `dataset`; `time` is the month for
/// year-month datasets.
fn coord_for(dataset: &DatasetDescriptor, year: Option<i32>, time: usize) -> EngineResult<TemporalCoord> {
    if !dataset.is_multi_year() {
        return Ok(TemporalCoord::index(time));
    }
    if time >= MONTHS_PER_YEAR {
        return Err(EngineError::not_found(format!("month {} out of range", time)));
    }
    let year = year
        .or_else(|| dataset.year_range.map(|r| r.end))
        .ok_or_else(|| EngineError::config(format!("dataset '{}' has no year", dataset.id)))?;
    Ok(TemporalCoord::year_month(year, time))
}

fn within(coords: &[f64], value: f64) -> bool {
    matches!(pixel_extent(coords), Some((lo, hi)) if value >= lo && value <= hi)
}

#[derive(Debug)]
struct Accumulator {
    sum: f64,
    min: f32,
    max: f32,
    count: usize,
}

impl Default for Accumulator {
    fn default() -> Self {
        Self {
            sum: 0.0,
            min: f32::INFINITY,
            max: f32::NEG_INFINITY,
            count: 0,
        }
    }
}

impl Accumulator {
    fn push(&mut self, v: f32) {
        self.sum += f64::from(v);
        self.min = self.min.min(v);
        self.max = self.max.max(v);
        self.count += 1;
    }

    fn mean(&self) -> f64 {
        self.sum / self.count as f64
    }
}

/// Even-odd ray casting test.
pub fn point_in_polygon(ring: &[(f64, f64)], x: f64, y: f64) -> bool {
    if ring.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let (xi, yi) = ring[i];
        let (xj, yj) = ring[j];
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Ordinary least squares over `(step, value)` pairs; `None` below two samples.
pub fn linear_trend(samples: impl IntoIterator<Item = (usize, f32)>) -> Option<Trend> {
    let (mut n, mut sx, mut sy, mut sxx, mut sxy) = (0.0f64, 0.0, 0.0, 0.0, 0.0);
    for (i, v) in samples {
        let (x, y) = (i as f64, f64::from(v));
        n += 1.0;
        sx += x;
        sy += y;
        sxx += x * x;
        sxy += x * y;
    }
    if n < 2.0 {
        return None;
    }
    let denom = n * sxx - sx * sx;
    if denom == 0.0 {
        return None;
    }
    let slope = (n * sxy - sx * sy) / denom;
    Some(Trend {
        slope,
        intercept: (sy - slope * sx) / n,
    })
}
