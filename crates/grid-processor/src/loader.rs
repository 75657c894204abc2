//! Slice loading: metadata, temporal index resolution, viewport-scoped reads.

use std::sync::Arc;

use tracing::{debug, warn};

use ecv_common::{
    CrsBounds, DatasetDescriptor, Dimensionality, EngineError, EngineResult, GeoBounds,
    LoadWarning, LoaderConfig, PixelRect, TemporalCoord, Viewport,
};
use projection::to_crs_clamped;

use crate::cache::{EngineCaches, MetadataKey, RawKey};
use crate::coords::{index_range, order, resolve_year, synthesize_xy};
use crate::store::PyramidStore;
use crate::types::{LevelMetadata, LoadedSlice, RawSlice};

/// Months per year on the month axis of year-month datasets.
pub const MONTHS_PER_YEAR: usize = 12;

/// Points sampled along each edge of a viewport when projecting it.
const EDGE_SAMPLES: usize = 8;

/// What to load: a dataset, a level, a temporal coordinate and a variable.
#[derive(Debug, Clone)]
pub struct SliceRequest {
    pub dataset: Arc<DatasetDescriptor>,
    pub level: usize,
    pub coord: TemporalCoord,
    pub variable: String,
}

impl SliceRequest {
    /// Request for the dataset's primary variable.
    pub fn new(dataset: Arc<DatasetDescriptor>, level: usize, coord: TemporalCoord) -> Self {
        let variable = dataset.variable.clone();
        Self {
            dataset,
            level,
            coord,
            variable,
        }
    }

    pub fn with_level(&self, level: usize) -> Self {
        Self {
            level,
            ..self.clone()
        }
    }

    pub fn with_coord(&self, coord: TemporalCoord) -> Self {
        Self {
            coord,
            ..self.clone()
        }
    }
}

/// A resolved request, ready to be read.
#[derive(Debug, Clone)]
pub struct SlicePlan {
    pub key: RawKey,
    pub metadata: Arc<LevelMetadata>,
    /// Leading-axis indices selecting the plane.
    pub index: Vec<u64>,
    pub warning: Option<LoadWarning>,
}

/// Loads slices through the store and the cache tiers.
#[derive(Clone)]
pub struct SliceLoader {
    store: Arc<dyn PyramidStore>,
    caches: Arc<EngineCaches>,
    config: LoaderConfig,
}

impl SliceLoader {
    pub fn new(store: Arc<dyn PyramidStore>, caches: Arc<EngineCaches>, config: LoaderConfig) -> Self {
        Self {
            store,
            caches,
            config,
        }
    }

    pub fn caches(&self) -> &Arc<EngineCaches> {
        &self.caches
    }

    pub fn store(&self) -> &Arc<dyn PyramidStore> {
        &self.store
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Metadata of `(dataset, level, variable)`, fetched at most once at a time.
    pub async fn metadata(
        &self,
        dataset: &Arc<DatasetDescriptor>,
        level: usize,
        variable: &str,
    ) -> EngineResult<Arc<LevelMetadata>> {
        if level > dataset.max_level() {
            return Err(EngineError::not_found(format!(
                "dataset '{}' has no level {}",
                dataset.id, level
            )));
        }
        let key = MetadataKey {
            dataset: dataset.id.clone(),
            level,
            variable: variable.to_string(),
        };
        let store = Arc::clone(&self.store);
        let dataset = Arc::clone(dataset);
        let variable = variable.to_string();
        self.caches
            .fetch_metadata(key, move || fetch_metadata(store, dataset, level, variable))
            .await
    }

    /// Resolve `request` into a cache key and plane index.
    ///
    /// With a viewport that has bounds, large planes are cropped to the
    /// visible window plus a margin.
    pub async fn plan(
        &self,
        request: &SliceRequest,
        viewport: Option<&Viewport>,
    ) -> EngineResult<SlicePlan> {
        let metadata = self
            .metadata(&request.dataset, request.level, &request.variable)
            .await?;
        let window = match viewport.and_then(|v| v.bounds) {
            Some(bounds) => self.plan_window(&request.dataset, &metadata, &bounds),
            None => None,
        };
        resolve_plan(request, metadata, window)
    }

    /// Load a slice, optionally scoped to the viewport.
    pub async fn load_slice(
        &self,
        request: &SliceRequest,
        viewport: Option<&Viewport>,
    ) -> EngineResult<LoadedSlice> {
        let mut plan = self.plan(request, viewport).await?;
        if plan.key.window.is_some() {
            let full = plan.key.full_plane();
            if self.caches.has_raw(&full).await {
                debug!(dataset = %full.dataset, level = full.level, "Reusing cached full plane");
                plan.key = full;
            }
        }
        self.load_planned(plan).await
    }

    /// Load an explicit pixel window of the plane.
    pub async fn load_rect(&self, request: &SliceRequest, rect: PixelRect) -> EngineResult<LoadedSlice> {
        let metadata = self
            .metadata(&request.dataset, request.level, &request.variable)
            .await?;
        if !rect.fits(metadata.width(), metadata.height()) {
            return Err(EngineError::shape_mismatch(format!(
                "window {:?} outside {}x{} plane",
                rect,
                metadata.width(),
                metadata.height()
            )));
        }
        let full = PixelRect::full(metadata.width(), metadata.height());
        let window = (rect != full).then_some(rect);
        let plan = resolve_plan(request, metadata, window)?;
        self.load_planned(plan).await
    }

    /// Read a resolved plan through the raw tier.
    pub async fn load_planned(&self, plan: SlicePlan) -> EngineResult<LoadedSlice> {
        let SlicePlan {
            key,
            metadata,
            index,
            warning,
        } = plan;
        let store = Arc::clone(&self.store);
        let window = key.window;
        let year = key.year;
        let slice = self
            .caches
            .fetch_raw(key.clone(), move || read_raw(store, metadata, index, window, year))
            .await?;
        Ok(LoadedSlice {
            key,
            slice,
            warning,
        })
    }

    /// True if the planned slice is already cached or being fetched.
    pub async fn is_cached_or_pending(&self, key: &RawKey) -> bool {
        self.caches.raw_in_flight(key) || self.caches.has_raw(key).await
    }

    /// Window to read for `bounds`, or `None` for a full-plane read.
    pub fn plan_window(
        &self,
        dataset: &DatasetDescriptor,
        metadata: &LevelMetadata,
        bounds: &GeoBounds,
    ) -> Option<PixelRect> {
        if metadata.plane_pixels() <= self.config.viewport_crop_min_pixels {
            return None;
        }
        let visible = visible_window(dataset, metadata, bounds)?;
        let padded = pad(
            visible,
            self.config.viewport_margin_px,
            metadata.width(),
            metadata.height(),
        );
        let full = PixelRect::full(metadata.width(), metadata.height());
        (padded != full).then_some(padded)
    }
}

/// Pixels of the level covered by `bounds`, without any margin.
///
/// `None` when the viewport cannot be projected at all.
pub fn visible_window(
    dataset: &DatasetDescriptor,
    metadata: &LevelMetadata,
    bounds: &GeoBounds,
) -> Option<PixelRect> {
    let (w, h) = (metadata.width(), metadata.height());
    if w == 0 || h == 0 {
        return None;
    }
    let projected = CrsBounds::enclosing(
        edge_points(bounds)
            .into_iter()
            .filter_map(|(lon, lat)| to_crs_clamped(dataset.crs, lon, lat).ok()),
    )?;

    let (mut xs, mut xe) = index_range(&metadata.x, projected.min_x, projected.max_x);
    let (mut ys, mut ye) = index_range(&metadata.y, projected.min_y, projected.max_y);
    // Keep at least one pixel so a viewport between two centres still reads.
    xs = xs.min(w - 1);
    ys = ys.min(h - 1);
    xe = xe.max(xs + 1).min(w);
    ye = ye.max(ys + 1).min(h);
    Some(PixelRect::new(xs, ys, xe - xs, ye - ys))
}

fn edge_points(bounds: &GeoBounds) -> Vec<(f64, f64)> {
    let mut points = Vec::with_capacity(4 * (EDGE_SAMPLES + 1));
    for i in 0..=EDGE_SAMPLES {
        let t = i as f64 / EDGE_SAMPLES as f64;
        let lon = bounds.west + (bounds.east - bounds.west) * t;
        let lat = bounds.south + (bounds.north - bounds.south) * t;
        points.push((lon, bounds.south));
        points.push((lon, bounds.north));
        points.push((bounds.west, lat));
        points.push((bounds.east, lat));
    }
    points
}

fn pad(rect: PixelRect, margin: usize, width: usize, height: usize) -> PixelRect {
    let xs = rect.x_start.saturating_sub(margin);
    let ys = rect.y_start.saturating_sub(margin);
    let xe = (rect.x_end() + margin).min(width);
    let ye = (rect.y_end() + margin).min(height);
    PixelRect::new(xs, ys, xe - xs, ye - ys)
}

/// Resolve the temporal coordinate of `request` against `metadata`.
pub fn resolve_plan(
    request: &SliceRequest,
    metadata: Arc<LevelMetadata>,
    window: Option<PixelRect>,
) -> EngineResult<SlicePlan> {
    let dataset = &request.dataset;
    let leading = metadata.handle.leading_shape().to_vec();

    let (index, year, time, warning) = match (dataset.dimensionality, request.coord) {
        (Dimensionality::TimeYx, TemporalCoord::Index { time }) => {
            let steps = leading.first().copied().unwrap_or(0) as usize;
            if time >= steps {
                return Err(EngineError::not_found(format!(
                    "time index {} out of range for '{}' ({} steps)",
                    time, dataset.id, steps
                )));
            }
            (vec![time as u64], None, time, None)
        }
        (Dimensionality::YearMonthYx, TemporalCoord::YearMonth { year, month }) => {
            let months = leading.get(1).copied().unwrap_or(0) as usize;
            if month >= MONTHS_PER_YEAR || month >= months {
                return Err(EngineError::not_found(format!(
                    "month {} out of range for '{}'",
                    month, dataset.id
                )));
            }
            let years = metadata.years.as_deref().map(Vec::as_slice).unwrap_or(&[]);
            let (year_index, used) = resolve_year(years, year)?;
            let warning = (used != year).then(|| {
                warn!(dataset = %dataset.id, requested = year, used, "Year not in store, substituting");
                LoadWarning::YearSubstituted {
                    requested: year,
                    used,
                }
            });
            (
                vec![year_index as u64, month as u64],
                Some(used),
                month,
                warning,
            )
        }
        (dims, coord) => {
            return Err(EngineError::config(format!(
                "temporal coordinate {} does not address a {:?} dataset",
                coord, dims
            )))
        }
    };

    Ok(SlicePlan {
        key: RawKey {
            dataset: dataset.id.clone(),
            level: request.level,
            variable: request.variable.clone(),
            year,
            time,
            window,
        },
        metadata,
        index,
        warning,
    })
}

async fn fetch_metadata(
    store: Arc<dyn PyramidStore>,
    dataset: Arc<DatasetDescriptor>,
    level: usize,
    variable: String,
) -> EngineResult<Arc<LevelMetadata>> {
    let handle = store.open_level(&dataset, level, &variable).await?;
    let coords = store.read_coords(&handle).await?;
    let (width, height) = handle.plane_size();

    let (x, y, synthesized_coords) = match (coords.x, coords.y) {
        (Some(x), Some(y)) => (x, y, false),
        _ => match dataset.aux_bounds {
            Some(bounds) => {
                debug!(dataset = %dataset.id, level, "Synthesising coordinates from aux_bounds");
                let (x, y) = synthesize_xy(&bounds, width, height);
                (x, y, true)
            }
            None => {
                return Err(EngineError::not_found(format!(
                    "{}: coordinate arrays missing and no aux_bounds configured",
                    handle.level_path
                )))
            }
        },
    };

    if x.len() != width || y.len() != height {
        return Err(EngineError::shape_mismatch(format!(
            "{}: coordinates {}x{} do not match plane {}x{}",
            handle.level_path,
            x.len(),
            y.len(),
            width,
            height
        )));
    }
    if order(&x).is_none() || order(&y).is_none() {
        return Err(EngineError::decode(format!(
            "{}: coordinate arrays are not monotonic",
            handle.level_path
        )));
    }

    debug!(
        dataset = %dataset.id,
        level,
        width,
        height,
        "Loaded level metadata"
    );

    Ok(Arc::new(LevelMetadata {
        handle,
        x: Arc::new(x),
        y: Arc::new(y),
        years: coords.years.map(Arc::new),
        synthesized_coords,
    }))
}

async fn read_raw(
    store: Arc<dyn PyramidStore>,
    metadata: Arc<LevelMetadata>,
    index: Vec<u64>,
    window: Option<PixelRect>,
    year: Option<i32>,
) -> EngineResult<Arc<RawSlice>> {
    let rect = window.unwrap_or_else(|| PixelRect::full(metadata.width(), metadata.height()));
    let data = match window {
        Some(rect) => store.read_sub_slice(&metadata.handle, &index, rect).await?,
        None => store.read_slice(&metadata.handle, &index).await?,
    };
    if data.values.len() != rect.len() {
        return Err(EngineError::shape_mismatch(format!(
            "{}: read {} values for a {}x{} window",
            metadata.handle.array_path(),
            data.values.len(),
            rect.width,
            rect.height
        )));
    }

    let (x_coords, y_coords) = match window {
        None => (Arc::clone(&metadata.x), Arc::clone(&metadata.y)),
        Some(r) => (
            Arc::new(metadata.x[r.x_start..r.x_end()].to_vec()),
            Arc::new(metadata.y[r.y_start..r.y_end()].to_vec()),
        ),
    };
    let crs_bounds = match (x_coords.first(), x_coords.last(), y_coords.first(), y_coords.last()) {
        (Some(&x0), Some(&x1), Some(&y0), Some(&y1)) => CrsBounds::from_corners(x0, y0, x1, y1),
        _ => return Err(EngineError::shape_mismatch("empty slice window")),
    };

    Ok(Arc::new(RawSlice {
        values: Arc::new(data.values),
        width: rect.width,
        height: rect.height,
        dtype: data.dtype,
        x_coords,
        y_coords,
        crs_bounds,
        window: rect,
        year,
    }))
}
