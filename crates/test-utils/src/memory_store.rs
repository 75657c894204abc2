//! In-memory [`PyramidStore`] with call counters, injectable failures and
//! per-read delays.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

use ecv_common::{DatasetDescriptor, EngineError, EngineResult, PixelRect};
use grid_processor::store::check_plane_index;
use grid_processor::{LevelCoords, LevelHandle, PyramidStore, SliceData, SourceDType};

/// One variable array: leading axes followed by `[Y, X]`, row-major.
#[derive(Debug, Clone)]
pub struct MemoryArray {
    pub shape: Vec<u64>,
    pub values: Vec<f32>,
    pub dtype: SourceDType,
}

impl MemoryArray {
    pub fn new(shape: Vec<u64>, values: Vec<f32>) -> Self {
        assert_eq!(
            shape.iter().product::<u64>() as usize,
            values.len(),
            "array shape does not match value count"
        );
        Self {
            shape,
            values,
            dtype: SourceDType::Float32,
        }
    }

    fn plane_offset(&self, index: &[u64]) -> usize {
        let n = self.shape.len();
        let plane = (self.shape[n - 1] * self.shape[n - 2]) as usize;
        let mut flat = 0u64;
        for (i, &len) in index.iter().zip(&self.shape[..n - 2]) {
            flat = flat * len + i;
        }
        flat as usize * plane
    }
}

/// Contents of one level group.
#[derive(Debug, Clone, Default)]
pub struct MemoryLevel {
    pub variables: HashMap<String, MemoryArray>,
    pub x: Option<Vec<f64>>,
    pub y: Option<Vec<f64>>,
    pub years: Option<Vec<i32>>,
}

impl MemoryLevel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_coords(mut self, x: Vec<f64>, y: Vec<f64>) -> Self {
        self.x = Some(x);
        self.y = Some(y);
        self
    }

    pub fn with_years(mut self, years: Vec<i32>) -> Self {
        self.years = Some(years);
        self
    }

    pub fn with_variable(mut self, name: &str, array: MemoryArray) -> Self {
        self.variables.insert(name.to_string(), array);
        self
    }
}

/// One data read as seen by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadRecord {
    Slice { path: String, index: Vec<u64> },
    SubSlice { path: String, index: Vec<u64>, rect: PixelRect },
    Series { path: String, leading: Vec<u64>, col: usize, row: usize },
}

impl ReadRecord {
    pub fn path(&self) -> &str {
        match self {
            ReadRecord::Slice { path, .. }
            | ReadRecord::SubSlice { path, .. }
            | ReadRecord::Series { path, .. } => path,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    opens: AtomicUsize,
    coord_reads: AtomicUsize,
    data_reads: AtomicUsize,
}

/// Pyramid held in memory, keyed by level path (`store_path/level_name`).
#[derive(Debug, Default)]
pub struct MemoryPyramidStore {
    levels: Mutex<HashMap<String, MemoryLevel>>,
    counters: Counters,
    reads: Mutex<Vec<ReadRecord>>,
    failures: Mutex<VecDeque<EngineError>>,
    delay: Mutex<Option<Duration>>,
}

impl MemoryPyramidStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_level(&self, level_path: impl Into<String>, level: MemoryLevel) {
        self.levels
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(level_path.into(), level);
    }

    /// Delay every data read by `delay` (uses tokio time, so a paused
    /// clock controls it).
    pub fn set_read_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap_or_else(|p| p.into_inner()) = delay;
    }

    /// Make the next `count` data reads fail with `err`.
    pub fn fail_next_reads(&self, count: usize, err: EngineError) {
        let mut failures = self.failures.lock().unwrap_or_else(|p| p.into_inner());
        failures.extend(std::iter::repeat(err).take(count));
    }

    /// Number of `open_level` calls.
    pub fn open_count(&self) -> usize {
        self.counters.opens.load(Ordering::SeqCst)
    }

    pub fn coord_read_count(&self) -> usize {
        self.counters.coord_reads.load(Ordering::SeqCst)
    }

    /// Number of data reads (slice, sub-slice and series) started.
    pub fn data_read_count(&self) -> usize {
        self.counters.data_reads.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> Vec<ReadRecord> {
        self.reads.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Data reads of whole planes or windows selected by `index`.
    pub fn plane_reads(&self, index: &[u64]) -> usize {
        self.reads()
            .iter()
            .filter(|r| match r {
                ReadRecord::Slice { index: i, .. } | ReadRecord::SubSlice { index: i, .. } => {
                    i == index
                }
                ReadRecord::Series { .. } => false,
            })
            .count()
    }

    pub fn reset_counters(&self) {
        self.counters.opens.store(0, Ordering::SeqCst);
        self.counters.coord_reads.store(0, Ordering::SeqCst);
        self.counters.data_reads.store(0, Ordering::SeqCst);
        self.reads.lock().unwrap_or_else(|p| p.into_inner()).clear();
    }

    fn level(&self, path: &str) -> EngineResult<MemoryLevel> {
        self.levels
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(path)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("level {}", path)))
    }

    fn array(&self, handle: &LevelHandle) -> EngineResult<MemoryArray> {
        self.level(&handle.level_path)?
            .variables
            .remove(&handle.variable)
            .ok_or_else(|| EngineError::not_found(format!("array {}", handle.array_path())))
    }

    /// Record a data read, then apply the delay and any injected failure.
    async fn begin_read(&self, record: ReadRecord) -> EngineResult<()> {
        self.counters.data_reads.fetch_add(1, Ordering::SeqCst);
        self.reads
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(record);

        let delay = *self.delay.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failure = self
            .failures
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front();
        match failure {
            Some(err) => {
                debug!(error = %err, "Injected read failure");
                Err(err)
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PyramidStore for MemoryPyramidStore {
    async fn open_level(
        &self,
        dataset: &DatasetDescriptor,
        level: usize,
        variable: &str,
    ) -> EngineResult<LevelHandle> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        let level_path = dataset
            .level_path(level)
            .ok_or_else(|| EngineError::not_found(format!("level {} of {}", level, dataset.id)))?;
        let array = self
            .level(&level_path)?
            .variables
            .remove(variable)
            .ok_or_else(|| EngineError::not_found(format!("array {}/{}", level_path, variable)))?;
        let expected = dataset.dimensionality.leading_axes() + 2;
        if array.shape.len() != expected {
            return Err(EngineError::shape_mismatch(format!(
                "{}/{}: expected {} dimensions, found {}",
                level_path,
                variable,
                expected,
                array.shape.len()
            )));
        }
        Ok(LevelHandle {
            dataset: dataset.id.clone(),
            level,
            level_path,
            variable: variable.to_string(),
            shape: array.shape,
            dtype: array.dtype,
        })
    }

    async fn read_coords(&self, handle: &LevelHandle) -> EngineResult<LevelCoords> {
        self.counters.coord_reads.fetch_add(1, Ordering::SeqCst);
        let level = self.level(&handle.level_path)?;
        Ok(LevelCoords {
            x: level.x,
            y: level.y,
            years: level.years,
            shape: handle.shape.clone(),
        })
    }

    async fn read_slice(&self, handle: &LevelHandle, index: &[u64]) -> EngineResult<SliceData> {
        self.begin_read(ReadRecord::Slice {
            path: handle.array_path(),
            index: index.to_vec(),
        })
        .await?;
        check_plane_index(handle, index)?;
        let array = self.array(handle)?;
        let (w, h) = handle.plane_size();
        let start = array.plane_offset(index);
        Ok(SliceData {
            values: array.values[start..start + w * h].to_vec(),
            dtype: array.dtype,
        })
    }

    async fn read_sub_slice(
        &self,
        handle: &LevelHandle,
        index: &[u64],
        rect: PixelRect,
    ) -> EngineResult<SliceData> {
        self.begin_read(ReadRecord::SubSlice {
            path: handle.array_path(),
            index: index.to_vec(),
            rect,
        })
        .await?;
        check_plane_index(handle, index)?;
        let (w, h) = handle.plane_size();
        if !rect.fits(w, h) {
            return Err(EngineError::shape_mismatch(format!(
                "window {:?} outside {}x{} plane",
                rect, w, h
            )));
        }
        let array = self.array(handle)?;
        let start = array.plane_offset(index);
        let mut values = Vec::with_capacity(rect.len());
        for row in rect.y_start..rect.y_end() {
            let line = start + row * w;
            values.extend_from_slice(&array.values[line + rect.x_start..line + rect.x_end()]);
        }
        Ok(SliceData {
            values,
            dtype: array.dtype,
        })
    }

    async fn read_pixel_series(
        &self,
        handle: &LevelHandle,
        leading: &[u64],
        col: usize,
        row: usize,
    ) -> EngineResult<SliceData> {
        self.begin_read(ReadRecord::Series {
            path: handle.array_path(),
            leading: leading.to_vec(),
            col,
            row,
        })
        .await?;
        let (w, h) = handle.plane_size();
        let axes = handle.leading_shape();
        if leading.len() + 1 != axes.len() || col >= w || row >= h {
            return Err(EngineError::shape_mismatch(format!(
                "{}: bad series request {:?} at ({}, {})",
                handle.array_path(),
                leading,
                col,
                row
            )));
        }
        let array = self.array(handle)?;
        let steps = axes[axes.len() - 1];
        let values = (0..steps)
            .map(|t| {
                let mut index = leading.to_vec();
                index.push(t);
                array.values[array.plane_offset(&index) + row * w + col]
            })
            .collect();
        Ok(SliceData {
            values,
            dtype: array.dtype,
        })
    }
}
