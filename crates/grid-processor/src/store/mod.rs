//! Store adapter: async access to pyramid levels in a chunked array store.

mod http;
mod zarr;

pub use http::{create_http_storage, HandleBlockOn, HttpStorage};
pub use zarr::ZarrStore;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use ecv_common::{DatasetDescriptor, DatasetId, EngineResult, PixelRect};

/// Numeric type of the values as stored, before normalisation to `f32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceDType {
    Float32,
    Float64,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
}

impl fmt::Display for SourceDType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceDType::Float32 => "float32",
            SourceDType::Float64 => "float64",
            SourceDType::Int8 => "int8",
            SourceDType::Int16 => "int16",
            SourceDType::Int32 => "int32",
            SourceDType::Int64 => "int64",
            SourceDType::UInt8 => "uint8",
            SourceDType::UInt16 => "uint16",
            SourceDType::UInt32 => "uint32",
            SourceDType::UInt64 => "uint64",
        };
        f.write_str(name)
    }
}

/// An opened variable array at one pyramid level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelHandle {
    pub dataset: DatasetId,
    pub level: usize,
    /// Store path of the level group, e.g. `sst/2`.
    pub level_path: String,
    pub variable: String,
    /// Full shape of the variable array, leading axes first.
    pub shape: Vec<u64>,
    pub dtype: SourceDType,
}

impl LevelHandle {
    /// `(width, height)` of the spatial plane.
    pub fn plane_size(&self) -> (usize, usize) {
        match self.shape.as_slice() {
            [.., h, w] => (*w as usize, *h as usize),
            _ => (0, 0),
        }
    }

    /// Shape of the axes preceding `[Y, X]`.
    pub fn leading_shape(&self) -> &[u64] {
        let n = self.shape.len().saturating_sub(2);
        &self.shape[..n]
    }

    /// Path of a sibling array in the same level group.
    pub fn sibling_path(&self, name: &str) -> String {
        format!("{}/{}", self.level_path, name)
    }

    pub fn array_path(&self) -> String {
        self.sibling_path(&self.variable)
    }
}

/// Coordinate arrays of a level. Missing arrays are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelCoords {
    pub x: Option<Vec<f64>>,
    pub y: Option<Vec<f64>>,
    pub years: Option<Vec<i32>>,
    pub shape: Vec<u64>,
}

/// Values read from the store, normalised to `f32`.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceData {
    pub values: Vec<f32>,
    pub dtype: SourceDType,
}

/// Async access to the pyramid levels of a chunked array store.
///
/// Every read is an independent range request; implementations do not cache
/// decoded data.
#[async_trait]
pub trait PyramidStore: Send + Sync {
    /// Open the array of `variable` at `level` of `dataset`.
    async fn open_level(
        &self,
        dataset: &DatasetDescriptor,
        level: usize,
        variable: &str,
    ) -> EngineResult<LevelHandle>;

    /// Read the `x`, `y` and (if present) `year` arrays of the level.
    async fn read_coords(&self, handle: &LevelHandle) -> EngineResult<LevelCoords>;

    /// Read a whole `[Y, X]` plane selected by the leading indices.
    async fn read_slice(&self, handle: &LevelHandle, index: &[u64]) -> EngineResult<SliceData>;

    /// Read a window of a plane. Only chunks intersecting `rect` are fetched
    /// and the result is dense row-major over `rect`.
    async fn read_sub_slice(
        &self,
        handle: &LevelHandle,
        index: &[u64],
        rect: PixelRect,
    ) -> EngineResult<SliceData>;

    /// Read the vector along the innermost leading axis at one pixel.
    ///
    /// `leading` fixes every leading axis except the innermost one, so it is
    /// empty for `[T, Y, X]` arrays and `[year_index]` for `[Year, Month, Y, X]`.
    async fn read_pixel_series(
        &self,
        handle: &LevelHandle,
        leading: &[u64],
        col: usize,
        row: usize,
    ) -> EngineResult<SliceData>;
}

#[async_trait]
impl<T: PyramidStore + ?Sized> PyramidStore for Arc<T> {
    async fn open_level(
        &self,
        dataset: &DatasetDescriptor,
        level: usize,
        variable: &str,
    ) -> EngineResult<LevelHandle> {
        (**self).open_level(dataset, level, variable).await
    }

    async fn read_coords(&self, handle: &LevelHandle) -> EngineResult<LevelCoords> {
        (**self).read_coords(handle).await
    }

    async fn read_slice(&self, handle: &LevelHandle, index: &[u64]) -> EngineResult<SliceData> {
        (**self).read_slice(handle, index).await
    }

    async fn read_sub_slice(
        &self,
        handle: &LevelHandle,
        index: &[u64],
        rect: PixelRect,
    ) -> EngineResult<SliceData> {
        (**self).read_sub_slice(handle, index, rect).await
    }

    async fn read_pixel_series(
        &self,
        handle: &LevelHandle,
        leading: &[u64],
        col: usize,
        row: usize,
    ) -> EngineResult<SliceData> {
        (**self).read_pixel_series(handle, leading, col, row).await
    }
}

/// Check that `index` addresses every leading axis of `handle`.
pub fn check_plane_index(handle: &LevelHandle, index: &[u64]) -> EngineResult<()> {
    let leading = handle.leading_shape();
    if index.len() != leading.len() {
        return Err(ecv_common::EngineError::shape_mismatch(format!(
            "{}: expected {} leading indices, got {}",
            handle.array_path(),
            leading.len(),
            index.len()
        )));
    }
    for (axis, (&i, &len)) in index.iter().zip(leading).enumerate() {
        if i >= len {
            return Err(ecv_common::EngineError::not_found(format!(
                "{}: index {} out of range on axis {} (len {})",
                handle.array_path(),
                i,
                axis,
                len
            )));
        }
    }
    Ok(())
}
