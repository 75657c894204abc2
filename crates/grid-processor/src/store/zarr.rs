//! Zarr implementation of [`PyramidStore`] on top of `zarrs`.

use async_trait::async_trait;
use num_traits::AsPrimitive;
use std::sync::Arc;
use tracing::{debug, instrument};
use zarrs::array::{Array, DataType, ElementOwned};
use zarrs::array_subset::ArraySubset;
use zarrs::storage::ReadableStorageTraits;

use ecv_common::{DatasetDescriptor, EngineError, EngineResult, PixelRect};

use super::{check_plane_index, LevelCoords, LevelHandle, PyramidStore, SliceData, SourceDType};
use crate::error::{join_error, open_error, read_error, subset_error};

/// Pyramid store backed by any readable zarrs storage.
///
/// Holds no state beyond the storage handle: every call opens the arrays it
/// needs and reads only the chunks it touches. All zarrs calls are
/// synchronous and run on the blocking pool.
pub struct ZarrStore<S: ?Sized> {
    storage: Arc<S>,
}

impl<S> ZarrStore<S>
where
    S: ?Sized + ReadableStorageTraits + 'static,
{
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// Open the array at `path`.
    async fn array(&self, path: String) -> EngineResult<Arc<Array<S>>> {
        let storage = Arc::clone(&self.storage);
        let node = node_path(&path);
        let array = tokio::task::spawn_blocking(move || {
            Array::open(storage, &node).map_err(|e| open_error(&node, e))
        })
        .await
        .map_err(join_error)??;
        Ok(Arc::new(array))
    }

    /// Open an optional array; absence is `None` rather than an error.
    async fn optional_array(&self, path: String) -> EngineResult<Option<Arc<Array<S>>>> {
        match self.array(path).await {
            Ok(array) => Ok(Some(array)),
            Err(EngineError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn read_subset(
        &self,
        handle: &LevelHandle,
        start: Vec<u64>,
        shape: Vec<u64>,
    ) -> EngineResult<SliceData> {
        let array = self.array(handle.array_path()).await?;
        tokio::task::spawn_blocking(move || {
            let path = array.path().as_str().to_string();
            let subset =
                ArraySubset::new_with_start_shape(start, shape).map_err(|e| subset_error(&path, e))?;
            read_f32(&array, &subset)
        })
        .await
        .map_err(join_error)?
    }
}

#[async_trait]
impl<S> PyramidStore for ZarrStore<S>
where
    S: ?Sized + ReadableStorageTraits + 'static,
{
    #[instrument(skip(self, dataset), fields(dataset = %dataset.id))]
    async fn open_level(
        &self,
        dataset: &DatasetDescriptor,
        level: usize,
        variable: &str,
    ) -> EngineResult<LevelHandle> {
        let level_path = dataset.level_path(level).ok_or_else(|| {
            EngineError::not_found(format!(
                "level {} of dataset '{}' (max {})",
                level,
                dataset.id,
                dataset.max_level()
            ))
        })?;
        let handle_path = format!("{}/{}", level_path, variable);
        let array = self.array(handle_path).await?;

        let shape = array.shape().to_vec();
        let expected_rank = dataset.dimensionality.leading_axes() + 2;
        if shape.len() != expected_rank {
            return Err(EngineError::shape_mismatch(format!(
                "{}/{} has rank {}, expected {}",
                level_path,
                variable,
                shape.len(),
                expected_rank
            )));
        }
        let dtype = source_dtype(array.data_type())?;
        debug!(level, variable, ?shape, %dtype, "Opened level");

        Ok(LevelHandle {
            dataset: dataset.id.clone(),
            level,
            level_path,
            variable: variable.to_string(),
            shape,
            dtype,
        })
    }

    #[instrument(skip(self, handle), fields(dataset = %handle.dataset, level = handle.level))]
    async fn read_coords(&self, handle: &LevelHandle) -> EngineResult<LevelCoords> {
        let x = self.optional_array(handle.sibling_path("x")).await?;
        let y = self.optional_array(handle.sibling_path("y")).await?;
        let year = self.optional_array(handle.sibling_path("year")).await?;

        let (x, y, years) = tokio::task::spawn_blocking(move || -> EngineResult<_> {
            let x = x.map(|a| read_full::<f64, S>(&a)).transpose()?;
            let y = y.map(|a| read_full::<f64, S>(&a)).transpose()?;
            let years = year
                .map(|a| read_full::<f64, S>(&a))
                .transpose()?
                .map(|v| v.into_iter().map(|y| y.round() as i32).collect());
            Ok((x, y, years))
        })
        .await
        .map_err(join_error)??;

        Ok(LevelCoords {
            x,
            y,
            years,
            shape: handle.shape.clone(),
        })
    }

    #[instrument(skip(self, handle), fields(dataset = %handle.dataset, level = handle.level))]
    async fn read_slice(&self, handle: &LevelHandle, index: &[u64]) -> EngineResult<SliceData> {
        check_plane_index(handle, index)?;
        let (w, h) = handle.plane_size();
        let mut start = index.to_vec();
        start.extend([0, 0]);
        let mut shape = vec![1u64; index.len()];
        shape.extend([h as u64, w as u64]);
        self.read_subset(handle, start, shape).await
    }

    #[instrument(skip(self, handle), fields(dataset = %handle.dataset, level = handle.level))]
    async fn read_sub_slice(
        &self,
        handle: &LevelHandle,
        index: &[u64],
        rect: PixelRect,
    ) -> EngineResult<SliceData> {
        check_plane_index(handle, index)?;
        let (w, h) = handle.plane_size();
        if !rect.fits(w, h) {
            return Err(EngineError::not_found(format!(
                "window {:?} outside {}x{} plane of {}",
                rect,
                w,
                h,
                handle.array_path()
            )));
        }
        let mut start = index.to_vec();
        start.extend([rect.y_start as u64, rect.x_start as u64]);
        let mut shape = vec![1u64; index.len()];
        shape.extend([rect.height as u64, rect.width as u64]);
        self.read_subset(handle, start, shape).await
    }

    #[instrument(skip(self, handle), fields(dataset = %handle.dataset, level = handle.level))]
    async fn read_pixel_series(
        &self,
        handle: &LevelHandle,
        leading: &[u64],
        col: usize,
        row: usize,
    ) -> EngineResult<SliceData> {
        let all_leading = handle.leading_shape();
        if all_leading.is_empty() || leading.len() + 1 != all_leading.len() {
            return Err(EngineError::shape_mismatch(format!(
                "{}: series needs {} fixed leading indices, got {}",
                handle.array_path(),
                all_leading.len().saturating_sub(1),
                leading.len()
            )));
        }
        let (w, h) = handle.plane_size();
        if col >= w || row >= h {
            return Err(EngineError::not_found(format!(
                "pixel ({}, {}) outside {}x{} plane",
                col, row, w, h
            )));
        }
        let series_len = all_leading[all_leading.len() - 1];
        let mut start = leading.to_vec();
        start.extend([0, row as u64, col as u64]);
        let mut shape = vec![1u64; leading.len()];
        shape.extend([series_len, 1, 1]);
        self.read_subset(handle, start, shape).await
    }
}

fn node_path(path: &str) -> String {
    format!("/{}", path.trim_start_matches('/'))
}

fn source_dtype(data_type: &DataType) -> EngineResult<SourceDType> {
    Ok(match data_type {
        DataType::Float32 => SourceDType::Float32,
        DataType::Float64 => SourceDType::Float64,
        DataType::Int8 => SourceDType::Int8,
        DataType::Int16 => SourceDType::Int16,
        DataType::Int32 => SourceDType::Int32,
        DataType::Int64 => SourceDType::Int64,
        DataType::UInt8 => SourceDType::UInt8,
        DataType::UInt16 => SourceDType::UInt16,
        DataType::UInt32 => SourceDType::UInt32,
        DataType::UInt64 => SourceDType::UInt64,
        other => {
            return Err(EngineError::decode(format!(
                "unsupported data type {:?}",
                other
            )))
        }
    })
}

fn retrieve_as<T, U, S>(array: &Array<S>, subset: &ArraySubset) -> EngineResult<Vec<U>>
where
    T: ElementOwned + AsPrimitive<U>,
    U: Copy + 'static,
    S: ?Sized + ReadableStorageTraits + 'static,
{
    let values: Vec<T> = array
        .retrieve_array_subset_elements::<T>(subset)
        .map_err(|e| read_error(array.path().as_str(), e))?;
    Ok(values.into_iter().map(AsPrimitive::as_).collect())
}

/// Retrieve `subset` converting any supported numeric type to `U`.
fn retrieve_converted<U, S>(
    array: &Array<S>,
    subset: &ArraySubset,
) -> EngineResult<(Vec<U>, SourceDType)>
where
    U: Copy + 'static,
    f32: AsPrimitive<U>,
    f64: AsPrimitive<U>,
    i8: AsPrimitive<U>,
    i16: AsPrimitive<U>,
    i32: AsPrimitive<U>,
    i64: AsPrimitive<U>,
    u8: AsPrimitive<U>,
    u16: AsPrimitive<U>,
    u32: AsPrimitive<U>,
    u64: AsPrimitive<U>,
    S: ?Sized + ReadableStorageTraits + 'static,
{
    let dtype = source_dtype(array.data_type())?;
    let values = match dtype {
        SourceDType::Float32 => retrieve_as::<f32, U, S>(array, subset)?,
        SourceDType::Float64 => retrieve_as::<f64, U, S>(array, subset)?,
        SourceDType::Int8 => retrieve_as::<i8, U, S>(array, subset)?,
        SourceDType::Int16 => retrieve_as::<i16, U, S>(array, subset)?,
        SourceDType::Int32 => retrieve_as::<i32, U, S>(array, subset)?,
        SourceDType::Int64 => retrieve_as::<i64, U, S>(array, subset)?,
        SourceDType::UInt8 => retrieve_as::<u8, U, S>(array, subset)?,
        SourceDType::UInt16 => retrieve_as::<u16, U, S>(array, subset)?,
        SourceDType::UInt32 => retrieve_as::<u32, U, S>(array, subset)?,
        SourceDType::UInt64 => retrieve_as::<u64, U, S>(array, subset)?,
    };
    Ok((values, dtype))
}

fn read_f32<S>(array: &Array<S>, subset: &ArraySubset) -> EngineResult<SliceData>
where
    S: ?Sized + ReadableStorageTraits + 'static,
{
    let (values, dtype) = retrieve_converted::<f32, S>(array, subset)?;
    Ok(SliceData { values, dtype })
}

/// Read a whole (coordinate) array.
fn read_full<U, S>(array: &Array<S>) -> EngineResult<Vec<U>>
where
    U: Copy + 'static,
    f32: AsPrimitive<U>,
    f64: AsPrimitive<U>,
    i8: AsPrimitive<U>,
    i16: AsPrimitive<U>,
    i32: AsPrimitive<U>,
    i64: AsPrimitive<U>,
    u8: AsPrimitive<U>,
    u16: AsPrimitive<U>,
    u32: AsPrimitive<U>,
    u64: AsPrimitive<U>,
    S: ?Sized + ReadableStorageTraits + 'static,
{
    let subset = ArraySubset::new_with_shape(array.shape().to_vec());
    Ok(retrieve_converted::<U, S>(array, &subset)?.0)
}
