//! Integration test: write a small pyramid level with zarrs and read it back
//! through `ZarrStore` and `SliceLoader`.

use std::path::Path;
use std::sync::Arc;

use ecv_common::{
    CacheCapacities, CrsBounds, DatasetDescriptor, EngineError, LoaderConfig, PixelRect,
    TemporalCoord,
};
use grid_processor::{
    EngineCaches, PyramidStore, SliceLoader, SliceRequest, SourceDType, ZarrStore,
};
use test_utils::{create_test_grid, datasets};
use zarrs::array::{ArrayBuilder, DataType, Element, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs_filesystem::FilesystemStore;

const WIDTH: usize = 8;
const HEIGHT: usize = 6;
const STEPS: usize = 2;

type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Write a 1-D or N-D array at `node` in one go.
fn write_array<T: Element>(
    store: &Arc<FilesystemStore>,
    node: &str,
    shape: Vec<u64>,
    chunks: Vec<u64>,
    data_type: DataType,
    fill: FillValue,
    values: &[T],
) -> TestResult {
    let array = ArrayBuilder::new(shape.clone(), data_type, chunks.try_into()?, fill)
        .build(store.clone(), node)?;
    array.store_metadata()?;
    let subset = ArraySubset::new_with_shape(shape);
    array.store_array_subset_elements(&subset, values)?;
    Ok(())
}

/// Value at `(t, col, row)`: `t * 100 + create_test_grid`.
fn plane(t: usize) -> Vec<f32> {
    create_test_grid(WIDTH, HEIGHT)
        .into_iter()
        .map(|v| v + (t * 100) as f32)
        .collect()
}

fn write_level(root: &Path, with_coords: bool) -> TestResult {
    let store = Arc::new(FilesystemStore::new(root)?);

    let values: Vec<f32> = (0..STEPS).flat_map(plane).collect();
    write_array(
        &store,
        "/sm_pyramid/0/value",
        vec![STEPS as u64, HEIGHT as u64, WIDTH as u64],
        vec![1, 4, 4],
        DataType::Float32,
        FillValue::from(f32::NAN),
        &values,
    )?;

    // Same data as u16 to exercise dtype normalisation.
    let counts: Vec<u16> = values.iter().map(|&v| (v as u32 % 60000) as u16).collect();
    write_array(
        &store,
        "/sm_pyramid/0/count",
        vec![STEPS as u64, HEIGHT as u64, WIDTH as u64],
        vec![1, 3, 8],
        DataType::UInt16,
        FillValue::from(0u16),
        &counts,
    )?;

    if with_coords {
        let x: Vec<f64> = (0..WIDTH).map(|i| i as f64 * 10.0).collect();
        let y: Vec<f64> = (0..HEIGHT).rev().map(|i| i as f64 * 10.0).collect();
        write_array(
            &store,
            "/sm_pyramid/0/x",
            vec![WIDTH as u64],
            vec![WIDTH as u64],
            DataType::Float64,
            FillValue::from(f64::NAN),
            &x,
        )?;
        write_array(
            &store,
            "/sm_pyramid/0/y",
            vec![HEIGHT as u64],
            vec![HEIGHT as u64],
            DataType::Float64,
            FillValue::from(f64::NAN),
            &y,
        )?;
    }
    Ok(())
}

fn descriptor() -> DatasetDescriptor {
    DatasetDescriptor {
        aux_variables: vec!["count".into()],
        ..datasets::web_time_series("sm", 1)
    }
}

fn open_store(root: &Path) -> Arc<ZarrStore<FilesystemStore>> {
    let fs = FilesystemStore::new(root).expect("open filesystem store");
    Arc::new(ZarrStore::new(Arc::new(fs)))
}

#[tokio::test]
async fn test_zarr_store_reads_planes_windows_and_series() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    write_level(dir.path(), true).expect("Failed to write Zarr");
    let store = open_store(dir.path());
    let d = descriptor();

    let handle = store.open_level(&d, 0, "value").await.unwrap();
    assert_eq!(handle.shape, vec![STEPS as u64, HEIGHT as u64, WIDTH as u64]);
    assert_eq!(handle.dtype, SourceDType::Float32);
    assert_eq!(handle.plane_size(), (WIDTH, HEIGHT));

    let coords = store.read_coords(&handle).await.unwrap();
    assert_eq!(coords.x.as_ref().map(Vec::len), Some(WIDTH));
    assert_eq!(coords.y.as_ref().and_then(|y| y.first().copied()), Some(50.0));
    assert_eq!(coords.years, None);

    let slice = store.read_slice(&handle, &[1]).await.unwrap();
    assert_eq!(slice.values, plane(1));

    // Window crossing chunk boundaries on both axes.
    let rect = PixelRect::new(3, 2, 4, 3);
    let window = store.read_sub_slice(&handle, &[0], rect).await.unwrap();
    assert_eq!(window.values.len(), 12);
    for r in 0..3 {
        for c in 0..4 {
            let expected = ((3 + c) * 1000 + (2 + r)) as f32;
            assert_eq!(window.values[r * 4 + c], expected);
        }
    }

    let series = store.read_pixel_series(&handle, &[], 5, 4).await.unwrap();
    assert_eq!(series.values, vec![5004.0, 5104.0]);
}

#[tokio::test]
async fn test_zarr_store_normalises_integer_dtype() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    write_level(dir.path(), true).expect("Failed to write Zarr");
    let store = open_store(dir.path());

    let handle = store.open_level(&descriptor(), 0, "count").await.unwrap();
    assert_eq!(handle.dtype, SourceDType::UInt16);
    let slice = store.read_slice(&handle, &[0]).await.unwrap();
    assert_eq!(slice.dtype, SourceDType::UInt16);
    assert_eq!(slice.values[1], 1000.0);
}

#[tokio::test]
async fn test_zarr_store_sees_rewritten_arrays() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    write_level(dir.path(), true).expect("Failed to write Zarr");
    let store = open_store(dir.path());
    let d = descriptor();

    let before = store.open_level(&d, 0, "value").await.unwrap();
    assert_eq!(store.read_slice(&before, &[0]).await.unwrap().values, plane(0));

    // Replace the level with a single-step u16 array of a different shape.
    let fs = Arc::new(FilesystemStore::new(dir.path()).expect("open filesystem store"));
    write_array(
        &fs,
        "/sm_pyramid/0/value",
        vec![1, 2, 3],
        vec![1, 2, 3],
        DataType::UInt16,
        FillValue::from(0u16),
        &[1u16, 2, 3, 4, 5, 6],
    )
    .expect("Failed to rewrite Zarr");

    let after = store.open_level(&d, 0, "value").await.unwrap();
    assert_eq!(after.shape, vec![1, 2, 3]);
    assert_eq!(after.dtype, SourceDType::UInt16);
    let slice = store.read_slice(&after, &[0]).await.unwrap();
    assert_eq!(slice.values, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
}

#[tokio::test]
async fn test_zarr_store_missing_arrays() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    write_level(dir.path(), true).expect("Failed to write Zarr");
    let store = open_store(dir.path());
    let d = descriptor();

    let err = store.open_level(&d, 0, "uncertainty").await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)), "{:?}", err);

    let err = store.open_level(&d, 3, "value").await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)), "{:?}", err);
}

#[tokio::test]
async fn test_loader_over_zarr_with_synthesised_coords() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    write_level(dir.path(), false).expect("Failed to write Zarr");
    let store = open_store(dir.path());
    let caches = Arc::new(EngineCaches::new(CacheCapacities::default()));
    let loader = SliceLoader::new(store, caches, LoaderConfig::default());

    // No coordinate arrays and no aux_bounds.
    let bare = Arc::new(descriptor());
    let err = loader
        .load_slice(&SliceRequest::new(bare, 0, TemporalCoord::index(0)), None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));

    let with_bounds = Arc::new(DatasetDescriptor {
        aux_bounds: Some(CrsBounds::new(0.0, 0.0, 80.0, 60.0)),
        ..descriptor()
    });
    let loaded = loader
        .load_slice(&SliceRequest::new(with_bounds, 0, TemporalCoord::index(1)), None)
        .await
        .unwrap();
    assert_eq!(loaded.slice.width, WIDTH);
    assert_eq!(*loaded.slice.values, plane(1));
    // Centres of 10-unit pixels, y descending.
    assert_eq!(loaded.slice.crs_bounds, CrsBounds::new(5.0, 5.0, 75.0, 55.0));
    assert_eq!(loaded.slice.y_coords.first().copied(), Some(55.0));
}
