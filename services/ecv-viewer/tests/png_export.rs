//! Rendering through the orchestrator into the PNG port.

use std::sync::Arc;

use ecv_common::{DatasetId, EngineConfig, LonLat, Viewport};
use ecv_viewer::PngPort;
use frame_engine::FrameOrchestrator;
use grid_processor::PyramidStore;
use test_utils::{datasets, populate_time_yx, MemoryPyramidStore};

const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

fn engine(store: &Arc<MemoryPyramidStore>) -> FrameOrchestrator<PngPort> {
    let d = datasets::web_time_series("sm", 2);
    populate_time_yx(store, &d, &[(8, 8), (16, 16)], 2, |_, t, col, row| {
        0.1 + (t * 64 + row * 8 + col) as f32 * 1e-3
    });
    let mut config = EngineConfig::default();
    config.prefetch.enabled = false;
    config.datasets = vec![d];
    let store: Arc<dyn PyramidStore> = store.clone();
    FrameOrchestrator::from_store(config, store, PngPort::new()).unwrap()
}

#[tokio::test]
async fn test_render_writes_png_and_sidecar() {
    let store = Arc::new(MemoryPyramidStore::new());
    let mut engine = engine(&store);

    engine
        .report_viewport(Viewport::new(LonLat::new(0.0, 0.0), 0.0))
        .await;
    engine.select_dataset(&DatasetId::new("sm")).await.unwrap();
    engine.set_time(1).await.unwrap();
    engine.settle().await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frame.png");
    let sidecar = engine.port().write(&path).unwrap();

    assert_eq!(sidecar.dataset, "sm");
    assert_eq!(sidecar.time, 1);
    assert_eq!(sidecar.epsg, "EPSG:3857");
    assert!(sidecar.width > 0 && sidecar.height > 0);
    assert!(sidecar.warnings.is_empty());

    let png = std::fs::read(&path).unwrap();
    assert_eq!(&png[..8], &PNG_MAGIC);

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(path.with_extension("json")).unwrap())
            .unwrap();
    assert_eq!(json["dataset"], "sm");
    assert_eq!(json["time"], 1);
    assert_eq!(json["crs_bounds"]["min_x"], sidecar.crs_bounds.min_x);
}

#[tokio::test]
async fn test_failed_render_has_no_frame() {
    let store = Arc::new(MemoryPyramidStore::new());
    let mut engine = engine(&store);

    let err = engine.select_dataset(&DatasetId::new("missing")).await;
    assert!(err.is_err());
    engine.settle().await;

    assert!(engine.port().current().is_none());
    let dir = tempfile::tempdir().unwrap();
    assert!(engine.port().write(&dir.path().join("frame.png")).is_err());
}

#[tokio::test]
async fn test_time_change_keeps_previous_frame() {
    let store = Arc::new(MemoryPyramidStore::new());
    let mut engine = engine(&store);

    engine.select_dataset(&DatasetId::new("sm")).await.unwrap();
    engine.settle().await;
    assert!(!engine.port().has_previous());

    engine.set_time(1).await.unwrap();
    engine.settle().await;
    assert!(engine.port().has_previous());
    assert_eq!(engine.port().selection().map(|s| s.time), Some(1));
}
