//! Orchestrator behaviour against the in-memory pyramid store.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use ecv_common::{
    Crs, CrsBounds, DatasetDescriptor, DatasetId, EngineConfig, EngineError, LonLat, Viewport,
};
use frame_engine::{
    Command, Frame, FrameOrchestrator, FrameState, FrameStatus, PrefetchReport, RendererPort,
    Selection, ShareState,
};
use grid_processor::coords::synthesize_xy;
use grid_processor::{PyramidStore, RawKey};
use test_utils::{datasets, populate_time_yx, populate_year_month, MemoryPyramidStore};

#[derive(Debug, Clone, PartialEq)]
enum PortEvent {
    SetCrs(Crs),
    Present { crs_bounds: CrsBounds, opacity: f32 },
    SetOpacity(f32),
    ClearPrevious,
    Notify(FrameStatus),
    Selection(Selection),
}

/// Port that records every call.
#[derive(Debug, Clone, Default)]
struct RecordingPort {
    events: Arc<Mutex<Vec<PortEvent>>>,
}

impl RecordingPort {
    fn events(&self) -> Vec<PortEvent> {
        self.events.lock().unwrap().clone()
    }

    fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    fn presents(&self) -> Vec<(CrsBounds, f32)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                PortEvent::Present {
                    crs_bounds,
                    opacity,
                } => Some((crs_bounds, opacity)),
                _ => None,
            })
            .collect()
    }

    fn statuses(&self) -> Vec<FrameStatus> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                PortEvent::Notify(status) => Some(status),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: PortEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl RendererPort for RecordingPort {
    fn set_crs(&mut self, crs: Crs) {
        self.push(PortEvent::SetCrs(crs));
    }

    fn present_image(&mut self, frame: Frame) {
        self.push(PortEvent::Present {
            crs_bounds: frame.crs_bounds,
            opacity: frame.opacity,
        });
    }

    fn set_opacity(&mut self, opacity: f32) {
        self.push(PortEvent::SetOpacity(opacity));
    }

    fn clear_previous(&mut self) {
        self.push(PortEvent::ClearPrevious);
    }

    fn notify(&mut self, status: FrameStatus) {
        self.push(PortEvent::Notify(status));
    }

    fn selection_changed(&mut self, selection: &Selection) {
        self.push(PortEvent::Selection(selection.clone()));
    }
}

const WEB_SIZES: [(usize, usize); 4] = [(4, 4), (8, 8), (16, 16), (32, 32)];

fn web_dataset(store: &MemoryPyramidStore) -> DatasetDescriptor {
    let d = datasets::web_time_series("sm", WEB_SIZES.len());
    populate_time_yx(store, &d, &WEB_SIZES, 3, |level, t, col, row| {
        0.1 + (level * 1000 + t * 100 + row * 10 + col) as f32 * 1e-5
    });
    d
}

fn polar_dataset(store: &MemoryPyramidStore) -> DatasetDescriptor {
    let d = datasets::polar_time_series("ice", 3);
    populate_time_yx(store, &d, &[(8, 8), (16, 16), (32, 32)], 2, |_, _, col, row| {
        10.0 + (row + col) as f32
    });
    d
}

fn engine(
    store: &Arc<MemoryPyramidStore>,
    descriptors: Vec<DatasetDescriptor>,
    config: EngineConfig,
) -> (FrameOrchestrator<RecordingPort>, RecordingPort) {
    let port = RecordingPort::default();
    let config = EngineConfig {
        datasets: descriptors,
        ..config
    };
    let store: Arc<dyn PyramidStore> = store.clone();
    let orchestrator = FrameOrchestrator::from_store(config, store, port.clone()).unwrap();
    (orchestrator, port)
}

fn no_prefetch() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.prefetch.enabled = false;
    config
}

fn raw_key(level: usize, time: usize) -> RawKey {
    RawKey {
        dataset: DatasetId::new("sm"),
        level,
        variable: "value".into(),
        year: None,
        time,
        window: None,
    }
}

/// Scenario 1 setup: web dataset displayed at zoom 2.
async fn displayed_web(
    config: EngineConfig,
) -> (
    FrameOrchestrator<RecordingPort>,
    RecordingPort,
    Arc<MemoryPyramidStore>,
) {
    let store = Arc::new(MemoryPyramidStore::new());
    let d = web_dataset(&store);
    let (mut orch, port) = engine(&store, vec![d], config);
    orch.report_viewport(Viewport::new(LonLat::new(0.0, 0.0), 2.0))
        .await;
    orch.select_dataset(&DatasetId::new("sm")).await.unwrap();
    orch.settle().await;
    (orch, port, store)
}

#[tokio::test(start_paused = true)]
async fn test_fresh_load_global_web_dataset() {
    let (orch, port, store) = displayed_web(EngineConfig::default()).await;

    assert_eq!(store.open_count(), 1);
    assert_eq!(store.data_read_count(), 1);
    assert_eq!(store.plane_reads(&[0]), 1);

    assert_eq!(orch.state(), FrameState::Displaying);
    let selection = orch.current_selection().unwrap();
    assert_eq!(selection.level, 3);
    assert_eq!(selection.target_level, 3);
    assert_eq!(selection.time, 0);

    let (w, h) = WEB_SIZES[3];
    let (x, y) = synthesize_xy(&Crs::Web.extent(), w, h);
    let expected = CrsBounds::from_corners(x[0], y[0], x[w - 1], y[h - 1]);
    let presents = port.presents();
    assert_eq!(presents.len(), 1);
    assert_eq!(presents[0], (expected, 1.0));

    let stats = orch.caches().stats().await;
    assert_eq!(stats.raw.entries, 1);
    assert_eq!(stats.rendered.entries, 1);
    assert_eq!(stats.metadata.entries, 1);

    let statuses = port.statuses();
    assert_eq!(
        statuses,
        vec![
            FrameStatus::Loading {
                dataset: DatasetId::new("sm")
            },
            FrameStatus::Ready {
                dataset: DatasetId::new("sm")
            },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_time_scrub_uses_prefetched_slices() {
    let (mut orch, port, store) = displayed_web(EngineConfig::default()).await;

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(
        orch.wait_for_prefetch().await,
        Some(PrefetchReport {
            warmed: 3,
            skipped: 0,
            failed: 0
        })
    );

    orch.set_time(1).await.unwrap();
    orch.settle().await;

    assert_eq!(orch.current_selection().unwrap().time, 1);
    assert_eq!(port.presents().len(), 2);
    assert_eq!(store.plane_reads(&[1]), 1);

    let report = orch.wait_for_prefetch().await.unwrap();
    assert_eq!(report.skipped, 2);
    assert!(orch.caches().has_raw(&raw_key(3, 2)).await);
    assert!(orch.caches().has_raw(&raw_key(3, 0)).await);
    assert_eq!(store.plane_reads(&[1]), 2, "level 2 warmed once at t=1");
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_prefetch_is_warmed_by_a_later_round() {
    let (mut orch, _port, store) = displayed_web(EngineConfig::default()).await;
    store.set_read_delay(Some(Duration::from_secs(1)));

    // The first candidate (level 2, t=0) is mid-read when time changes.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(orch.caches().raw_in_flight(&raw_key(2, 0)));
    orch.set_time(1).await.unwrap();
    orch.settle().await;
    assert!(!orch.caches().raw_in_flight(&raw_key(2, 0)));
    assert!(!orch.caches().has_raw(&raw_key(2, 0)).await);
    orch.wait_for_prefetch().await;

    orch.set_time(0).await.unwrap();
    orch.settle().await;
    assert_eq!(
        orch.wait_for_prefetch().await,
        Some(PrefetchReport {
            warmed: 1,
            skipped: 2,
            failed: 0
        })
    );
    assert!(orch.caches().has_raw(&raw_key(2, 0)).await);
}

#[tokio::test(start_paused = true)]
async fn test_missing_year_is_substituted_and_surfaced() {
    let store = Arc::new(MemoryPyramidStore::new());
    let d = datasets::year_month("pf", 1, 1988, 2023);
    let years: Vec<i32> = (1988..=2023).filter(|&y| y != 1990).collect();
    populate_year_month(&store, &d, &[(8, 4)], &years, |_, yi, month, _, _| {
        260.0 + yi as f32 + month as f32 * 0.1
    });
    let (mut orch, port) = engine(&store, vec![d], no_prefetch());

    orch.select_dataset(&DatasetId::new("pf")).await.unwrap();
    orch.settle().await;
    assert_eq!(orch.current_selection().unwrap().year, Some(2023));

    orch.set_year(1990).await.unwrap();
    orch.set_time(5).await.unwrap();
    orch.settle().await;

    let selection = orch.current_selection().unwrap();
    assert_eq!(selection.year, Some(1989));
    assert_eq!(selection.time, 5);
    assert_eq!(orch.state(), FrameState::Displaying);
    assert!(port.statuses().contains(&FrameStatus::Warning(
        "year 1990 not available, showing 1989 (earlier)".to_string()
    )));
}

#[tokio::test(start_paused = true)]
async fn test_substitution_is_surfaced_again_on_rendered_cache_hit() {
    let store = Arc::new(MemoryPyramidStore::new());
    let d = datasets::year_month("pf", 1, 1988, 2023);
    let years: Vec<i32> = (1988..=2023).filter(|&y| y != 1990).collect();
    populate_year_month(&store, &d, &[(8, 4)], &years, |_, yi, month, _, _| {
        260.0 + yi as f32 + month as f32 * 0.1
    });
    let (mut orch, port) = engine(&store, vec![d], no_prefetch());
    let warning = FrameStatus::Warning("year 1990 not available, showing 1989 (earlier)".to_string());

    orch.select_dataset(&DatasetId::new("pf")).await.unwrap();
    orch.set_year(1990).await.unwrap();
    orch.settle().await;
    assert!(port.statuses().contains(&warning));

    orch.set_year(2000).await.unwrap();
    orch.settle().await;
    assert_eq!(orch.current_selection().unwrap().year, Some(2000));

    port.clear();
    let reads = store.data_read_count();
    orch.set_year(1990).await.unwrap();
    orch.settle().await;

    assert_eq!(store.data_read_count(), reads, "served from the rendered tier");
    assert_eq!(orch.current_selection().unwrap().year, Some(1989));
    let warnings = port
        .statuses()
        .into_iter()
        .filter(|s| *s == warning)
        .count();
    assert_eq!(warnings, 1);
}

#[tokio::test(start_paused = true)]
async fn test_crs_switch_clears_previous_before_first_polar_frame() {
    let store = Arc::new(MemoryPyramidStore::new());
    let web = web_dataset(&store);
    let polar = polar_dataset(&store);
    let (mut orch, port) = engine(&store, vec![web, polar], no_prefetch());

    orch.report_viewport(Viewport::new(LonLat::new(0.0, 70.0), 2.0))
        .await;
    orch.select_dataset(&DatasetId::new("sm")).await.unwrap();
    orch.settle().await;
    port.clear();

    orch.select_dataset(&DatasetId::new("ice")).await.unwrap();
    assert_eq!(orch.state(), FrameState::Loading);
    orch.settle().await;

    let events = port.events();
    assert_eq!(events[0], PortEvent::ClearPrevious);
    let set_crs = events
        .iter()
        .position(|e| *e == PortEvent::SetCrs(Crs::Polar))
        .unwrap();
    let present = events
        .iter()
        .position(|e| matches!(e, PortEvent::Present { .. }))
        .unwrap();
    assert!(set_crs < present);
    assert!(!events[..present]
        .iter()
        .any(|e| matches!(e, PortEvent::SetOpacity(_))));

    let (bounds, _) = port.presents()[0];
    assert!(Crs::Polar.extent().contains(&bounds));
    assert_eq!(orch.crs(), Some(Crs::Polar));
    assert!(orch.previous_selection().is_none());
    assert_eq!(orch.current_selection().unwrap().dataset.as_str(), "ice");
}

#[tokio::test(start_paused = true)]
async fn test_rendered_cache_rehit_skips_raw_fetch() {
    let (mut orch, port, store) = displayed_web(no_prefetch()).await;
    orch.set_time(1).await.unwrap();
    orch.settle().await;
    let reads = store.data_read_count();

    orch.set_time(0).await.unwrap();
    assert!(!orch.is_loading());
    assert_eq!(orch.state(), FrameState::Displaying);
    assert_eq!(store.data_read_count(), reads);
    assert_eq!(port.presents().len(), 3);
    assert_eq!(orch.current_selection().unwrap().time, 0);
    assert_eq!(orch.previous_selection().unwrap().time, 1);
}

#[tokio::test(start_paused = true)]
async fn test_reload_dims_current_frame_until_swap() {
    let (mut orch, port, store) = displayed_web(no_prefetch()).await;
    store.set_read_delay(Some(Duration::from_millis(50)));
    port.clear();

    orch.set_time(2).await.unwrap();
    assert_eq!(orch.state(), FrameState::ReloadingWhileDisplaying);
    assert_eq!(port.events()[0], PortEvent::SetOpacity(0.7));

    orch.settle().await;
    assert_eq!(orch.state(), FrameState::Displaying);
    let (_, opacity) = port.presents()[0];
    assert_eq!(opacity, 1.0);
    assert_eq!(orch.previous_selection().unwrap().time, 0);

    tokio::time::sleep(Duration::from_millis(20)).await;
    orch.process_next().await;
    assert!(orch.previous_selection().is_none());
    assert_eq!(port.events().last(), Some(&PortEvent::ClearPrevious));
}

#[tokio::test(start_paused = true)]
async fn test_superseded_request_is_never_shown() {
    let (mut orch, port, store) = displayed_web(no_prefetch()).await;
    store.set_read_delay(Some(Duration::from_millis(50)));

    orch.set_time(1).await.unwrap();
    orch.set_time(2).await.unwrap();
    orch.settle().await;

    assert_eq!(port.presents().len(), 2);
    assert_eq!(orch.current_selection().unwrap().time, 2);
}

#[tokio::test(start_paused = true)]
async fn test_identical_request_is_not_restarted() {
    let (mut orch, port, store) = displayed_web(no_prefetch()).await;
    store.set_read_delay(Some(Duration::from_millis(50)));
    let mut same = orch.share_state().unwrap().clone();
    same.time = 1;
    port.clear();

    orch.set_time(1).await.unwrap();
    orch.restore(&same).await.unwrap();
    orch.settle().await;

    let loading = port
        .statuses()
        .into_iter()
        .filter(|s| matches!(s, FrameStatus::Loading { .. }))
        .count();
    assert_eq!(loading, 1);
    assert_eq!(store.plane_reads(&[1]), 1);
    assert_eq!(port.presents().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_reload_keeps_frame_and_restores_opacity() {
    let (mut orch, port, store) = displayed_web(no_prefetch()).await;
    store.fail_next_reads(1, EngineError::network("connection reset"));
    let share_before = orch.share_state().cloned();
    port.clear();

    orch.set_time(1).await.unwrap();
    orch.settle().await;

    assert_eq!(orch.state(), FrameState::Displaying);
    assert_eq!(orch.current_selection().unwrap().time, 0);
    assert_eq!(orch.share_state().cloned(), share_before);
    let events = port.events();
    assert_eq!(events[0], PortEvent::SetOpacity(0.7));
    assert!(events.contains(&PortEvent::SetOpacity(1.0)));
    assert!(port.statuses().iter().any(|s| matches!(
        s,
        FrameStatus::Error {
            kind: "network",
            ..
        }
    )));
}

#[tokio::test(start_paused = true)]
async fn test_failed_first_load_returns_to_idle() {
    let store = Arc::new(MemoryPyramidStore::new());
    let d = datasets::web_time_series("empty", 2);
    let (mut orch, port) = engine(&store, vec![d], no_prefetch());

    orch.select_dataset(&DatasetId::new("empty")).await.unwrap();
    orch.settle().await;

    assert_eq!(orch.state(), FrameState::Idle);
    assert!(port.presents().is_empty());
    assert!(orch.share_state().is_none());
    assert!(port.statuses().iter().any(|s| matches!(
        s,
        FrameStatus::Error {
            kind: "not_found",
            ..
        }
    )));
}

#[tokio::test(start_paused = true)]
async fn test_level_change_waits_for_debounce() {
    let (mut orch, _port, _store) = displayed_web(no_prefetch()).await;

    orch.report_viewport(Viewport::new(LonLat::new(0.0, 0.0), 1.0))
        .await;
    assert!(!orch.is_loading());
    assert_eq!(orch.current_selection().unwrap().level, 3);

    orch.settle().await;
    assert_eq!(orch.current_selection().unwrap().level, 2);
}

#[tokio::test(start_paused = true)]
async fn test_opacity_is_attribute_only() {
    let (mut orch, port, store) = displayed_web(no_prefetch()).await;
    let reads = store.data_read_count();
    port.clear();

    orch.set_opacity(0.4).unwrap();

    assert_eq!(port.events(), vec![PortEvent::SetOpacity(0.4)]);
    assert_eq!(store.data_read_count(), reads);
    assert!(!orch.is_loading());
    assert_eq!(orch.share_state().unwrap().opacity, 0.4);
    assert!(orch.set_opacity(1.5).is_err());
}

#[tokio::test(start_paused = true)]
async fn test_share_state_restores_same_view() {
    let (mut orch, _port, store) = displayed_web(no_prefetch()).await;
    orch.set_time(2).await.unwrap();
    orch.settle().await;
    let shared = orch.share_state().unwrap().clone();
    let query = shared.to_query_string();

    let d = datasets::web_time_series("sm", WEB_SIZES.len());
    let (mut restored, port) = engine(&store, vec![d], no_prefetch());
    restored
        .restore(&ShareState::from_query_string(&query).unwrap())
        .await
        .unwrap();
    restored.settle().await;

    assert_eq!(restored.share_state(), Some(&shared));
    assert_eq!(restored.current_selection().unwrap().time, 2);
    assert_eq!(port.presents().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_queries_need_a_selected_dataset() {
    let store = Arc::new(MemoryPyramidStore::new());
    let d = web_dataset(&store);
    let (orch, _port) = engine(&store, vec![d], no_prefetch());

    let err = orch.report_pointer(LonLat::new(0.0, 0.0)).await.unwrap_err();
    assert!(matches!(err, EngineError::Config(_)));
    assert!(orch.aggregate_region(&[]).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_run_loop_processes_commands() {
    let store = Arc::new(MemoryPyramidStore::new());
    let d = web_dataset(&store);
    let (orch, _port) = engine(&store, vec![d], no_prefetch());
    let (tx, rx) = tokio::sync::mpsc::channel(8);
    let handle = tokio::spawn(orch.run(rx));

    tx.send(Command::Viewport(Viewport::new(LonLat::new(0.0, 0.0), 0.5)))
        .await
        .unwrap();
    tx.send(Command::SelectDataset(DatasetId::new("sm")))
        .await
        .unwrap();
    tx.send(Command::SelectDataset(DatasetId::new("nope")))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    tx.send(Command::Shutdown).await.unwrap();

    let port = handle.await.unwrap();
    let presents = port.presents();
    assert_eq!(presents.len(), 1);
    assert!(port.statuses().iter().any(|s| matches!(
        s,
        FrameStatus::Error {
            kind: "not_found",
            ..
        }
    )));
}
