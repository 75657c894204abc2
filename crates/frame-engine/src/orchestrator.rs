//! Frame orchestrator: turns user intent and viewport reports into frames.
//!
//! All state lives in one [`FrameOrchestrator`] mutated through `&mut self`.
//! Loads run as spawned tasks and report back through an unbounded channel;
//! a result whose request id is no longer the live one is dropped.
//!
//! ```text
//!            select_dataset / restore
//!   Idle ─────────────────────────────► Loading
//!    ▲                                     │ Finished(Ok)
//!    │ Finished(Err), nothing shown        ▼
//!    └──────────────────────────────── Displaying ◄──────────┐
//!                                          │                  │ Finished(Ok): swap
//!            level / time / year / style   ▼                  │ Finished(Err): undim
//!                                ReloadingWhileDisplaying ────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use ecv_common::config::FRAME_MS;
use ecv_common::{
    ColourMapName, Crs, DatasetDescriptor, DatasetId, DatasetRegistry, EngineConfig, EngineError,
    EngineResult, LoadWarning, LonLat, TemporalCoord, Viewport,
};
use grid_processor::loader::{resolve_plan, visible_window};
use grid_processor::{
    choose_level, north_up, EngineCaches, LodSelector, MetadataKey, PyramidStore, QueryOutcome,
    QueryService, RegionAggregate, RenderedEntry, RenderedKey, SliceLoader, SliceRequest,
    SliceStats, Timeseries,
};
use renderer::RenderParams;

use crate::port::{Frame, FrameStatus, RendererPort, Selection};
use crate::prefetch::{PrefetchReport, Prefetcher};
use crate::share::ShareState;

/// Display state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Loading,
    Displaying,
    ReloadingWhileDisplaying,
}

/// Inbound messages for [`FrameOrchestrator::run`].
#[derive(Debug, Clone)]
pub enum Command {
    SelectDataset(DatasetId),
    SetTime(usize),
    SetYear(i32),
    SetColourMap(ColourMapName),
    SetSmoothing(u8),
    SetOpacity(f32),
    Viewport(Viewport),
    Restore(ShareState),
    Shutdown,
}

/// What the user asked to see.
#[derive(Debug, Clone)]
struct Intent {
    dataset: Arc<DatasetDescriptor>,
    year: Option<i32>,
    time: usize,
    colour_map: ColourMapName,
    smoothing: u8,
    opacity: f32,
}

impl Intent {
    fn for_dataset(dataset: Arc<DatasetDescriptor>, opacity: f32) -> Self {
        let year = dataset
            .year_range
            .filter(|_| dataset.is_multi_year())
            .map(|range| range.end);
        Self {
            colour_map: dataset.default_colour_map,
            smoothing: dataset.default_smoothing,
            year,
            time: 0,
            opacity,
            dataset,
        }
    }

    fn coord(&self) -> TemporalCoord {
        match self.year {
            Some(year) => TemporalCoord::year_month(year, self.time),
            None => TemporalCoord::index(self.time),
        }
    }

    fn render_params(&self) -> RenderParams {
        RenderParams {
            colour_map: self.colour_map,
            vmin: self.dataset.value_range.vmin,
            vmax: self.dataset.value_range.vmax,
            fill_policy: self.dataset.fill_policy,
            smoothing: self.smoothing,
        }
    }
}

/// Identity of a frame request, before the viewport window is known.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FrameKey {
    pub dataset: DatasetId,
    pub level: usize,
    pub coord: TemporalCoord,
    pub colour_map: ColourMapName,
    pub smoothing: u8,
}

/// A frame handed to the port.
#[derive(Debug, Clone)]
struct DisplayedFrame {
    key: RenderedKey,
    entry: RenderedEntry,
    selection: Selection,
    request: SliceRequest,
}

struct ActiveLoad {
    id: u64,
    key: FrameKey,
    handle: JoinHandle<()>,
}

struct LoadOutcome {
    key: RenderedKey,
    entry: RenderedEntry,
    request: SliceRequest,
    warning: Option<LoadWarning>,
}

enum Event {
    Finished {
        id: u64,
        target_level: usize,
        result: EngineResult<LoadOutcome>,
    },
    LodDeadline,
    ReleasePrevious {
        generation: u64,
    },
}

pub struct FrameOrchestrator<P: RendererPort> {
    registry: Arc<DatasetRegistry>,
    loader: SliceLoader,
    queries: QueryService,
    prefetcher: Prefetcher,
    port: P,
    config: EngineConfig,
    lod: LodSelector,
    state: FrameState,
    crs: Option<Crs>,
    intent: Option<Intent>,
    viewport: Viewport,
    current: Option<DisplayedFrame>,
    previous: Option<DisplayedFrame>,
    active: Option<ActiveLoad>,
    next_id: u64,
    generation: u64,
    lod_timer: Option<JoinHandle<()>>,
    share: Option<ShareState>,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
}

impl<P: RendererPort> FrameOrchestrator<P> {
    pub fn new(
        config: EngineConfig,
        registry: Arc<DatasetRegistry>,
        loader: SliceLoader,
        port: P,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            queries: QueryService::new(loader.clone()),
            prefetcher: Prefetcher::new(loader.clone(), config.prefetch),
            lod: LodSelector::new(config.lod_debounce()),
            registry,
            loader,
            port,
            config,
            state: FrameState::Idle,
            crs: None,
            intent: None,
            viewport: Viewport::default(),
            current: None,
            previous: None,
            active: None,
            next_id: 0,
            generation: 0,
            lod_timer: None,
            share: None,
            events_tx,
            events_rx,
        }
    }

    /// Validate `config`, build the registry and caches, and wire a loader
    /// over `store`.
    pub fn from_store(
        config: EngineConfig,
        store: Arc<dyn PyramidStore>,
        port: P,
    ) -> EngineResult<Self> {
        config.validate()?;
        let registry = Arc::new(config.build_registry()?);
        let caches = Arc::new(EngineCaches::new(config.cache_capacities));
        let loader = SliceLoader::new(store, caches, config.loader);
        Ok(Self::new(config, registry, loader, port))
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn registry(&self) -> &Arc<DatasetRegistry> {
        &self.registry
    }

    pub fn loader(&self) -> &SliceLoader {
        &self.loader
    }

    pub fn caches(&self) -> &Arc<EngineCaches> {
        self.loader.caches()
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    pub fn into_port(self) -> P {
        self.port
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn crs(&self) -> Option<Crs> {
        self.crs
    }

    /// Last state that produced a frame.
    pub fn share_state(&self) -> Option<&ShareState> {
        self.share.as_ref()
    }

    pub fn current_selection(&self) -> Option<&Selection> {
        self.current.as_ref().map(|f| &f.selection)
    }

    pub fn previous_selection(&self) -> Option<&Selection> {
        self.previous.as_ref().map(|f| &f.selection)
    }

    /// The frame on screen, at the intended opacity.
    pub fn current_frame(&self) -> Option<Frame> {
        let opacity = self.intent.as_ref().map_or(1.0, |i| i.opacity);
        self.current.as_ref().map(|f| Frame {
            image: f.entry.image.clone(),
            crs_bounds: f.entry.crs_bounds,
            opacity,
        })
    }

    pub fn is_loading(&self) -> bool {
        self.active.is_some()
    }

    /// Switch to `id`. Selecting the dataset already shown is a no-op.
    pub async fn select_dataset(&mut self, id: &DatasetId) -> EngineResult<()> {
        let dataset = self.registry.require(id)?;
        if self
            .intent
            .as_ref()
            .is_some_and(|intent| intent.dataset.id == dataset.id)
        {
            return Ok(());
        }
        self.enter_dataset(dataset);
        self.request_frame().await;
        Ok(())
    }

    pub async fn set_time(&mut self, time: usize) -> EngineResult<()> {
        let intent = self.intent_mut()?;
        if intent.time == time {
            return Ok(());
        }
        intent.time = time;
        self.request_frame().await;
        Ok(())
    }

    pub async fn set_year(&mut self, year: i32) -> EngineResult<()> {
        let intent = self.intent_mut()?;
        if !intent.dataset.is_multi_year() {
            return Err(EngineError::config(format!(
                "dataset '{}' has no year axis",
                intent.dataset.id
            )));
        }
        if intent.year == Some(year) {
            return Ok(());
        }
        intent.year = Some(year);
        self.request_frame().await;
        Ok(())
    }

    pub async fn set_colour_map(&mut self, colour_map: ColourMapName) -> EngineResult<()> {
        let intent = self.intent_mut()?;
        if intent.colour_map == colour_map {
            return Ok(());
        }
        intent.colour_map = colour_map;
        self.request_frame().await;
        Ok(())
    }

    pub async fn set_smoothing(&mut self, smoothing: u8) -> EngineResult<()> {
        if smoothing > 3 {
            return Err(EngineError::config(format!(
                "smoothing must be 0..=3, got {}",
                smoothing
            )));
        }
        let intent = self.intent_mut()?;
        if intent.smoothing == smoothing {
            return Ok(());
        }
        intent.smoothing = smoothing;
        self.request_frame().await;
        Ok(())
    }

    /// Attribute-only update; never reloads.
    pub fn set_opacity(&mut self, opacity: f32) -> EngineResult<()> {
        if !(0.0..=1.0).contains(&opacity) {
            return Err(EngineError::config(format!(
                "opacity must be within 0..=1, got {}",
                opacity
            )));
        }
        self.intent_mut()?.opacity = opacity;
        if let Some(share) = self.share.as_mut() {
            share.opacity = opacity;
        }
        if self.current.is_some() {
            let shown = match self.state {
                FrameState::ReloadingWhileDisplaying => {
                    opacity * self.config.display.reload_dim_factor
                }
                _ => opacity,
            };
            self.port.set_opacity(shown);
        }
        Ok(())
    }

    /// The renderer reports a new camera.
    ///
    /// Reloads when the committed level changes, or when the frame on screen
    /// was read for a window that no longer covers the view.
    pub async fn report_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        let Some(intent) = self.intent.as_ref() else {
            return;
        };
        let dataset = Arc::clone(&intent.dataset);
        let level = self.lod.select(viewport.zoom, dataset.max_level(), dataset.crs);
        self.arm_lod_timer();

        if self.shown_level() != Some(level) {
            debug!(dataset = %dataset.id, level, "Level changed");
            self.request_frame().await;
        } else if self.active.is_none() && !self.covers_viewport().await {
            debug!(dataset = %dataset.id, level, "Viewport left the loaded window");
            self.request_frame().await;
        }
    }

    /// Re-create a shared view.
    pub async fn restore(&mut self, state: &ShareState) -> EngineResult<()> {
        let dataset = self.registry.require(&state.dataset)?;
        if !(0.0..=1.0).contains(&state.opacity) {
            return Err(EngineError::config("shared opacity must be within 0..=1"));
        }
        self.viewport = Viewport::new(LonLat::new(state.lon, state.lat), state.zoom);
        let same = self
            .intent
            .as_ref()
            .is_some_and(|intent| intent.dataset.id == dataset.id);
        if !same {
            self.enter_dataset(Arc::clone(&dataset));
        }

        let intent = self.intent_mut()?;
        if dataset.is_multi_year() {
            if let Some(year) = state.year {
                intent.year = Some(year);
            }
        }
        intent.time = state.time;
        intent.colour_map = state.colour_map;
        intent.opacity = state.opacity;
        if same {
            self.lod.reset();
        }
        self.request_frame().await;
        Ok(())
    }

    /// Point query on the selected dataset at the selected year.
    pub async fn report_pointer(&self, at: LonLat) -> EngineResult<QueryOutcome<Timeseries>> {
        let intent = self.intent()?;
        self.queries
            .point_timeseries(&intent.dataset, at, intent.year)
            .await
    }

    /// Region aggregate over the slice currently selected.
    pub async fn aggregate_region(&self, polygon: &[LonLat]) -> EngineResult<RegionAggregate> {
        let intent = self.intent()?;
        self.queries
            .region_aggregate(&intent.dataset, polygon, intent.year, intent.time)
            .await
    }

    /// Whole-slice statistics of the slice currently selected.
    pub async fn slice_stats(&self) -> EngineResult<QueryOutcome<SliceStats>> {
        let intent = self.intent()?;
        self.queries
            .slice_stats(&intent.dataset, intent.year, intent.time)
            .await
    }

    /// Wait for the pending prefetch round, if one is scheduled.
    pub async fn wait_for_prefetch(&mut self) -> Option<PrefetchReport> {
        self.prefetcher.wait().await
    }

    /// Handle one internal event, waiting for it if necessary.
    pub async fn process_next(&mut self) {
        if let Some(event) = self.events_rx.recv().await {
            self.handle_event(event).await;
        }
    }

    /// Process events until no load and no level change is pending.
    pub async fn settle(&mut self) {
        while self.active.is_some() || self.lod_timer.is_some() {
            self.process_next().await;
        }
    }

    /// Drive the orchestrator from `commands` until they end.
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) -> P {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    None | Some(Command::Shutdown) => break,
                    Some(command) => {
                        if let Err(e) = self.apply(command).await {
                            self.surface_error(&e);
                        }
                    }
                },
                Some(event) = self.events_rx.recv() => self.handle_event(event).await,
            }
        }
        info!("Orchestrator stopped");
        self.shutdown();
        self.port
    }

    pub async fn apply(&mut self, command: Command) -> EngineResult<()> {
        match command {
            Command::SelectDataset(id) => self.select_dataset(&id).await,
            Command::SetTime(time) => self.set_time(time).await,
            Command::SetYear(year) => self.set_year(year).await,
            Command::SetColourMap(map) => self.set_colour_map(map).await,
            Command::SetSmoothing(level) => self.set_smoothing(level).await,
            Command::SetOpacity(opacity) => self.set_opacity(opacity),
            Command::Viewport(viewport) => {
                self.report_viewport(viewport).await;
                Ok(())
            }
            Command::Restore(state) => self.restore(&state).await,
            Command::Shutdown => Ok(()),
        }
    }

    /// Abort every task this orchestrator owns.
    pub fn shutdown(&mut self) {
        self.abort_active();
        self.prefetcher.cancel();
        if let Some(timer) = self.lod_timer.take() {
            timer.abort();
        }
    }

    fn intent(&self) -> EngineResult<&Intent> {
        self.intent
            .as_ref()
            .ok_or_else(|| EngineError::config("no dataset selected"))
    }

    fn intent_mut(&mut self) -> EngineResult<&mut Intent> {
        self.intent
            .as_mut()
            .ok_or_else(|| EngineError::config("no dataset selected"))
    }

    fn enter_dataset(&mut self, dataset: Arc<DatasetDescriptor>) {
        info!(dataset = %dataset.id, crs = %dataset.crs, "Switching dataset");
        self.prefetcher.cancel();
        self.abort_active();
        self.generation += 1;
        self.previous = None;
        self.port.clear_previous();

        if self.crs != Some(dataset.crs) {
            self.current = None;
            self.port.set_crs(dataset.crs);
            self.crs = Some(dataset.crs);
        }
        if self.current.is_none() {
            self.state = FrameState::Idle;
        }

        let opacity = self
            .intent
            .as_ref()
            .map_or(self.config.display.default_opacity, |i| i.opacity);
        self.intent = Some(Intent::for_dataset(dataset, opacity));
        self.lod.reset();
    }

    fn shown_level(&self) -> Option<usize> {
        match &self.active {
            Some(active) => Some(active.key.level),
            None => self.current.as_ref().map(|f| f.selection.level),
        }
    }

    fn level_choice(&mut self, dataset: &DatasetDescriptor) -> (usize, usize) {
        let zoom = self.viewport.zoom;
        let level = self.lod.select(zoom, dataset.max_level(), dataset.crs);
        let target = choose_level(zoom, dataset.max_level(), dataset.crs).target;
        (level, target)
    }

    /// Whether the frame on screen was read for a window containing the
    /// visible pixels. Unknown metadata counts as covered.
    async fn covers_viewport(&self) -> bool {
        let (Some(frame), Some(bounds)) = (self.current.as_ref(), self.viewport.bounds) else {
            return true;
        };
        let Some(window) = frame.key.raw.window else {
            return true;
        };
        let Some(metadata) = self.caches().metadata(&frame.key.raw.metadata_key()).await else {
            return true;
        };
        match visible_window(&frame.request.dataset, &metadata, &bounds) {
            Some(visible) => window.contains(&visible),
            None => true,
        }
    }

    /// Show the frame matching the current intent and viewport.
    async fn request_frame(&mut self) {
        let Some(intent) = self.intent.clone() else {
            return;
        };
        self.prefetcher.cancel();
        let dataset = Arc::clone(&intent.dataset);
        let (level, target_level) = self.level_choice(&dataset);
        let request = SliceRequest::new(Arc::clone(&dataset), level, intent.coord());

        if let Some((rendered_key, warning)) = self.rendered_hit(&request, &intent).await {
            if self.current.as_ref().is_some_and(|f| f.key == rendered_key) {
                debug!(dataset = %dataset.id, level, "Frame already on screen");
                self.abort_active();
                self.undim();
                return;
            }
            if let Some(entry) = self.caches().rendered(&rendered_key).await {
                debug!(key = ?rendered_key, "Rendered cache hit");
                self.abort_active();
                let frame = displayed(rendered_key, entry, request, target_level);
                self.swap_in(frame, warning);
                return;
            }
        }

        let key = FrameKey {
            dataset: dataset.id.clone(),
            level,
            coord: request.coord,
            colour_map: intent.colour_map,
            smoothing: intent.smoothing,
        };
        if self.active.as_ref().is_some_and(|a| a.key == key) {
            debug!(dataset = %dataset.id, level, "Identical request already loading");
            return;
        }
        self.abort_active();

        if self.current.is_some() {
            self.state = FrameState::ReloadingWhileDisplaying;
            self.port
                .set_opacity(intent.opacity * self.config.display.reload_dim_factor);
        } else {
            self.state = FrameState::Loading;
        }
        self.port.notify(FrameStatus::Loading {
            dataset: dataset.id.clone(),
        });

        self.next_id += 1;
        let id = self.next_id;
        let loader = self.loader.clone();
        let viewport = self.viewport;
        let params = intent.render_params();
        let tx = self.events_tx.clone();
        debug!(id, dataset = %dataset.id, level, coord = %request.coord, "Starting load");
        let handle = tokio::spawn(async move {
            let result = load_and_render(&loader, request, viewport, params).await;
            let _ = tx.send(Event::Finished {
                id,
                target_level,
                result,
            });
        });
        self.active = Some(ActiveLoad { id, key, handle });
    }

    /// Rendered-tier key for `request` when its metadata is already cached,
    /// with the substitution warning the resolved plan carries. Prefers a
    /// cached full-plane image over a windowed one.
    async fn rendered_hit(
        &self,
        request: &SliceRequest,
        intent: &Intent,
    ) -> Option<(RenderedKey, Option<LoadWarning>)> {
        let metadata_key = MetadataKey {
            dataset: request.dataset.id.clone(),
            level: request.level,
            variable: request.variable.clone(),
        };
        let metadata = self.caches().metadata(&metadata_key).await?;
        let window = self
            .viewport
            .bounds
            .and_then(|b| self.loader.plan_window(&request.dataset, &metadata, &b));
        let plan = resolve_plan(request, metadata, window).ok()?;

        let full = RenderedKey {
            raw: plan.key.full_plane(),
            colour_map: intent.colour_map,
            smoothing: intent.smoothing,
        };
        if plan.key.window.is_some() && self.caches().has_rendered(&full).await {
            return Some((full, plan.warning));
        }
        let key = RenderedKey {
            raw: plan.key,
            ..full
        };
        Some((key, plan.warning))
    }

    async fn handle_event(&mut self, event: Event) {
        match event {
            Event::Finished {
                id,
                target_level,
                result,
            } => {
                if self.active.as_ref().map(|a| a.id) != Some(id) {
                    debug!(id, "Discarding stale load result");
                    return;
                }
                self.active = None;
                match result {
                    Ok(outcome) => {
                        let frame =
                            displayed(outcome.key, outcome.entry, outcome.request, target_level);
                        self.swap_in(frame, outcome.warning);
                        if !self.covers_viewport().await {
                            self.request_frame().await;
                        }
                    }
                    Err(e) => self.fail(e),
                }
            }
            Event::LodDeadline => {
                self.lod_timer = None;
                let Some(intent) = self.intent.as_ref() else {
                    return;
                };
                let dataset = Arc::clone(&intent.dataset);
                let level = self
                    .lod
                    .select(self.viewport.zoom, dataset.max_level(), dataset.crs);
                self.arm_lod_timer();
                if self.shown_level() != Some(level) {
                    debug!(dataset = %dataset.id, level, "Debounced level committed");
                    self.request_frame().await;
                }
            }
            Event::ReleasePrevious { generation } => {
                if generation == self.generation && self.previous.take().is_some() {
                    self.port.clear_previous();
                }
            }
        }
    }

    /// Make `frame` current. The old frame is kept as previous for one more
    /// frame when it belongs to the same dataset.
    fn swap_in(&mut self, frame: DisplayedFrame, warning: Option<LoadWarning>) {
        let Some(intent) = self.intent.as_ref() else {
            return;
        };
        let opacity = intent.opacity;
        let colour_map = intent.colour_map;

        self.port.present_image(Frame {
            image: frame.entry.image.clone(),
            crs_bounds: frame.entry.crs_bounds,
            opacity,
        });

        self.generation += 1;
        match self.current.take() {
            Some(old) if old.selection.dataset == frame.selection.dataset => {
                self.previous = Some(old);
                self.schedule_release(self.generation);
            }
            Some(_) => {
                self.previous = None;
                self.port.clear_previous();
            }
            None => {}
        }

        let selection = frame.selection.clone();
        info!(
            dataset = %selection.dataset,
            level = selection.level,
            time = selection.time,
            year = ?selection.year,
            "Frame swapped"
        );
        self.port.notify(FrameStatus::Ready {
            dataset: selection.dataset.clone(),
        });
        if let Some(warning) = warning {
            warn!(dataset = %selection.dataset, %warning, "Showing substitute");
            self.port.notify(FrameStatus::Warning(warning.to_string()));
        }
        self.port.selection_changed(&selection);
        self.state = FrameState::Displaying;

        self.share = Some(ShareState {
            dataset: selection.dataset.clone(),
            year: selection.year,
            time: selection.time,
            lon: self.viewport.center.lon,
            lat: self.viewport.center.lat,
            zoom: self.viewport.zoom,
            colour_map,
            opacity,
        });
        self.prefetcher
            .schedule(frame.request.clone(), Some(self.viewport));
        self.current = Some(frame);
    }

    fn fail(&mut self, error: EngineError) {
        if self.current.is_some() {
            self.undim();
        } else {
            self.state = FrameState::Idle;
        }
        self.surface_error(&error);
    }

    fn surface_error(&mut self, error: &EngineError) {
        if !error.is_user_visible() {
            return;
        }
        warn!(kind = error.kind(), error = %error, "Frame request failed");
        self.port.notify(FrameStatus::Error {
            kind: error.kind(),
            message: error.to_string(),
        });
    }

    /// Back to `Displaying` at full intended opacity.
    fn undim(&mut self) {
        if self.state == FrameState::ReloadingWhileDisplaying {
            if let Some(intent) = self.intent.as_ref() {
                self.port.set_opacity(intent.opacity);
            }
        }
        if self.current.is_some() {
            self.state = FrameState::Displaying;
        }
    }

    fn abort_active(&mut self) {
        if let Some(active) = self.active.take() {
            debug!(id = active.id, "Aborting superseded load");
            active.handle.abort();
        }
    }

    fn arm_lod_timer(&mut self) {
        if let Some(timer) = self.lod_timer.take() {
            timer.abort();
        }
        if let Some(deadline) = self.lod.pending_deadline() {
            let tx = self.events_tx.clone();
            self.lod_timer = Some(tokio::spawn(async move {
                tokio::time::sleep_until(deadline).await;
                let _ = tx.send(Event::LodDeadline);
            }));
        }
    }

    fn schedule_release(&self, generation: u64) {
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(FRAME_MS)).await;
            let _ = tx.send(Event::ReleasePrevious { generation });
        });
    }
}

fn displayed(
    key: RenderedKey,
    entry: RenderedEntry,
    request: SliceRequest,
    target_level: usize,
) -> DisplayedFrame {
    let selection = Selection {
        dataset: key.raw.dataset.clone(),
        level: key.raw.level,
        target_level,
        year: key.raw.year,
        time: key.raw.time,
    };
    DisplayedFrame {
        key,
        entry,
        selection,
        request,
    }
}

/// Load the slice, then render it unless the rendered tier already has it.
#[instrument(skip_all, fields(dataset = %request.dataset.id, level = request.level, coord = %request.coord))]
async fn load_and_render(
    loader: &SliceLoader,
    request: SliceRequest,
    viewport: Viewport,
    params: RenderParams,
) -> EngineResult<LoadOutcome> {
    let loaded = loader.load_slice(&request, Some(&viewport)).await?;
    let key = RenderedKey {
        raw: loaded.key.clone(),
        colour_map: params.colour_map,
        smoothing: params.smoothing,
    };
    let caches = loader.caches();

    let entry = match caches.rendered(&key).await {
        Some(entry) => entry,
        None => {
            let slice = Arc::clone(&loaded.slice);
            let entry = tokio::task::spawn_blocking(move || {
                let oriented = north_up(&slice);
                let image =
                    renderer::render(&oriented.values, oriented.width, oriented.height, &params)?;
                Ok::<_, EngineError>(RenderedEntry {
                    width: image.width(),
                    height: image.height(),
                    image,
                    crs_bounds: oriented.crs_bounds,
                })
            })
            .await
            .map_err(|e| {
                if e.is_cancelled() {
                    EngineError::Cancelled
                } else {
                    EngineError::decode(format!("colourisation task failed: {}", e))
                }
            })??;
            caches.store_rendered(key.clone(), entry.clone()).await;
            entry
        }
    };

    Ok(LoadOutcome {
        key,
        entry,
        request,
        warning: loaded.warning,
    })
}
