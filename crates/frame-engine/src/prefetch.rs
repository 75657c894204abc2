//! Predictive warming of the raw-slice tier.
//!
//! After the orchestrator shows a frame it schedules a prefetch for the
//! neighbourhood of that frame: adjacent levels, nearby time steps and, for
//! year-month datasets, adjacent years. Warming runs after a debounce so
//! that scrubbing through time only warms where the user stops.

use tokio::task::JoinHandle;
use tracing::{debug, info};

use ecv_common::{Dimensionality, PrefetchConfig, TemporalCoord, Viewport};
use grid_processor::{LevelMetadata, SliceLoader, SliceRequest};

/// Counts of one prefetch round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrefetchReport {
    pub warmed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Result of warming a single candidate.
#[derive(Debug)]
enum WarmResult {
    Loaded,
    AlreadyCached,
    Failed,
}

/// Owns at most one pending prefetch task.
pub struct Prefetcher {
    loader: SliceLoader,
    config: PrefetchConfig,
    task: Option<JoinHandle<PrefetchReport>>,
}

impl Prefetcher {
    pub fn new(loader: SliceLoader, config: PrefetchConfig) -> Self {
        Self {
            loader,
            config,
            task: None,
        }
    }

    pub fn config(&self) -> &PrefetchConfig {
        &self.config
    }

    /// Replace any pending round with one around `current`.
    pub fn schedule(&mut self, current: SliceRequest, viewport: Option<Viewport>) {
        self.cancel();
        if !self.config.enabled {
            return;
        }
        let loader = self.loader.clone();
        let config = self.config;
        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep(config.debounce()).await;
            warm_neighbourhood(&loader, &config, &current, viewport.as_ref()).await
        }));
    }

    /// Abort the pending round. A fetch it started is abandoned in the
    /// in-flight table: the next load of that key resumes it, and starting
    /// any other fetch reclaims it.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            if !task.is_finished() {
                debug!("Cancelling prefetch");
            }
            task.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Wait for the pending round, if any. `None` when nothing was scheduled
    /// or the round was cancelled.
    pub async fn wait(&mut self) -> Option<PrefetchReport> {
        let task = self.task.take()?;
        task.await.ok()
    }
}

impl Drop for Prefetcher {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn warm_neighbourhood(
    loader: &SliceLoader,
    config: &PrefetchConfig,
    current: &SliceRequest,
    viewport: Option<&Viewport>,
) -> PrefetchReport {
    let mut report = PrefetchReport::default();

    let metadata = match loader
        .metadata(&current.dataset, current.level, &current.variable)
        .await
    {
        Ok(metadata) => metadata,
        Err(e) => {
            debug!(dataset = %current.dataset.id, error = %e, "Prefetch skipped");
            return report;
        }
    };

    let candidates = candidates(current, time_steps(current, &metadata), config);
    debug!(
        dataset = %current.dataset.id,
        level = current.level,
        candidates = candidates.len(),
        "Prefetch starting"
    );

    for candidate in candidates {
        match warm_one(loader, &candidate, viewport).await {
            WarmResult::Loaded => report.warmed += 1,
            WarmResult::AlreadyCached => report.skipped += 1,
            WarmResult::Failed => report.failed += 1,
        }
    }

    info!(
        dataset = %current.dataset.id,
        warmed = report.warmed,
        skipped = report.skipped,
        failed = report.failed,
        "Prefetch complete"
    );
    report
}

async fn warm_one(
    loader: &SliceLoader,
    candidate: &SliceRequest,
    viewport: Option<&Viewport>,
) -> WarmResult {
    let plan = match loader.plan(candidate, viewport).await {
        Ok(plan) => plan,
        Err(e) => {
            debug!(
                level = candidate.level,
                coord = %candidate.coord,
                error = %e,
                "Prefetch candidate unavailable"
            );
            return WarmResult::Failed;
        }
    };

    let full = plan.key.full_plane();
    if loader.is_cached_or_pending(&plan.key).await
        || (plan.key.window.is_some() && loader.is_cached_or_pending(&full).await)
    {
        debug!(key = ?plan.key, "Prefetch skip, already cached");
        return WarmResult::AlreadyCached;
    }

    match loader.load_planned(plan).await {
        Ok(loaded) => {
            debug!(key = ?loaded.key, "Prefetched slice");
            WarmResult::Loaded
        }
        Err(e) => {
            debug!(
                level = candidate.level,
                coord = %candidate.coord,
                error = %e,
                "Prefetch failed"
            );
            WarmResult::Failed
        }
    }
}

/// Number of positions along the innermost temporal axis.
fn time_steps(request: &SliceRequest, metadata: &LevelMetadata) -> usize {
    match request.dataset.dimensionality {
        Dimensionality::TimeYx => metadata
            .handle
            .leading_shape()
            .first()
            .map(|&n| n as usize)
            .unwrap_or(0),
        Dimensionality::YearMonthYx => grid_processor::loader::MONTHS_PER_YEAR,
    }
}

/// Prefetch candidates around `current`, highest priority first.
///
/// Adjacent levels (finer before coarser), then `time+1, time-1, time+2,
/// time-2, ..` bounded by the lookahead/lookbehind and `steps`, then
/// adjacent years within the dataset's year range.
pub fn candidates(
    current: &SliceRequest,
    steps: usize,
    config: &PrefetchConfig,
) -> Vec<SliceRequest> {
    let mut out = Vec::new();
    let max_level = current.dataset.max_level();
    let level = current.level;

    for d in 1..=config.level_lookahead {
        if level + d <= max_level {
            out.push(current.with_level(level + d));
        }
        if level >= d {
            out.push(current.with_level(level - d));
        }
    }

    let time = current.coord.time();
    for d in 1..=config.time_lookahead.max(config.time_lookbehind) {
        if d <= config.time_lookahead && time + d < steps {
            out.push(current.with_coord(current.coord.with_time(time + d)));
        }
        if d <= config.time_lookbehind && time >= d {
            out.push(current.with_coord(current.coord.with_time(time - d)));
        }
    }

    if let (TemporalCoord::YearMonth { year, .. }, Some(range)) =
        (current.coord, current.dataset.year_range)
    {
        for d in 1..=config.year_lookahead as i32 {
            if range.contains(year + d) {
                out.push(current.with_coord(current.coord.with_year(year + d)));
            }
            if range.contains(year - d) {
                out.push(current.with_coord(current.coord.with_year(year - d)));
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::datasets;

    fn config() -> PrefetchConfig {
        PrefetchConfig::default()
    }

    fn describe(requests: &[SliceRequest]) -> Vec<(usize, String)> {
        requests
            .iter()
            .map(|r| (r.level, r.coord.to_string()))
            .collect()
    }

    #[test]
    fn test_candidate_order_time_series() {
        let dataset = std::sync::Arc::new(datasets::web_time_series("sst", 4));
        let current = SliceRequest::new(dataset, 2, TemporalCoord::index(3));
        let got = describe(&candidates(&current, 10, &config()));
        assert_eq!(
            got,
            vec![
                (3, "t3".to_string()),
                (1, "t3".to_string()),
                (2, "t4".to_string()),
                (2, "t2".to_string()),
                (2, "t5".to_string()),
                (2, "t1".to_string()),
            ]
        );
    }

    #[test]
    fn test_candidates_respect_bounds() {
        let dataset = std::sync::Arc::new(datasets::web_time_series("sst", 2));
        let current = SliceRequest::new(dataset, 1, TemporalCoord::index(0));
        let got = describe(&candidates(&current, 2, &config()));
        assert_eq!(got, vec![(0, "t0".to_string()), (1, "t1".to_string())]);
    }

    #[test]
    fn test_candidates_include_adjacent_years() {
        let dataset = std::sync::Arc::new(datasets::year_month("ice", 1, 1985, 1987));
        let current = SliceRequest::new(dataset, 0, TemporalCoord::year_month(1987, 11));
        let got = describe(&candidates(&current, 12, &config()));
        assert_eq!(
            got,
            vec![
                (0, "1987-11".to_string()),
                (0, "1987-10".to_string()),
                (0, "1986-12".to_string()),
            ]
        );
    }

    #[test]
    fn test_zero_lookahead_yields_nothing() {
        let dataset = std::sync::Arc::new(datasets::web_time_series("sst", 3));
        let current = SliceRequest::new(dataset, 1, TemporalCoord::index(1));
        let config = PrefetchConfig {
            time_lookahead: 0,
            time_lookbehind: 0,
            level_lookahead: 0,
            ..PrefetchConfig::default()
        };
        assert!(candidates(&current, 5, &config).is_empty());
    }
}
