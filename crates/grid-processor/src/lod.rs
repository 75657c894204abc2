//! Pyramid level selection for a viewport.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use ecv_common::Crs;

/// Result of a level choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelChoice {
    /// Level implied by the zoom, before clamping to the pyramid.
    pub target: usize,
    /// Level actually used, `min(target, max_level)`.
    pub effective: usize,
}

impl LevelChoice {
    pub fn is_clamped(&self) -> bool {
        self.target != self.effective
    }
}

/// Level implied by `zoom` for a pyramid whose finest level is `max_level`.
///
/// Web datasets use `floor(zoom) + 1`. Polar datasets walk the resolution
/// ladder and take the coarsest level whose nominal resolution is at least
/// as fine as the viewport's metres per pixel.
pub fn choose_level(zoom: f64, max_level: usize, crs: Crs) -> LevelChoice {
    let target = match crs {
        Crs::Web => {
            let z = if zoom.is_finite() { zoom.floor() } else { 0.0 };
            (z + 1.0).max(0.0) as usize
        }
        Crs::Polar => polar_target(crs.metres_per_pixel(zoom), max_level),
    };
    LevelChoice {
        target,
        effective: target.min(max_level),
    }
}

fn polar_target(mpp: f64, max_level: usize) -> usize {
    if !mpp.is_finite() {
        return 0;
    }
    (0..=max_level)
        .find(|&level| Crs::polar_level_resolution(level) <= mpp)
        .unwrap_or_else(|| {
            // Finer than the pyramid: report how far past the finest level we are.
            let mut level = max_level;
            while Crs::polar_level_resolution(level) > mpp && level < 64 {
                level += 1;
            }
            level
        })
}

/// Debounced level selection.
///
/// The first selection commits immediately. Afterwards a different level is
/// only committed once it has been requested continuously for the debounce
/// window, so zoom gestures hovering over a boundary do not thrash.
#[derive(Debug, Clone)]
pub struct LodSelector {
    debounce: Duration,
    committed: Option<usize>,
    pending: Option<(usize, Instant)>,
}

impl LodSelector {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            committed: None,
            pending: None,
        }
    }

    pub fn committed(&self) -> Option<usize> {
        self.committed
    }

    /// Select a level for `zoom`, returning the committed level.
    pub fn select(&mut self, zoom: f64, max_level: usize, crs: Crs) -> usize {
        self.select_at(zoom, max_level, crs, Instant::now())
    }

    pub fn select_at(&mut self, zoom: f64, max_level: usize, crs: Crs, now: Instant) -> usize {
        let choice = choose_level(zoom, max_level, crs);
        if choice.is_clamped() {
            debug!(
                target_level = choice.target,
                effective_level = choice.effective,
                "Level clamped to pyramid"
            );
        }
        let wanted = choice.effective;

        let Some(current) = self.committed else {
            self.committed = Some(wanted);
            self.pending = None;
            return wanted;
        };

        if wanted == current {
            self.pending = None;
            return current;
        }

        match self.pending {
            Some((level, since)) if level == wanted => {
                if now.duration_since(since) >= self.debounce {
                    debug!(from = current, to = wanted, "Committing level change");
                    self.committed = Some(wanted);
                    self.pending = None;
                    wanted
                } else {
                    current
                }
            }
            _ => {
                self.pending = Some((wanted, now));
                current
            }
        }
    }

    /// When the pending level (if any) becomes committable.
    pub fn pending_deadline(&self) -> Option<Instant> {
        self.pending.map(|(_, since)| since + self.debounce)
    }

    pub fn pending_level(&self) -> Option<usize> {
        self.pending.map(|(level, _)| level)
    }

    /// Forget all history; the next selection commits immediately.
    pub fn reset(&mut self) {
        self.committed = None;
        self.pending = None;
    }
}
