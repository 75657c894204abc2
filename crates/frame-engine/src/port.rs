//! The capability set the orchestrator needs from a map renderer.

use std::fmt;

use ecv_common::{Crs, CrsBounds, DatasetId};
use renderer::ImageHandle;

/// An image ready to be drawn over `crs_bounds`.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub image: ImageHandle,
    pub crs_bounds: CrsBounds,
    pub opacity: f32,
}

/// What is currently selected for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub dataset: DatasetId,
    /// Level drawn.
    pub level: usize,
    /// Level the zoom asked for; differs from `level` when clamped.
    pub target_level: usize,
    /// Year actually shown, for year-month datasets.
    pub year: Option<i32>,
    pub time: usize,
}

/// Status notifications for the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameStatus {
    Loading { dataset: DatasetId },
    Ready { dataset: DatasetId },
    Warning(String),
    Error { kind: &'static str, message: String },
}

impl fmt::Display for FrameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameStatus::Loading { dataset } => write!(f, "loading {}", dataset),
            FrameStatus::Ready { dataset } => write!(f, "{} ready", dataset),
            FrameStatus::Warning(msg) => write!(f, "warning: {}", msg),
            FrameStatus::Error { kind, message } => write!(f, "{} error: {}", kind, message),
        }
    }
}

/// Renderer adapter.
///
/// Calls arrive from the orchestrator's task only, in order. An adapter
/// draws at most the current frame plus the previous one.
pub trait RendererPort: Send {
    /// Reconfigure the map for `crs`. Always called before the first frame
    /// in that CRS.
    fn set_crs(&mut self, crs: Crs);

    /// Show `frame` as the current image; the old current becomes previous.
    fn present_image(&mut self, frame: Frame);

    /// Change the opacity of the current image only.
    fn set_opacity(&mut self, opacity: f32);

    /// Drop the previous image.
    fn clear_previous(&mut self);

    fn notify(&mut self, status: FrameStatus);

    fn selection_changed(&mut self, _selection: &Selection) {}
}

/// Port that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPort;

impl RendererPort for NullPort {
    fn set_crs(&mut self, _crs: Crs) {}
    fn present_image(&mut self, _frame: Frame) {}
    fn set_opacity(&mut self, _opacity: f32) {}
    fn clear_previous(&mut self) {}
    fn notify(&mut self, _status: FrameStatus) {}
}
