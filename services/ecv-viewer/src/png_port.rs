//! Renderer port that keeps the last frame and writes it as a PNG.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use ecv_common::{Crs, CrsBounds};
use frame_engine::{Frame, FrameStatus, RendererPort, Selection};

/// Metadata written next to the PNG so the image can be georeferenced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameSidecar {
    pub dataset: String,
    pub level: usize,
    pub target_level: usize,
    pub year: Option<i32>,
    pub time: usize,
    pub crs: Crs,
    pub epsg: &'static str,
    pub crs_bounds: CrsBounds,
    pub width: u32,
    pub height: u32,
    /// Display opacity; not baked into the PNG.
    pub opacity: f32,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PngPort {
    crs: Option<Crs>,
    current: Option<Frame>,
    previous: Option<Frame>,
    selection: Option<Selection>,
    warnings: Vec<String>,
    errors: Vec<String>,
}

impl PngPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&Frame> {
        self.current.as_ref()
    }

    pub fn has_previous(&self) -> bool {
        self.previous.is_some()
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Describe the current frame.
    pub fn sidecar(&self) -> Option<FrameSidecar> {
        let frame = self.current.as_ref()?;
        let selection = self.selection.as_ref()?;
        let crs = self.crs?;
        Some(FrameSidecar {
            dataset: selection.dataset.to_string(),
            level: selection.level,
            target_level: selection.target_level,
            year: selection.year,
            time: selection.time,
            crs,
            epsg: crs.epsg_code(),
            crs_bounds: frame.crs_bounds,
            width: frame.image.width(),
            height: frame.image.height(),
            opacity: frame.opacity,
            warnings: self.warnings.clone(),
        })
    }

    /// Write the current frame to `path` and its sidecar to `path.json`.
    pub fn write(&self, path: &Path) -> Result<FrameSidecar> {
        let frame = self.current.as_ref().context("no frame was rendered")?;
        let sidecar = self.sidecar().context("frame has no selection")?;

        let png = frame.image.to_png()?;
        std::fs::write(path, png)
            .with_context(|| format!("failed to write {}", path.display()))?;

        let sidecar_path = path.with_extension("json");
        let json = serde_json::to_string_pretty(&sidecar)?;
        std::fs::write(&sidecar_path, json)
            .with_context(|| format!("failed to write {}", sidecar_path.display()))?;

        info!(
            path = %path.display(),
            width = sidecar.width,
            height = sidecar.height,
            "Wrote frame"
        );
        Ok(sidecar)
    }
}

impl RendererPort for PngPort {
    fn set_crs(&mut self, crs: Crs) {
        debug!(crs = %crs, "Map CRS set");
        self.crs = Some(crs);
        self.current = None;
        self.previous = None;
    }

    fn present_image(&mut self, frame: Frame) {
        self.previous = self.current.replace(frame);
    }

    fn set_opacity(&mut self, opacity: f32) {
        if let Some(frame) = self.current.as_mut() {
            frame.opacity = opacity;
        }
    }

    fn clear_previous(&mut self) {
        self.previous = None;
    }

    fn notify(&mut self, status: FrameStatus) {
        match status {
            FrameStatus::Loading { dataset } => debug!(dataset = %dataset, "Loading"),
            FrameStatus::Ready { dataset } => debug!(dataset = %dataset, "Ready"),
            FrameStatus::Warning(message) => {
                warn!(%message, "Engine warning");
                self.warnings.push(message);
            }
            FrameStatus::Error { kind, message } => {
                warn!(kind, %message, "Engine error");
                self.errors.push(message);
            }
        }
    }

    fn selection_changed(&mut self, selection: &Selection) {
        self.selection = Some(selection.clone());
    }
}
