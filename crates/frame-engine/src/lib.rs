//! Frame orchestration for the raster engine.
//!
//! [`FrameOrchestrator`] owns the display state machine. It picks a level
//! for the reported viewport, loads and colourises slices through the
//! grid-processor data path, double-buffers frames through a
//! [`RendererPort`], and schedules a [`Prefetcher`] round whenever a frame
//! lands.
//!
//! ```text
//! intent / viewport ──► FrameOrchestrator ──► LodSelector
//!                             │
//!                             ├─► SliceLoader ──► renderer::render ──► RendererPort
//!                             │
//!                             └─► Prefetcher (debounced, cancellable)
//! ```

pub mod orchestrator;
pub mod port;
pub mod prefetch;
pub mod share;

pub use orchestrator::{Command, FrameKey, FrameOrchestrator, FrameState};
pub use port::{Frame, FrameStatus, NullPort, RendererPort, Selection};
pub use prefetch::{candidates, PrefetchReport, Prefetcher};
pub use share::ShareState;
