//! Headless driver for the ECV raster engine.
//!
//! Wires the engine to a Zarr pyramid (HTTP or a local directory) and a
//! renderer port that writes the frame it is handed to a PNG file.

pub mod png_port;
pub mod setup;

pub use png_port::{FrameSidecar, PngPort};
pub use setup::{load_config, open_store, parse_bbox, parse_polygon};
