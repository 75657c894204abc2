//! Colouriser: turns a numeric slice into a transparent-where-missing RGBA
//! image.
//!
//! Rendering is pure and deterministic. The same buffer, colour map, value
//! range, fill policy and smoothing level always produce byte-identical
//! output.

pub mod colormap;
pub mod gradient;
pub mod handle;
pub mod smooth;

pub use colormap::{hex_to_rgb, ColourMap};
pub use gradient::{render, RenderParams, IN_RANGE_ALPHA};
pub use handle::ImageHandle;
pub use smooth::{smooth, smoothing_passes};
