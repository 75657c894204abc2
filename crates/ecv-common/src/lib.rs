//! Common types shared across the ECV raster engine crates.
//!
//! Everything here is plain data: dataset descriptors and their registry,
//! the two supported coordinate reference systems, CRS-space bounds,
//! viewports, temporal coordinates, the engine configuration and the error
//! taxonomy every other crate reports through.

pub mod bbox;
pub mod config;
pub mod crs;
pub mod dataset;
pub mod error;
pub mod registry;
pub mod style;
pub mod time;
pub mod viewport;

pub use bbox::{CrsBounds, GeoBounds, PixelRect};
pub use config::{CacheCapacities, DisplayConfig, EngineConfig, LoaderConfig, PrefetchConfig};
pub use crs::Crs;
pub use dataset::{
    DatasetDescriptor, DatasetId, Dimensionality, FillPolicy, ValueRange, YearRange,
};
pub use error::{EngineError, EngineResult, LoadWarning};
pub use registry::DatasetRegistry;
pub use style::ColourMapName;
pub use time::TemporalCoord;
pub use viewport::{LonLat, Viewport};
