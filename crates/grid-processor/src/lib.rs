//! Data path of the raster engine: chunked store access, cache tiers,
//! level selection, slice loading and queries.
//!
//! Only the chunks a view needs are fetched. Decoded planes are kept in an
//! LRU tier keyed by `(dataset, level, year, time, window)` and concurrent
//! requests for the same key share one fetch.
//!
//! # Architecture
//!
//! ```text
//! SliceRequest (+ viewport)
//!      │
//!      ▼
//! SliceLoader::load_slice
//!      │
//!      ├─► metadata: MetadataKey ──► EngineCaches ──miss──► PyramidStore::open_level / read_coords
//!      │
//!      ├─► resolve time index / year (YearSubstituted warning)
//!      │
//!      ├─► viewport window (project edges, binary search coords, pad)
//!      │
//!      └─► raw slice: RawKey ──► EngineCaches ──miss──► read_slice / read_sub_slice
//!               │
//!               ▼
//!          LoadedSlice { slice, warning }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use grid_processor::{EngineCaches, SliceLoader, SliceRequest, ZarrStore};
//!
//! let store = Arc::new(ZarrStore::new(create_http_storage(&config.api_base_url)?));
//! let caches = Arc::new(EngineCaches::new(config.cache_capacities));
//! let loader = SliceLoader::new(store, caches, config.loader);
//!
//! let request = SliceRequest::new(dataset, 3, TemporalCoord::index(0));
//! let loaded = loader.load_slice(&request, Some(&viewport)).await?;
//! ```

pub mod cache;
pub mod coords;
mod error;
pub mod loader;
pub mod lod;
pub mod query;
pub mod store;
pub mod types;

pub use cache::{EngineCaches, MetadataKey, RawKey, RenderedEntry, RenderedKey, TierStats};
pub use loader::{SliceLoader, SlicePlan, SliceRequest};
pub use lod::{choose_level, LevelChoice, LodSelector};
pub use query::{
    QueryEmpty, QueryOutcome, QueryService, RegionAggregate, SliceStats, Timeseries,
    TimeseriesPoint, Trend,
};
pub use store::{
    create_http_storage, HandleBlockOn, HttpStorage, LevelCoords, LevelHandle, PyramidStore,
    SliceData, SourceDType, ZarrStore,
};
pub use types::{north_up, LevelMetadata, LoadedSlice, NorthUpSlice, RawSlice};
