//! In-memory caching primitives for the raster engine.
//!
//! - [`LruTier`]: a fixed-capacity LRU map with hit/miss/eviction counters.
//! - [`InflightTable`]: single-flight deduplication of concurrent fetches.
//!
//! Both are runtime-agnostic building blocks; the concrete metadata, raw and
//! rendered tiers are assembled on top of them by the grid processor.

pub mod inflight;
pub mod lru_tier;

pub use inflight::{InflightTable, SharedFetch};
pub use lru_tier::{CacheStats, LruTier};
