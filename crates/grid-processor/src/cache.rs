//! The three cache tiers (metadata, raw slices, rendered images) and their
//! single-flight fetch paths.

use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use ecv_common::{
    CacheCapacities, ColourMapName, CrsBounds, DatasetId, EngineError, EngineResult, PixelRect,
};
use renderer::ImageHandle;
use storage::{CacheStats, InflightTable, LruTier};

use crate::types::{LevelMetadata, RawSlice};

/// Key of the metadata tier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetadataKey {
    pub dataset: DatasetId,
    pub level: usize,
    pub variable: String,
}

/// Key of the raw-slice tier.
///
/// `year` is the year actually read; `window` is `None` for full-plane reads.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RawKey {
    pub dataset: DatasetId,
    pub level: usize,
    pub variable: String,
    pub year: Option<i32>,
    pub time: usize,
    pub window: Option<PixelRect>,
}

impl RawKey {
    pub fn metadata_key(&self) -> MetadataKey {
        MetadataKey {
            dataset: self.dataset.clone(),
            level: self.level,
            variable: self.variable.clone(),
        }
    }

    /// The same slice read as a whole plane.
    pub fn full_plane(&self) -> RawKey {
        RawKey {
            window: None,
            ..self.clone()
        }
    }
}

/// Key of the rendered tier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderedKey {
    pub raw: RawKey,
    pub colour_map: ColourMapName,
    pub smoothing: u8,
}

/// A colourised slice ready for display.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEntry {
    pub image: ImageHandle,
    pub width: u32,
    pub height: u32,
    pub crs_bounds: CrsBounds,
}

/// Snapshot of all three tiers' counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierStats {
    pub metadata: CacheStats,
    pub raw: CacheStats,
    pub rendered: CacheStats,
}

type Tier<K, V> = Arc<Mutex<LruTier<K, V>>>;

/// Metadata, raw and rendered caches plus the in-flight tables that keep at
/// most one fetch live per metadata or raw key.
pub struct EngineCaches {
    metadata: Tier<MetadataKey, Arc<LevelMetadata>>,
    raw: Tier<RawKey, Arc<RawSlice>>,
    rendered: Tier<RenderedKey, RenderedEntry>,
    metadata_inflight: InflightTable<MetadataKey, Arc<LevelMetadata>, EngineError>,
    raw_inflight: InflightTable<RawKey, Arc<RawSlice>, EngineError>,
}

impl EngineCaches {
    pub fn new(capacities: CacheCapacities) -> Self {
        Self {
            metadata: Arc::new(Mutex::new(LruTier::new("metadata", capacities.metadata))),
            raw: Arc::new(Mutex::new(LruTier::new("raw", capacities.raw))),
            rendered: Arc::new(Mutex::new(LruTier::new("rendered", capacities.rendered))),
            metadata_inflight: InflightTable::new(),
            raw_inflight: InflightTable::new(),
        }
    }

    // === Metadata ===

    pub async fn metadata(&self, key: &MetadataKey) -> Option<Arc<LevelMetadata>> {
        self.metadata.lock().await.get(key)
    }

    /// Cached metadata, or the result of a deduplicated `producer` run.
    pub async fn fetch_metadata<F, Fut>(
        &self,
        key: MetadataKey,
        producer: F,
    ) -> EngineResult<Arc<LevelMetadata>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = EngineResult<Arc<LevelMetadata>>> + Send + 'static,
    {
        fetch_through(&self.metadata, &self.metadata_inflight, key, producer).await
    }

    // === Raw slices ===

    pub async fn raw(&self, key: &RawKey) -> Option<Arc<RawSlice>> {
        self.raw.lock().await.get(key)
    }

    /// Membership test that does not disturb LRU order.
    pub async fn has_raw(&self, key: &RawKey) -> bool {
        self.raw.lock().await.has(key)
    }

    pub fn raw_in_flight(&self, key: &RawKey) -> bool {
        self.raw_inflight.contains(key)
    }

    pub async fn fetch_raw<F, Fut>(&self, key: RawKey, producer: F) -> EngineResult<Arc<RawSlice>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = EngineResult<Arc<RawSlice>>> + Send + 'static,
    {
        fetch_through(&self.raw, &self.raw_inflight, key, producer).await
    }

    // === Rendered images ===

    pub async fn rendered(&self, key: &RenderedKey) -> Option<RenderedEntry> {
        self.rendered.lock().await.get(key)
    }

    pub async fn has_rendered(&self, key: &RenderedKey) -> bool {
        self.rendered.lock().await.has(key)
    }

    pub async fn store_rendered(&self, key: RenderedKey, entry: RenderedEntry) {
        self.rendered.lock().await.set(key, entry);
    }

    pub async fn stats(&self) -> TierStats {
        TierStats {
            metadata: self.metadata.lock().await.stats(),
            raw: self.raw.lock().await.stats(),
            rendered: self.rendered.lock().await.stats(),
        }
    }
}

/// Tier lookup, falling back to a single-flight fetch that writes its
/// result into the tier on success.
async fn fetch_through<K, V, F, Fut>(
    tier: &Tier<K, V>,
    inflight: &InflightTable<K, V, EngineError>,
    key: K,
    producer: F,
) -> EngineResult<V>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = EngineResult<V>> + Send + 'static,
{
    if let Some(value) = tier.lock().await.get(&key) {
        debug!(key = ?key, "Cache hit");
        return Ok(value);
    }

    let tier_ref = Arc::clone(tier);
    let slot_key = key.clone();
    inflight
        .dedupe(key, move || {
            let fetch = producer();
            async move {
                let value = fetch.await?;
                tier_ref.lock().await.set(slot_key, value.clone());
                Ok(value)
            }
        })
        .await
}
