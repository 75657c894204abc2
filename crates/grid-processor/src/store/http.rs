//! HTTP backend: a remote Zarr store read through `object_store`.

use std::sync::Arc;

use object_store::http::{HttpBuilder, HttpStore};
use tokio::runtime::Handle;
use zarrs_object_store::AsyncObjectStore;
use zarrs_storage::storage_adapter::async_to_sync::{
    AsyncToSyncBlockOn, AsyncToSyncStorageAdapter,
};

use ecv_common::{EngineError, EngineResult};

/// Drives async storage futures from the blocking pool.
///
/// Store reads always run inside `spawn_blocking`, where blocking on the
/// captured runtime handle is allowed.
#[derive(Clone)]
pub struct HandleBlockOn(Handle);

impl HandleBlockOn {
    /// Capture the handle of the current runtime.
    pub fn current() -> EngineResult<Self> {
        Handle::try_current()
            .map(Self)
            .map_err(|e| EngineError::config(format!("no tokio runtime available: {}", e)))
    }
}

impl AsyncToSyncBlockOn for HandleBlockOn {
    fn block_on<F: core::future::Future>(&self, future: F) -> F::Output {
        self.0.block_on(future)
    }
}

/// Storage type for an HTTP-served Zarr store (sync adapter over async).
pub type HttpStorage = AsyncToSyncStorageAdapter<AsyncObjectStore<HttpStore>, HandleBlockOn>;

/// Build a readable zarrs storage rooted at `base_url`.
pub fn create_http_storage(base_url: &str) -> EngineResult<Arc<HttpStorage>> {
    let http = HttpBuilder::new()
        .with_url(base_url)
        .build()
        .map_err(|e| {
            EngineError::config(format!("failed to create HTTP store for {}: {}", base_url, e))
        })?;

    let async_store = Arc::new(AsyncObjectStore::new(http));
    let sync_store = AsyncToSyncStorageAdapter::new(async_store, HandleBlockOn::current()?);

    Ok(Arc::new(sync_store))
}
