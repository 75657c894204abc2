//! Configuration, store selection and argument parsing.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;
use zarrs_filesystem::FilesystemStore;

use ecv_common::{EngineConfig, GeoBounds, LonLat};
use grid_processor::{create_http_storage, PyramidStore, ZarrStore};

/// Load the YAML config (defaults when `path` is `None`), apply `ECV_*`
/// overrides and the command-line base URL, then validate.
pub fn load_config(path: Option<&Path>, api_base_url: Option<String>) -> Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let mut config = config.with_env_overrides();
    if let Some(url) = api_base_url {
        config.api_base_url = url;
    }
    config.validate().context("invalid configuration")?;
    info!(
        api_base_url = %config.api_base_url,
        datasets = config.datasets.len(),
        "Loaded configuration"
    );
    Ok(config)
}

/// Open the pyramid store at `base`: `http(s)://` goes through the HTTP
/// backend, `file://` or a bare path through the filesystem store.
///
/// Must be called inside a tokio runtime.
pub fn open_store(base: &str) -> Result<Arc<dyn PyramidStore>> {
    match local_root(base) {
        Some(root) => {
            let fs = FilesystemStore::new(&root)
                .with_context(|| format!("failed to open store at {}", root.display()))?;
            info!(root = %root.display(), "Using local store");
            Ok(Arc::new(ZarrStore::new(Arc::new(fs))))
        }
        None => {
            let storage = create_http_storage(base)?;
            info!(url = base, "Using HTTP store");
            Ok(Arc::new(ZarrStore::new(storage)))
        }
    }
}

fn local_root(base: &str) -> Option<PathBuf> {
    if let Some(path) = base.strip_prefix("file://") {
        return Some(PathBuf::from(path));
    }
    (!base.contains("://")).then(|| PathBuf::from(base))
}

/// Parse `lon,lat;lon,lat;...`.
pub fn parse_polygon(s: &str) -> Result<Vec<LonLat>> {
    let vertices = s
        .split(';')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|vertex| {
            let (lon, lat) = vertex
                .split_once(',')
                .with_context(|| format!("vertex '{}' is not lon,lat", vertex))?;
            Ok(LonLat::new(
                lon.trim().parse().with_context(|| format!("bad longitude '{}'", lon))?,
                lat.trim().parse().with_context(|| format!("bad latitude '{}'", lat))?,
            ))
        })
        .collect::<Result<Vec<_>>>()?;
    if vertices.len() < 3 {
        bail!("a polygon needs at least 3 vertices, got {}", vertices.len());
    }
    Ok(vertices)
}

/// Parse `west,south,east,north` in degrees.
pub fn parse_bbox(s: &str) -> Result<GeoBounds> {
    let parts = s
        .split(',')
        .map(|p| {
            p.trim()
                .parse::<f64>()
                .with_context(|| format!("bad bbox component '{}'", p))
        })
        .collect::<Result<Vec<_>>>()?;
    let [west, south, east, north] = parts[..] else {
        bail!("bbox must be west,south,east,north");
    };
    if west >= east || south >= north {
        bail!("bbox '{}' is empty", s);
    }
    Ok(GeoBounds::new(west, south, east, north))
}
