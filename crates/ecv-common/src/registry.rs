//! Static table of registered datasets.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::dataset::{DatasetDescriptor, DatasetId};
use crate::error::{EngineError, EngineResult};

/// Datasets registered at startup, keyed by id.
///
/// Descriptors are validated on registration and immutable afterwards.
#[derive(Debug, Clone, Default)]
pub struct DatasetRegistry {
    datasets: HashMap<DatasetId, Arc<DatasetDescriptor>>,
    order: Vec<DatasetId>,
}

impl DatasetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_descriptors(
        descriptors: impl IntoIterator<Item = DatasetDescriptor>,
    ) -> EngineResult<Self> {
        let mut registry = Self::new();
        for descriptor in descriptors {
            registry.register(descriptor)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, descriptor: DatasetDescriptor) -> EngineResult<()> {
        validate_descriptor(&descriptor)?;
        if self.datasets.contains_key(&descriptor.id) {
            return Err(EngineError::config(format!(
                "duplicate dataset id '{}'",
                descriptor.id
            )));
        }
        debug!(
            dataset = %descriptor.id,
            levels = descriptor.levels.len(),
            crs = %descriptor.crs,
            "Registered dataset"
        );
        self.order.push(descriptor.id.clone());
        self.datasets
            .insert(descriptor.id.clone(), Arc::new(descriptor));
        Ok(())
    }

    pub fn get(&self, id: &DatasetId) -> Option<Arc<DatasetDescriptor>> {
        self.datasets.get(id).cloned()
    }

    /// Like `get`, but a missing id is `NotFound`.
    pub fn require(&self, id: &DatasetId) -> EngineResult<Arc<DatasetDescriptor>> {
        self.get(id)
            .ok_or_else(|| EngineError::not_found(format!("dataset '{}'", id)))
    }

    /// Descriptors in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<DatasetDescriptor>> {
        self.order.iter().filter_map(|id| self.datasets.get(id))
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}

fn validate_descriptor(d: &DatasetDescriptor) -> EngineResult<()> {
    let fail = |msg: String| Err(EngineError::config(format!("dataset '{}': {}", d.id, msg)));

    if d.id.as_str().is_empty() {
        return Err(EngineError::config("dataset id must not be empty"));
    }
    if d.variable.is_empty() {
        return fail("variable must not be empty".into());
    }
    if d.levels.is_empty() {
        return fail("at least one pyramid level is required".into());
    }
    if d.levels.iter().any(|l| l.is_empty()) {
        return fail("level names must not be empty".into());
    }
    let range = d.value_range;
    if !range.vmin.is_finite() || !range.vmax.is_finite() || range.vmax <= range.vmin {
        return fail(format!(
            "value range requires vmax > vmin, got ({}, {})",
            range.vmin, range.vmax
        ));
    }
    if d.default_smoothing > 3 {
        return fail(format!(
            "default smoothing must be 0..=3, got {}",
            d.default_smoothing
        ));
    }
    if d.is_multi_year() {
        match d.year_range {
            None => return fail("year-month-yx datasets need a year_range".into()),
            Some(yr) if yr.end < yr.start => {
                return fail(format!("year_range {}..{} is empty", yr.start, yr.end))
            }
            Some(_) => {}
        }
    }
    if matches!(d.fill_policy.sentinel, Some(s) if s.is_nan()) {
        return fail("NaN sentinel is not allowed, use treat_nan".into());
    }
    if let Some(bounds) = d.aux_bounds {
        if bounds.width() <= 0.0 || bounds.height() <= 0.0 {
            return fail("aux_bounds must have positive extent".into());
        }
    }
    d.time_origin_date()?;
    Ok(())
}
