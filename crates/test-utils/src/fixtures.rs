//! Dataset descriptors and pre-populated pyramids for engine tests.

use ecv_common::{
    ColourMapName, Crs, DatasetDescriptor, DatasetId, Dimensionality,
    FillPolicy, GeoBounds, ValueRange, YearRange,
};
use grid_processor::coords::synthesize_xy;

use crate::memory_store::{MemoryArray, MemoryLevel, MemoryPyramidStore};

/// Geographic extents used across tests, as `(west, south, east, north)`.
pub mod geo {
    use super::GeoBounds;

    pub const GLOBAL: (f64, f64, f64, f64) = (-180.0, -85.0, 180.0, 85.0);

    pub const EUROPE: (f64, f64, f64, f64) = (-15.0, 35.0, 45.0, 72.0);

    pub const ARCTIC: (f64, f64, f64, f64) = (-180.0, 60.0, 180.0, 90.0);

    /// Open ocean in the tropical Atlantic.
    pub const ATLANTIC_POINT: (f64, f64) = (-30.0, 0.0);

    pub fn bounds((west, south, east, north): (f64, f64, f64, f64)) -> GeoBounds {
        GeoBounds::new(west, south, east, north)
    }
}

/// Dataset descriptors shaped like the real catalogue entries.
pub mod datasets {
    use super::*;

    fn base(id: &str, crs: Crs, levels: usize, dimensionality: Dimensionality) -> DatasetDescriptor {
        DatasetDescriptor {
            id: DatasetId::new(id),
            title: String::new(),
            store_path: format!("{}_pyramid", id),
            variable: "value".into(),
            aux_variables: vec![],
            crs,
            levels: DatasetDescriptor::numbered_levels(levels),
            dimensionality,
            value_range: ValueRange::new(0.05, 0.5),
            unit: String::new(),
            fill_policy: FillPolicy::default(),
            default_colour_map: ColourMapName::YlOrRd,
            default_smoothing: 0,
            year_range: None,
            aux_bounds: None,
            time_origin: None,
        }
    }

    /// Global web-mercator monthly series (soil-moisture-like range).
    pub fn web_time_series(id: &str, levels: usize) -> DatasetDescriptor {
        DatasetDescriptor {
            title: "Soil moisture".into(),
            unit: "m3/m3".into(),
            time_origin: Some("1979-01".into()),
            ..base(id, Crs::Web, levels, Dimensionality::TimeYx)
        }
    }

    /// Arctic sea-ice concentration on the polar grid.
    pub fn polar_time_series(id: &str, levels: usize) -> DatasetDescriptor {
        DatasetDescriptor {
            title: "Sea ice concentration".into(),
            unit: "%".into(),
            value_range: ValueRange::new(0.0, 100.0),
            default_colour_map: ColourMapName::YlGnBu,
            ..base(id, Crs::Polar, levels, Dimensionality::TimeYx)
        }
    }

    /// Multi-year monthly dataset (`[Year, Month, Y, X]`).
    pub fn year_month(id: &str, levels: usize, start: i32, end: i32) -> DatasetDescriptor {
        DatasetDescriptor {
            title: "Permafrost".into(),
            unit: "K".into(),
            value_range: ValueRange::new(250.0, 290.0),
            default_colour_map: ColourMapName::RdYlBuR,
            year_range: Some(YearRange { start, end }),
            ..base(id, Crs::Web, levels, Dimensionality::YearMonthYx)
        }
    }

    /// Land-only dataset whose ocean pixels hold a sentinel.
    pub fn land_only(id: &str, levels: usize, sentinel: f32) -> DatasetDescriptor {
        DatasetDescriptor {
            fill_policy: FillPolicy {
                sentinel: Some(sentinel),
                treat_nan: true,
                floor_threshold: Some(0.0),
            },
            ..web_time_series(id, levels)
        }
    }
}

/// Fill `store` with a `[T, Y, X]` pyramid for `descriptor`.
///
/// `sizes[level]` is the `(width, height)` of each level; coordinates span
/// the CRS extent with x ascending and y descending. `value(level, t, col,
/// row)` supplies the data.
pub fn populate_time_yx(
    store: &MemoryPyramidStore,
    descriptor: &DatasetDescriptor,
    sizes: &[(usize, usize)],
    steps: usize,
    value: impl Fn(usize, usize, usize, usize) -> f32,
) {
    for (level, &(w, h)) in sizes.iter().enumerate() {
        let (x, y) = synthesize_xy(&descriptor.crs.extent(), w, h);
        let mut values = Vec::with_capacity(steps * w * h);
        for t in 0..steps {
            for row in 0..h {
                for col in 0..w {
                    values.push(value(level, t, col, row));
                }
            }
        }
        let array = MemoryArray::new(vec![steps as u64, h as u64, w as u64], values);
        store.insert_level(
            level_path(descriptor, level),
            MemoryLevel::new()
                .with_coords(x, y)
                .with_variable(&descriptor.variable, array),
        );
    }
}

/// Fill `store` with a `[Year, Month, Y, X]` pyramid holding `years`.
///
/// `value(level, year_index, month, col, row)` supplies the data.
pub fn populate_year_month(
    store: &MemoryPyramidStore,
    descriptor: &DatasetDescriptor,
    sizes: &[(usize, usize)],
    years: &[i32],
    value: impl Fn(usize, usize, usize, usize, usize) -> f32,
) {
    for (level, &(w, h)) in sizes.iter().enumerate() {
        let (x, y) = synthesize_xy(&descriptor.crs.extent(), w, h);
        let mut values = Vec::with_capacity(years.len() * 12 * w * h);
        for yi in 0..years.len() {
            for month in 0..12 {
                for row in 0..h {
                    for col in 0..w {
                        values.push(value(level, yi, month, col, row));
                    }
                }
            }
        }
        let array = MemoryArray::new(
            vec![years.len() as u64, 12, h as u64, w as u64],
            values,
        );
        store.insert_level(
            level_path(descriptor, level),
            MemoryLevel::new()
                .with_coords(x, y)
                .with_years(years.to_vec())
                .with_variable(&descriptor.variable, array),
        );
    }
}

/// Store path of `level` of `descriptor`.
pub fn level_path(descriptor: &DatasetDescriptor, level: usize) -> String {
    descriptor
        .level_path(level)
        .unwrap_or_else(|| panic!("dataset {} has no level {}", descriptor.id, level))
}
