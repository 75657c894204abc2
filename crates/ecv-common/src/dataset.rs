//! Dataset descriptors.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::bbox::CrsBounds;
use crate::crs::Crs;
use crate::error::EngineResult;
use crate::style::ColourMapName;
use crate::time::parse_month;

/// Opaque dataset key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetId(pub String);

impl DatasetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DatasetId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Axis layout of the primary variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Dimensionality {
    /// `[T, Y, X]`
    TimeYx,
    /// `[Year, Month, Y, X]`
    YearMonthYx,
}

impl Dimensionality {
    /// Number of leading (non-spatial) axes.
    pub fn leading_axes(&self) -> usize {
        match self {
            Dimensionality::TimeYx => 1,
            Dimensionality::YearMonthYx => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub vmin: f32,
    pub vmax: f32,
}

impl ValueRange {
    pub fn new(vmin: f32, vmax: f32) -> Self {
        Self { vmin, vmax }
    }
}

/// Inclusive range of years a multi-year dataset covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub start: i32,
    pub end: i32,
}

impl YearRange {
    pub fn contains(&self, year: i32) -> bool {
        year >= self.start && year <= self.end
    }
}

fn default_floor_threshold() -> Option<f32> {
    Some(0.0)
}

fn default_treat_nan() -> bool {
    true
}

/// Decides which raw values are no-data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FillPolicy {
    #[serde(default)]
    pub sentinel: Option<f32>,
    #[serde(default = "default_treat_nan")]
    pub treat_nan: bool,
    /// Values at or below this are no-data; `null` disables the check.
    #[serde(default = "default_floor_threshold")]
    pub floor_threshold: Option<f32>,
}

impl Default for FillPolicy {
    fn default() -> Self {
        Self {
            sentinel: None,
            treat_nan: true,
            floor_threshold: default_floor_threshold(),
        }
    }
}

impl FillPolicy {
    /// Policy that only masks NaN.
    pub fn nan_only() -> Self {
        Self {
            sentinel: None,
            treat_nan: true,
            floor_threshold: None,
        }
    }

    #[inline]
    pub fn is_no_data(&self, value: f32) -> bool {
        if value.is_nan() {
            return self.treat_nan;
        }
        if self.sentinel == Some(value) {
            return true;
        }
        matches!(self.floor_threshold, Some(floor) if value <= floor)
    }
}

fn default_levels() -> Vec<String> {
    vec!["0".to_string()]
}

/// Immutable description of one pyramid dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    pub id: DatasetId,
    #[serde(default)]
    pub title: String,
    pub store_path: String,
    pub variable: String,
    #[serde(default)]
    pub aux_variables: Vec<String>,
    pub crs: Crs,
    /// Level names, coarsest first.
    #[serde(default = "default_levels")]
    pub levels: Vec<String>,
    pub dimensionality: Dimensionality,
    pub value_range: ValueRange,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub fill_policy: FillPolicy,
    pub default_colour_map: ColourMapName,
    #[serde(default)]
    pub default_smoothing: u8,
    #[serde(default)]
    pub year_range: Option<YearRange>,
    /// Extent used to synthesise coordinates when the store has none.
    #[serde(default)]
    pub aux_bounds: Option<CrsBounds>,
    /// First month (`YYYY-MM`) of a monthly `time-yx` series.
    #[serde(default)]
    pub time_origin: Option<String>,
}

impl DatasetDescriptor {
    /// Level names `"0".."n-1"`.
    pub fn numbered_levels(count: usize) -> Vec<String> {
        (0..count).map(|i| i.to_string()).collect()
    }

    pub fn max_level(&self) -> usize {
        self.levels.len().saturating_sub(1)
    }

    pub fn level_name(&self, level: usize) -> Option<&str> {
        self.levels.get(level).map(String::as_str)
    }

    /// Store path of a level subtree, e.g. `sst/3`.
    pub fn level_path(&self, level: usize) -> Option<String> {
        let name = self.level_name(level)?;
        let base = self.store_path.trim_end_matches('/');
        Some(if base.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", base, name)
        })
    }

    pub fn is_multi_year(&self) -> bool {
        self.dimensionality == Dimensionality::YearMonthYx
    }

    pub fn time_origin_date(&self) -> EngineResult<Option<NaiveDate>> {
        self.time_origin.as_deref().map(parse_month).transpose()
    }

    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            self.id.as_str()
        } else {
            &self.title
        }
    }
}
