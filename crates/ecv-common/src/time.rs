//! Temporal coordinates of a slice.

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::EngineError;

/// Selects one 2-D plane along a dataset's leading axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TemporalCoord {
    /// Index into the `T` axis of a `time-yx` dataset.
    Index { time: usize },
    /// Year value (looked up in the `year` array) and month 0..12.
    YearMonth { year: i32, month: usize },
}

impl TemporalCoord {
    pub fn index(time: usize) -> Self {
        TemporalCoord::Index { time }
    }

    pub fn year_month(year: i32, month: usize) -> Self {
        TemporalCoord::YearMonth { year, month }
    }

    pub fn year(&self) -> Option<i32> {
        match self {
            TemporalCoord::Index { .. } => None,
            TemporalCoord::YearMonth { year, .. } => Some(*year),
        }
    }

    /// Time or month position along the innermost temporal axis.
    pub fn time(&self) -> usize {
        match self {
            TemporalCoord::Index { time } => *time,
            TemporalCoord::YearMonth { month, .. } => *month,
        }
    }

    pub fn with_time(self, time: usize) -> Self {
        match self {
            TemporalCoord::Index { .. } => TemporalCoord::Index { time },
            TemporalCoord::YearMonth { year, .. } => TemporalCoord::YearMonth { year, month: time },
        }
    }

    pub fn with_year(self, year: i32) -> Self {
        match self {
            TemporalCoord::Index { .. } => self,
            TemporalCoord::YearMonth { month, .. } => TemporalCoord::YearMonth { year, month },
        }
    }
}

impl fmt::Display for TemporalCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemporalCoord::Index { time } => write!(f, "t{}", time),
            TemporalCoord::YearMonth { year, month } => write!(f, "{}-{:02}", year, month + 1),
        }
    }
}

/// Parse a `YYYY-MM` origin into the first day of that month.
pub fn parse_month(s: &str) -> Result<NaiveDate, EngineError> {
    NaiveDate::parse_from_str(&format!("{}-01", s.trim()), "%Y-%m-%d")
        .map_err(|_| EngineError::config(format!("invalid month '{}', expected YYYY-MM", s)))
}

/// Label for sample `index` of a monthly series starting at `origin`,
/// falling back to `t{index}` when no origin is known.
pub fn time_label(origin: Option<NaiveDate>, index: usize) -> String {
    origin
        .and_then(|start| start.checked_add_months(Months::new(index as u32)))
        .map(|date| format!("{}-{:02}", date.year(), date.month()))
        .unwrap_or_else(|| format!("t{}", index))
}

/// Label for month `month` (0-based) of `year`.
pub fn month_label(year: i32, month: usize) -> String {
    format!("{}-{:02}", year, month + 1)
}
