//! Error taxonomy for the raster engine.

use std::fmt;

use thiserror::Error;

/// Result type alias using EngineError.
pub type EngineResult<T> = Result<T, EngineError>;

/// Primary error type for engine operations.
///
/// Errors are `Clone` because a single in-flight fetch fans its outcome out
/// to every caller waiting on the same key.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    // === Startup Errors ===
    #[error("Invalid configuration: {0}")]
    Config(String),

    // === Data Errors ===
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Year lookup failed: {0}")]
    YearNotFound(String),

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Failed to decode chunk data: {0}")]
    Decode(String),

    // === Transport Errors ===
    #[error("Network error: {0}")]
    Network(String),

    // === Geometry Errors ===
    #[error("Projection error: {0}")]
    Projection(String),

    // === Internal ===
    #[error("Request cancelled")]
    Cancelled,
}

impl EngineError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn year_not_found(msg: impl Into<String>) -> Self {
        Self::YearNotFound(msg.into())
    }

    pub fn shape_mismatch(msg: impl Into<String>) -> Self {
        Self::ShapeMismatch(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    pub fn projection(msg: impl Into<String>) -> Self {
        Self::Projection(msg.into())
    }

    /// Short machine-readable name, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Config(_) => "config",
            EngineError::NotFound(_) => "not_found",
            EngineError::YearNotFound(_) => "year_not_found",
            EngineError::ShapeMismatch(_) => "shape_mismatch",
            EngineError::Decode(_) => "decode",
            EngineError::Network(_) => "network",
            EngineError::Projection(_) => "projection",
            EngineError::Cancelled => "cancelled",
        }
    }

    /// Whether the error should ever reach the user.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, EngineError::Cancelled)
    }

    /// Transient errors may succeed if the same request is issued again later.
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Network(_))
    }

    /// Errors that most likely point at a bug in the pyramid producer.
    pub fn is_data_pipeline_fault(&self) -> bool {
        matches!(self, EngineError::ShapeMismatch(_) | EngineError::Decode(_))
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Config(format!("JSON error: {}", err))
    }
}

impl From<serde_yaml::Error> for EngineError {
    fn from(err: serde_yaml::Error) -> Self {
        EngineError::Config(format!("YAML error: {}", err))
    }
}

/// Non-fatal conditions that accompany a successful load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadWarning {
    /// The requested year is missing from the store's year array; the
    /// nearest available year was used instead.
    YearSubstituted { requested: i32, used: i32 },
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadWarning::YearSubstituted { requested, used } => {
                let direction = if used < requested { "earlier" } else { "later" };
                write!(
                    f,
                    "year {} not available, showing {} ({})",
                    requested, used, direction
                )
            }
        }
    }
}
