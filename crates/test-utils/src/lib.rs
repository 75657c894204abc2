//! Shared test utilities for the ECV engine workspace.
//!
//! - [`MemoryPyramidStore`]: an in-memory chunked store implementing
//!   `PyramidStore`, with call counters, injectable failures and read delays
//! - a grid generator with predictable values
//! - dataset fixtures and pyramid builders
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Only integration tests (`tests/`) may use this crate from
//! `grid-processor`, since it depends on `grid-processor` itself.

pub mod fixtures;
pub mod generators;
pub mod memory_store;

pub use fixtures::*;
pub use generators::*;
pub use memory_store::{MemoryArray, MemoryLevel, MemoryPyramidStore, ReadRecord};

/// Macro for approximate floating-point equality assertions.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(1.0001_f64, 1.0_f64, 0.001_f64); // passes
/// assert_approx_eq!(1.1_f32, 1.0_f32, 0.001_f32);    // fails
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: f64 = $left as f64;
        let right: f64 = $right as f64;
        let epsilon: f64 = $epsilon as f64;
        let diff = (left - right).abs();
        if diff > epsilon {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n  diff: `{:?}` > epsilon `{:?}`",
                left, right, diff, epsilon
            );
        }
    }};
}
