//! Mapping of store and runtime failures onto the engine error taxonomy.

use ecv_common::EngineError;
use tokio::task::JoinError;
use zarrs::array::{ArrayCreateError, ArrayError};
use zarrs::array_subset::IncompatibleDimensionalityError;

/// Failure to open an array. Absent metadata means the array does not exist.
pub(crate) fn open_error(path: &str, err: ArrayCreateError) -> EngineError {
    match err {
        ArrayCreateError::MissingMetadata => EngineError::not_found(format!("array {}", path)),
        ArrayCreateError::StorageError(e) => {
            EngineError::network(format!("failed to open {}: {}", path, e))
        }
        other => EngineError::decode(format!("failed to open {}: {}", path, other)),
    }
}

/// Failure while retrieving or decoding chunk data.
pub(crate) fn read_error(path: &str, err: ArrayError) -> EngineError {
    match err {
        ArrayError::StorageError(e) => EngineError::network(format!("{}: {}", path, e)),
        other => EngineError::decode(format!("{}: {}", path, other)),
    }
}

pub(crate) fn subset_error(path: &str, err: IncompatibleDimensionalityError) -> EngineError {
    EngineError::shape_mismatch(format!("{}: {}", path, err))
}

/// A blocking read task that did not complete.
pub(crate) fn join_error(err: JoinError) -> EngineError {
    if err.is_cancelled() {
        EngineError::Cancelled
    } else {
        EngineError::decode(format!("read task failed: {}", err))
    }
}
