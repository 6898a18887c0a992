//! Errors produced while applying patch operations.

use crate::Path;
use serde_json::Value;
use thiserror::Error;

/// Result alias for state operations.
pub type StateResult<T> = Result<T, StateError>;

/// A patch operation could not be applied to the document.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StateError {
    /// The target path does not exist.
    #[error("path not found: {path}")]
    PathNotFound {
        /// Missing path.
        path: Path,
    },

    /// The value at the path has the wrong JSON type.
    #[error("type mismatch at {path}: expected {expected}, found {found}")]
    TypeMismatch {
        /// Offending path.
        path: Path,
        /// Expected JSON type.
        expected: &'static str,
        /// Actual JSON type.
        found: &'static str,
    },

    /// An array index is past the end of the array.
    #[error("index {index} out of bounds at {path} (len {len})")]
    IndexOutOfBounds {
        /// Offending path.
        path: Path,
        /// Requested index.
        index: usize,
        /// Array length.
        len: usize,
    },
}

impl StateError {
    pub(crate) fn path_not_found(path: Path) -> Self {
        StateError::PathNotFound { path }
    }

    pub(crate) fn type_mismatch(path: Path, expected: &'static str, found: &Value) -> Self {
        StateError::TypeMismatch {
            path,
            expected,
            found: value_type_name(found),
        }
    }

    pub(crate) fn index_out_of_bounds(path: Path, index: usize, len: usize) -> Self {
        StateError::IndexOutOfBounds { path, index, len }
    }
}

/// Human-readable JSON type name for error messages.
pub(crate) fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
