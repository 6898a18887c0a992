//! Patch operations.
//!
//! The op set is closed and wire-visible: every mutation a run performs on
//! client-facing state is one of these four operations.

use crate::Path;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single atomic change to the run-state document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    /// Set the value at the path, creating intermediate objects as needed.
    ///
    /// Errors if an array index along the path is out of bounds.
    Set {
        /// Target path.
        path: Path,
        /// Value to set.
        value: Value,
    },

    /// Delete the value at the path. No-op if the path does not exist.
    Delete {
        /// Target path.
        path: Path,
    },

    /// Append a value to the array at the path, creating the array if absent.
    ///
    /// Errors if the target exists and is not an array.
    Append {
        /// Target path.
        path: Path,
        /// Value to append.
        value: Value,
    },

    /// Append a text fragment to the string at the path, creating the string
    /// if absent. This is the streaming-delta primitive.
    ///
    /// Errors if the target exists and is not a string.
    StrAppend {
        /// Target path.
        path: Path,
        /// Fragment to append.
        delta: String,
    },
}

impl Op {
    /// Create a Set operation.
    #[inline]
    pub fn set(path: Path, value: impl Into<Value>) -> Self {
        Op::Set {
            path,
            value: value.into(),
        }
    }

    /// Create a Delete operation.
    #[inline]
    pub fn delete(path: Path) -> Self {
        Op::Delete { path }
    }

    /// Create an Append operation.
    #[inline]
    pub fn append(path: Path, value: impl Into<Value>) -> Self {
        Op::Append {
            path,
            value: value.into(),
        }
    }

    /// Create a StrAppend operation.
    #[inline]
    pub fn str_append(path: Path, delta: impl Into<String>) -> Self {
        Op::StrAppend {
            path,
            delta: delta.into(),
        }
    }

    /// The path this operation targets.
    #[inline]
    pub fn path(&self) -> &Path {
        match self {
            Op::Set { path, .. } => path,
            Op::Delete { path } => path,
            Op::Append { path, .. } => path,
            Op::StrAppend { path, .. } => path,
        }
    }
}
