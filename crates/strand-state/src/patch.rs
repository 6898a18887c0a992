//! An ordered group of operations applied atomically.

use crate::Op;
use serde::{Deserialize, Serialize};

/// An ordered sequence of [`Op`]s.
///
/// A patch is the unit of emission: the controller applies it to the live
/// document and forwards it to the client in the same order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Patch {
    ops: Vec<Op>,
}

impl Patch {
    /// Create an empty patch.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a patch from a vector of operations.
    #[inline]
    pub fn with_ops(ops: Vec<Op>) -> Self {
        Self { ops }
    }

    /// Add an operation (builder).
    #[inline]
    pub fn with_op(mut self, op: Op) -> Self {
        self.ops.push(op);
        self
    }

    /// Add an operation (mutating).
    #[inline]
    pub fn push(&mut self, op: Op) {
        self.ops.push(op);
    }

    /// The operations in order.
    #[inline]
    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    /// True when the patch has no operations.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Number of operations.
    #[inline]
    pub fn len(&self) -> usize {
        self.ops.len()
    }
}

impl From<Op> for Patch {
    fn from(op: Op) -> Self {
        Patch { ops: vec![op] }
    }
}

impl FromIterator<Op> for Patch {
    fn from_iter<I: IntoIterator<Item = Op>>(iter: I) -> Self {
        Patch {
            ops: iter.into_iter().collect(),
        }
    }
}
