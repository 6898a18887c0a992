//! Pure JSON document patching.
//!
//! Run state is a JSON document mutated only through [`Patch`]es. Application
//! is a pure function: `state' = apply_patch(state, patch)`, so any consumer
//! holding the patch sequence can reconstruct the document exactly.

mod apply;
mod error;
mod op;
mod patch;
mod path;

pub use apply::{apply_patch, apply_patches, get_at_path};
pub use error::{StateError, StateResult};
pub use op::Op;
pub use patch::Patch;
pub use path::{Path, Seg};
