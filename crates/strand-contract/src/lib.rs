//! Shared vocabulary for strand runs.
//!
//! Everything the graph producer, the run adapter, and the transport agree
//! on lives here: conversation messages, the namespaced raw-event variant,
//! the tool contract, the fault taxonomy, and the model-executor seam.

mod correlation;
mod error;
mod event;
mod message;
mod model;
mod tool;

pub use correlation::CorrelationMap;
pub use error::{FailureKind, GraphError};
pub use event::{EventPayload, GraphEvent, Namespace, NamespaceSegment};
pub use message::{gen_message_id, Message, Role, ToolCall};
pub use model::{GenaiModelExecutor, ModelEventStream, ModelExecutor};
pub use tool::{Tool, ToolDescriptor, ToolError, ToolResult, ToolStatus};
