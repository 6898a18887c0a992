//! The execution graph.
//!
//! A run is a two-node finite-state machine over the conversation: the agent
//! node streams one model turn, the tools node executes the tool calls that
//! turn requested. The graph is the producer side of the run: it emits the
//! namespaced raw-event stream the run adapter folds into client state.

mod collector;
mod convert;
mod node;
mod registry;
mod runner;
mod task;

pub mod testing;

pub use collector::{StreamCollector, StreamOutput, StreamResult};
pub use convert::{build_request, to_chat_message, to_genai_tool};
pub use node::{transition, GraphNode};
pub use registry::{DelegateSpec, ToolBinding, ToolRegistry};
pub use runner::{run_graph, GraphConfig, GraphEventStream};
pub use task::{run_task, TaskState};
