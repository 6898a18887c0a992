//! Run state: folds a run's raw event stream into an append-only JSON
//! document and a client-facing patch stream.
//!
//! The [`RunController`] owns the live document and the outbound frame
//! channel; the [`EventAdapter`] consumes the graph's event stream and turns
//! each event into a patch. [`stream_run`] wires the two to a graph run.

mod adapter;
mod controller;
mod run;

pub use adapter::{ArgCompletion, EventAdapter, ProducerSignalled};
pub use controller::{replay, RunController, RunError, RunPhase, StreamFrame};
pub use run::{collect_run, stream_run};
