//! End-to-end run driver: graph in, frame stream out.

use crate::adapter::EventAdapter;
use crate::controller::{RunController, StreamFrame};
use serde_json::Value;
use std::sync::Arc;
use strand_contract::{CorrelationMap, Message};
use strand_graph::{run_graph, GraphConfig, ToolRegistry};
use strand_state::{path, Op, Patch};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Run the graph over the seeded conversation, streaming frames until the
/// run reaches a terminal phase.
///
/// Seed messages enter the document through a regular patch frame, so a
/// client replaying the stream over `{"messages": []}` reconstructs the full
/// conversation including its inputs.
pub async fn stream_run(
    config: Arc<GraphConfig>,
    registry: Arc<ToolRegistry>,
    seed: Vec<Message>,
    frames: mpsc::Sender<StreamFrame>,
    cancel: CancellationToken,
) {
    info!(model = %config.model, seed_len = seed.len(), "starting run");
    let mut controller = RunController::new(frames);

    let mut seed_patch = Patch::new();
    for message in &seed {
        match serde_json::to_value(message) {
            Ok(value) => seed_patch.push(Op::append(path!("messages"), value)),
            Err(err) => error!(error = %err, "unserializable seed message"),
        }
    }
    if controller.append_patch(seed_patch).await.is_err() {
        return;
    }

    let correlations = CorrelationMap::new();
    let mut adapter = EventAdapter::new(correlations.clone());
    adapter.seed_root(&seed);

    let stream = run_graph(config, registry, seed, correlations, cancel);
    adapter.drive(stream, &mut controller).await;
    info!(phase = ?controller.phase(), "run finished");
}

/// Convenience used by tests and callers that want the final document rather
/// than the frame stream.
pub async fn collect_run(
    config: Arc<GraphConfig>,
    registry: Arc<ToolRegistry>,
    seed: Vec<Message>,
) -> (Value, Vec<StreamFrame>) {
    let (tx, mut rx) = mpsc::channel(256);
    let run = stream_run(
        config,
        registry,
        seed,
        tx,
        CancellationToken::new(),
    );
    let drain = async {
        let mut frames = Vec::new();
        while let Some(frame) = rx.recv().await {
            frames.push(frame);
        }
        frames
    };
    let ((), frames) = tokio::join!(run, drain);
    let doc = crate::controller::replay(&frames).unwrap_or(Value::Null);
    (doc, frames)
}
