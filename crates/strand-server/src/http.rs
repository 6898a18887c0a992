//! HTTP routes: the assistant run endpoint and health.

use crate::request::AssistantRequest;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use std::convert::Infallible;
use std::sync::Arc;
use strand_graph::{GraphConfig, ToolRegistry};
use strand_run::{stream_run, StreamFrame};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{info, warn};

/// Run endpoint path.
pub const ASSISTANT_PATH: &str = "/assistant";
/// Health endpoint path.
pub const HEALTH_PATH: &str = "/health";

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GraphConfig>,
    pub registry: Arc<ToolRegistry>,
}

/// Build the server router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(health))
        .route(ASSISTANT_PATH, post(assistant))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    StatusCode::OK
}

/// Start a run from the request's commands and stream its frames as SSE.
async fn assistant(State(st): State<AppState>, Json(req): Json<AssistantRequest>) -> Response {
    let seed = req.seed_messages();
    info!(
        commands = req.commands.len(),
        seed_len = seed.len(),
        "assistant run requested"
    );

    // Per-request registry: the backend tools plus whatever client-executed
    // tools this request declares.
    let registry = match &req.tools {
        Some(tools) if !tools.is_empty() => {
            let mut registry = (*st.registry).clone();
            for (name, spec) in tools {
                registry.register_client(spec.descriptor(name));
            }
            Arc::new(registry)
        }
        _ => st.registry.clone(),
    };

    // A request-level system prompt overrides the configured instruction.
    // Either way it rides the model request, never the run state.
    let config = match &req.system {
        Some(system) => Arc::new((*st.config).clone().with_system_instruction(system.clone())),
        None => st.config.clone(),
    };

    let (tx, rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();
    tokio::spawn(stream_run(config, registry, seed, tx, cancel.clone()));

    let body = Body::from_stream(frame_stream(rx, cancel.drop_guard()));
    match Response::builder()
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(body)
    {
        Ok(response) => response,
        Err(err) => {
            warn!(error = %err, "failed to build SSE response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Frames to SSE chunks. Dropping the stream (client disconnect) drops the
/// guard, which cancels the run.
fn frame_stream(
    mut rx: mpsc::Receiver<StreamFrame>,
    guard: DropGuard,
) -> impl futures::Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    async_stream::stream! {
        let _guard = guard;
        while let Some(frame) = rx.recv().await {
            match serde_json::to_string(&frame) {
                Ok(json) => yield Ok(Bytes::from(format!("data: {json}\n\n"))),
                Err(err) => warn!(error = %err, "failed to serialize stream frame"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use strand_contract::FailureKind;

    #[tokio::test]
    async fn health_returns_ok() {
        let response = health().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn frames_render_as_sse_data_lines() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(StreamFrame::Failed {
            kind: FailureKind::UpstreamFault,
        })
        .await
        .unwrap();
        drop(tx);

        let cancel = CancellationToken::new();
        let chunks: Vec<Bytes> = frame_stream(rx, cancel.clone().drop_guard())
            .map(|c| c.unwrap())
            .collect()
            .await;

        assert_eq!(chunks.len(), 1);
        let text = String::from_utf8(chunks[0].to_vec()).unwrap();
        assert!(text.starts_with("data: "));
        assert!(text.ends_with("\n\n"));
        assert!(text.contains(r#""type":"failed""#));
        // The stream finished, so its guard cancelled the run token.
        assert!(cancel.is_cancelled());
    }
}
