//! Scripted model executors for tests.

use async_trait::async_trait;
use futures::stream;
use genai::chat::{ChatOptions, ChatRequest, ChatStreamEvent, StreamChunk, StreamEnd, ToolChunk};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use strand_contract::{ModelEventStream, ModelExecutor};

/// Replays pre-scripted event turns, one per model call.
///
/// When the script runs out every further call returns a bare End event,
/// which finishes the run with an empty assistant turn. Every request the
/// executor receives is recorded for inspection.
pub struct ScriptedExecutor {
    turns: Mutex<VecDeque<Vec<ChatStreamEvent>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedExecutor {
    pub fn new(turns: Vec<Vec<ChatStreamEvent>>) -> Self {
        Self {
            turns: Mutex::new(turns.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Debug renderings of the requests seen so far, in call order.
    pub fn seen_requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|requests| requests.iter().map(|req| format!("{req:?}")).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ModelExecutor for ScriptedExecutor {
    async fn exec_chat_stream_events(
        &self,
        _model: &str,
        chat_req: ChatRequest,
        _options: Option<&ChatOptions>,
    ) -> genai::Result<ModelEventStream> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(chat_req);
        }
        let turn = self
            .turns
            .lock()
            .ok()
            .and_then(|mut turns| turns.pop_front())
            .unwrap_or_else(|| vec![end()]);
        Ok(Box::pin(stream::iter(turn.into_iter().map(Ok))))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// A text content chunk.
pub fn text_chunk(content: &str) -> ChatStreamEvent {
    ChatStreamEvent::Chunk(StreamChunk {
        content: content.to_string(),
    })
}

/// A tool call chunk carrying accumulated argument text.
pub fn tool_call_chunk(call_id: &str, fn_name: &str, args: &str) -> ChatStreamEvent {
    ChatStreamEvent::ToolCallChunk(ToolChunk {
        tool_call: genai::chat::ToolCall {
            call_id: call_id.to_string(),
            fn_name: fn_name.to_string(),
            fn_arguments: Value::String(args.to_string()),
            thought_signatures: None,
        },
    })
}

/// A bare stream End event.
pub fn end() -> ChatStreamEvent {
    ChatStreamEvent::End(StreamEnd::default())
}
