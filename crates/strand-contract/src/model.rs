//! Model inference seam.

use async_trait::async_trait;
use genai::chat::{ChatOptions, ChatRequest, ChatStreamEvent};
use genai::Client;

/// Boxed stream of model chat events.
pub type ModelEventStream =
    std::pin::Pin<Box<dyn futures::Stream<Item = Result<ChatStreamEvent, genai::Error>> + Send>>;

/// Abstraction over streaming model inference.
///
/// The graph calls this for every agent step; tests substitute scripted
/// executors.
#[async_trait]
pub trait ModelExecutor: Send + Sync {
    /// Run a streaming chat completion, returning a boxed event stream.
    async fn exec_chat_stream_events(
        &self,
        model: &str,
        chat_req: ChatRequest,
        options: Option<&ChatOptions>,
    ) -> genai::Result<ModelEventStream>;

    /// Stable label for logging.
    fn name(&self) -> &'static str;
}

/// Default executor backed by `genai::Client`.
#[derive(Clone)]
pub struct GenaiModelExecutor {
    client: Client,
}

impl GenaiModelExecutor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl std::fmt::Debug for GenaiModelExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenaiModelExecutor").finish()
    }
}

#[async_trait]
impl ModelExecutor for GenaiModelExecutor {
    async fn exec_chat_stream_events(
        &self,
        model: &str,
        chat_req: ChatRequest,
        options: Option<&ChatOptions>,
    ) -> genai::Result<ModelEventStream> {
        let resp = self
            .client
            .exec_chat_stream(model, chat_req, options)
            .await?;
        Ok(Box::pin(resp.stream))
    }

    fn name(&self) -> &'static str {
        "genai_client"
    }
}
