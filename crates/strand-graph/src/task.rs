//! Delegated sub-computation runner.

use crate::collector::StreamCollector;
use crate::runner::{payload_for, send_scoped};
use crate::convert;
use futures::StreamExt;
use genai::chat::ChatOptions;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strand_contract::{
    gen_message_id, EventPayload, GraphError, GraphEvent, Message, ModelExecutor, Namespace,
    NamespaceSegment, Role,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub(crate) const TASK_SYSTEM_PROMPT: &str =
    "You are a focused sub-agent. Complete the assigned task and reply with a clear, \
     self-contained result.";

/// Full final state of a delegated sub-computation.
///
/// This is the artifact attached to the delegation's tool message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskState {
    /// The sub-computation's own conversation.
    pub messages: Vec<Message>,
    /// The task it was given.
    pub task: String,
    /// Its final answer.
    pub result: String,
}

/// Run a delegated task to completion.
///
/// Every event is emitted under `Namespace::of(scope)`; the caller must have
/// registered `scope.invocation_id` in the correlation map beforehand. The
/// task graph degenerates to a single model turn since the sub-agent carries
/// no tools of its own.
pub async fn run_task(
    executor: Arc<dyn ModelExecutor>,
    model: &str,
    chat_options: Option<&ChatOptions>,
    task: String,
    scope: NamespaceSegment,
    events: mpsc::Sender<GraphEvent>,
    cancel: CancellationToken,
) -> Result<TaskState, GraphError> {
    let namespace = Namespace::of(scope);
    let mut messages = vec![
        Message::system(TASK_SYSTEM_PROMPT),
        Message::user(task.clone()),
    ];

    let request = convert::build_request(&messages, &[], None);
    let mut stream = executor
        .exec_chat_stream_events(model, request, chat_options)
        .await
        .map_err(|e| GraphError::Upstream(e.to_string()))?;

    let message_id = gen_message_id();
    send_scoped(
        &events,
        &namespace,
        EventPayload::NewMessage {
            id: message_id.clone(),
            role: Role::Assistant,
        },
    )
    .await?;

    let mut collector = StreamCollector::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(GraphError::Upstream("sub-computation cancelled".to_string()));
            }
            next = stream.next() => match next {
                Some(Ok(event)) => {
                    if let Some(output) = collector.process(event) {
                        send_scoped(&events, &namespace, payload_for(output)).await?;
                    }
                }
                Some(Err(e)) => return Err(GraphError::Upstream(e.to_string())),
                None => break,
            }
        }
    }

    let turn = collector.finish();
    for call in &turn.tool_calls {
        send_scoped(
            &events,
            &namespace,
            EventPayload::ToolCallArgDelta {
                id: call.id.clone(),
                delta: String::new(),
                last: true,
            },
        )
        .await?;
    }

    let assistant =
        Message::assistant_with_tool_calls(turn.text.clone(), turn.tool_calls).with_id(message_id);
    send_scoped(
        &events,
        &namespace,
        EventPayload::StepUpdate {
            messages: vec![assistant.clone()],
        },
    )
    .await?;
    messages.push(assistant);

    Ok(TaskState {
        messages,
        task,
        result: turn.text,
    })
}
