//! The graph run loop: the producer side of a run.

use crate::collector::{StreamCollector, StreamOutput};
use crate::convert;
use crate::node::{transition, GraphNode};
use crate::registry::{ToolBinding, ToolRegistry};
use crate::task::run_task;
use async_stream::stream;
use futures::{Stream, StreamExt};
use genai::chat::ChatOptions;
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;
use strand_contract::{
    gen_message_id, CorrelationMap, EventPayload, GraphError, GraphEvent, Message, ModelExecutor,
    Namespace, NamespaceSegment, Role, ToolCall,
};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Boxed stream of raw graph events.
///
/// Stream exhaustion means the run completed; a fatal fault is yielded as an
/// `Err` item and ends the stream.
pub type GraphEventStream = Pin<Box<dyn Stream<Item = Result<GraphEvent, GraphError>> + Send>>;

/// Runtime configuration for a run. Built once at startup and shared by
/// reference; no global state.
#[derive(Clone)]
pub struct GraphConfig {
    /// Model identifier.
    pub model: String,
    /// Chat options applied to every model turn.
    pub chat_options: Option<ChatOptions>,
    /// Bound on agent-tools cycles; unbounded when `None`. Reaching the
    /// bound ends the run normally.
    pub max_cycles: Option<usize>,
    /// System instruction given to the model on every agent turn. It rides
    /// the request and never enters the conversation; a conversation that
    /// carries its own system message overrides it.
    pub system_instruction: Option<String>,
    /// Streaming inference backend.
    pub executor: Arc<dyn ModelExecutor>,
}

impl GraphConfig {
    pub fn new(model: impl Into<String>, executor: Arc<dyn ModelExecutor>) -> Self {
        Self {
            model: model.into(),
            chat_options: Some(
                ChatOptions::default()
                    .with_capture_usage(true)
                    .with_capture_tool_calls(true),
            ),
            max_cycles: None,
            system_instruction: None,
            executor,
        }
    }

    /// Bound the agent-tools loop.
    #[must_use]
    pub fn with_max_cycles(mut self, max_cycles: Option<usize>) -> Self {
        self.max_cycles = max_cycles;
        self
    }

    /// Set the per-turn system instruction.
    #[must_use]
    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }
}

impl std::fmt::Debug for GraphConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphConfig")
            .field("model", &self.model)
            .field("max_cycles", &self.max_cycles)
            .field("executor", &self.executor.name())
            .finish()
    }
}

/// Map a collector output to its raw-event payload.
pub(crate) fn payload_for(output: StreamOutput) -> EventPayload {
    match output {
        StreamOutput::TextDelta(delta) => EventPayload::TextDelta { delta },
        StreamOutput::ToolCallStart { id, name } => EventPayload::ToolCallOpened { id, name },
        StreamOutput::ToolCallDelta { id, args_delta } => EventPayload::ToolCallArgDelta {
            id,
            delta: args_delta,
            last: false,
        },
    }
}

/// Send a payload under a namespace, treating a closed channel as a fault.
pub(crate) async fn send_scoped(
    events: &mpsc::Sender<GraphEvent>,
    namespace: &Namespace,
    payload: EventPayload,
) -> Result<(), GraphError> {
    events
        .send(GraphEvent::namespaced(namespace.clone(), payload))
        .await
        .map_err(|_| GraphError::Upstream("event channel closed".to_string()))
}

/// Run the conversation graph over the seeded messages.
///
/// The returned stream is the run's single event source: the root namespace
/// carries the parent conversation, and each delegated sub-computation
/// streams through under its own namespace, interleaved with everything
/// else. Tool messages follow their sub-events because the closing step
/// update is emitted only after dispatch drains.
pub fn run_graph(
    config: Arc<GraphConfig>,
    registry: Arc<ToolRegistry>,
    seed: Vec<Message>,
    correlations: CorrelationMap,
    cancel: CancellationToken,
) -> GraphEventStream {
    Box::pin(stream! {
        let descriptors = registry.descriptors();
        let mut messages = seed;
        let mut node = GraphNode::Agent;
        let mut cycles = 0usize;

        loop {
            match node {
                GraphNode::Agent => {
                    if let Some(limit) = config.max_cycles {
                        if cycles >= limit {
                            warn!(limit, "cycle bound reached, ending run");
                            break;
                        }
                    }
                    cycles += 1;

                    let request = convert::build_request(
                        &messages,
                        &descriptors,
                        config.system_instruction.as_deref(),
                    );
                    let mut model_stream = match config
                        .executor
                        .exec_chat_stream_events(&config.model, request, config.chat_options.as_ref())
                        .await
                    {
                        Ok(stream) => stream,
                        Err(e) => {
                            yield Err(GraphError::Upstream(e.to_string()));
                            return;
                        }
                    };

                    let message_id = gen_message_id();
                    yield Ok(GraphEvent::root(EventPayload::NewMessage {
                        id: message_id.clone(),
                        role: Role::Assistant,
                    }));

                    let mut collector = StreamCollector::new();
                    loop {
                        tokio::select! {
                            _ = cancel.cancelled() => {
                                debug!("run cancelled during model turn");
                                return;
                            }
                            next = model_stream.next() => match next {
                                Some(Ok(event)) => {
                                    if let Some(output) = collector.process(event) {
                                        yield Ok(GraphEvent::root(payload_for(output)));
                                    }
                                }
                                Some(Err(e)) => {
                                    yield Err(GraphError::Upstream(e.to_string()));
                                    return;
                                }
                                None => break,
                            }
                        }
                    }

                    let turn = collector.finish();
                    if let Some(usage) = &turn.usage {
                        trace!(total_tokens = ?usage.total_tokens, "model turn finished");
                    }
                    // Terminal argument fragment for every call the turn opened.
                    for call in &turn.tool_calls {
                        yield Ok(GraphEvent::root(EventPayload::ToolCallArgDelta {
                            id: call.id.clone(),
                            delta: String::new(),
                            last: true,
                        }));
                    }

                    let assistant =
                        Message::assistant_with_tool_calls(turn.text.clone(), turn.tool_calls)
                            .with_id(message_id);
                    yield Ok(GraphEvent::root(EventPayload::StepUpdate {
                        messages: vec![assistant.clone()],
                    }));
                    messages.push(assistant);

                    node = match transition(GraphNode::Agent, messages.last()) {
                        Some(next) => next,
                        None => break,
                    };
                }
                GraphNode::Tools => {
                    let calls = messages
                        .last()
                        .and_then(|m| m.tool_calls.clone())
                        .unwrap_or_default();
                    debug!(count = calls.len(), "dispatching tool calls");

                    let (tx, mut rx) = mpsc::channel::<GraphEvent>(32);
                    let mut tasks: JoinSet<(usize, Option<Message>)> = JoinSet::new();
                    for (index, call) in calls.into_iter().enumerate() {
                        let config = config.clone();
                        let registry = registry.clone();
                        let correlations = correlations.clone();
                        let tx = tx.clone();
                        let cancel = cancel.clone();
                        tasks.spawn(async move {
                            let message =
                                dispatch_call(call, &config, &registry, &correlations, tx, cancel)
                                    .await;
                            (index, message)
                        });
                    }
                    drop(tx);

                    // Forward sub-computation events until every dispatch is done.
                    loop {
                        tokio::select! {
                            _ = cancel.cancelled() => {
                                debug!("run cancelled during tool dispatch");
                                tasks.abort_all();
                                return;
                            }
                            event = rx.recv() => match event {
                                Some(event) => yield Ok(event),
                                None => break,
                            }
                        }
                    }

                    let mut produced: Vec<(usize, Message)> = Vec::new();
                    while let Some(joined) = tasks.join_next().await {
                        match joined {
                            Ok((index, Some(message))) => produced.push((index, message)),
                            Ok((_, None)) => {}
                            Err(e) => warn!(error = %e, "tool dispatch task failed"),
                        }
                    }
                    // Tool messages land in call order regardless of completion order.
                    produced.sort_by_key(|(index, _)| *index);
                    let tool_messages: Vec<Message> =
                        produced.into_iter().map(|(_, message)| message).collect();

                    if !tool_messages.is_empty() {
                        yield Ok(GraphEvent::root(EventPayload::StepUpdate {
                            messages: tool_messages.clone(),
                        }));
                        messages.extend(tool_messages);
                    }

                    node = match transition(GraphNode::Tools, messages.last()) {
                        Some(next) => next,
                        None => break,
                    };
                }
            }
        }
    })
}

/// Execute one tool call. A failure is contained as an error-content tool
/// message; only the absence of a message (client-executed) is special.
async fn dispatch_call(
    call: ToolCall,
    config: &GraphConfig,
    registry: &ToolRegistry,
    correlations: &CorrelationMap,
    events: mpsc::Sender<GraphEvent>,
    cancel: CancellationToken,
) -> Option<Message> {
    match registry.binding(&call.name) {
        None => {
            warn!(tool = %call.name, "model requested unknown tool");
            Some(Message::tool(
                call.id,
                format!("Unknown tool: {}", call.name),
            ))
        }
        Some(ToolBinding::ClientExecuted(_)) => {
            debug!(tool = %call.name, id = %call.id, "deferring to client execution");
            None
        }
        Some(ToolBinding::Backend(tool)) => {
            let message = match tool.execute(call.arguments.clone()).await {
                Ok(result) => {
                    if result.is_error() {
                        warn!(tool = %call.name, "tool reported an error");
                    }
                    Message::tool(call.id, result.content())
                }
                Err(err) => {
                    warn!(tool = %call.name, error = %err, "tool execution failed");
                    Message::tool(
                        call.id,
                        format!("Error executing tool '{}': {}", call.name, err),
                    )
                }
            };
            Some(message)
        }
        Some(ToolBinding::Delegating(spec)) => {
            let task = match call.arguments.get("task_description").and_then(Value::as_str) {
                Some(task) if !task.is_empty() => task.to_string(),
                _ => {
                    return Some(Message::tool(
                        call.id,
                        format!(
                            "Error executing tool '{}': Invalid arguments: task_description is required",
                            call.name
                        ),
                    ));
                }
            };

            let invocation_id = uuid::Uuid::new_v4().simple().to_string();
            // Registered before the sub-computation can emit its first event.
            correlations.register(invocation_id.clone(), call.id.clone());
            let scope = NamespaceSegment::new("tools", invocation_id);
            let model = spec.model.as_deref().unwrap_or(&config.model);

            match run_task(
                config.executor.clone(),
                model,
                config.chat_options.as_ref(),
                task,
                scope,
                events,
                cancel,
            )
            .await
            {
                Ok(final_state) => {
                    let artifact = serde_json::to_value(&final_state).unwrap_or(Value::Null);
                    Some(Message::tool(call.id, final_state.result.clone()).with_artifact(artifact))
                }
                Err(err) => {
                    warn!(tool = %call.name, error = %err, "delegated task failed");
                    Some(Message::tool(
                        call.id,
                        format!("Error executing tool '{}': {}", call.name, err),
                    ))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::DelegateSpec;
    use crate::testing::{end, text_chunk, tool_call_chunk, ScriptedExecutor};
    use async_trait::async_trait;
    use serde_json::json;
    use strand_contract::{Tool, ToolDescriptor, ToolError, ToolResult};

    struct WeatherStub;

    #[async_trait]
    impl Tool for WeatherStub {
        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor::new("get_weather", "Get current weather")
        }

        async fn execute(&self, args: Value) -> Result<ToolResult, ToolError> {
            let location = args
                .get("location")
                .and_then(Value::as_str)
                .ok_or_else(|| ToolError::InvalidArguments("location is required".to_string()))?;
            Ok(ToolResult::success(
                "get_weather",
                json!({"location": location, "condition": "sunny"}),
            ))
        }
    }

    async fn collect(stream: GraphEventStream) -> Vec<Result<GraphEvent, GraphError>> {
        stream.collect().await
    }

    fn config_with(turns: Vec<Vec<genai::chat::ChatStreamEvent>>) -> Arc<GraphConfig> {
        Arc::new(GraphConfig::new(
            "test-model",
            Arc::new(ScriptedExecutor::new(turns)),
        ))
    }

    #[tokio::test]
    async fn plain_text_turn_ends_the_run() {
        let config = config_with(vec![vec![text_chunk("Hello there."), end()]]);
        let events = collect(run_graph(
            config,
            Arc::new(ToolRegistry::new()),
            vec![Message::user("hi")],
            CorrelationMap::new(),
            CancellationToken::new(),
        ))
        .await;

        let payloads: Vec<EventPayload> =
            events.into_iter().map(|e| e.unwrap().payload).collect();
        assert!(matches!(payloads[0], EventPayload::NewMessage { .. }));
        assert!(matches!(payloads[1], EventPayload::TextDelta { ref delta } if delta == "Hello there."));
        let EventPayload::StepUpdate { messages } = &payloads[2] else {
            panic!("expected closing step update");
        };
        assert_eq!(messages[0].content, "Hello there.");
        assert_eq!(payloads.len(), 3);
    }

    #[tokio::test]
    async fn tool_cycle_roundtrips_through_dispatch() {
        let config = config_with(vec![
            vec![
                text_chunk("Checking."),
                tool_call_chunk("tc_1", "get_weather", r#"{"location": "Tokyo"}"#),
                end(),
            ],
            vec![text_chunk("It is sunny in Tokyo."), end()],
        ]);
        let mut registry = ToolRegistry::new();
        registry.register_backend(Arc::new(WeatherStub));

        let events = collect(run_graph(
            config,
            Arc::new(registry),
            vec![Message::user("weather in Tokyo?")],
            CorrelationMap::new(),
            CancellationToken::new(),
        ))
        .await;
        let payloads: Vec<EventPayload> =
            events.into_iter().map(|e| e.unwrap().payload).collect();

        // Turn one: stub, text, tool open, terminal arg fragment, step update.
        assert!(matches!(payloads[2], EventPayload::ToolCallOpened { ref name, .. } if name == "get_weather"));
        assert!(matches!(
            payloads[3],
            EventPayload::ToolCallArgDelta { last: true, .. }
        ));

        // Tool step update carries the weather payload.
        let tool_update = payloads
            .iter()
            .filter_map(|p| match p {
                EventPayload::StepUpdate { messages }
                    if messages.iter().any(|m| m.role == Role::Tool) =>
                {
                    Some(messages.clone())
                }
                _ => None,
            })
            .next()
            .expect("tool step update");
        assert!(tool_update[0].content.contains("\"location\":\"Tokyo\""));
        assert_eq!(tool_update[0].tool_call_id.as_deref(), Some("tc_1"));

        // Second turn closes the run with plain text.
        let new_messages = payloads
            .iter()
            .filter(|p| matches!(p, EventPayload::NewMessage { .. }))
            .count();
        assert_eq!(new_messages, 2);
    }

    #[tokio::test]
    async fn tool_failure_is_contained_as_message_content() {
        let config = config_with(vec![
            vec![
                // Malformed arguments parse to Null, which the tool rejects.
                tool_call_chunk("tc_1", "get_weather", r#"{"location": "Tok"#),
                end(),
            ],
            vec![text_chunk("Sorry, that failed."), end()],
        ]);
        let mut registry = ToolRegistry::new();
        registry.register_backend(Arc::new(WeatherStub));

        let events = collect(run_graph(
            config,
            Arc::new(registry),
            vec![Message::user("weather?")],
            CorrelationMap::new(),
            CancellationToken::new(),
        ))
        .await;

        assert!(events.iter().all(|e| e.is_ok()), "tool faults never fail the run");
        let tool_message = events
            .iter()
            .filter_map(|e| match &e.as_ref().unwrap().payload {
                EventPayload::StepUpdate { messages } => {
                    messages.iter().find(|m| m.role == Role::Tool).cloned()
                }
                _ => None,
            })
            .next()
            .expect("tool message");
        assert!(tool_message.content.contains("Invalid arguments"));
    }

    #[tokio::test]
    async fn client_executed_calls_end_the_run_without_messages() {
        let config = config_with(vec![vec![
            tool_call_chunk("tc_1", "confirm_order", r#"{"order_id": "o_1"}"#),
            end(),
        ]]);
        let mut registry = ToolRegistry::new();
        registry.register_client(ToolDescriptor::new("confirm_order", "Ask the user to confirm"));

        let events = collect(run_graph(
            config,
            Arc::new(registry),
            vec![Message::user("order it")],
            CorrelationMap::new(),
            CancellationToken::new(),
        ))
        .await;
        let payloads: Vec<EventPayload> =
            events.into_iter().map(|e| e.unwrap().payload).collect();

        // Exactly one model turn, no tool step update.
        assert_eq!(
            payloads
                .iter()
                .filter(|p| matches!(p, EventPayload::NewMessage { .. }))
                .count(),
            1
        );
        assert!(!payloads.iter().any(|p| matches!(
            p,
            EventPayload::StepUpdate { messages } if messages.iter().any(|m| m.role == Role::Tool)
        )));
    }

    #[tokio::test]
    async fn delegation_streams_namespaced_events_and_attaches_artifact() {
        let config = config_with(vec![
            // Parent turn: delegate.
            vec![
                tool_call_chunk(
                    "tc_1",
                    "delegate_task",
                    r#"{"task_description": "summarize the report"}"#,
                ),
                end(),
            ],
            // Sub-agent turn.
            vec![text_chunk("The report says X."), end()],
            // Parent closing turn.
            vec![text_chunk("Done: the report says X."), end()],
        ]);
        let mut registry = ToolRegistry::new();
        registry.register_delegate(DelegateSpec::new(ToolDescriptor::new(
            "delegate_task",
            "Hand a task to a sub-agent",
        )));
        let correlations = CorrelationMap::new();

        let events = collect(run_graph(
            config,
            Arc::new(registry),
            vec![Message::user("summarize")],
            correlations.clone(),
            CancellationToken::new(),
        ))
        .await;
        let events: Vec<GraphEvent> = events.into_iter().map(|e| e.unwrap()).collect();

        // Sub events arrive under a tools namespace that resolves to tc_1.
        let sub_events: Vec<&GraphEvent> =
            events.iter().filter(|e| !e.namespace.is_root()).collect();
        assert!(!sub_events.is_empty());
        let segment = sub_events[0].namespace.first().unwrap();
        assert_eq!(segment.step, "tools");
        assert_eq!(
            correlations.resolve(&segment.invocation_id).as_deref(),
            Some("tc_1")
        );

        // The tool message carries the full final sub-state as artifact.
        let tool_message = events
            .iter()
            .filter_map(|e| match &e.payload {
                EventPayload::StepUpdate { messages } if e.namespace.is_root() => {
                    messages.iter().find(|m| m.role == Role::Tool).cloned()
                }
                _ => None,
            })
            .next()
            .expect("tool message");
        assert_eq!(tool_message.content, "The report says X.");
        let artifact = tool_message.artifact.expect("artifact");
        assert_eq!(artifact["task"], "summarize the report");
        assert_eq!(artifact["result"], "The report says X.");
        assert!(artifact["messages"].as_array().unwrap().len() >= 3);
    }

    #[tokio::test]
    async fn system_instruction_reaches_the_model_but_not_the_transcript() {
        let executor = Arc::new(ScriptedExecutor::new(vec![vec![
            text_chunk("Hello."),
            end(),
        ]]));
        let config = Arc::new(
            GraphConfig::new("test-model", executor.clone())
                .with_system_instruction("stay concise"),
        );

        let events = collect(run_graph(
            config,
            Arc::new(ToolRegistry::new()),
            vec![Message::user("hi")],
            CorrelationMap::new(),
            CancellationToken::new(),
        ))
        .await;

        let requests = executor.seen_requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].contains("stay concise"));

        // No step update ever carries the instruction.
        for event in events {
            if let EventPayload::StepUpdate { messages } = event.unwrap().payload {
                assert!(messages.iter().all(|m| m.role != Role::System));
            }
        }
    }

    #[tokio::test]
    async fn cycle_bound_ends_the_run_normally() {
        // The script always asks for another tool; the bound must cut it off.
        let looping_turn = || {
            vec![
                tool_call_chunk("tc_loop", "get_weather", r#"{"location": "Tokyo"}"#),
                end(),
            ]
        };
        let config = Arc::new(
            GraphConfig::new(
                "test-model",
                Arc::new(ScriptedExecutor::new(vec![
                    looping_turn(),
                    looping_turn(),
                    looping_turn(),
                ])),
            )
            .with_max_cycles(Some(2)),
        );
        let mut registry = ToolRegistry::new();
        registry.register_backend(Arc::new(WeatherStub));

        let events = collect(run_graph(
            config,
            Arc::new(registry),
            vec![Message::user("loop")],
            CorrelationMap::new(),
            CancellationToken::new(),
        ))
        .await;

        assert!(events.iter().all(|e| e.is_ok()));
        let turns = events
            .iter()
            .filter(|e| {
                matches!(
                    e.as_ref().unwrap().payload,
                    EventPayload::NewMessage { .. }
                )
            })
            .count();
        assert_eq!(turns, 2, "bound of two cycles allows two model turns");
    }
}
