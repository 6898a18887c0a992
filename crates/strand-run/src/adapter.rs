//! Folds the raw event stream into run-state patches.
//!
//! The adapter is the single consumer of a run's event stream. Every event
//! becomes one patch, applied through the controller, so client replay and
//! the live document stay in lockstep. Sub-computation events are folded into
//! a pending container keyed by the tool call that spawned them; the closing
//! tool message collapses the container into the conversation.

use crate::controller::{RunController, RunError};
use futures::StreamExt;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use strand_contract::{
    CorrelationMap, EventPayload, FailureKind, GraphEvent, Message, Namespace, Role,
};
use strand_graph::GraphEventStream;
use strand_state::{get_at_path, path, Op, Patch, Path};
use tracing::{debug, error, warn};

/// Unresolved namespaced events held while their correlation registration is
/// still in flight. Overflow is a correlation fault.
const MAX_UNRESOLVED: usize = 256;

/// Decides when the accumulated argument text of a tool call is complete.
pub trait ArgCompletion: Send + Sync {
    fn is_complete(&self, last: bool, buffer: &str) -> bool;
}

/// Completion is whatever the producer says: the fragment flagged as last
/// closes the call.
#[derive(Debug, Default)]
pub struct ProducerSignalled;

impl ArgCompletion for ProducerSignalled {
    fn is_complete(&self, last: bool, _buffer: &str) -> bool {
        last
    }
}

/// Which message container an event lands in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ContainerKey {
    /// The conversation itself.
    Root,
    /// The pending container of the sub-computation spawned by this tool
    /// call id.
    Sub(String),
}

/// An open tool call whose argument text is still streaming.
struct OpenCall {
    msg_index: usize,
    call_index: usize,
    buffer: String,
    closed: bool,
}

/// Bookkeeping for one message container.
struct ContainerState {
    /// Path of the container's messages array.
    base: Path,
    /// Messages appended so far.
    len: usize,
    /// Message id to index, for stub reconciliation.
    ids: HashMap<String, usize>,
    /// Index of the message currently streaming, if any.
    open: Option<usize>,
    /// Open tool calls by call id.
    calls: HashMap<String, OpenCall>,
    /// Tool calls opened per message index.
    call_counts: HashMap<usize, usize>,
}

impl ContainerState {
    fn new(base: Path) -> Self {
        Self {
            base,
            len: 0,
            ids: HashMap::new(),
            open: None,
            calls: HashMap::new(),
            call_counts: HashMap::new(),
        }
    }

    fn message_path(&self, index: usize) -> Path {
        self.base.clone().index(index)
    }
}

enum DriveEnd {
    Fault(FailureKind),
    Disconnected,
}

/// Stateful event-to-patch fold over one run.
pub struct EventAdapter {
    correlations: CorrelationMap,
    containers: HashMap<ContainerKey, ContainerState>,
    unresolved: VecDeque<GraphEvent>,
    arg_completion: Box<dyn ArgCompletion>,
}

impl EventAdapter {
    /// Create an adapter sharing the run's correlation map.
    pub fn new(correlations: CorrelationMap) -> Self {
        Self {
            correlations,
            containers: HashMap::new(),
            unresolved: VecDeque::new(),
            arg_completion: Box::new(ProducerSignalled),
        }
    }

    /// Replace the argument-completion policy.
    #[must_use]
    pub fn with_arg_completion(mut self, policy: Box<dyn ArgCompletion>) -> Self {
        self.arg_completion = policy;
        self
    }

    /// Account for messages already in the document before the stream starts,
    /// so stub indices and reconciliation line up.
    pub fn seed_root(&mut self, messages: &[Message]) {
        let root = self.root_container();
        for message in messages {
            let index = root.len;
            root.len += 1;
            if let Some(id) = &message.id {
                root.ids.insert(id.clone(), index);
            }
        }
    }

    /// Consume the event stream to exhaustion, driving the controller to a
    /// terminal phase.
    pub async fn drive(mut self, mut stream: GraphEventStream, controller: &mut RunController) {
        while let Some(item) = stream.next().await {
            match item {
                Ok(event) => match self.handle_event(event, controller).await {
                    Ok(()) => {}
                    Err(DriveEnd::Fault(kind)) => {
                        controller.fail(kind).await;
                        return;
                    }
                    Err(DriveEnd::Disconnected) => return,
                },
                Err(fault) => {
                    warn!(error = %fault, "run stream faulted");
                    controller.fail(fault.failure_kind()).await;
                    return;
                }
            }
        }

        if !self.unresolved.is_empty() {
            warn!(
                count = self.unresolved.len(),
                "stream ended with unattributable sub events"
            );
            controller.fail(FailureKind::CorrelationFault).await;
            return;
        }
        controller.complete().await;
    }

    async fn handle_event(
        &mut self,
        event: GraphEvent,
        controller: &mut RunController,
    ) -> Result<(), DriveEnd> {
        match self.container_key(&event.namespace) {
            Some(key) => {
                self.apply(key, event.payload, controller).await?;
                self.flush_unresolved(controller).await
            }
            None => {
                if self.unresolved.len() >= MAX_UNRESOLVED {
                    warn!(namespace = %event.namespace, "unresolved event buffer overflowed");
                    return Err(DriveEnd::Fault(FailureKind::CorrelationFault));
                }
                debug!(namespace = %event.namespace, "buffering unattributed event");
                self.unresolved.push_back(event);
                Ok(())
            }
        }
    }

    /// Retry buffered events until a pass resolves none of them.
    async fn flush_unresolved(&mut self, controller: &mut RunController) -> Result<(), DriveEnd> {
        loop {
            let position = self
                .unresolved
                .iter()
                .position(|ev| self.container_key(&ev.namespace).is_some());
            let Some(position) = position else {
                return Ok(());
            };
            let event = self
                .unresolved
                .remove(position)
                .ok_or(DriveEnd::Fault(FailureKind::CorrelationFault))?;
            match self.container_key(&event.namespace) {
                Some(key) => self.apply(key, event.payload, controller).await?,
                None => return Ok(()),
            }
        }
    }

    /// Map a namespace to its container. Deeper nesting folds into the
    /// container of the outermost segment.
    fn container_key(&self, namespace: &Namespace) -> Option<ContainerKey> {
        match namespace.first() {
            None => Some(ContainerKey::Root),
            Some(segment) => self
                .correlations
                .resolve(&segment.invocation_id)
                .map(ContainerKey::Sub),
        }
    }

    fn root_container(&mut self) -> &mut ContainerState {
        self.containers
            .entry(ContainerKey::Root)
            .or_insert_with(|| ContainerState::new(path!("messages")))
    }

    fn container(&mut self, key: &ContainerKey) -> &mut ContainerState {
        self.containers.entry(key.clone()).or_insert_with(|| {
            let base = match key {
                ContainerKey::Root => path!("messages"),
                ContainerKey::Sub(call_id) => {
                    path!("pending_subruns", call_id.clone(), "messages")
                }
            };
            ContainerState::new(base)
        })
    }

    async fn apply(
        &mut self,
        key: ContainerKey,
        payload: EventPayload,
        controller: &mut RunController,
    ) -> Result<(), DriveEnd> {
        let patch = match payload {
            EventPayload::NewMessage { id, role } => self.on_new_message(&key, id, role),
            EventPayload::TextDelta { delta } => self.on_text_delta(&key, delta),
            EventPayload::ToolCallOpened { id, name } => self.on_tool_call_opened(&key, id, name),
            EventPayload::ToolCallArgDelta { id, delta, last } => {
                self.on_tool_call_arg_delta(&key, id, delta, last)
            }
            EventPayload::StepUpdate { messages } => {
                self.on_step_update(&key, messages, controller.state())
            }
        };

        match controller.append_patch(patch).await {
            Ok(()) => Ok(()),
            Err(RunError::Disconnected) => Err(DriveEnd::Disconnected),
            Err(err) => {
                // A patch the adapter built cannot fail against a document
                // the adapter tracks unless its bookkeeping is wrong. Same
                // class as an unattributable event, not a model fault.
                error!(error = %err, "event patch contradicts the document");
                Err(DriveEnd::Fault(FailureKind::CorrelationFault))
            }
        }
    }

    fn on_new_message(&mut self, key: &ContainerKey, id: String, role: Role) -> Patch {
        let container = self.container(key);
        let index = container.len;
        container.len += 1;
        container.ids.insert(id.clone(), index);
        container.open = Some(index);

        let role = serde_json::to_value(role).unwrap_or(Value::Null);
        Patch::from(Op::append(
            container.base.clone(),
            json!({"id": id, "role": role, "content": ""}),
        ))
    }

    fn on_text_delta(&mut self, key: &ContainerKey, delta: String) -> Patch {
        let container = self.container(key);
        let Some(index) = container.open else {
            warn!("text delta with no open message");
            return Patch::new();
        };
        Patch::from(Op::str_append(
            container.message_path(index).key("content"),
            delta,
        ))
    }

    fn on_tool_call_opened(&mut self, key: &ContainerKey, id: String, name: String) -> Patch {
        let container = self.container(key);
        let Some(msg_index) = container.open else {
            warn!(call_id = %id, "tool call opened with no open message");
            return Patch::new();
        };
        let count = container.call_counts.entry(msg_index).or_insert(0);
        let call_index = *count;
        *count += 1;
        container.calls.insert(
            id.clone(),
            OpenCall {
                msg_index,
                call_index,
                buffer: String::new(),
                closed: false,
            },
        );

        Patch::from(Op::append(
            container.message_path(msg_index).key("tool_calls"),
            json!({"id": id, "name": name, "arguments_text": ""}),
        ))
    }

    fn on_tool_call_arg_delta(
        &mut self,
        key: &ContainerKey,
        id: String,
        delta: String,
        last: bool,
    ) -> Patch {
        let arg_completion = &self.arg_completion;
        let container = match self.containers.get_mut(key) {
            Some(container) => container,
            None => {
                warn!(call_id = %id, "argument fragment for unknown container");
                return Patch::new();
            }
        };
        let Some(call) = container.calls.get_mut(&id) else {
            warn!(call_id = %id, "argument fragment for unknown tool call");
            return Patch::new();
        };
        if call.closed {
            return Patch::new();
        }
        call.buffer.push_str(&delta);

        let call_path = container
            .base
            .clone()
            .index(call.msg_index)
            .key("tool_calls")
            .index(call.call_index);

        let mut patch = Patch::new();
        if !delta.is_empty() {
            patch.push(Op::str_append(
                call_path.clone().key("arguments_text"),
                delta,
            ));
        }

        if arg_completion.is_complete(last, &call.buffer) {
            call.closed = true;
            let arguments = parse_arguments(&call.buffer);
            patch.push(Op::set(call_path.clone().key("arguments"), arguments));
            patch.push(Op::delete(call_path.key("arguments_text")));
        }
        patch
    }

    fn on_step_update(&mut self, key: &ContainerKey, messages: Vec<Message>, doc: &Value) -> Patch {
        let mut patch = Patch::new();
        let mut finished_subruns: Vec<String> = Vec::new();

        {
            let container = self.container(key);
            for message in messages {
                let known = message
                    .id
                    .as_ref()
                    .and_then(|id| container.ids.get(id).copied());
                match known {
                    Some(index) => {
                        reconcile_message(container, index, &message, doc, &mut patch);
                        if container.open == Some(index) {
                            container.open = None;
                        }
                    }
                    None => {
                        let index = container.len;
                        container.len += 1;
                        if let Some(id) = &message.id {
                            container.ids.insert(id.clone(), index);
                        }

                        let mut message = message;
                        if *key == ContainerKey::Root && message.role == Role::Tool {
                            if let Some(call_id) = message.tool_call_id.clone() {
                                let pending = path!("pending_subruns", call_id.clone());
                                if get_at_path(doc, &pending).is_some() {
                                    if message.artifact.is_none() {
                                        message.artifact =
                                            get_at_path(doc, &pending).cloned();
                                    }
                                    patch.push(Op::delete(pending));
                                    finished_subruns.push(call_id);
                                }
                            }
                        }

                        match serde_json::to_value(&message) {
                            Ok(value) => {
                                patch.push(Op::append(container.base.clone(), value));
                            }
                            Err(err) => {
                                error!(error = %err, "unserializable step message");
                            }
                        }
                    }
                }
            }
        }

        for call_id in finished_subruns {
            self.containers.remove(&ContainerKey::Sub(call_id));
        }
        patch
    }
}

/// Parse a completed argument buffer. An empty buffer is an argument-free
/// call; malformed text becomes a recoverable error object.
fn parse_arguments(buffer: &str) -> Value {
    if buffer.trim().is_empty() {
        return json!({});
    }
    match serde_json::from_str(buffer) {
        Ok(value) => value,
        Err(err) => json!({"error": format!("invalid arguments: {err}")}),
    }
}

/// Fill a streamed stub in from its finished message. Fields already equal
/// are skipped, so re-applying an update is a no-op.
fn reconcile_message(
    container: &ContainerState,
    index: usize,
    message: &Message,
    doc: &Value,
    patch: &mut Patch,
) {
    let msg_path = container.message_path(index);
    let current = get_at_path(doc, &msg_path);

    let current_content = current
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    if current_content != message.content {
        patch.push(Op::set(
            msg_path.clone().key("content"),
            Value::String(message.content.clone()),
        ));
    }

    if let Some(calls) = &message.tool_calls {
        let desired = serde_json::to_value(calls).unwrap_or(Value::Null);
        let current_calls = current.and_then(|m| m.get("tool_calls"));
        if current_calls != Some(&desired) {
            patch.push(Op::set(msg_path.clone().key("tool_calls"), desired));
        }
    }

    if let Some(artifact) = &message.artifact {
        if current.and_then(|m| m.get("artifact")).is_none() {
            patch.push(Op::set(msg_path.clone().key("artifact"), artifact.clone()));
        }
    }

    if let Some(call_id) = &message.tool_call_id {
        if current.and_then(|m| m.get("tool_call_id")).is_none() {
            patch.push(Op::set(
                msg_path.key("tool_call_id"),
                Value::String(call_id.clone()),
            ));
        }
    }
}
