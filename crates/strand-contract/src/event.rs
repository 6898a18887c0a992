//! The raw event stream between the execution graph and the run adapter.
//!
//! Events are namespaced: the root namespace is the parent conversation,
//! and each delegated sub-computation extends the namespace with one
//! (step, invocation id) segment per nesting level. Order is guaranteed
//! within a namespace only; streams from concurrent sub-computations may
//! interleave arbitrarily.

use crate::{Message, Role};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One level of sub-computation nesting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamespaceSegment {
    /// Graph step that spawned the sub-computation.
    pub step: String,
    /// Unique id of this spawn, minted at dispatch time.
    pub invocation_id: String,
}

impl NamespaceSegment {
    /// Create a segment.
    pub fn new(step: impl Into<String>, invocation_id: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            invocation_id: invocation_id.into(),
        }
    }
}

impl fmt::Display for NamespaceSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.step, self.invocation_id)
    }
}

/// Ordered path of (step, invocation id) segments identifying the emitter.
///
/// Namespaces form a prefix tree rooted at the parent conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace(Vec<NamespaceSegment>);

impl Namespace {
    /// The parent conversation (empty namespace).
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// A single-segment namespace.
    pub fn of(segment: NamespaceSegment) -> Self {
        Self(vec![segment])
    }

    /// True for events emitted by the parent conversation itself.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// The segments, outermost first.
    pub fn segments(&self) -> &[NamespaceSegment] {
        &self.0
    }

    /// The outermost segment, if any.
    pub fn first(&self) -> Option<&NamespaceSegment> {
        self.0.first()
    }

    /// Prepend a segment, pushing this namespace one nesting level deeper.
    /// Used when forwarding a sub-computation's events to the parent stream.
    #[must_use]
    pub fn prefixed_with(&self, segment: NamespaceSegment) -> Namespace {
        let mut segs = Vec::with_capacity(self.0.len() + 1);
        segs.push(segment);
        segs.extend(self.0.iter().cloned());
        Namespace(segs)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "<root>");
        }
        for (i, seg) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{seg}")?;
        }
        Ok(())
    }
}

/// A raw event emitted by the execution graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEvent {
    /// Emitting sub-computation; root for the parent conversation.
    #[serde(default, skip_serializing_if = "Namespace::is_root")]
    pub namespace: Namespace,
    /// What happened.
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl GraphEvent {
    /// Event in the root namespace.
    pub fn root(payload: EventPayload) -> Self {
        Self {
            namespace: Namespace::root(),
            payload,
        }
    }

    /// Event in an explicit namespace.
    pub fn namespaced(namespace: Namespace, payload: EventPayload) -> Self {
        Self { namespace, payload }
    }

    /// Re-scope this event one nesting level deeper.
    #[must_use]
    pub fn prefixed_with(mut self, segment: NamespaceSegment) -> Self {
        self.namespace = self.namespace.prefixed_with(segment);
        self
    }
}

/// The closed set of things a graph step can report.
///
/// Everything a producer emits is decided into one of these variants at the
/// producer boundary; consumers match exhaustively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    /// A new message has started streaming. `id` is the stable id the
    /// finished message will carry in the closing step update.
    NewMessage { id: String, role: Role },
    /// Text fragment for the open message of the emitting namespace.
    TextDelta { delta: String },
    /// The model opened a tool call on the open message.
    ToolCallOpened { id: String, name: String },
    /// Argument text fragment for an open tool call. `last` marks the
    /// terminal fragment; its `delta` may be empty.
    ToolCallArgDelta { id: String, delta: String, last: bool },
    /// A graph step finished: the complete messages it produced.
    StepUpdate { messages: Vec<Message> },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn root_namespace_is_empty() {
        assert!(Namespace::root().is_root());
        assert!(Namespace::root().first().is_none());
    }

    #[test]
    fn prefixing_nests_outermost_first() {
        let inner = Namespace::of(NamespaceSegment::new("tools", "inv_inner"));
        let outer = inner.prefixed_with(NamespaceSegment::new("tools", "inv_outer"));
        assert_eq!(outer.segments().len(), 2);
        assert_eq!(outer.first().unwrap().invocation_id, "inv_outer");
        assert_eq!(outer.to_string(), "tools:inv_outer/tools:inv_inner");
    }

    #[test]
    fn event_wire_encoding() {
        let ev = GraphEvent::root(EventPayload::TextDelta {
            delta: "hi".into(),
        });
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json, json!({"kind": "text_delta", "delta": "hi"}));

        let ev = GraphEvent::namespaced(
            Namespace::of(NamespaceSegment::new("tools", "inv_1")),
            EventPayload::ToolCallArgDelta {
                id: "tc_1".into(),
                delta: "".into(),
                last: true,
            },
        );
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["namespace"][0]["invocation_id"], "inv_1");
        assert_eq!(json["kind"], "tool_call_arg_delta");
        let back: GraphEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, ev);
    }
}
