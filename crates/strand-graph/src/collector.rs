//! Accumulates a model event stream into text and tool calls.

use genai::chat::{ChatStreamEvent, StreamEnd, Usage};
use serde_json::Value;
use strand_contract::ToolCall;

/// Tool call still being streamed.
#[derive(Debug, Clone)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

impl PartialToolCall {
    fn opened(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: String::new(),
            arguments: String::new(),
        }
    }
}

/// Completed model turn.
#[derive(Debug, Clone)]
pub struct StreamResult {
    /// Accumulated assistant text.
    pub text: String,
    /// Tool calls in model-emitted order, arguments parsed
    /// (`Value::Null` when the argument text is not valid JSON).
    pub tool_calls: Vec<ToolCall>,
    /// Token usage reported by the provider, when captured.
    pub usage: Option<Usage>,
}

/// Incremental output worth forwarding while a turn streams.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamOutput {
    /// Text content delta.
    TextDelta(String),
    /// A tool call opened with its name.
    ToolCallStart { id: String, name: String },
    /// Argument text delta for an open tool call.
    ToolCallDelta { id: String, args_delta: String },
}

/// Folds `ChatStreamEvent`s into a [`StreamResult`].
///
/// `process` returns the forwardable output for each event, if any; `finish`
/// consumes the collector once the stream ends. Calls live in a vector in
/// model-emitted order; turns carry few enough calls that lookup by id is a
/// linear scan.
#[derive(Debug, Default)]
pub struct StreamCollector {
    text: String,
    calls: Vec<PartialToolCall>,
    usage: Option<Usage>,
}

/// Extract the raw argument text from a genai `fn_arguments` value.
///
/// Providers deliver argument text wrapped in `Value::String`; using
/// `.to_string()` on that would add JSON quoting.
fn raw_args(value: &Value) -> String {
    match value {
        Value::String(s) if !s.is_empty() => s.clone(),
        Value::Null | Value::String(_) => String::new(),
        other => other.to_string(),
    }
}

impl StreamCollector {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one stream event, returning the output to forward, if any.
    pub fn process(&mut self, event: ChatStreamEvent) -> Option<StreamOutput> {
        match event {
            ChatStreamEvent::Chunk(chunk) => {
                if chunk.content.is_empty() {
                    return None;
                }
                self.text.push_str(&chunk.content);
                Some(StreamOutput::TextDelta(chunk.content))
            }
            ChatStreamEvent::ToolCallChunk(tool_chunk) => {
                self.fold_call_chunk(tool_chunk.tool_call)
            }
            ChatStreamEvent::End(end) => {
                self.merge_end(end);
                None
            }
            _ => None,
        }
    }

    fn fold_call_chunk(&mut self, tc: genai::chat::ToolCall) -> Option<StreamOutput> {
        let args = raw_args(&tc.fn_arguments);
        let index = self.call_index(&tc.call_id);
        let call = &mut self.calls[index];

        let mut output = None;
        if !tc.fn_name.is_empty() && call.name.is_empty() {
            call.name = tc.fn_name;
            output = Some(StreamOutput::ToolCallStart {
                id: tc.call_id.clone(),
                name: call.name.clone(),
            });
        }

        // With capture_tool_calls enabled each chunk carries the ACCUMULATED
        // argument text so far, not a delta. Replace the stored value and
        // derive the delta by prefix comparison.
        if !args.is_empty() {
            let delta = if args.len() > call.arguments.len() && args.starts_with(&call.arguments)
            {
                args[call.arguments.len()..].to_string()
            } else {
                args.clone()
            };
            call.arguments = args;
            // Do not clobber a ToolCallStart produced by this chunk.
            if !delta.is_empty() && output.is_none() {
                output = Some(StreamOutput::ToolCallDelta {
                    id: tc.call_id,
                    args_delta: delta,
                });
            }
        }
        output
    }

    /// The End event's captured tool calls are authoritative over whatever
    /// accumulated during streaming.
    fn merge_end(&mut self, end: StreamEnd) {
        if let Some(tool_calls) = end.captured_tool_calls() {
            for tc in tool_calls {
                let args = raw_args(&tc.fn_arguments);
                let index = self.call_index(&tc.call_id);
                let call = &mut self.calls[index];
                if call.name.is_empty() {
                    call.name = tc.fn_name.clone();
                }
                if !args.is_empty() {
                    call.arguments = args;
                }
            }
        }
        self.usage = end.captured_usage;
    }

    /// Index of the call with this id, opening a new slot when unseen.
    fn call_index(&mut self, call_id: &str) -> usize {
        match self.calls.iter().position(|c| c.id == call_id) {
            Some(index) => index,
            None => {
                self.calls.push(PartialToolCall::opened(call_id));
                self.calls.len() - 1
            }
        }
    }

    /// The accumulated argument text for an open tool call.
    pub fn args_text(&self, call_id: &str) -> Option<&str> {
        self.calls
            .iter()
            .find(|c| c.id == call_id)
            .map(|c| c.arguments.as_str())
    }

    /// True once at least one tool call has been seen.
    pub fn has_tool_calls(&self) -> bool {
        !self.calls.is_empty()
    }

    /// Consume the collector, parsing argument text for each call.
    ///
    /// Calls with an empty name are dropped (some providers emit ghost
    /// chunks). Argument text that is not valid JSON parses to `Value::Null`;
    /// downstream treats that as a recoverable argument fault.
    pub fn finish(self) -> StreamResult {
        let tool_calls = self
            .calls
            .into_iter()
            .filter(|call| !call.name.is_empty())
            .map(|call| {
                let arguments = serde_json::from_str(&call.arguments).unwrap_or(Value::Null);
                ToolCall::new(call.id, call.name, arguments)
            })
            .collect();

        StreamResult {
            text: self.text,
            tool_calls,
            usage: self.usage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genai::chat::{MessageContent, StreamChunk, StreamEnd, ToolChunk};
    use serde_json::json;

    fn text_chunk(content: &str) -> ChatStreamEvent {
        ChatStreamEvent::Chunk(StreamChunk {
            content: content.to_string(),
        })
    }

    fn tc_chunk(call_id: &str, fn_name: &str, args: &str) -> ChatStreamEvent {
        ChatStreamEvent::ToolCallChunk(ToolChunk {
            tool_call: genai::chat::ToolCall {
                call_id: call_id.to_string(),
                fn_name: fn_name.to_string(),
                fn_arguments: Value::String(args.to_string()),
                thought_signatures: None,
            },
        })
    }

    #[test]
    fn accumulates_text_deltas() {
        let mut collector = StreamCollector::new();
        for word in ["Looks ", "sunny ", "today."] {
            let out = collector.process(text_chunk(word));
            assert!(matches!(out, Some(StreamOutput::TextDelta(_))));
        }
        assert!(collector.process(text_chunk("")).is_none());

        let result = collector.finish();
        assert_eq!(result.text, "Looks sunny today.");
        assert!(result.tool_calls.is_empty());
    }

    #[test]
    fn tool_start_survives_name_and_args_in_one_chunk() {
        let mut collector = StreamCollector::new();
        let out = collector.process(tc_chunk("tc_1", "get_weather", r#"{"location":"Tokyo"}"#));
        assert!(matches!(out, Some(StreamOutput::ToolCallStart { .. })));

        let result = collector.finish();
        assert_eq!(result.tool_calls.len(), 1);
        assert_eq!(result.tool_calls[0].arguments, json!({"location": "Tokyo"}));
    }

    #[test]
    fn accumulated_args_produce_prefix_deltas() {
        let mut collector = StreamCollector::new();
        collector.process(tc_chunk("tc_1", "get_weather", ""));

        let out = collector.process(tc_chunk("tc_1", "", r#"{"location":"#));
        assert!(matches!(
            out,
            Some(StreamOutput::ToolCallDelta { ref args_delta, .. }) if args_delta == r#"{"location":"#
        ));

        let out = collector.process(tc_chunk("tc_1", "", r#"{"location": "Tokyo"}"#));
        assert!(matches!(
            out,
            Some(StreamOutput::ToolCallDelta { ref args_delta, .. }) if args_delta == r#" "Tokyo"}"#
        ));

        assert_eq!(
            collector.args_text("tc_1"),
            Some(r#"{"location": "Tokyo"}"#)
        );
    }

    #[test]
    fn preserves_model_emitted_call_order() {
        let mut collector = StreamCollector::new();
        for (i, id) in ["tc_c", "tc_a", "tc_b"].iter().enumerate() {
            collector.process(tc_chunk(id, &format!("tool_{i}"), "{}"));
        }
        let got: Vec<String> = collector.finish().tool_calls.into_iter().map(|c| c.id).collect();
        assert_eq!(got, vec!["tc_c", "tc_a", "tc_b"]);
    }

    #[test]
    fn end_event_overrides_truncated_streaming_args() {
        let mut collector = StreamCollector::new();
        collector.process(tc_chunk("tc_1", "get_weather", r#"{"location": "New Yo"#));

        let end_tc = genai::chat::ToolCall {
            call_id: "tc_1".to_string(),
            fn_name: String::new(),
            fn_arguments: Value::String(r#"{"location": "New York"}"#.to_string()),
            thought_signatures: None,
        };
        collector.process(ChatStreamEvent::End(StreamEnd {
            captured_content: Some(MessageContent::from_tool_calls(vec![end_tc])),
            ..Default::default()
        }));

        let result = collector.finish();
        assert_eq!(result.tool_calls[0].arguments, json!({"location": "New York"}));
    }

    #[test]
    fn malformed_args_fall_back_to_null() {
        let mut collector = StreamCollector::new();
        collector.process(tc_chunk("tc_1", "search_products", r#"{"query": "sh"#));
        let result = collector.finish();
        assert_eq!(result.tool_calls.len(), 1);
        assert_eq!(result.tool_calls[0].arguments, Value::Null);
    }

    #[test]
    fn ghost_calls_without_names_are_dropped() {
        let mut collector = StreamCollector::new();
        collector.process(tc_chunk("ghost", "", "{}"));
        collector.process(tc_chunk("tc_1", "get_weather", "{}"));
        let result = collector.finish();
        assert_eq!(result.tool_calls.len(), 1);
        assert_eq!(result.tool_calls[0].id, "tc_1");
    }

    #[test]
    fn end_event_captures_usage() {
        let mut collector = StreamCollector::new();
        collector.process(ChatStreamEvent::End(StreamEnd {
            captured_usage: Some(Usage {
                prompt_tokens: Some(12),
                prompt_tokens_details: None,
                completion_tokens: Some(3),
                completion_tokens_details: None,
                total_tokens: Some(15),
            }),
            ..Default::default()
        }));
        let result = collector.finish();
        assert_eq!(result.usage.unwrap().total_tokens, Some(15));
    }
}
