//! The conversation finite-state machine.

use strand_contract::{Message, Role};

/// The two graph nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphNode {
    /// Stream one model turn.
    Agent,
    /// Execute the tool calls the last turn requested.
    Tools,
}

/// Pure transition function over the last conversation message.
///
/// * `Agent` hands off to `Tools` exactly when the last message carries
///   pending tool calls; otherwise the run ends.
/// * `Tools` hands back to `Agent` exactly when dispatch appended at least
///   one tool message (the last message has the tool role). When every call
///   was client-executed nothing is appended and the run ends; the results
///   arrive out of band on a later request.
pub fn transition(node: GraphNode, last_message: Option<&Message>) -> Option<GraphNode> {
    match node {
        GraphNode::Agent => match last_message {
            Some(msg) if msg.has_tool_calls() => Some(GraphNode::Tools),
            _ => None,
        },
        GraphNode::Tools => match last_message {
            Some(msg) if msg.role == Role::Tool => Some(GraphNode::Agent),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strand_contract::ToolCall;

    #[test]
    fn agent_ends_run_without_tool_calls() {
        let msg = Message::assistant("all done");
        assert_eq!(transition(GraphNode::Agent, Some(&msg)), None);
        assert_eq!(transition(GraphNode::Agent, None), None);
    }

    #[test]
    fn agent_hands_off_on_pending_tool_calls() {
        let msg = Message::assistant_with_tool_calls(
            "",
            vec![ToolCall::new("tc_1", "get_weather", json!({}))],
        );
        assert_eq!(transition(GraphNode::Agent, Some(&msg)), Some(GraphNode::Tools));
    }

    #[test]
    fn empty_tool_call_list_does_not_hand_off() {
        let msg = Message::assistant_with_tool_calls("thinking", vec![]);
        assert_eq!(transition(GraphNode::Agent, Some(&msg)), None);
    }

    #[test]
    fn tools_return_to_agent_only_after_producing_messages() {
        let tool_msg = Message::tool("tc_1", "{}");
        assert_eq!(transition(GraphNode::Tools, Some(&tool_msg)), Some(GraphNode::Agent));

        // All calls client-executed: last message is still the assistant turn.
        let assistant = Message::assistant_with_tool_calls(
            "",
            vec![ToolCall::new("tc_1", "confirm_order", json!({}))],
        );
        assert_eq!(transition(GraphNode::Tools, Some(&assistant)), None);
    }
}
