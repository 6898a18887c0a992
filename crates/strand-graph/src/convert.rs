//! Pure conversions between strand messages and genai chat types.

use genai::chat::{ChatMessage, ChatRequest, MessageContent, ToolResponse};
use strand_contract::{Message, Role, ToolDescriptor};

/// Convert a descriptor to a genai tool declaration.
pub fn to_genai_tool(desc: &ToolDescriptor) -> genai::chat::Tool {
    genai::chat::Tool::new(&desc.name)
        .with_description(&desc.description)
        .with_schema(desc.parameters.clone())
}

/// Convert a conversation message to a genai chat message.
pub fn to_chat_message(msg: &Message) -> ChatMessage {
    match msg.role {
        Role::System => ChatMessage::system(&msg.content),
        Role::User => ChatMessage::user(&msg.content),
        Role::Assistant => match &msg.tool_calls {
            None => ChatMessage::assistant(&msg.content),
            Some(calls) => {
                let mut content = MessageContent::from(msg.content.as_str());
                for call in calls {
                    content.push(genai::chat::ContentPart::ToolCall(genai::chat::ToolCall {
                        call_id: call.id.clone(),
                        fn_name: call.name.clone(),
                        fn_arguments: call.arguments.clone(),
                        thought_signatures: None,
                    }));
                }
                ChatMessage::assistant(content)
            }
        },
        Role::Tool => {
            let call_id = msg.tool_call_id.as_deref().unwrap_or("");
            ChatMessage::from(ToolResponse {
                call_id: call_id.to_string(),
                fn_name: None,
                content: msg.content.clone(),
            })
        }
    }
}

/// Assemble a chat request from the conversation and the available tools.
///
/// `system` is prepended to the request only; it never enters the
/// conversation itself, and it yields when the conversation already carries
/// its own system message.
pub fn build_request(
    messages: &[Message],
    tools: &[ToolDescriptor],
    system: Option<&str>,
) -> ChatRequest {
    let mut chat_messages: Vec<ChatMessage> = Vec::with_capacity(messages.len() + 1);
    if let Some(system) = system {
        if !messages.iter().any(|m| m.role == Role::System) {
            chat_messages.push(ChatMessage::system(system));
        }
    }
    chat_messages.extend(messages.iter().map(to_chat_message));
    let genai_tools: Vec<genai::chat::Tool> = tools.iter().map(to_genai_tool).collect();

    let mut request = ChatRequest::new(chat_messages);
    if !genai_tools.is_empty() {
        request = request.with_tools(genai_tools);
    }
    request
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strand_contract::ToolCall;

    #[test]
    fn descriptor_maps_to_genai_tool() {
        let desc = ToolDescriptor::new("get_weather", "Get current weather")
            .with_parameters(json!({"type": "object", "properties": {"location": {"type": "string"}}}));
        let tool = to_genai_tool(&desc);
        assert_eq!(tool.name.to_string(), "get_weather");
        assert_eq!(tool.description.as_deref(), Some("Get current weather"));
    }

    #[test]
    fn request_carries_tools_only_when_present() {
        let messages = vec![Message::user("hello")];
        let request = build_request(&messages, &[], None);
        assert_eq!(request.messages.len(), 1);
        assert!(request.tools.is_none());

        let request = build_request(
            &messages,
            &[ToolDescriptor::new("get_weather", "Get current weather")],
            None,
        );
        assert_eq!(request.tools.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn system_instruction_is_prepended_to_the_request_only() {
        let messages = vec![Message::user("hello")];
        let request = build_request(&messages, &[], Some("be terse"));
        assert_eq!(request.messages.len(), 2);
        // ChatMessage doesn't expose its role, but the debug form does.
        assert!(format!("{:?}", request.messages[0]).contains("be terse"));
        // The conversation itself is untouched.
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn existing_system_message_wins_over_the_instruction() {
        let messages = vec![Message::system("custom system"), Message::user("hello")];
        let request = build_request(&messages, &[], Some("ignored default"));
        assert_eq!(request.messages.len(), 2);
        let rendered = format!("{:?}", request.messages);
        assert!(rendered.contains("custom system"));
        assert!(!rendered.contains("ignored default"));
    }

    #[test]
    fn conversions_cover_all_roles() {
        let msgs = vec![
            Message::system("be brief"),
            Message::user("weather in Tokyo?"),
            Message::assistant_with_tool_calls(
                "",
                vec![ToolCall::new("tc_1", "get_weather", json!({"location": "Tokyo"}))],
            ),
            Message::tool("tc_1", r#"{"temperature": 22}"#),
            Message::assistant("22 degrees."),
        ];
        let request = build_request(&msgs, &[], None);
        assert_eq!(request.messages.len(), 5);
    }
}
