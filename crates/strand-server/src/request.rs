//! Inbound request schema for the assistant endpoint.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use strand_contract::{Message, ToolDescriptor};
use tracing::warn;

/// Instruction injected when the conversation carries no system message.
/// Tool results render in UI components, so the model must not echo them.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str =
    "When you call a tool and receive a result, the result is automatically displayed in the UI. \
     Do not repeat, explain, or output the tool's result data in your response. \
     Do not output JSON data, base64-encoded data, or raw tool results. \
     Simply acknowledge that the requested action has been completed.";

/// `POST /assistant` payload.
#[derive(Debug, Deserialize)]
pub struct AssistantRequest {
    pub commands: Vec<Command>,
    /// System prompt override.
    #[serde(default)]
    pub system: Option<String>,
    /// Client-executed tools declared for this request.
    #[serde(default)]
    pub tools: Option<HashMap<String, ClientToolSpec>>,
    /// Conversation state from a previous run; its `messages` seed this one.
    #[serde(default)]
    pub state: Option<Value>,
}

/// A mutation the client asks for before the run starts.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    /// Append a user message.
    #[serde(rename = "add-message")]
    AddMessage { message: UserMessage },
    /// Append the result of a client-executed tool call.
    #[serde(rename = "add-tool-result")]
    AddToolResult {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        result: Value,
    },
}

/// A user message made of typed parts.
#[derive(Debug, Deserialize)]
pub struct UserMessage {
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Deserialize)]
pub struct MessagePart {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

/// A client-declared tool: executed by the client, only described to the
/// model here.
#[derive(Debug, Deserialize)]
pub struct ClientToolSpec {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Option<Value>,
}

impl ClientToolSpec {
    pub fn descriptor(&self, name: &str) -> ToolDescriptor {
        let mut desc = ToolDescriptor::new(name, self.description.clone().unwrap_or_default());
        if let Some(parameters) = &self.parameters {
            desc = desc.with_parameters(parameters.clone());
        }
        desc
    }
}

impl AssistantRequest {
    /// Build the seed conversation: prior state messages, then the command
    /// messages in order.
    ///
    /// The system instruction is deliberately absent. It is given to the
    /// model with each request and never becomes part of the run state, so
    /// replaying a run yields exactly the messages the client saw.
    pub fn seed_messages(&self) -> Vec<Message> {
        let mut messages = self.state_messages();

        for command in &self.commands {
            match command {
                Command::AddMessage { message } => {
                    let text: Vec<&str> = message
                        .parts
                        .iter()
                        .filter(|p| p.kind == "text")
                        .filter_map(|p| p.text.as_deref())
                        .collect();
                    if !text.is_empty() {
                        messages.push(Message::user(text.join(" ")));
                    }
                }
                Command::AddToolResult {
                    tool_call_id,
                    result,
                } => {
                    messages.push(Message::tool(tool_call_id.clone(), result.to_string()));
                }
            }
        }
        messages
    }

    fn state_messages(&self) -> Vec<Message> {
        let Some(list) = self
            .state
            .as_ref()
            .and_then(|s| s.get("messages"))
            .and_then(Value::as_array)
        else {
            return Vec::new();
        };
        list.iter()
            .filter_map(|value| match serde_json::from_value(value.clone()) {
                Ok(message) => Some(message),
                Err(err) => {
                    warn!(error = %err, "skipping unparsable state message");
                    None
                }
            })
            .collect()
    }
}
