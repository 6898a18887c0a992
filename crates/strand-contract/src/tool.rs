//! Tool contract.
//!
//! A tool failure is data, not control flow: dispatch converts it into an
//! error-content tool message and the run continues. Only the fault kinds in
//! [`crate::GraphError`] end a run.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Tool execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    /// Execution succeeded.
    Success,
    /// Execution failed; the failure is reported as message content.
    Error,
}

/// Result of tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Tool name.
    pub tool_name: String,
    /// Execution status.
    pub status: ToolStatus,
    /// Result data.
    pub data: Value,
    /// Optional message, always set for errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ToolResult {
    /// Create a success result.
    pub fn success(tool_name: impl Into<String>, data: impl Into<Value>) -> Self {
        Self {
            tool_name: tool_name.into(),
            status: ToolStatus::Success,
            data: data.into(),
            message: None,
        }
    }

    /// Create an error result.
    pub fn error(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            status: ToolStatus::Error,
            data: Value::Null,
            message: Some(message.into()),
        }
    }

    /// Check if execution failed.
    pub fn is_error(&self) -> bool {
        matches!(self.status, ToolStatus::Error)
    }

    /// Render the content string for the tool message fed back to the model.
    pub fn content(&self) -> String {
        match self.status {
            ToolStatus::Success => self.data.to_string(),
            ToolStatus::Error => self
                .message
                .clone()
                .unwrap_or_else(|| "tool execution failed".to_string()),
        }
    }
}

/// Tool execution errors. Contained by dispatch, never fatal to the run.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

/// Tool metadata exposed to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Tool name, unique within a registry.
    pub name: String,
    /// Tool description.
    pub description: String,
    /// JSON schema for parameters.
    pub parameters: Value,
}

impl ToolDescriptor {
    /// Create a descriptor with an empty parameter schema.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        }
    }

    /// Set the parameter schema.
    #[must_use]
    pub fn with_parameters(mut self, schema: Value) -> Self {
        self.parameters = schema;
        self
    }
}

/// A backend-executed tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool metadata.
    fn descriptor(&self) -> ToolDescriptor;

    /// Execute the tool with parsed arguments.
    async fn execute(&self, args: Value) -> Result<ToolResult, ToolError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_content_is_serialized_data() {
        let result = ToolResult::success("get_weather", json!({"location": "Tokyo"}));
        assert!(!result.is_error());
        assert!(result.content().contains("\"location\":\"Tokyo\""));
    }

    #[test]
    fn error_content_is_the_message() {
        let result = ToolResult::error("display_chart", "Unsupported plot type: scatter");
        assert!(result.is_error());
        assert_eq!(result.content(), "Unsupported plot type: scatter");
    }

    #[test]
    fn descriptor_defaults_to_empty_object_schema() {
        let desc = ToolDescriptor::new("search_products", "Search the catalog");
        assert_eq!(desc.parameters["type"], "object");
    }
}
