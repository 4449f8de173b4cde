//! The tool contract — the boundary to the external tool-execution runtime.
//!
//! This core never speaks a tool-transport protocol itself; it only converts
//! between provider tool dialects and these provider-neutral shapes.

use crate::chunk::ToolServerInfo;
use crate::error::ToolError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// A request to execute a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Provider-local call ID (matches the LLM's tool_call id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

/// The result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,

    /// Whether the tool executed successfully
    pub success: bool,

    /// The output content
    pub output: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// The external tool-execution collaborator.
///
/// Implemented outside this core (e.g., by an MCP-backed runtime). The
/// tool-call loop only ever reaches tools through this trait.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// All tools currently available for the model to call.
    async fn list_tools(&self) -> std::result::Result<Vec<ToolDefinition>, ToolError>;

    /// Execute one invocation and return its result.
    async fn invoke(
        &self,
        invocation: &ToolInvocation,
    ) -> std::result::Result<ToolResult, ToolError>;

    /// Identity of the server owning a tool, for chunk lifecycle events.
    fn server_info(&self, _tool_name: &str) -> Option<ToolServerInfo> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoExecutor;

    #[async_trait]
    impl ToolExecutor for EchoExecutor {
        async fn list_tools(&self) -> std::result::Result<Vec<ToolDefinition>, ToolError> {
            Ok(vec![ToolDefinition {
                name: "echo".into(),
                description: "Echoes back the input".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "text": { "type": "string" }
                    },
                    "required": ["text"]
                }),
            }])
        }

        async fn invoke(
            &self,
            invocation: &ToolInvocation,
        ) -> std::result::Result<ToolResult, ToolError> {
            let text = invocation.arguments["text"].as_str().unwrap_or("").to_string();
            Ok(ToolResult {
                call_id: invocation.id.clone(),
                success: true,
                output: text,
                data: None,
            })
        }
    }

    #[tokio::test]
    async fn executor_lists_and_invokes() {
        let exec = EchoExecutor;
        let tools = exec.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "echo");

        let result = exec
            .invoke(&ToolInvocation {
                id: "call_1".into(),
                name: "echo".into(),
                arguments: serde_json::json!({"text": "hello world"}),
            })
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output, "hello world");
        assert_eq!(result.call_id, "call_1");
    }

    #[test]
    fn tool_definition_serialization() {
        let tool = ToolDefinition {
            name: "web_search".into(),
            description: "Search the web".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "The search query" }
                },
                "required": ["query"]
            }),
        };
        let json = serde_json::to_string(&tool).unwrap();
        assert!(json.contains("web_search"));
        assert!(json.contains("query"));
    }
}
