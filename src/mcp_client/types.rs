//! Shared types for the MCP client.
//!
//! JSON-RPC 2.0 message types, MCP protocol structures, and the persisted
//! server descriptor / configuration records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ─── JSON-RPC 2.0 ───────────────────────────────────────────────────────────

/// JSON-RPC 2.0 request message.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC request.
    pub fn new(id: u64, method: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }
}

/// Any JSON-RPC message read from a server.
///
/// Servers interleave responses with their own notifications and requests,
/// so `method` is kept to tell them apart.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcMessage {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcMessage {
    /// Whether this message is the response to request `id`.
    pub fn is_response_to(&self, id: u64) -> bool {
        self.method.is_none() && self.id.as_ref().and_then(|v| v.as_u64()) == Some(id)
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

// ─── MCP Protocol Types ──────────────────────────────────────────────────────

/// Protocol revision announced in the `initialize` request.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// A tool advertised by a connected server via `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub input_schema: serde_json::Value,
}

impl McpToolDefinition {
    /// Property names declared by the tool's input schema, in schema order.
    pub fn parameter_names(&self) -> Vec<&str> {
        self.input_schema
            .get("properties")
            .and_then(|p| p.as_object())
            .map(|props| props.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }
}

/// One page of a `tools/list` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsPage {
    #[serde(default)]
    pub tools: Vec<McpToolDefinition>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// MCP initialize response payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    #[serde(default)]
    pub protocol_version: Option<String>,
    #[serde(default)]
    pub server_info: Option<ServerInfo>,
}

/// Server info returned in the initialize response.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    pub name: Option<String>,
    pub version: Option<String>,
}

/// A tool invocation addressed to one live client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub client: String,
    pub name: String,
    #[serde(default = "empty_args")]
    pub args: serde_json::Map<String, serde_json::Value>,
}

fn empty_args() -> serde_json::Map<String, serde_json::Value> {
    serde_json::Map::new()
}

// ─── Persisted Configuration ─────────────────────────────────────────────────

/// A configured tool provider, as stored in `mcp.json`.
///
/// Fields are loosely typed on disk; `command` is only required once the
/// descriptor is activated.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerDescriptor {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub is_active: bool,
    /// Extra variables layered over the allow-listed environment.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Working directory for the child process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    /// Fields this version does not understand, kept so rewrites are lossless.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ServerDescriptor {
    /// Build a descriptor with the fields needed to spawn a server.
    pub fn new(key: &str, command: &str, args: &[&str]) -> Self {
        Self {
            key: key.to_string(),
            name: key.to_string(),
            command: Some(command.to_string()),
            args: args.iter().map(|a| a.to_string()).collect(),
            ..Self::default()
        }
    }
}

/// The whole persisted document: `{ "mcpServers": { <key>: ServerDescriptor } }`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct McpConfiguration {
    #[serde(rename = "mcpServers", default)]
    pub mcp_servers: BTreeMap<String, ServerDescriptor>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ─── Standard JSON-RPC Error Codes ───────────────────────────────────────────

/// Well-known JSON-RPC error codes.
pub mod error_codes {
    /// The method does not exist or is not available.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i32 = -32603;
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_rpc_request_serialization() {
        let req = JsonRpcRequest::new(1, "initialize", None);
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.starts_with(r#"{"jsonrpc":"2.0","id":1,"method":"initialize""#));
        // params should be omitted when None
        assert!(!json.contains("params"));
    }

    #[test]
    fn test_message_response_matching() {
        let resp: JsonRpcMessage =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":7,"result":{"tools":[]}}"#).unwrap();
        assert!(resp.is_response_to(7));
        assert!(!resp.is_response_to(8));

        // A server-originated request reusing the same id is not our response.
        let req: JsonRpcMessage =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":7,"method":"ping"}"#).unwrap();
        assert!(!req.is_response_to(7));

        let note: JsonRpcMessage =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"notifications/message"}"#)
                .unwrap();
        assert!(!note.is_response_to(7));
    }

    #[test]
    fn test_json_rpc_error_response() {
        let json = r#"{"jsonrpc":"2.0","id":2,"error":{"code":-32601,"message":"Method not found"}}"#;
        let resp: JsonRpcMessage = serde_json::from_str(json).unwrap();
        let err = resp.error.unwrap();
        assert_eq!(err.code, error_codes::METHOD_NOT_FOUND);
    }

    #[test]
    fn test_tool_definition_reads_input_schema() {
        let json = r#"{
            "name": "read_file",
            "inputSchema": {"type": "object", "properties": {"path": {"type": "string"}}}
        }"#;
        let tool: McpToolDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(tool.description, "");
        assert_eq!(tool.parameter_names(), vec!["path"]);
    }

    #[test]
    fn test_descriptor_defaults_and_camel_case() {
        let json = r#"{"key":"fs","command":"npx","isActive":true}"#;
        let desc: ServerDescriptor = serde_json::from_str(json).unwrap();
        assert!(desc.is_active);
        assert!(desc.args.is_empty());

        let out = serde_json::to_value(&desc).unwrap();
        assert_eq!(out["isActive"], true);
        assert!(out.get("env").is_none());
        assert!(out.get("cwd").is_none());
    }

    #[test]
    fn test_descriptor_preserves_unknown_fields() {
        let json = r#"{"key":"fs","command":"npx","timeout":30}"#;
        let desc: ServerDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(desc.extra["timeout"], 30);
        let out = serde_json::to_value(&desc).unwrap();
        assert_eq!(out["timeout"], 30);
    }

    #[test]
    fn test_tool_call_request_defaults_args() {
        let req: ToolCallRequest =
            serde_json::from_str(r#"{"client":"fs","name":"read_file"}"#).unwrap();
        assert!(req.args.is_empty());
    }
}
