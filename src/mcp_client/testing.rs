//! In-memory [`ToolHost`] for registry, router and executor tests.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use super::errors::McpError;
use super::supervisor::ToolHost;
use super::types::{McpToolDefinition, ServerDescriptor, ToolCallRequest};

/// Build a tool whose input schema declares `params` as string properties.
pub(crate) fn tool(name: &str, description: &str, params: &[&str]) -> McpToolDefinition {
    let properties: serde_json::Map<String, serde_json::Value> = params
        .iter()
        .map(|p| (p.to_string(), serde_json::json!({ "type": "string" })))
        .collect();
    McpToolDefinition {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: serde_json::json!({ "type": "object", "properties": properties }),
    }
}

/// Scripted host: fixed catalogs, optional failures, and a call log.
#[derive(Default)]
pub(crate) struct FakeHost {
    catalogs: Vec<(String, Vec<McpToolDefinition>)>,
    broken_catalogs: HashSet<String>,
    failing_tools: HashSet<String>,
    calls: Mutex<Vec<ToolCallRequest>>,
}

impl FakeHost {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_client(mut self, key: &str, tools: Vec<McpToolDefinition>) -> Self {
        self.catalogs.push((key.to_string(), tools));
        self
    }

    /// `list_tools` on `key` fails with a transport error.
    pub(crate) fn with_broken_catalog(mut self, key: &str) -> Self {
        self.broken_catalogs.insert(key.to_string());
        self
    }

    /// Calls to the tool `name` fail with a server error.
    pub(crate) fn with_failing_tool(mut self, name: &str) -> Self {
        self.failing_tools.insert(name.to_string());
        self
    }

    /// Every call received, in order.
    pub(crate) fn calls(&self) -> Vec<ToolCallRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolHost for FakeHost {
    fn client_keys(&self) -> Vec<String> {
        self.catalogs.iter().map(|(key, _)| key.clone()).collect()
    }

    async fn list_tools(&self, client: &str) -> Result<Vec<McpToolDefinition>, McpError> {
        if self.broken_catalogs.contains(client) {
            return Err(McpError::Transport {
                server: client.to_string(),
                reason: "server stdout closed".into(),
            });
        }
        self.catalogs
            .iter()
            .find(|(key, _)| key == client)
            .map(|(_, tools)| tools.clone())
            .ok_or_else(|| McpError::NotConnected {
                key: client.to_string(),
            })
    }

    async fn call_tool(&self, call: &ToolCallRequest) -> Result<serde_json::Value, McpError> {
        self.calls.lock().unwrap().push(call.clone());

        if !self.catalogs.iter().any(|(key, _)| *key == call.client) {
            return Err(McpError::NotConnected {
                key: call.client.clone(),
            });
        }
        if self.failing_tools.contains(&call.name) {
            return Err(McpError::Server {
                code: -32000,
                message: format!("{} failed", call.name),
                data: None,
            });
        }
        Ok(serde_json::json!({
            "content": [{ "type": "text", "text": format!("{} ok", call.name) }]
        }))
    }
}

// ─── Scripted stdio server ───────────────────────────────────────────────────

/// A minimal line-oriented MCP server in POSIX sh offering one `echo` tool.
/// Request ids are recovered from the fixed serialization prefix of our
/// requests.
#[cfg(unix)]
const ECHO_SERVER: &str = r#"
while IFS= read -r line; do
  id=$(printf '%s\n' "$line" | sed -n 's/^{"jsonrpc":"2.0","id":\([0-9]*\),.*/\1/p')
  case "$line" in
    *'"method":"initialize"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"2024-11-05","capabilities":{"tools":{}},"serverInfo":{"name":"echo","version":"0.1"}}}\n' "$id" ;;
    *'"method":"tools/list"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"echo","description":"Echo text back","inputSchema":{"type":"object","properties":{"text":{"type":"string"}}}}]}}\n' "$id" ;;
    *'"method":"tools/call"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"pong"}]}}\n' "$id" ;;
  esac
done
"#;

/// Write the echo server script into `dir` and describe it as `key`.
#[cfg(unix)]
pub(crate) fn echo_server_descriptor(dir: &Path, key: &str) -> ServerDescriptor {
    let script = dir.join("echo_server.sh");
    std::fs::write(&script, ECHO_SERVER).unwrap();
    ServerDescriptor::new(key, "sh", &[script.to_str().unwrap()])
}
