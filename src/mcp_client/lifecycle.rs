//! Server process lifecycle management.
//!
//! Spawns MCP server child processes with a scrubbed environment, performs
//! the initialization handshake, and owns the resulting [`Connection`] until
//! it is explicitly closed.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};

use super::errors::McpError;
use super::transport::StdioTransport;
use super::types::{
    InitializeResult, ListToolsPage, McpToolDefinition, ServerDescriptor, MCP_PROTOCOL_VERSION,
};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Timeout for the initialize handshake.
///
/// Generous because `npx`/`uvx` launchers may download the server on first run.
const INIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for a single `tools/list` or `tools/call` request.
const CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Grace period between closing stdin and force-killing the process.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on `tools/list` pages, in case a server loops its cursor.
const MAX_TOOL_PAGES: usize = 32;

/// Variables passed through to tool servers, per platform.
#[cfg(windows)]
const DEFAULT_ENV_VARS: &[&str] = &[
    "APPDATA",
    "HOMEDRIVE",
    "HOMEPATH",
    "LOCALAPPDATA",
    "PATH",
    "PROCESSOR_ARCHITECTURE",
    "SYSTEMDRIVE",
    "SYSTEMROOT",
    "TEMP",
    "USERNAME",
    "USERPROFILE",
];

/// Variables passed through to tool servers, per platform.
#[cfg(not(windows))]
const DEFAULT_ENV_VARS: &[&str] = &["HOME", "LOGNAME", "PATH", "SHELL", "TERM", "USER"];

// ─── Environment ─────────────────────────────────────────────────────────────

/// Keep only allow-listed variables, dropping shell function definitions
/// (values starting with `()`, as exported by bash).
pub fn filter_environment<I>(vars: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = (String, String)>,
{
    vars.into_iter()
        .filter(|(key, value)| {
            DEFAULT_ENV_VARS.contains(&key.as_str()) && !value.starts_with("()")
        })
        .collect()
}

/// The environment a tool server is spawned with.
///
/// Allow-listed parent variables, then the descriptor's explicit `env`, then
/// the real `PATH` so the server can find its own interpreters.
pub fn child_environment(descriptor: &ServerDescriptor) -> HashMap<String, String> {
    let mut env = filter_environment(std::env::vars());
    env.extend(descriptor.env.iter().map(|(k, v)| (k.clone(), v.clone())));
    env.insert("PATH".to_string(), std::env::var("PATH").unwrap_or_default());
    env
}

// ─── Connection ──────────────────────────────────────────────────────────────

/// A live, handshaken tool server.
///
/// The child is spawned with kill-on-drop, but callers should still
/// [`close`](Connection::close) it so the process exits deterministically.
pub struct Connection {
    /// The descriptor key this connection was activated under.
    pub key: String,
    process: Child,
    transport: StdioTransport,
    /// Server name/version reported during the handshake, if any.
    pub server_info: Option<String>,
}

impl Connection {
    /// Fetch the server's full tool catalog, following pagination.
    pub async fn list_tools(&self) -> Result<Vec<McpToolDefinition>, McpError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_TOOL_PAGES {
            let params = cursor
                .as_ref()
                .map(|c| serde_json::json!({ "cursor": c }));
            let result = self.timed("tools/list", params).await?;
            let page: ListToolsPage =
                serde_json::from_value(result).map_err(|e| McpError::Transport {
                    server: self.key.clone(),
                    reason: format!("malformed tools/list result: {e}"),
                })?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(tools),
            }
        }

        tracing::warn!(server = %self.key, pages = MAX_TOOL_PAGES, "tools/list pagination truncated");
        Ok(tools)
    }

    /// Invoke a tool. The result payload is returned verbatim.
    pub async fn call_tool(
        &self,
        name: &str,
        args: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<serde_json::Value, McpError> {
        let params = serde_json::json!({
            "name": name,
            "arguments": args,
        });
        self.timed("tools/call", Some(params)).await
    }

    /// Close the transport and make sure the process is gone.
    pub async fn close(mut self) {
        self.transport.close().await;

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.process.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(server = %self.key, %status, "server exited");
            }
            _ => {
                tracing::warn!(server = %self.key, "server did not exit on EOF, killing");
                let _ = self.process.kill().await;
            }
        }
    }

    async fn timed(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, McpError> {
        tokio::time::timeout(CALL_TIMEOUT, self.transport.request(method, params))
            .await
            .map_err(|_| McpError::Timeout {
                server: self.key.clone(),
                operation: method.to_string(),
                timeout_ms: CALL_TIMEOUT.as_millis() as u64,
            })?
    }
}

// ─── Spawning ────────────────────────────────────────────────────────────────

/// Spawn the server described by `descriptor` and complete the MCP handshake.
///
/// `command` must already be validated by the caller.
pub async fn open_connection(
    descriptor: &ServerDescriptor,
    command: &str,
) -> Result<Connection, McpError> {
    let key = descriptor.key.as_str();

    let mut cmd = Command::new(command);
    cmd.args(&descriptor.args);
    cmd.env_clear();
    cmd.envs(child_environment(descriptor));
    if let Some(dir) = descriptor.cwd.as_deref() {
        cmd.current_dir(dir);
    }

    // Windows: prevent console window from appearing for child processes
    #[cfg(target_os = "windows")]
    {
        const CREATE_NO_WINDOW: u32 = 0x08000000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }

    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::piped());
    cmd.stderr(if cfg!(windows) {
        Stdio::piped()
    } else {
        Stdio::inherit()
    });
    cmd.kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| McpError::SpawnFailed {
        name: key.to_string(),
        reason: format!("{command}: {e}"),
    })?;

    let stdin = child.stdin.take().ok_or(McpError::SpawnFailed {
        name: key.to_string(),
        reason: "failed to capture stdin".into(),
    })?;
    let stdout = child.stdout.take().ok_or(McpError::SpawnFailed {
        name: key.to_string(),
        reason: "failed to capture stdout".into(),
    })?;
    if let Some(stderr) = child.stderr.take() {
        drain_stderr(key.to_string(), stderr);
    }

    tracing::debug!(server = key, command, args = ?descriptor.args, pid = ?child.id(), "spawned server");

    let transport = StdioTransport::new(key, stdin, stdout);

    let server_info = match tokio::time::timeout(INIT_TIMEOUT, initialize(&transport, key)).await {
        Ok(Ok(info)) => info,
        Ok(Err(e)) => {
            let _ = child.kill().await;
            return Err(McpError::InitFailed {
                name: key.to_string(),
                reason: e.to_string(),
            });
        }
        Err(_) => {
            let _ = child.kill().await;
            return Err(McpError::InitFailed {
                name: key.to_string(),
                reason: format!("initialization timed out after {}s", INIT_TIMEOUT.as_secs()),
            });
        }
    };

    Ok(Connection {
        key: key.to_string(),
        process: child,
        transport,
        server_info,
    })
}

/// Perform the MCP initialization handshake.
///
/// Returns a `name version` label for the server when it reports one.
async fn initialize(
    transport: &StdioTransport,
    client_name: &str,
) -> Result<Option<String>, McpError> {
    let params = serde_json::json!({
        "protocolVersion": MCP_PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": { "name": client_name, "version": "1.0.0" },
    });
    let result = transport.request("initialize", Some(params)).await?;

    let init: InitializeResult =
        serde_json::from_value(result).map_err(|e| McpError::InitFailed {
            name: client_name.to_string(),
            reason: format!("failed to parse initialize response: {e}"),
        })?;

    if let Some(version) = init.protocol_version.as_deref() {
        if version != MCP_PROTOCOL_VERSION {
            tracing::info!(server = client_name, version, "server negotiated a different protocol version");
        }
    }

    transport.notify("notifications/initialized", None).await?;

    Ok(init.server_info.map(|info| {
        format!(
            "{} {}",
            info.name.unwrap_or_default(),
            info.version.unwrap_or_default()
        )
        .trim()
        .to_string()
    }))
}

/// Forward a piped stderr into the log so the child never blocks on it.
fn drain_stderr(server: String, stderr: tokio::process::ChildStderr) {
    use tokio::io::{AsyncBufReadExt, BufReader};

    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(server = %server, stderr = %line, "server stderr");
        }
    });
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[cfg(not(windows))]
    #[test]
    fn test_filter_keeps_only_allow_listed() {
        let env = filter_environment(vars(&[
            ("HOME", "/home/me"),
            ("PATH", "/usr/bin"),
            ("AWS_SECRET_ACCESS_KEY", "hunter2"),
            ("OPENAI_API_KEY", "sk-123"),
        ]));
        assert_eq!(env.len(), 2);
        assert_eq!(env["HOME"], "/home/me");
        assert!(!env.contains_key("AWS_SECRET_ACCESS_KEY"));
        assert!(!env.contains_key("OPENAI_API_KEY"));
    }

    #[cfg(not(windows))]
    #[test]
    fn test_filter_drops_shell_functions() {
        let env = filter_environment(vars(&[
            ("SHELL", "() {  echo pwned\n}"),
            ("USER", "me"),
        ]));
        assert!(!env.contains_key("SHELL"));
        assert_eq!(env["USER"], "me");
    }

    #[test]
    fn test_child_environment_layers_descriptor_env_and_path() {
        let mut desc = ServerDescriptor::new("fs", "npx", &[]);
        desc.env.insert("FS_ROOT".into(), "/data".into());
        let env = child_environment(&desc);
        assert_eq!(env["FS_ROOT"], "/data");
        assert_eq!(env["PATH"], std::env::var("PATH").unwrap_or_default());
    }

    #[tokio::test]
    async fn test_open_connection_missing_binary() {
        let desc = ServerDescriptor::new("ghost", "chattron-definitely-not-a-binary", &[]);
        let err = open_connection(&desc, "chattron-definitely-not-a-binary")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, McpError::SpawnFailed { .. }));
    }
}
