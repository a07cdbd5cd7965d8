//! MCP client error types.

use thiserror::Error;

/// Errors that can occur while managing tool servers and their configuration.
#[derive(Debug, Error)]
pub enum McpError {
    /// A descriptor is missing a field required for the requested operation.
    #[error("invalid server descriptor '{key}': {reason}")]
    Validation { key: String, reason: String },

    /// A key was referenced that is not present in the configuration.
    #[error("no server configured with key '{key}'")]
    NotFound { key: String },

    /// Spawning or handshaking with a server failed. Wraps the cause.
    #[error("failed to activate server '{key}': {source}")]
    Activation {
        key: String,
        #[source]
        source: Box<McpError>,
    },

    /// An operation targeted a key with no live connection.
    #[error("client '{key}' is not connected")]
    NotConnected { key: String },

    /// The configuration file could not be read or written.
    #[error("config file {path}: {reason}")]
    ConfigIo { path: String, reason: String },

    /// The configuration file exists but is not a valid document.
    #[error("config file {path} is malformed: {reason}")]
    ConfigParse { path: String, reason: String },

    /// A server process failed to start.
    #[error("failed to spawn server '{name}': {reason}")]
    SpawnFailed { name: String, reason: String },

    /// The initialization handshake failed.
    #[error("server '{name}' initialization failed: {reason}")]
    InitFailed { name: String, reason: String },

    /// JSON-RPC communication error (malformed message, I/O error, closed pipe).
    #[error("transport error for server '{server}': {reason}")]
    Transport { server: String, reason: String },

    /// Server returned a JSON-RPC error response.
    #[error("server error [{code}]: {message}")]
    Server {
        code: i32,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// A request did not complete in time.
    #[error("'{operation}' on server '{server}' timed out after {timeout_ms}ms")]
    Timeout {
        server: String,
        operation: String,
        timeout_ms: u64,
    },
}

impl McpError {
    /// Wrap a spawn/handshake failure as an activation error for `key`.
    pub fn activation(key: &str, cause: McpError) -> Self {
        McpError::Activation {
            key: key.to_string(),
            source: Box::new(cause),
        }
    }

    /// Stable machine-readable category, used at the command boundary.
    pub fn kind(&self) -> &'static str {
        match self {
            McpError::Validation { .. } => "validation",
            McpError::NotFound { .. } => "notFound",
            McpError::Activation { .. } | McpError::SpawnFailed { .. } | McpError::InitFailed { .. } => {
                "activation"
            }
            McpError::NotConnected { .. } => "notConnected",
            McpError::ConfigIo { .. } | McpError::ConfigParse { .. } => "io",
            McpError::Transport { .. } => "transport",
            McpError::Server { .. } => "server",
            McpError::Timeout { .. } => "timeout",
        }
    }
}
