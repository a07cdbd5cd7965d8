//! Process supervisor: the single owner of live tool-server connections.
//!
//! Keeps the persisted `isActive` flags in step with activation attempts and
//! exposes the connection map to the rest of the crate only through
//! [`ToolHost`].

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::config_store::ConfigStore;
use super::errors::McpError;
use super::lifecycle::{open_connection, Connection};
use super::types::{McpConfiguration, McpToolDefinition, ServerDescriptor, ToolCallRequest};

// ─── ToolHost ────────────────────────────────────────────────────────────────

/// Read/call access to live tool servers.
///
/// Implemented by [`ProcessSupervisor`]; registry building and plan execution
/// only need this much.
#[async_trait]
pub trait ToolHost: Send + Sync {
    /// Keys with a currently live connection.
    fn client_keys(&self) -> Vec<String>;

    /// The tool catalog advertised by `client`.
    async fn list_tools(&self, client: &str) -> Result<Vec<McpToolDefinition>, McpError>;

    /// Invoke a tool and return its raw result.
    async fn call_tool(&self, call: &ToolCallRequest) -> Result<serde_json::Value, McpError>;
}

// ─── ActivationTarget ────────────────────────────────────────────────────────

/// What to activate: a configured key, or a full descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActivationTarget {
    Key(String),
    Descriptor(ServerDescriptor),
}

impl From<&str> for ActivationTarget {
    fn from(key: &str) -> Self {
        ActivationTarget::Key(key.to_string())
    }
}

impl From<ServerDescriptor> for ActivationTarget {
    fn from(descriptor: ServerDescriptor) -> Self {
        ActivationTarget::Descriptor(descriptor)
    }
}

// ─── ProcessSupervisor ───────────────────────────────────────────────────────

/// Manages the set of live [`Connection`]s, keyed by descriptor key.
pub struct ProcessSupervisor {
    store: ConfigStore,
    connections: HashMap<String, Connection>,
}

impl ProcessSupervisor {
    /// Create a supervisor persisting to `store`. Nothing is spawned yet.
    pub fn new(store: ConfigStore) -> Self {
        Self {
            store,
            connections: HashMap::new(),
        }
    }

    /// The backing configuration store.
    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────

    /// Startup hook, run before [`load`](Self::load). Currently does nothing
    /// beyond announcing where configuration lives.
    pub async fn init(&mut self) -> Result<(), McpError> {
        tracing::debug!(config = %self.store.path().display(), "supervisor initialized");
        Ok(())
    }

    /// Activate every descriptor whose `isActive` flag is set.
    ///
    /// One server failing does not stop the others; failures are logged and
    /// returned so the caller can surface them.
    pub async fn load(&mut self) -> Result<Vec<(String, McpError)>, McpError> {
        let config = self.store.load()?;
        let mut failures = Vec::new();

        for descriptor in config.mcp_servers.into_values().filter(|d| d.is_active) {
            let key = descriptor.key.clone();
            if let Err(e) = self.activate(ActivationTarget::Descriptor(descriptor)).await {
                tracing::warn!(server = %key, error = %e, "failed to restore server");
                failures.push((key, e));
            }
        }

        tracing::info!(
            running = self.connections.len(),
            failed = failures.len(),
            "restored active servers"
        );
        Ok(failures)
    }

    /// Spawn and handshake a server, then record it as active.
    ///
    /// Activating a descriptor upserts it into the configuration on success.
    /// An existing connection for the same key is replaced and closed. On
    /// failure neither the configuration nor the live set changes.
    pub async fn activate(&mut self, target: ActivationTarget) -> Result<String, McpError> {
        let descriptor = match target {
            ActivationTarget::Descriptor(descriptor) => descriptor,
            ActivationTarget::Key(key) => self
                .store
                .get_server(&key)?
                .ok_or(McpError::NotFound { key })?,
        };

        let command = descriptor
            .command
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| McpError::Validation {
                key: descriptor.key.clone(),
                reason: "command is required".into(),
            })?
            .to_string();
        if descriptor.key.trim().is_empty() {
            return Err(McpError::Validation {
                key: String::new(),
                reason: "key is required".into(),
            });
        }

        let key = descriptor.key.clone();
        tracing::info!(server = %key, command = %command, "activating server");

        let connection = open_connection(&descriptor, &command)
            .await
            .map_err(|e| McpError::activation(&key, e))?;

        let persisted = ServerDescriptor {
            is_active: true,
            ..descriptor
        };
        if let Err(e) = self.store.upsert_server(persisted) {
            connection.close().await;
            return Err(e);
        }

        let message = match connection.server_info.as_deref() {
            Some(info) if !info.is_empty() => format!("server '{key}' activated ({info})"),
            _ => format!("server '{key}' activated"),
        };

        if let Some(previous) = self.connections.insert(key.clone(), connection) {
            tracing::debug!(server = %key, "replacing previous connection");
            previous.close().await;
        }

        tracing::info!(server = %key, "server activated");
        Ok(message)
    }

    /// Close the connection for `key` (if any) and clear its `isActive` flag.
    ///
    /// Unknown keys are not an error.
    pub async fn deactivate(&mut self, key: &str) -> Result<(), McpError> {
        if let Some(connection) = self.connections.remove(key) {
            connection.close().await;
            tracing::info!(server = %key, "server deactivated");
        }

        self.store.set_active(key, false)?;
        Ok(())
    }

    /// Deactivate (best-effort) and then delete `key` from the configuration.
    ///
    /// Returns whether a configuration entry existed.
    pub async fn remove_server(&mut self, key: &str) -> Result<bool, McpError> {
        if let Err(e) = self.deactivate(key).await {
            tracing::warn!(server = %key, error = %e, "deactivation before removal failed");
        }
        let removed = self.store.remove_server(key)?;
        tracing::info!(server = %key, removed, "server removed");
        Ok(removed)
    }

    /// Close every live connection. Persisted flags are left as they are so
    /// the same set comes back on the next [`load`](Self::load).
    pub async fn shutdown_all(&mut self) {
        for (_, connection) in self.connections.drain() {
            connection.close().await;
        }
    }

    // ─── Configuration passthrough ───────────────────────────────────────

    /// Add a descriptor; `false` if the key already exists.
    pub fn add_server(&self, descriptor: ServerDescriptor) -> Result<bool, McpError> {
        self.store.add_server(descriptor)
    }

    /// Replace a descriptor; `false` if the key does not exist.
    pub fn update_server(&self, descriptor: ServerDescriptor) -> Result<bool, McpError> {
        self.store.update_server(descriptor)
    }

    /// The current persisted configuration.
    pub fn get_config(&self) -> Result<McpConfiguration, McpError> {
        self.store.load()
    }

    fn connection(&self, key: &str) -> Result<&Connection, McpError> {
        self.connections.get(key).ok_or_else(|| McpError::NotConnected {
            key: key.to_string(),
        })
    }
}

#[async_trait]
impl ToolHost for ProcessSupervisor {
    fn client_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.connections.keys().cloned().collect();
        keys.sort();
        keys
    }

    async fn list_tools(&self, client: &str) -> Result<Vec<McpToolDefinition>, McpError> {
        self.connection(client)?.list_tools().await
    }

    async fn call_tool(&self, call: &ToolCallRequest) -> Result<serde_json::Value, McpError> {
        let connection = self.connection(&call.client)?;
        tracing::info!(server = %call.client, tool = %call.name, "calling tool");
        connection
            .call_tool(&call.name, &call.args)
            .await
            .inspect_err(|e| {
                tracing::warn!(server = %call.client, tool = %call.name, error = %e, "tool call failed");
            })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
