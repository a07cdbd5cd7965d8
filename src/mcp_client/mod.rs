//! MCP Client: tool-server supervision over JSON-RPC on stdio.
//!
//! This module handles:
//! - Persisting tool-server descriptors (`mcp.json`)
//! - Spawning server processes with a scrubbed environment
//! - JSON-RPC 2.0 communication over process stdio
//! - Tracking live connections and keeping `isActive` flags in step
//! - Building the client → tools registry used for request routing

pub mod config_store;
pub mod errors;
pub mod lifecycle;
pub mod registry;
pub mod supervisor;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
pub use config_store::ConfigStore;
pub use errors::McpError;
pub use registry::{RegistryBuild, RegistryBuilder, ToolRegistry};
pub use supervisor::{ActivationTarget, ProcessSupervisor, ToolHost};
pub use types::{McpConfiguration, McpToolDefinition, ServerDescriptor, ToolCallRequest};
