//! Tool registry: the live client → tools mapping used for request routing.
//!
//! Provides:
//! - An insertion-ordered registry (clients in build order, tools in the
//!   order each server advertised them)
//! - Lookup of a tool offered by a specific client
//! - Detection of tool names offered by more than one client
//! - The registry builder that reconciles a caller's "known active" set with
//!   what the supervisor actually has running

use std::collections::HashSet;

use serde::Serialize;

use super::supervisor::ToolHost;
use super::types::McpToolDefinition;

// ─── ToolRegistry ────────────────────────────────────────────────────────────

/// Tools grouped by the client that offers them.
///
/// Iteration order is significant: keyword matching takes the first hit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolRegistry {
    clients: Vec<(String, Vec<McpToolDefinition>)>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tools for `client`. A client already present keeps its
    /// position and has its tool list replaced.
    pub fn insert(&mut self, client: &str, tools: Vec<McpToolDefinition>) {
        match self.clients.iter_mut().find(|(key, _)| key == client) {
            Some((_, slot)) => *slot = tools,
            None => self.clients.push((client.to_string(), tools)),
        }
    }

    /// Client keys in registry order.
    pub fn clients(&self) -> Vec<&str> {
        self.clients.iter().map(|(key, _)| key.as_str()).collect()
    }

    /// The tools offered by `client`, if it is registered.
    pub fn tools_for(&self, client: &str) -> Option<&[McpToolDefinition]> {
        self.clients
            .iter()
            .find(|(key, _)| key == client)
            .map(|(_, tools)| tools.as_slice())
    }

    /// Look up a tool by name on a specific client.
    pub fn get_tool(&self, client: &str, tool_name: &str) -> Option<&McpToolDefinition> {
        self.tools_for(client)?
            .iter()
            .find(|tool| tool.name == tool_name)
    }

    /// Every distinct tool name, in first-seen order.
    pub fn tool_names(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.iter()
            .map(|(_, tool)| tool.name.as_str())
            .filter(|name| seen.insert(*name))
            .collect()
    }

    /// Tool names offered by more than one client, in first-seen order.
    ///
    /// An unqualified name in an LLM plan is ambiguous for these.
    pub fn shared_tool_names(&self) -> Vec<&str> {
        let mut counts: Vec<(&str, usize)> = Vec::new();
        for (_, tools) in &self.clients {
            let mut seen = HashSet::new();
            for name in tools.iter().map(|t| t.name.as_str()) {
                if !seen.insert(name) {
                    continue;
                }
                match counts.iter_mut().find(|(n, _)| *n == name) {
                    Some((_, count)) => *count += 1,
                    None => counts.push((name, 1)),
                }
            }
        }
        counts
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(name, _)| name)
            .collect()
    }

    /// Iterate `(client, tool)` pairs in registry order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &McpToolDefinition)> {
        self.clients
            .iter()
            .flat_map(|(key, tools)| tools.iter().map(move |tool| (key.as_str(), tool)))
    }

    /// Total number of `(client, tool)` pairs.
    pub fn len(&self) -> usize {
        self.clients.iter().map(|(_, tools)| tools.len()).sum()
    }

    /// Whether no client offers any tool.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Serialized as a JSON object `{ <client>: [tools...] }` in registry order.
impl Serialize for ToolRegistry {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(Some(self.clients.len()))?;
        for (key, tools) in &self.clients {
            map.serialize_entry(key, tools)?;
        }
        map.end()
    }
}

// ─── RegistryBuilder ─────────────────────────────────────────────────────────

/// Result of a registry build.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryBuild {
    pub registry: ToolRegistry,
    /// The corrected candidate set; callers should persist this as their
    /// new "known active" record.
    pub active_keys: Vec<String>,
    /// Candidates dropped because no live connection exists for them.
    pub removed_keys: Vec<String>,
    /// Live clients whose tool catalog could not be fetched, with the reason.
    pub failed: Vec<(String, String)>,
}

/// Builds a [`ToolRegistry`] from live connections.
pub struct RegistryBuilder<'a> {
    host: &'a dyn ToolHost,
}

impl<'a> RegistryBuilder<'a> {
    pub fn new(host: &'a dyn ToolHost) -> Self {
        Self { host }
    }

    /// Reconcile `candidates` against the live set and fetch each survivor's
    /// tools.
    ///
    /// A client whose `tools/list` fails stays in `active_keys` (it is still
    /// running) but is left out of the registry.
    pub async fn build(&self, candidates: &[String]) -> RegistryBuild {
        let live: HashSet<String> = self.host.client_keys().into_iter().collect();
        let mut out = RegistryBuild::default();
        let mut seen = HashSet::new();

        for key in candidates {
            if !seen.insert(key.as_str()) {
                continue;
            }
            if !live.contains(key) {
                tracing::info!(client = %key, "dropping stale client from active set");
                out.removed_keys.push(key.clone());
                continue;
            }
            out.active_keys.push(key.clone());

            match self.host.list_tools(key).await {
                Ok(tools) => {
                    tracing::debug!(client = %key, count = tools.len(), "fetched tools");
                    out.registry.insert(key, tools);
                }
                Err(e) => {
                    tracing::warn!(client = %key, error = %e, "failed to fetch tools");
                    out.failed.push((key.clone(), e.to_string()));
                }
            }
        }

        tracing::info!(
            clients = out.registry.clients().len(),
            tools = out.registry.len(),
            removed = out.removed_keys.len(),
            "tool registry built"
        );
        out
    }

    /// Build from every live client, in key order.
    pub async fn build_all(&self) -> RegistryBuild {
        let keys = self.host.client_keys();
        self.build(&keys).await
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
