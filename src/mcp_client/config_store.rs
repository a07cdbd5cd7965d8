//! Persistent tool-server configuration (`mcp.json`).
//!
//! The file is the only durable state of the MCP subsystem. Nothing is cached:
//! every mutation re-reads the document, patches it, and rewrites it whole, so
//! the file is always what a freshly started process will see.

use std::path::{Path, PathBuf};

use super::errors::McpError;
use super::types::{McpConfiguration, ServerDescriptor};

/// File-backed store for [`McpConfiguration`].
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Create a store backed by `path`. The file is created lazily on first load.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the configuration, creating an empty one if the file is missing.
    pub fn load(&self) -> Result<McpConfiguration, McpError> {
        if !self.path.exists() {
            let config = McpConfiguration::default();
            self.save(&config)?;
            tracing::info!(path = %self.path.display(), "created empty MCP configuration");
            return Ok(config);
        }

        let raw = std::fs::read_to_string(&self.path).map_err(|e| self.io_error(e))?;
        let mut config: McpConfiguration =
            serde_json::from_str(&raw).map_err(|e| McpError::ConfigParse {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            })?;

        // The map key is authoritative; hand-edited files may omit or contradict the inner `key`.
        for (key, descriptor) in config.mcp_servers.iter_mut() {
            if !descriptor.key.is_empty() && descriptor.key != *key {
                tracing::warn!(
                    entry = %key,
                    inner_key = %descriptor.key,
                    "descriptor key differs from its entry; using the entry key"
                );
            }
            descriptor.key = key.clone();
        }

        Ok(config)
    }

    /// Overwrite the file with `config`.
    ///
    /// Writes a sibling temp file and renames it over the target, so a crash
    /// mid-write leaves the previous document intact.
    pub fn save(&self, config: &McpConfiguration) -> Result<(), McpError> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).map_err(|e| self.io_error(e))?;
            }
        }

        let mut body = serde_json::to_string_pretty(config).map_err(|e| McpError::ConfigIo {
            path: self.path.display().to_string(),
            reason: format!("failed to serialize: {e}"),
        })?;
        body.push('\n');

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, body).map_err(|e| self.io_error(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))
    }

    /// Insert `descriptor` unless its key is already present.
    ///
    /// Returns `false` on a duplicate key; the existing entry is untouched.
    pub fn add_server(&self, descriptor: ServerDescriptor) -> Result<bool, McpError> {
        require_key(&descriptor)?;
        let mut config = self.load()?;
        if config.mcp_servers.contains_key(&descriptor.key) {
            return Ok(false);
        }
        config
            .mcp_servers
            .insert(descriptor.key.clone(), descriptor);
        self.save(&config)?;
        Ok(true)
    }

    /// Replace the entry for `descriptor.key` if it exists.
    ///
    /// Returns `false` when there is nothing to update.
    pub fn update_server(&self, descriptor: ServerDescriptor) -> Result<bool, McpError> {
        require_key(&descriptor)?;
        let mut config = self.load()?;
        match config.mcp_servers.get_mut(&descriptor.key) {
            Some(slot) => *slot = descriptor,
            None => return Ok(false),
        }
        self.save(&config)?;
        Ok(true)
    }

    /// Insert or replace `descriptor`.
    pub fn upsert_server(&self, descriptor: ServerDescriptor) -> Result<(), McpError> {
        require_key(&descriptor)?;
        let mut config = self.load()?;
        config
            .mcp_servers
            .insert(descriptor.key.clone(), descriptor);
        self.save(&config)
    }

    /// Delete the entry for `key`. Returns whether an entry existed.
    pub fn remove_server(&self, key: &str) -> Result<bool, McpError> {
        let mut config = self.load()?;
        if config.mcp_servers.remove(key).is_none() {
            return Ok(false);
        }
        self.save(&config)?;
        Ok(true)
    }

    /// Look up a single descriptor.
    pub fn get_server(&self, key: &str) -> Result<Option<ServerDescriptor>, McpError> {
        Ok(self.load()?.mcp_servers.remove(key))
    }

    /// Set the `isActive` flag of `key`. Returns `false` if the key is unknown.
    pub fn set_active(&self, key: &str, active: bool) -> Result<bool, McpError> {
        let mut config = self.load()?;
        let Some(descriptor) = config.mcp_servers.get_mut(key) else {
            return Ok(false);
        };
        descriptor.is_active = active;
        self.save(&config)?;
        Ok(true)
    }

    fn io_error(&self, e: std::io::Error) -> McpError {
        McpError::ConfigIo {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        }
    }
}

fn require_key(descriptor: &ServerDescriptor) -> Result<(), McpError> {
    if descriptor.key.trim().is_empty() {
        return Err(McpError::Validation {
            key: String::new(),
            reason: "key is required".into(),
        });
    }
    Ok(())
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(tmp: &TempDir) -> ConfigStore {
        ConfigStore::new(tmp.path().join("nested").join("mcp.json"))
    }

    #[test]
    fn test_load_creates_default_file() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        assert!(!store.path().exists());

        let config = store.load().unwrap();
        assert!(config.mcp_servers.is_empty());
        assert!(store.path().exists());

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw, serde_json::json!({ "mcpServers": {} }));
    }

    #[test]
    fn test_save_of_load_is_noop() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        store.load().unwrap();
        store
            .add_server(ServerDescriptor::new("fs", "npx", &["-y", "server-fs"]))
            .unwrap();

        let before = std::fs::read(store.path()).unwrap();
        store.save(&store.load().unwrap()).unwrap();
        let after = std::fs::read(store.path()).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_add_rejects_duplicate_and_update_replaces() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        let original = ServerDescriptor::new("fs", "npx", &["a"]);
        let mut replacement = ServerDescriptor::new("fs", "node", &["b"]);
        replacement.description = "replacement".into();

        assert!(store.add_server(original.clone()).unwrap());
        assert!(!store.add_server(replacement.clone()).unwrap());
        assert_eq!(store.get_server("fs").unwrap().unwrap(), original);

        assert!(store.update_server(replacement.clone()).unwrap());
        assert_eq!(store.get_server("fs").unwrap().unwrap(), replacement);
    }

    #[test]
    fn test_update_missing_returns_false() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        assert!(!store
            .update_server(ServerDescriptor::new("nope", "npx", &[]))
            .unwrap());
        assert!(store.load().unwrap().mcp_servers.is_empty());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        store.add_server(ServerDescriptor::new("fs", "npx", &[])).unwrap();

        assert!(store.remove_server("fs").unwrap());
        assert!(!store.remove_server("fs").unwrap());
        assert!(!store.remove_server("never-existed").unwrap());
    }

    #[test]
    fn test_add_requires_key() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let err = store
            .add_server(ServerDescriptor::new("  ", "npx", &[]))
            .unwrap_err();
        assert!(matches!(err, McpError::Validation { .. }));
    }

    #[test]
    fn test_set_active() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        store.add_server(ServerDescriptor::new("fs", "npx", &[])).unwrap();

        assert!(store.set_active("fs", true).unwrap());
        assert!(store.get_server("fs").unwrap().unwrap().is_active);
        assert!(!store.set_active("ghost", true).unwrap());
    }

    #[test]
    fn test_load_fills_missing_inner_key() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(
            store.path(),
            r#"{"mcpServers":{"web":{"command":"npx","args":["browser"]}}}"#,
        )
        .unwrap();

        let config = store.load().unwrap();
        assert_eq!(config.mcp_servers["web"].key, "web");
    }

    #[test]
    fn test_load_overrides_mismatched_inner_key() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(
            store.path(),
            r#"{"mcpServers":{"a":{"key":"b","command":"npx"}}}"#,
        )
        .unwrap();

        assert_eq!(store.get_server("a").unwrap().unwrap().key, "a");
        assert!(store.get_server("b").unwrap().is_none());

        // Flag updates stay on the entry they were addressed to.
        assert!(store.set_active("a", true).unwrap());
        let config = store.load().unwrap();
        assert_eq!(config.mcp_servers.keys().collect::<Vec<_>>(), vec!["a"]);
        assert!(config.mcp_servers["a"].is_active);
    }

    #[test]
    fn test_load_malformed_file() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "{ not json").unwrap();

        let err = store.load().unwrap_err();
        assert!(matches!(err, McpError::ConfigParse { .. }));
    }

    #[test]
    fn test_unreadable_path_is_io_error() {
        let tmp = TempDir::new().unwrap();
        // A directory where the file should be cannot be read as a document.
        let path = tmp.path().join("mcp.json");
        std::fs::create_dir_all(&path).unwrap();
        let err = ConfigStore::new(&path).load().unwrap_err();
        assert!(matches!(err, McpError::ConfigIo { .. }));
    }
}
