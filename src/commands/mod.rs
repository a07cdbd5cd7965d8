//! Request/response commands exposed to the UI process.
//!
//! Each request is one JSON object tagged by `op`, e.g.
//! `{"op": "activate", "target": "filesystem"}`. Each reply is
//! `{"status": "ok", "data": ...}` or
//! `{"status": "error", "kind": ..., "message": ...}`.
//!
//! "No plan found" is not an error: `resolve` and `run` answer
//! `status: ok` with `noPlan: true` so the UI can fall back to plain chat.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use crate::agent_core::{ExecutionEngine, Resolution, RequestRouter};
use crate::inference::config::{load_settings, load_settings_raw, save_settings, settings_path};
use crate::inference::{InferenceClient, InferenceError, LlmSettings, LlmTransport};
use crate::mcp_client::{
    ActivationTarget, ConfigStore, McpError, ProcessSupervisor, RegistryBuild, RegistryBuilder,
    ServerDescriptor, ToolCallRequest, ToolHost,
};

/// Tool-server configuration file inside the data directory.
pub const MCP_CONFIG_FILE: &str = "mcp.json";

// ─── Wire Types ──────────────────────────────────────────────────────────────

/// One UI request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Request {
    AddServer {
        descriptor: ServerDescriptor,
    },
    UpdateServer {
        descriptor: ServerDescriptor,
    },
    GetConfig,
    Activate {
        target: ActivationTarget,
    },
    Deactivate {
        key: String,
    },
    RemoveServer {
        key: String,
    },
    ListTools {
        key: String,
    },
    CallTool {
        client: String,
        name: String,
        #[serde(default)]
        args: serde_json::Map<String, Value>,
    },
    GetClientKeys,
    /// Rebuild the registry; `knownActive` defaults to every live client.
    #[serde(rename_all = "camelCase")]
    BuildRegistry {
        #[serde(default)]
        known_active: Option<Vec<String>>,
    },
    #[serde(rename_all = "camelCase")]
    Resolve {
        prompt: String,
        #[serde(default)]
        known_active: Option<Vec<String>>,
    },
    /// Resolve, then execute the plan.
    #[serde(rename_all = "camelCase")]
    Run {
        prompt: String,
        #[serde(default)]
        known_active: Option<Vec<String>>,
    },
    GetSettings,
    SaveSettings {
        settings: LlmSettings,
    },
}

impl Request {
    /// The `op` name, for logging.
    pub fn op(&self) -> &'static str {
        match self {
            Request::AddServer { .. } => "addServer",
            Request::UpdateServer { .. } => "updateServer",
            Request::GetConfig => "getConfig",
            Request::Activate { .. } => "activate",
            Request::Deactivate { .. } => "deactivate",
            Request::RemoveServer { .. } => "removeServer",
            Request::ListTools { .. } => "listTools",
            Request::CallTool { .. } => "callTool",
            Request::GetClientKeys => "getClientKeys",
            Request::BuildRegistry { .. } => "buildRegistry",
            Request::Resolve { .. } => "resolve",
            Request::Run { .. } => "run",
            Request::GetSettings => "getSettings",
            Request::SaveSettings { .. } => "saveSettings",
        }
    }
}

/// One reply. `id` echoes the request's `id`, if it had one.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Response {
    Ok {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<Value>,
        data: Value,
    },
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<Value>,
        kind: String,
        message: String,
    },
}

impl Response {
    pub fn ok(data: Value) -> Self {
        Response::Ok { id: None, data }
    }

    pub fn error(err: &CommandError) -> Self {
        Response::Error {
            id: None,
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }

    /// Attach the request id.
    pub fn with_id(self, request_id: Option<Value>) -> Self {
        match self {
            Response::Ok { data, .. } => Response::Ok {
                id: request_id,
                data,
            },
            Response::Error { kind, message, .. } => Response::Error {
                id: request_id,
                kind,
                message,
            },
        }
    }
}

/// Parse one request line into its optional `id` and the request.
pub fn parse_request(line: &str) -> (Option<Value>, Result<Request, CommandError>) {
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => return (None, Err(CommandError::BadRequest(format!("invalid JSON: {e}")))),
    };
    let id = value.get("id").cloned();
    let request = serde_json::from_value(value)
        .map_err(|e| CommandError::BadRequest(format!("invalid request: {e}")));
    (id, request)
}

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Errors surfaced at the command boundary.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Mcp(#[from] McpError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl CommandError {
    /// Stable machine-readable category.
    pub fn kind(&self) -> &'static str {
        match self {
            CommandError::Mcp(e) => e.kind(),
            CommandError::Inference(_) => "inference",
            CommandError::BadRequest(_) => "badRequest",
        }
    }
}

// ─── CommandHandler ──────────────────────────────────────────────────────────

/// Owns the long-lived supervisor and LLM client and serves requests.
pub struct CommandHandler {
    supervisor: Mutex<ProcessSupervisor>,
    llm: RwLock<Option<Arc<dyn LlmTransport>>>,
    engine: ExecutionEngine,
    settings_path: PathBuf,
}

impl CommandHandler {
    /// Create a handler persisting under `data_dir`.
    ///
    /// Unreadable LLM settings are logged and treated as "no LLM".
    pub fn new(data_dir: &Path) -> Self {
        let settings_path = settings_path(data_dir);
        let llm = match load_llm(&settings_path) {
            Ok(llm) => llm,
            Err(e) => {
                tracing::warn!(error = %e, "LLM settings unusable; LLM resolution disabled");
                None
            }
        };

        Self {
            supervisor: Mutex::new(ProcessSupervisor::new(ConfigStore::new(
                data_dir.join(MCP_CONFIG_FILE),
            ))),
            llm: RwLock::new(llm),
            engine: ExecutionEngine::new(),
            settings_path,
        }
    }

    /// Replace the LLM collaborator.
    pub fn with_llm(self, llm: Arc<dyn LlmTransport>) -> Self {
        Self {
            llm: RwLock::new(Some(llm)),
            ..self
        }
    }

    /// Replace the execution engine.
    pub fn with_engine(self, engine: ExecutionEngine) -> Self {
        Self { engine, ..self }
    }

    /// Run the supervisor's init hook and restore active servers.
    ///
    /// Returns the servers that failed to come back.
    pub async fn startup(&self) -> Result<Vec<(String, McpError)>, McpError> {
        let mut supervisor = self.supervisor.lock().await;
        supervisor.init().await?;
        supervisor.load().await
    }

    /// Close every live connection.
    pub async fn shutdown(&self) {
        self.supervisor.lock().await.shutdown_all().await;
    }

    /// Serve one request.
    pub async fn dispatch(&self, request: Request) -> Response {
        let op = request.op();
        match self.handle(request).await {
            Ok(data) => Response::ok(data),
            Err(e) => {
                tracing::warn!(op, kind = e.kind(), error = %e, "command failed");
                Response::error(&e)
            }
        }
    }

    /// Serve one request, returning its `data` payload.
    pub async fn handle(&self, request: Request) -> Result<Value, CommandError> {
        tracing::debug!(op = request.op(), "handling command");
        match request {
            Request::AddServer { descriptor } => {
                let inserted = self.supervisor.lock().await.add_server(descriptor)?;
                Ok(json!(inserted))
            }
            Request::UpdateServer { descriptor } => {
                let updated = self.supervisor.lock().await.update_server(descriptor)?;
                Ok(json!(updated))
            }
            Request::GetConfig => {
                let config = self.supervisor.lock().await.get_config()?;
                Ok(to_json(&config))
            }
            Request::Activate { target } => {
                let message = self.supervisor.lock().await.activate(target).await?;
                Ok(json!(message))
            }
            Request::Deactivate { key } => {
                self.supervisor.lock().await.deactivate(&key).await?;
                Ok(Value::Null)
            }
            Request::RemoveServer { key } => {
                let removed = self.supervisor.lock().await.remove_server(&key).await?;
                Ok(json!(removed))
            }
            Request::ListTools { key } => {
                let tools = self.supervisor.lock().await.list_tools(&key).await?;
                Ok(to_json(&tools))
            }
            Request::CallTool { client, name, args } => {
                let call = ToolCallRequest { client, name, args };
                let result = self.supervisor.lock().await.call_tool(&call).await?;
                Ok(result)
            }
            Request::GetClientKeys => Ok(json!(self.supervisor.lock().await.client_keys())),
            Request::BuildRegistry { known_active } => {
                let build = self.build_registry(known_active).await;
                Ok(to_json(&build))
            }
            Request::Resolve {
                prompt,
                known_active,
            } => {
                let build = self.build_registry(known_active).await;
                let resolution = self.route(&build, &prompt).await;
                Ok(json!({
                    "noPlan": resolution.is_none(),
                    "resolution": resolution,
                    "activeKeys": build.active_keys,
                    "removedKeys": build.removed_keys,
                }))
            }
            Request::Run {
                prompt,
                known_active,
            } => self.run(&prompt, known_active).await,
            Request::GetSettings => {
                let settings = load_settings_raw(&self.settings_path)?;
                Ok(to_json(&settings))
            }
            Request::SaveSettings { settings } => {
                save_settings(&self.settings_path, &settings)?;
                let llm = load_llm(&self.settings_path)?;
                *self.llm.write().await = llm;
                Ok(json!(true))
            }
        }
    }

    async fn build_registry(&self, known_active: Option<Vec<String>>) -> RegistryBuild {
        let supervisor = self.supervisor.lock().await;
        let host: &dyn ToolHost = &*supervisor;
        let builder = RegistryBuilder::new(host);
        match known_active {
            Some(keys) => builder.build(&keys).await,
            None => builder.build_all().await,
        }
    }

    async fn route(&self, build: &RegistryBuild, prompt: &str) -> Option<Resolution> {
        let llm = self.llm.read().await.clone();
        let router = RequestRouter::new(&build.registry);
        match llm.as_deref() {
            Some(llm) => router.with_llm(llm).route(prompt).await,
            None => router.route(prompt).await,
        }
    }

    async fn run(
        &self,
        prompt: &str,
        known_active: Option<Vec<String>>,
    ) -> Result<Value, CommandError> {
        let build = self.build_registry(known_active).await;
        let Some(resolution) = self.route(&build, prompt).await else {
            return Ok(json!({
                "noPlan": true,
                "activeKeys": build.active_keys,
                "removedKeys": build.removed_keys,
            }));
        };

        let supervisor = self.supervisor.lock().await;
        let report = self.engine.execute(&*supervisor, &resolution.plan).await?;
        Ok(json!({
            "noPlan": false,
            "resolution": resolution,
            "report": report,
            "activeKeys": build.active_keys,
            "removedKeys": build.removed_keys,
        }))
    }
}

/// Build an LLM client from the settings file, if one exists.
fn load_llm(path: &Path) -> Result<Option<Arc<dyn LlmTransport>>, InferenceError> {
    let Some(settings) = load_settings(path)? else {
        tracing::info!(path = %path.display(), "no LLM settings; LLM resolution disabled");
        return Ok(None);
    };
    tracing::info!(
        provider = settings.provider.as_str(),
        model = %settings.model_name,
        "LLM configured"
    );
    let client: Arc<dyn LlmTransport> = Arc::new(InferenceClient::new(settings)?);
    Ok(Some(client))
}

/// Serialize a response payload. Our payload types always serialize.
fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
