//! RequestRouter: turns a free-text request into a resolution plan.
//!
//! Two tiers, cheapest first:
//! - **Keyword**: a tool's name or description appears verbatim in the
//!   request. First hit in registry order wins; the LLM is not consulted.
//! - **LLM**: the model is shown the valid clients and tools and asked for
//!   one invocation object or an array of them. The reply is run through
//!   [`plan_parser::extract_plan`](super::plan_parser::extract_plan).
//!
//! Neither tier is an error source. A failed LLM call or an unusable reply
//! is logged and reported as "no plan", which callers treat as plain chat.

use crate::inference::LlmTransport;
use crate::mcp_client::registry::ToolRegistry;
use crate::mcp_client::types::McpToolDefinition;

use super::arguments::backfill_args;
use super::plan_parser::{extract_plan, PlanValidator};
use super::types::{Resolution, ResolutionPlan, ResolutionTier, ResolvedInvocation};

// ─── Prompt ─────────────────────────────────────────────────────────────────

/// System instruction for LLM resolution.
pub const RESOLUTION_SYSTEM_PROMPT: &str = "\
You translate a user's request into tool calls.
Reply with JSON only, no commentary.
For a single action reply with one object:
{\"client\": \"<client key>\", \"toolName\": \"<tool name>\", \"args\": { ... }}
For several actions reply with a JSON array of such objects, in the order they must run.
Use only the clients and tools listed. If no tool fits the request, reply with [].";

/// Build the user message: valid clients, valid tools, then the request.
pub fn build_resolution_prompt(registry: &ToolRegistry, request: &str) -> String {
    let shared = registry.shared_tool_names();
    if !shared.is_empty() {
        tracing::warn!(
            tools = ?shared,
            "tool names offered by several clients; the prompt does not qualify them"
        );
    }

    let mut prompt = String::new();
    prompt.push_str("Valid clients: ");
    prompt.push_str(&registry.clients().join(", "));
    prompt.push_str("\nValid tools: ");
    prompt.push_str(&registry.tool_names().join(", "));
    prompt.push_str("\n\nTools by client:\n");
    for client in registry.clients() {
        for tool in registry.tools_for(client).unwrap_or_default() {
            prompt.push_str(&format!("- {client} / {}", tool.name));
            if !tool.description.is_empty() {
                prompt.push_str(&format!(": {}", tool.description));
            }
            let params = tool.parameter_names();
            if !params.is_empty() {
                prompt.push_str(&format!(" (args: {})", params.join(", ")));
            }
            prompt.push('\n');
        }
    }
    prompt.push_str("\nUser request: ");
    prompt.push_str(request);
    prompt
}

// ─── Tier 1 ─────────────────────────────────────────────────────────────────

/// A keyword hit: the tool and the client offering it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeywordMatch<'r> {
    pub client: &'r str,
    pub tool: &'r McpToolDefinition,
}

/// First `(client, tool)` whose name or description occurs in `request`,
/// case-insensitively. Empty names and descriptions never match.
pub fn match_keyword<'r>(registry: &'r ToolRegistry, request: &str) -> Option<KeywordMatch<'r>> {
    let request = request.to_lowercase();
    registry
        .iter()
        .find(|(_, tool)| {
            contains_nonempty(&request, &tool.name) || contains_nonempty(&request, &tool.description)
        })
        .map(|(client, tool)| KeywordMatch { client, tool })
}

fn contains_nonempty(haystack: &str, needle: &str) -> bool {
    let needle = needle.trim();
    !needle.is_empty() && haystack.contains(&needle.to_lowercase())
}

// ─── Tier 2 ─────────────────────────────────────────────────────────────────

/// Ask the LLM for a plan. `None` on any failure.
pub async fn resolve_with_llm(
    llm: &dyn LlmTransport,
    registry: &ToolRegistry,
    request: &str,
) -> Option<ResolutionPlan> {
    if registry.is_empty() {
        tracing::debug!("no tools registered; skipping LLM resolution");
        return None;
    }

    let prompt = build_resolution_prompt(registry, request);
    let reply = match llm.complete(RESOLUTION_SYSTEM_PROMPT, &prompt).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!(error = %e, "LLM resolution failed");
            return None;
        }
    };

    let plan = extract_plan(&reply, &PlanValidator::from_registry(registry));
    if plan.is_none() {
        tracing::info!(reply_len = reply.len(), "LLM reply contained no usable plan");
    }
    plan
}

// ─── RequestRouter ──────────────────────────────────────────────────────────

/// Routes requests against one registry snapshot.
pub struct RequestRouter<'a> {
    registry: &'a ToolRegistry,
    llm: Option<&'a dyn LlmTransport>,
}

impl<'a> RequestRouter<'a> {
    /// A keyword-only router.
    pub fn new(registry: &'a ToolRegistry) -> Self {
        Self {
            registry,
            llm: None,
        }
    }

    /// Enable the LLM tier.
    pub fn with_llm(mut self, llm: &'a dyn LlmTransport) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Resolve `request`, or `None` when no plan applies.
    pub async fn route(&self, request: &str) -> Option<Resolution> {
        let request = request.trim();
        if request.is_empty() {
            return None;
        }

        if let Some(hit) = match_keyword(self.registry, request) {
            tracing::info!(client = hit.client, tool = %hit.tool.name, "keyword match");
            let mut invocation = ResolvedInvocation::new(hit.client, &hit.tool.name);
            backfill_args(&mut invocation.args, request, &hit.tool.input_schema);
            return Some(Resolution {
                tier: ResolutionTier::Keyword,
                plan: ResolutionPlan::Single { invocation },
            });
        }

        let Some(llm) = self.llm else {
            tracing::debug!("no keyword match and no LLM configured");
            return None;
        };

        let mut plan = resolve_with_llm(llm, self.registry, request).await?;
        for invocation in plan.invocations_mut() {
            if let Some(tool) = self.registry.get_tool(&invocation.client, &invocation.tool_name) {
                backfill_args(&mut invocation.args, request, &tool.input_schema);
            }
        }
        tracing::info!(steps = plan.len(), "LLM resolution produced a plan");
        Some(Resolution {
            tier: ResolutionTier::Llm,
            plan,
        })
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::InferenceError;
    use crate::mcp_client::testing::tool;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replies with a fixed string and records every prompt.
    struct ScriptedLlm {
        reply: Result<String, ()>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        fn replying(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                reply: Err(()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LlmTransport for ScriptedLlm {
        async fn complete(&self, _system: &str, user: &str) -> Result<String, InferenceError> {
            self.prompts.lock().unwrap().push(user.to_string());
            self.reply.clone().map_err(|_| InferenceError::Timeout { duration_secs: 1 })
        }
    }

    fn registry() -> ToolRegistry {
        let mut reg = ToolRegistry::new();
        reg.insert("fs", vec![tool("read_file", "Read a file from disk", &["path"])]);
        reg.insert(
            "browser",
            vec![
                tool("navigate", "Open a web page", &["url"]),
                tool("click", "Click an element", &["selector"]),
            ],
        );
        reg
    }

    #[tokio::test]
    async fn test_keyword_match_skips_llm() {
        let reg = registry();
        let llm = ScriptedLlm::replying("[]");
        let resolution = RequestRouter::new(&reg)
            .with_llm(&llm)
            .route("please read_file now")
            .await
            .unwrap();

        assert_eq!(resolution.tier, ResolutionTier::Keyword);
        assert_eq!(
            resolution.plan,
            ResolutionPlan::Single {
                invocation: ResolvedInvocation::new("fs", "read_file"),
            }
        );
        assert_eq!(llm.calls(), 0);
    }

    #[test]
    fn test_keyword_match_returns_client_and_tool() {
        let reg = registry();
        let hit = match_keyword(&reg, "please read_file now").unwrap();
        assert_eq!(hit.client, "fs");
        assert_eq!(hit.tool.name, "read_file");
    }

    #[test]
    fn test_keyword_match_on_description_and_order() {
        let reg = registry();
        let hit = match_keyword(&reg, "Could you OPEN A WEB PAGE and click an element?").unwrap();
        // navigate precedes click in registry order.
        assert_eq!(hit.tool.name, "navigate");
        assert!(match_keyword(&reg, "what's the weather").is_none());
    }

    #[test]
    fn test_empty_description_never_matches() {
        let mut reg = ToolRegistry::new();
        reg.insert("x", vec![tool("zz_tool", "", &[])]);
        assert!(match_keyword(&reg, "anything at all").is_none());
    }

    #[tokio::test]
    async fn test_keyword_match_backfills_args() {
        let reg = registry();
        let resolution = RequestRouter::new(&reg)
            .route("read_file path: /tmp/x.txt")
            .await
            .unwrap();
        let inv = &resolution.plan.invocations()[0];
        assert_eq!(inv.args["path"], "/tmp/x.txt");
    }

    #[tokio::test]
    async fn test_llm_multi_step_plan() {
        let reg = registry();
        let llm = ScriptedLlm::replying(
            "```json\n[{\"client\":\"browser\",\"toolName\":\"navigate\",\"args\":{\"url\":\"https://example.com\"}},\
             {\"client\":\"browser\",\"toolName\":\"click\",\"args\":{}}]\n```",
        );
        let resolution = RequestRouter::new(&reg)
            .with_llm(&llm)
            .route("go to example dot com then press the login button selector=#login")
            .await
            .unwrap();

        assert_eq!(resolution.tier, ResolutionTier::Llm);
        let steps = resolution.plan.invocations();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].args["url"], "https://example.com");
        assert_eq!(steps[1].args["selector"], "#login");

        let prompts = llm.prompts.lock().unwrap();
        assert!(prompts[0].contains("Valid clients: fs, browser"));
        assert!(prompts[0].contains("Valid tools: read_file, navigate, click"));
        assert!(prompts[0].ends_with("selector=#login"));
    }

    #[tokio::test]
    async fn test_llm_hallucinated_tool_is_dropped() {
        let reg = registry();
        let llm = ScriptedLlm::replying(r#"{"client":"fs","toolName":"delete_everything","args":{}}"#);
        let resolution = RequestRouter::new(&reg)
            .with_llm(&llm)
            .route("tidy up my disk")
            .await;
        assert!(resolution.is_none());
    }

    #[tokio::test]
    async fn test_llm_tool_on_wrong_client_is_dropped() {
        let reg = registry();
        let llm = ScriptedLlm::replying(r#"{"client":"browser","toolName":"read_file","args":{}}"#);
        assert!(RequestRouter::new(&reg).with_llm(&llm).route("show me notes").await.is_none());
    }

    #[tokio::test]
    async fn test_llm_failure_is_no_plan() {
        let reg = registry();
        let llm = ScriptedLlm::failing();
        assert!(RequestRouter::new(&reg).with_llm(&llm).route("hello there").await.is_none());
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_no_llm_and_no_keyword_is_no_plan() {
        let reg = registry();
        assert!(RequestRouter::new(&reg).route("hello there").await.is_none());
        assert!(RequestRouter::new(&reg).route("   ").await.is_none());
    }

    #[tokio::test]
    async fn test_empty_registry_skips_llm() {
        let reg = ToolRegistry::new();
        let llm = ScriptedLlm::replying("[]");
        assert!(RequestRouter::new(&reg).with_llm(&llm).route("hello").await.is_none());
        assert_eq!(llm.calls(), 0);
    }

    #[test]
    fn test_prompt_lists_shared_names_once() {
        let mut reg = registry();
        reg.insert("backup", vec![tool("read_file", "Read a backup", &["path"])]);
        let prompt = build_resolution_prompt(&reg, "x");
        assert!(prompt.contains("Valid tools: read_file, navigate, click\n"));
        assert!(prompt.contains("- backup / read_file: Read a backup (args: path)"));
    }
}
