//! Plan extraction from free-form LLM replies.
//!
//! Models asked for JSON do not reliably return only JSON. Extraction runs a
//! fixed chain of strategies and stops at the first that yields at least one
//! valid invocation:
//! 1. the whole reply as JSON
//! 2. the first fenced code block
//! 3. bracket-delimited arrays in the raw text
//! 4. every brace-delimited object in the raw text
//!
//! Every candidate, whichever strategy found it, must name a client and tool
//! known to the [`PlanValidator`]. Anything else is dropped.

use std::collections::{HashMap, HashSet};

use crate::mcp_client::registry::ToolRegistry;

use super::types::{ResolutionPlan, ResolvedInvocation};

// ─── Validation ─────────────────────────────────────────────────────────────

/// The set of invocations a plan may contain.
#[derive(Debug, Clone, Default)]
pub struct PlanValidator {
    clients: HashSet<String>,
    tools: HashSet<String>,
    /// When present, a tool must be offered by the named client itself.
    per_client: Option<HashMap<String, HashSet<String>>>,
}

impl PlanValidator {
    /// Flat validation: any known client with any known tool.
    pub fn new<C, T>(clients: C, tools: T) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        Self {
            clients: clients.into_iter().map(Into::into).collect(),
            tools: tools.into_iter().map(Into::into).collect(),
            per_client: None,
        }
    }

    /// Per-client validation against a built registry.
    pub fn from_registry(registry: &ToolRegistry) -> Self {
        let mut per_client: HashMap<String, HashSet<String>> = HashMap::new();
        for (client, tool) in registry.iter() {
            per_client
                .entry(client.to_string())
                .or_default()
                .insert(tool.name.clone());
        }
        Self {
            clients: registry.clients().into_iter().map(str::to_string).collect(),
            tools: registry.tool_names().into_iter().map(str::to_string).collect(),
            per_client: Some(per_client),
        }
    }

    /// Whether `inv` may be executed.
    pub fn accepts(&self, inv: &ResolvedInvocation) -> bool {
        if !self.clients.contains(&inv.client) || !self.tools.contains(&inv.tool_name) {
            return false;
        }
        match &self.per_client {
            Some(map) => map
                .get(&inv.client)
                .is_some_and(|tools| tools.contains(&inv.tool_name)),
            None => true,
        }
    }

    fn keep(&self, inv: ResolvedInvocation) -> Option<ResolvedInvocation> {
        if self.accepts(&inv) {
            Some(inv)
        } else {
            tracing::info!(
                client = %inv.client,
                tool = %inv.tool_name,
                "discarding invocation outside the tool registry"
            );
            None
        }
    }
}

// ─── Extraction Chain ───────────────────────────────────────────────────────

type Strategy = fn(&str, &PlanValidator) -> Option<Vec<ResolvedInvocation>>;

const STRATEGIES: [(&str, Strategy); 4] = [
    ("direct", parse_direct),
    ("fenced", parse_fenced),
    ("bracket", parse_bracket_arrays),
    ("brace", parse_brace_objects),
];

/// Extract a validated plan from `text`, or `None` if nothing qualifies.
pub fn extract_plan(text: &str, validator: &PlanValidator) -> Option<ResolutionPlan> {
    for (name, strategy) in STRATEGIES {
        if let Some(steps) = strategy(text, validator) {
            tracing::debug!(strategy = name, steps = steps.len(), "extracted plan");
            return ResolutionPlan::from_steps(steps);
        }
    }
    tracing::debug!(reply_len = text.len(), "no plan in LLM reply");
    None
}

/// Strategy 1: the entire trimmed reply.
fn parse_direct(text: &str, validator: &PlanValidator) -> Option<Vec<ResolvedInvocation>> {
    parse_candidates(text.trim(), validator)
}

/// Strategy 2: the first triple-backtick block, with an optional tag.
fn parse_fenced(text: &str, validator: &PlanValidator) -> Option<Vec<ResolvedInvocation>> {
    parse_candidates(first_fenced_block(text)?, validator)
}

/// Strategy 3: top-level `[...]` spans, first valid one wins.
fn parse_bracket_arrays(text: &str, validator: &PlanValidator) -> Option<Vec<ResolvedInvocation>> {
    let mut from = 0;
    while let Some(offset) = text[from..].find('[') {
        let open = from + offset;
        let Some(close) = matching_close(text, open) else {
            from = open + 1;
            continue;
        };
        if let Some(steps) = parse_candidates(&text[open..=close], validator) {
            return Some(steps);
        }
        from = close + 1;
    }
    None
}

/// Strategy 4: every `{...}` span that parses to a valid invocation.
///
/// Spans that do not parse are re-scanned from the next character, so an
/// invocation wrapped in some other object is still found.
fn parse_brace_objects(text: &str, validator: &PlanValidator) -> Option<Vec<ResolvedInvocation>> {
    let mut steps = Vec::new();
    let mut from = 0;
    while let Some(offset) = text[from..].find('{') {
        let open = from + offset;
        let found = matching_close(text, open).and_then(|close| {
            let value = serde_json::from_str::<serde_json::Value>(&text[open..=close]).ok()?;
            let inv = invocation_from_value(&value)?;
            Some((close, inv))
        });
        match found {
            Some((close, inv)) => {
                steps.extend(validator.keep(inv));
                from = close + 1;
            }
            None => from = open + 1,
        }
    }
    (!steps.is_empty()).then_some(steps)
}

// ─── Candidate Parsing ──────────────────────────────────────────────────────

/// Parse `text` as one invocation object or an array of them.
fn parse_candidates(text: &str, validator: &PlanValidator) -> Option<Vec<ResolvedInvocation>> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    let steps: Vec<ResolvedInvocation> = match &value {
        serde_json::Value::Array(items) => items
            .iter()
            .filter_map(invocation_from_value)
            .filter_map(|inv| validator.keep(inv))
            .collect(),
        serde_json::Value::Object(_) => invocation_from_value(&value)
            .and_then(|inv| validator.keep(inv))
            .into_iter()
            .collect(),
        _ => return None,
    };
    (!steps.is_empty()).then_some(steps)
}

/// An object with string `client`, string `toolName`, and object `args`.
fn invocation_from_value(value: &serde_json::Value) -> Option<ResolvedInvocation> {
    let obj = value.as_object()?;
    let client = obj.get("client")?.as_str()?;
    let tool_name = obj.get("toolName")?.as_str()?;
    let args = obj.get("args")?.as_object()?;
    Some(ResolvedInvocation {
        client: client.to_string(),
        tool_name: tool_name.to_string(),
        args: args.clone(),
    })
}

// ─── Text Scanning ──────────────────────────────────────────────────────────

/// Contents of the first ```` ``` ```` fenced block, minus any language tag.
fn first_fenced_block(text: &str) -> Option<&str> {
    const FENCE: &str = "```";
    let start = text.find(FENCE)? + FENCE.len();
    let rest = &text[start..];
    let tag_len = rest
        .bytes()
        .take_while(|b| b.is_ascii_alphanumeric())
        .count();
    let body = &rest[tag_len..];
    let end = body.find(FENCE)?;
    Some(body[..end].trim())
}

/// Index of the bracket closing the `{` or `[` at `open`.
///
/// Only brackets of the same kind are counted; brackets inside JSON string
/// literals are ignored.
fn matching_close(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let (open_ch, close_ch) = match bytes.get(open)? {
        b'{' => (b'{', b'}'),
        b'[' => (b'[', b']'),
        _ => return None,
    };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        if b == b'"' {
            in_string = true;
        } else if b == open_ch {
            depth += 1;
        } else if b == close_ch {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

// ─── Tests ──────────────────────────────────────────────────────────────────
