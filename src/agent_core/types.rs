//! Shared types for the agent core.
//!
//! Resolved invocations and plans produced by the request router, and the
//! per-step outcomes produced by the execution engine.

use serde::{Deserialize, Serialize};

use crate::mcp_client::types::ToolCallRequest;

// ─── Invocations ────────────────────────────────────────────────────────────

/// One tool call resolved from a user request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedInvocation {
    /// Key of the client that offers the tool.
    pub client: String,
    pub tool_name: String,
    #[serde(default)]
    pub args: serde_json::Map<String, serde_json::Value>,
}

impl ResolvedInvocation {
    pub fn new(client: &str, tool_name: &str) -> Self {
        Self {
            client: client.to_string(),
            tool_name: tool_name.to_string(),
            args: serde_json::Map::new(),
        }
    }

    /// The supervisor-level call for this invocation.
    pub fn to_call(&self) -> ToolCallRequest {
        ToolCallRequest {
            client: self.client.clone(),
            name: self.tool_name.clone(),
            args: self.args.clone(),
        }
    }
}

/// What to run for one request: a single call, or an ordered sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum ResolutionPlan {
    Single { invocation: ResolvedInvocation },
    Multi { steps: Vec<ResolvedInvocation> },
}

impl ResolutionPlan {
    /// Build a plan from extracted steps. A lone step is a single-mode plan;
    /// no steps is no plan.
    pub fn from_steps(mut steps: Vec<ResolvedInvocation>) -> Option<Self> {
        match steps.len() {
            0 => None,
            1 => steps.pop().map(|invocation| ResolutionPlan::Single { invocation }),
            _ => Some(ResolutionPlan::Multi { steps }),
        }
    }

    /// Invocations in execution order.
    pub fn invocations(&self) -> &[ResolvedInvocation] {
        match self {
            ResolutionPlan::Single { invocation } => std::slice::from_ref(invocation),
            ResolutionPlan::Multi { steps } => steps,
        }
    }

    pub fn invocations_mut(&mut self) -> &mut [ResolvedInvocation] {
        match self {
            ResolutionPlan::Single { invocation } => std::slice::from_mut(invocation),
            ResolutionPlan::Multi { steps } => steps,
        }
    }

    pub fn len(&self) -> usize {
        self.invocations().len()
    }

    pub fn is_empty(&self) -> bool {
        self.invocations().is_empty()
    }
}

/// Which tier produced a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ResolutionTier {
    /// Tool name or description found verbatim in the request.
    Keyword,
    /// Extracted from an LLM reply.
    Llm,
}

/// A routed request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub tier: ResolutionTier,
    pub plan: ResolutionPlan,
}

// ─── Execution ──────────────────────────────────────────────────────────────

/// Outcome of one executed step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutcome {
    /// Zero-based position in the plan.
    pub index: usize,
    pub success: bool,
    pub client: String,
    pub tool_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub execution_time_ms: u64,
}

/// All step outcomes of a plan, in plan order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub steps: Vec<StepOutcome>,
    pub succeeded: usize,
    pub total: usize,
    /// e.g. `"1/2 steps succeeded"`.
    pub summary: String,
}

impl ExecutionReport {
    pub fn from_steps(steps: Vec<StepOutcome>) -> Self {
        let succeeded = steps.iter().filter(|s| s.success).count();
        let total = steps.len();
        Self {
            steps,
            succeeded,
            total,
            summary: format!("{succeeded}/{total} steps succeeded"),
        }
    }

    /// Whether every step succeeded.
    pub fn all_succeeded(&self) -> bool {
        self.succeeded == self.total
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_steps_normalises_mode() {
        assert!(ResolutionPlan::from_steps(vec![]).is_none());

        let single = ResolutionPlan::from_steps(vec![ResolvedInvocation::new("a", "t1")]).unwrap();
        assert!(matches!(single, ResolutionPlan::Single { .. }));
        assert_eq!(single.len(), 1);

        let multi = ResolutionPlan::from_steps(vec![
            ResolvedInvocation::new("a", "t1"),
            ResolvedInvocation::new("a", "t2"),
        ])
        .unwrap();
        assert_eq!(multi.invocations()[1].tool_name, "t2");
    }

    #[test]
    fn test_plan_serialization() {
        let plan = ResolutionPlan::Single {
            invocation: ResolvedInvocation::new("fs", "read_file"),
        };
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["mode"], "single");
        assert_eq!(json["invocation"]["toolName"], "read_file");
    }

    #[test]
    fn test_invocation_accepts_missing_args() {
        let inv: ResolvedInvocation =
            serde_json::from_str(r#"{"client":"fs","toolName":"read_file"}"#).unwrap();
        assert!(inv.args.is_empty());
        assert_eq!(inv.to_call().name, "read_file");
    }

    #[test]
    fn test_report_summary() {
        let step = |index, success| StepOutcome {
            index,
            success,
            client: "a".into(),
            tool_name: "t".into(),
            result: None,
            error: None,
            execution_time_ms: 0,
        };
        let report = ExecutionReport::from_steps(vec![step(0, false), step(1, true)]);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.total, 2);
        assert_eq!(report.summary, "1/2 steps succeeded");
        assert!(!report.all_succeeded());

        let json = serde_json::to_value(&report).unwrap();
        assert!(json["steps"][0].get("executionTimeMs").is_some());
        assert!(json["steps"][0].get("error").is_none());
    }
}
