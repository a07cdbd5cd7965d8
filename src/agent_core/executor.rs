//! Execution engine: runs resolved invocations against live tool servers.
//!
//! Steps run strictly one at a time, in plan order. A failed step in a
//! multi-step plan is recorded and the next step still runs; a failed
//! single invocation is returned as an error.

use std::time::{Duration, Instant};

use crate::mcp_client::errors::McpError;
use crate::mcp_client::supervisor::ToolHost;

use super::types::{ExecutionReport, ResolutionPlan, ResolvedInvocation, StepOutcome};

/// Pause between successive steps, for servers whose side effects settle
/// asynchronously (browser automation, for instance).
pub const DEFAULT_STEP_DELAY: Duration = Duration::from_millis(500);

/// Sequential executor for resolution plans.
#[derive(Debug, Clone)]
pub struct ExecutionEngine {
    step_delay: Duration,
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self {
            step_delay: DEFAULT_STEP_DELAY,
        }
    }
}

impl ExecutionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the inter-step delay.
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    /// Call one tool; the result is returned verbatim. No retry.
    pub async fn execute_single(
        &self,
        host: &dyn ToolHost,
        invocation: &ResolvedInvocation,
    ) -> Result<serde_json::Value, McpError> {
        host.call_tool(&invocation.to_call()).await
    }

    /// Run every step in order, recording each outcome.
    pub async fn execute_plan(
        &self,
        host: &dyn ToolHost,
        steps: &[ResolvedInvocation],
    ) -> ExecutionReport {
        let mut outcomes = Vec::with_capacity(steps.len());

        for (index, invocation) in steps.iter().enumerate() {
            if index > 0 && !self.step_delay.is_zero() {
                tokio::time::sleep(self.step_delay).await;
            }

            let start = Instant::now();
            let result = self.execute_single(host, invocation).await;
            let execution_time_ms = start.elapsed().as_millis() as u64;

            let outcome = match result {
                Ok(value) => {
                    tracing::info!(
                        step = index,
                        client = %invocation.client,
                        tool = %invocation.tool_name,
                        execution_time_ms,
                        "step succeeded"
                    );
                    StepOutcome {
                        index,
                        success: true,
                        client: invocation.client.clone(),
                        tool_name: invocation.tool_name.clone(),
                        result: Some(value),
                        error: None,
                        execution_time_ms,
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        step = index,
                        client = %invocation.client,
                        tool = %invocation.tool_name,
                        error = %e,
                        "step failed; continuing"
                    );
                    StepOutcome {
                        index,
                        success: false,
                        client: invocation.client.clone(),
                        tool_name: invocation.tool_name.clone(),
                        result: None,
                        error: Some(e.to_string()),
                        execution_time_ms,
                    }
                }
            };
            outcomes.push(outcome);
        }

        let report = ExecutionReport::from_steps(outcomes);
        tracing::info!(summary = %report.summary, "plan finished");
        report
    }

    /// Execute a plan in the mode it was resolved in.
    ///
    /// A single-mode plan fails hard; a multi-mode plan always yields a report.
    pub async fn execute(
        &self,
        host: &dyn ToolHost,
        plan: &ResolutionPlan,
    ) -> Result<ExecutionReport, McpError> {
        match plan {
            ResolutionPlan::Single { invocation } => {
                let start = Instant::now();
                let value = self.execute_single(host, invocation).await?;
                Ok(ExecutionReport::from_steps(vec![StepOutcome {
                    index: 0,
                    success: true,
                    client: invocation.client.clone(),
                    tool_name: invocation.tool_name.clone(),
                    result: Some(value),
                    error: None,
                    execution_time_ms: start.elapsed().as_millis() as u64,
                }]))
            }
            ResolutionPlan::Multi { steps } => Ok(self.execute_plan(host, steps).await),
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
