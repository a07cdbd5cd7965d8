//! Agent Core: request routing and plan execution.
//!
//! Submodules:
//! - `request_router`: keyword tier, then LLM tier, producing a plan
//! - `plan_parser`: extraction chain for LLM replies + registry validation
//! - `arguments`: schema-guided argument back-fill from the request text
//! - `executor`: sequential, partial-failure-tolerant plan execution
//! - `types`: invocations, plans, and step outcomes

pub mod arguments;
pub mod executor;
pub mod plan_parser;
pub mod request_router;
pub mod types;

// Re-exports for convenience
pub use arguments::extract_args_from_prompt;
pub use executor::ExecutionEngine;
pub use plan_parser::{extract_plan, PlanValidator};
pub use request_router::RequestRouter;
pub use types::{
    ExecutionReport, Resolution, ResolutionPlan, ResolutionTier, ResolvedInvocation, StepOutcome,
};
