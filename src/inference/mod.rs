//! Inference Client: the LLM collaborator used for plan resolution.
//!
//! This module handles all communication with the configured model endpoint:
//! - Settings loading from `settings.json` (with env interpolation)
//! - Provider-specific request payloads and auth headers
//! - Reply-text extraction across response shapes
//!
//! Callers depend on [`LlmTransport`], so a different endpoint (or a fake in
//! tests) is a constructor change, not a code change.

pub mod client;
pub mod config;
pub mod errors;
pub mod types;

// Re-exports for convenience
pub use client::{InferenceClient, LlmTransport};
pub use config::{LlmSettings, Provider};
pub use errors::InferenceError;
