//! Model client abstractions for interacting with inference APIs.
//!
//! This module provides:
//! - [`api::LlmClient`] -- OpenAI-compatible HTTP client for chat and text
//!   completions.
//! - [`api::ScriptedClient`] -- deterministic replay client for tests.
//! - [`prompt`] -- system prompts and few-shot examples for the built-in
//!   environments.

pub mod api;
pub mod prompt;

// Re-export the most commonly used types at the module level so that callers
// can write `use crate::model::LlmClient`.
pub use api::{
    AnyClient, ChatMessage, InferenceClient, LlmClient, Role, SamplingArgs, ScriptedClient,
    ScriptedRequest, ERROR_PREFIX,
};
