use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::{ChatMessage, SamplingArgs};

/// Default cap on concurrent rollouts within a single environment.
pub const DEFAULT_MAX_CONCURRENT: usize = 512;

/// Smaller concurrency cap for callers that generate dataset rows with
/// model calls rather than running scored rollouts.
pub const DATASET_MAX_CONCURRENT: usize = 32;

/// How prompts are sent to the inference server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Chat-style message lists sent to `/chat/completions`.
    Chat,
    /// Raw text prompts sent to `/completions`.
    Completion,
}

impl Default for MessageType {
    fn default() -> Self {
        MessageType::Chat
    }
}

/// Per-environment run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    /// Model identifier sent with every inference request.
    pub model: String,
    /// System prompt prepended to each rollout prompt, when set.
    pub system_prompt: Option<String>,
    /// Few-shot messages inserted between the system prompt and the question.
    pub few_shot: Vec<ChatMessage>,
    /// Sampling parameters forwarded to the inference server.
    pub sampling: SamplingArgs,
    /// Cap on concurrent rollouts (default: 512).
    pub max_concurrent: usize,
    /// Prompt encoding for model requests (default: chat).
    pub message_type: MessageType,
    /// HTTP timeout for inference requests, in seconds (default: 30).
    pub timeout_secs: u64,
    /// Free-form extras for environment-specific settings.
    pub extra: Map<String, Value>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            system_prompt: None,
            few_shot: Vec::new(),
            sampling: SamplingArgs::default(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            message_type: MessageType::Chat,
            timeout_secs: 30,
            extra: Map::new(),
        }
    }
}

impl EnvConfig {
    /// Replaces zeroed-out knobs with their defaults.
    ///
    /// Also seeds the sampling `extra_body` with the special-token settings
    /// vLLM-style servers expect, unless the caller supplied their own.
    pub fn normalized(mut self) -> Self {
        if self.max_concurrent == 0 {
            self.max_concurrent = DEFAULT_MAX_CONCURRENT;
        }
        if self.sampling.n == 0 {
            self.sampling.n = 1;
        }
        if self.sampling.extra.is_empty() {
            self.sampling
                .extra
                .insert("skip_special_tokens".to_string(), Value::Bool(false));
            self.sampling.extra.insert(
                "spaces_between_special_tokens".to_string(),
                Value::Bool(false),
            );
        }
        self
    }
}
