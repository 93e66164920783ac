//! Rollout environments: single-turn, multi-turn variants, and task routing.
//!
//! An environment bundles a run configuration with an optional parser,
//! rubric, and train/eval datasets, and drives an [`InferenceClient`] to
//! produce a scored [`Rollout`]:
//!
//! - [`SingleTurnEnv`] -- one completion, parse, score.
//! - [`DialogEnv`] -- converse until a completion keyword appears.
//! - [`DoubleCheckEnv`] -- answer, then an "Are you sure?" verification turn.
//! - [`ToolEnv`] / [`SmolaToolEnv`] -- tool-calling loops over a registry.
//! - [`CodeMathEnv`] -- iterative `<code>` expression evaluation.
//! - [`EnvGroup`] -- routes `"task:answer"` ground truths to members.
//!
//! Concrete environments are dispatched through the sealed [`AnyEnv`] enum.

pub mod code_math;
pub mod double_check;
pub mod group;
pub mod multi_turn;
pub mod single_turn;
pub mod smola;
pub mod tool;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::config::{EnvConfig, MessageType};
use crate::dataset::Dataset;
use crate::model::{ChatMessage, InferenceClient, SamplingArgs};
use crate::parser::AnyParser;
use crate::rubric::{AnyRubric, Metric};

pub use code_math::CodeMathEnv;
pub use double_check::DoubleCheckEnv;
pub use group::EnvGroup;
pub use multi_turn::{run_multi_turn, DialogEnv, MultiTurnLogic, DEFAULT_MAX_TURNS};
pub use single_turn::SingleTurnEnv;
pub use smola::SmolaToolEnv;
pub use tool::ToolEnv;

// ---------------------------------------------------------------------------
// Prompt and rollout types
// ---------------------------------------------------------------------------

/// A rollout prompt: chat messages or raw completion text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Prompt {
    /// Message list for `/chat/completions`.
    Chat(Vec<ChatMessage>),
    /// Raw text for `/completions`.
    Text(String),
}

impl Prompt {
    /// The messages, if this is a chat prompt.
    pub fn as_chat(&self) -> Option<&[ChatMessage]> {
        match self {
            Prompt::Chat(messages) => Some(messages),
            Prompt::Text(_) => None,
        }
    }

    /// The raw text, if this is a completion prompt.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Prompt::Chat(_) => None,
            Prompt::Text(text) => Some(text),
        }
    }
}

impl From<Vec<ChatMessage>> for Prompt {
    fn from(messages: Vec<ChatMessage>) -> Self {
        Prompt::Chat(messages)
    }
}

impl From<String> for Prompt {
    fn from(text: String) -> Self {
        Prompt::Text(text)
    }
}

impl From<&str> for Prompt {
    fn from(text: &str) -> Self {
        Prompt::Text(text.to_string())
    }
}

/// The outcome of one environment rollout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Rollout {
    /// The conversation transcript: the prompt messages plus every turn
    /// appended during the rollout. Empty in completion mode.
    pub messages: Vec<ChatMessage>,
    /// Raw text of the scored model response.
    pub response: String,
    /// Weighted rubric score.
    pub score: f64,
}

// ---------------------------------------------------------------------------
// Shared environment internals
// ---------------------------------------------------------------------------

/// State common to every environment: configuration, parser, rubric, and
/// datasets. Construction normalizes the config.
#[derive(Debug, Clone)]
pub struct EnvCore {
    /// Run configuration, normalized at construction.
    pub config: EnvConfig,
    /// Parser applied to model responses, when set.
    pub parser: Option<AnyParser>,
    /// Rubric that scores rollouts, when set.
    pub rubric: Option<AnyRubric>,
    /// Training dataset, when set.
    pub dataset: Option<Dataset>,
    /// Held-out evaluation dataset, when set.
    pub eval_dataset: Option<Dataset>,
}

impl EnvCore {
    pub fn new(config: EnvConfig) -> Self {
        Self {
            config: config.normalized(),
            parser: None,
            rubric: None,
            dataset: None,
            eval_dataset: None,
        }
    }

    /// Build the chat prompt for a question: system prompt (when set), then
    /// few-shot examples, then the user question.
    pub fn format_prompt(&self, question: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.config.few_shot.len() + 2);
        if let Some(system) = &self.config.system_prompt {
            if !system.is_empty() {
                messages.push(ChatMessage::system(system.clone()));
            }
        }
        messages.extend(self.config.few_shot.iter().cloned());
        messages.push(ChatMessage::user(question));
        messages
    }

    /// Sample one model response for `prompt`, routed by the configured
    /// message type.
    pub async fn get_model_response<C: InferenceClient>(
        &self,
        client: &C,
        model: &str,
        prompt: &Prompt,
        sampling: &SamplingArgs,
    ) -> Result<String> {
        match self.config.message_type {
            MessageType::Chat => {
                let Some(messages) = prompt.as_chat() else {
                    anyhow::bail!("expected a message list for a chat completion");
                };
                client.create_chat_completion(model, messages, sampling).await
            }
            MessageType::Completion => {
                let Some(text) = prompt.as_text() else {
                    anyhow::bail!("expected a text prompt for a completion");
                };
                client.create_completion(model, text, sampling).await
            }
        }
    }
}

/// Shuffle-and-truncate a dataset to `n` items. Returns the full dataset
/// unless `0 < n < len`.
pub(crate) fn sample_dataset(dataset: Option<&Dataset>, n: usize, seed: u64) -> Option<Dataset> {
    let dataset = dataset?;
    if n > 0 && n < dataset.len() {
        let indices: Vec<usize> = (0..n).collect();
        Some(dataset.shuffle(seed).select(&indices))
    } else {
        Some(dataset.clone())
    }
}

// ---------------------------------------------------------------------------
// Environment dispatch
// ---------------------------------------------------------------------------

/// All environment implementations behind one concrete type.
#[derive(Debug, Clone)]
pub enum AnyEnv {
    SingleTurn(SingleTurnEnv),
    Dialog(DialogEnv),
    DoubleCheck(DoubleCheckEnv),
    Tool(ToolEnv),
    Smola(SmolaToolEnv),
    CodeMath(CodeMathEnv),
    Group(EnvGroup),
}

impl AnyEnv {
    /// Shared internals of the concrete environment.
    pub fn core(&self) -> &EnvCore {
        match self {
            AnyEnv::SingleTurn(env) => env.core(),
            AnyEnv::Dialog(env) => env.core(),
            AnyEnv::DoubleCheck(env) => env.core(),
            AnyEnv::Tool(env) => env.core(),
            AnyEnv::Smola(env) => env.core(),
            AnyEnv::CodeMath(env) => env.core(),
            AnyEnv::Group(env) => env.core(),
        }
    }

    pub fn core_mut(&mut self) -> &mut EnvCore {
        match self {
            AnyEnv::SingleTurn(env) => env.core_mut(),
            AnyEnv::Dialog(env) => env.core_mut(),
            AnyEnv::DoubleCheck(env) => env.core_mut(),
            AnyEnv::Tool(env) => env.core_mut(),
            AnyEnv::Smola(env) => env.core_mut(),
            AnyEnv::CodeMath(env) => env.core_mut(),
            AnyEnv::Group(env) => env.core_mut(),
        }
    }

    /// Run one rollout against `client`.
    pub async fn rollout<C: InferenceClient>(
        &self,
        client: &C,
        model: &str,
        prompt: &Prompt,
        answer: &str,
        sampling: &SamplingArgs,
    ) -> Result<Rollout> {
        match self {
            AnyEnv::SingleTurn(env) => env.rollout(client, model, prompt, answer, sampling).await,
            AnyEnv::Dialog(env) => env.rollout(client, model, prompt, answer, sampling).await,
            AnyEnv::DoubleCheck(env) => env.rollout(client, model, prompt, answer, sampling).await,
            AnyEnv::Tool(env) => env.rollout(client, model, prompt, answer, sampling).await,
            AnyEnv::Smola(env) => env.rollout(client, model, prompt, answer, sampling).await,
            AnyEnv::CodeMath(env) => env.rollout(client, model, prompt, answer, sampling).await,
            AnyEnv::Group(env) => env.rollout(client, model, prompt, answer, sampling).await,
        }
    }

    /// The training dataset, shuffled and truncated to `n` items when
    /// `0 < n < len`. Groups return their combined, task-labeled dataset.
    pub fn dataset(&self, n: usize, seed: u64) -> Option<Dataset> {
        match self {
            AnyEnv::Group(group) => group.dataset(n, seed),
            env => sample_dataset(env.core().dataset.as_ref(), n, seed),
        }
    }

    /// The evaluation dataset, sampled like [`AnyEnv::dataset`].
    pub fn eval_dataset(&self, n: usize, seed: u64) -> Option<Dataset> {
        match self {
            AnyEnv::Group(group) => group.eval_dataset(n, seed),
            env => sample_dataset(env.core().eval_dataset.as_ref(), n, seed),
        }
    }

    /// The rubric's reward metrics. Groups wrap members' metrics with task
    /// routing.
    pub fn metrics(&self) -> Vec<Metric> {
        match self {
            AnyEnv::Group(group) => group.metrics(),
            env => env
                .core()
                .rubric
                .as_ref()
                .map(AnyRubric::metrics)
                .unwrap_or_default(),
        }
    }

    /// The weights of [`AnyEnv::metrics`], in the same order.
    pub fn weights(&self) -> Vec<f64> {
        self.metrics().iter().map(|metric| metric.weight).collect()
    }
}

impl From<SingleTurnEnv> for AnyEnv {
    fn from(env: SingleTurnEnv) -> Self {
        AnyEnv::SingleTurn(env)
    }
}

impl From<DialogEnv> for AnyEnv {
    fn from(env: DialogEnv) -> Self {
        AnyEnv::Dialog(env)
    }
}

impl From<DoubleCheckEnv> for AnyEnv {
    fn from(env: DoubleCheckEnv) -> Self {
        AnyEnv::DoubleCheck(env)
    }
}

impl From<ToolEnv> for AnyEnv {
    fn from(env: ToolEnv) -> Self {
        AnyEnv::Tool(env)
    }
}

impl From<SmolaToolEnv> for AnyEnv {
    fn from(env: SmolaToolEnv) -> Self {
        AnyEnv::Smola(env)
    }
}

impl From<CodeMathEnv> for AnyEnv {
    fn from(env: CodeMathEnv) -> Self {
        AnyEnv::CodeMath(env)
    }
}

impl From<EnvGroup> for AnyEnv {
    fn from(env: EnvGroup) -> Self {
        AnyEnv::Group(env)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
