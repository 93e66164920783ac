//! One-shot environment: a single completion, parsed and scored.

use anyhow::{Context, Result};

use crate::config::{EnvConfig, MessageType};
use crate::dataset::Dataset;
use crate::env::{EnvCore, Prompt, Rollout};
use crate::model::{ChatMessage, InferenceClient, SamplingArgs};
use crate::parser::AnyParser;
use crate::rubric::AnyRubric;

/// The simplest environment: one model call, one parse, one score.
///
/// Without a parser the raw response is scored; without a rubric the score
/// is 0. In chat mode the returned transcript is the prompt plus the
/// assistant reply; completion mode returns no transcript.
#[derive(Debug, Clone)]
pub struct SingleTurnEnv {
    core: EnvCore,
}

impl SingleTurnEnv {
    pub fn new(config: EnvConfig) -> Self {
        Self {
            core: EnvCore::new(config),
        }
    }

    /// A single-turn environment forced into completion mode.
    pub fn completion(mut config: EnvConfig) -> Self {
        config.message_type = MessageType::Completion;
        Self::new(config)
    }

    pub fn with_parser(mut self, parser: impl Into<AnyParser>) -> Self {
        self.core.parser = Some(parser.into());
        self
    }

    pub fn with_rubric(mut self, rubric: impl Into<AnyRubric>) -> Self {
        self.core.rubric = Some(rubric.into());
        self
    }

    pub fn with_dataset(mut self, dataset: Dataset) -> Self {
        self.core.dataset = Some(dataset);
        self
    }

    pub fn with_eval_dataset(mut self, dataset: Dataset) -> Self {
        self.core.eval_dataset = Some(dataset);
        self
    }

    pub fn core(&self) -> &EnvCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut EnvCore {
        &mut self.core
    }

    /// Run one rollout: sample a response, parse it, score the parsed text
    /// against `answer`.
    pub async fn rollout<C: InferenceClient>(
        &self,
        client: &C,
        model: &str,
        prompt: &Prompt,
        answer: &str,
        sampling: &SamplingArgs,
    ) -> Result<Rollout> {
        let response = self
            .core
            .get_model_response(client, model, prompt, sampling)
            .await
            .context("failed to get model response")?;

        let parsed = match &self.core.parser {
            Some(parser) => parser.parse(&response),
            None => response.clone(),
        };

        let score = match &self.core.rubric {
            Some(rubric) => rubric
                .compute_reward(&parsed, answer)
                .await
                .context("failed to compute reward")?,
            None => 0.0,
        };

        let messages = match (self.core.config.message_type, prompt) {
            (MessageType::Chat, Prompt::Chat(prompt_messages)) => {
                let mut messages = prompt_messages.clone();
                messages.push(ChatMessage::assistant(response.clone()));
                messages
            }
            _ => Vec::new(),
        };

        Ok(Rollout {
            messages,
            response,
            score,
        })
    }
}
