//! Two-turn environment that asks the model to double-check its answer.
//!
//! Turn one collects an answer in `<think>`/`<answer>` format; the
//! environment then asks "Are you sure?" and the model's second (final)
//! answer is scored with the math rubric. A reply without an answer tag is
//! re-prompted for format instead, without consuming the double-check
//! question.

use anyhow::Result;

use crate::config::EnvConfig;
use crate::dataset::Dataset;
use crate::env::{run_multi_turn, EnvCore, MultiTurnLogic, Prompt, Rollout};
use crate::model::{ChatMessage, InferenceClient, Role, SamplingArgs};
use crate::parser::XmlParser;
use crate::rubric::MathRubric;

/// Conversation state for one double-check rollout.
#[derive(Debug, Clone, Copy, Default)]
pub struct DoubleCheckState {
    /// Whether the double-check question has been asked.
    pub asked: bool,
}

/// Math environment that challenges the model's first answer once.
#[derive(Debug, Clone)]
pub struct DoubleCheckEnv {
    core: EnvCore,
    parser: XmlParser,
}

impl DoubleCheckEnv {
    pub fn new(config: EnvConfig) -> Result<Self> {
        let parser = XmlParser::new(&[&["think"], &["answer"]], "answer")?;
        let mut core = EnvCore::new(config);
        core.parser = Some(parser.clone().into());
        core.rubric = Some(MathRubric::new()?.into());
        Ok(Self { core, parser })
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

    pub async fn rollout<C: InferenceClient>(
        &self,
        client: &C,
        model: &str,
        prompt: &Prompt,
        answer: &str,
        sampling: &SamplingArgs,
    ) -> Result<Rollout> {
        run_multi_turn(self, client, model, prompt, answer, sampling).await
    }
}

impl MultiTurnLogic for DoubleCheckEnv {
    type State = DoubleCheckState;

    fn max_turns(&self) -> usize {
        2
    }

    fn is_completed(&self, messages: &[ChatMessage], state: &DoubleCheckState) -> bool {
        // Complete only once an assistant turn follows the double-check
        // question, so the scored response is the re-checked answer.
        if state.asked
            && messages
                .last()
                .is_some_and(|message| message.role == Role::Assistant)
        {
            return true;
        }
        messages.windows(2).any(|pair| {
            pair[0].role == Role::User
                && pair[0].content.to_lowercase().contains("are you sure")
                && pair[1].role == Role::Assistant
        })
    }

    async fn env_response(
        &self,
        messages: &[ChatMessage],
        state: &mut DoubleCheckState,
    ) -> Result<ChatMessage> {
        let Some(last) = messages.last() else {
            anyhow::bail!("no messages to process");
        };
        if state.asked {
            anyhow::bail!("already asked double-check question");
        }
        if last.role != Role::Assistant {
            anyhow::bail!("last message must be from assistant");
        }

        let fields = self.parser.parse_fields(&last.content, true);
        if fields.get("answer").map_or(true, str::is_empty) {
            // Format slip: re-prompt without spending the double-check turn.
            return Ok(ChatMessage::user(
                "Please provide your answer in the correct format with <think> and <answer> tags.",
            ));
        }

        state.asked = true;
        Ok(ChatMessage::user("Are you sure? Double-check your answer."))
    }

    async fn score_rollout(
        &self,
        response: &str,
        ground_truth: &str,
        _state: &DoubleCheckState,
    ) -> Result<f64> {
        if response.is_empty() {
            return Ok(0.0);
        }
        match &self.core.rubric {
            Some(rubric) => rubric.compute_reward(response, ground_truth).await,
            None => Ok(0.0),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
