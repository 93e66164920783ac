//! Multi-turn conversation driver and the dialog environment.
//!
//! [`run_multi_turn`] owns the turn loop shared by every conversational
//! environment; variants supply the [`MultiTurnLogic`] hooks: a completion
//! predicate, a synthetic environment turn, and final scoring.

use anyhow::{Context, Result};

use crate::config::EnvConfig;
use crate::dataset::Dataset;
use crate::env::{EnvCore, Prompt, Rollout};
use crate::model::{ChatMessage, InferenceClient, Role, SamplingArgs, ERROR_PREFIX};
use crate::parser::AnyParser;
use crate::rubric::AnyRubric;

/// Turn budget applied when an environment reports zero.
pub const DEFAULT_MAX_TURNS: usize = 10;

// ---------------------------------------------------------------------------
// Variant hooks
// ---------------------------------------------------------------------------

/// Hooks a conversational environment plugs into [`run_multi_turn`].
///
/// `State` is threaded through one rollout: seeded by `initial_state`,
/// read by `is_completed`, mutated by `env_response`, and available to
/// `score_rollout` once the loop exits.
#[allow(async_fn_in_trait)]
pub trait MultiTurnLogic: Send + Sync {
    /// Conversation state carried through one rollout.
    type State: Default + Send;

    /// Turn budget for one rollout. Zero falls back to
    /// [`DEFAULT_MAX_TURNS`].
    fn max_turns(&self) -> usize;

    /// State for a fresh rollout. The default ignores the ground truth.
    fn initial_state(&self, _answer: &str) -> Self::State {
        Self::State::default()
    }

    /// Whether the conversation is finished.
    fn is_completed(&self, messages: &[ChatMessage], state: &Self::State) -> bool;

    /// The next environment message, given a transcript ending in an
    /// assistant turn.
    async fn env_response(
        &self,
        messages: &[ChatMessage],
        state: &mut Self::State,
    ) -> Result<ChatMessage>;

    /// Score the final response once the loop exits.
    async fn score_rollout(
        &self,
        response: &str,
        ground_truth: &str,
        state: &Self::State,
    ) -> Result<f64>;
}

// ---------------------------------------------------------------------------
// Turn loop
// ---------------------------------------------------------------------------

/// Drive a conversation to completion and score it.
///
/// Each turn: check the completion predicate, sample an assistant message,
/// then (unless done, out of budget, or the response carries the
/// [`ERROR_PREFIX`] sentinel) append the environment's reply. The rollout
/// response is the last assistant message produced by the loop, scored by
/// the variant's hook.
pub async fn run_multi_turn<L, C>(
    logic: &L,
    client: &C,
    model: &str,
    prompt: &Prompt,
    answer: &str,
    sampling: &SamplingArgs,
) -> Result<Rollout>
where
    L: MultiTurnLogic,
    C: InferenceClient,
{
    let Some(prompt_messages) = prompt.as_chat() else {
        anyhow::bail!("multi-turn rollouts require a message-list prompt");
    };

    let max_turns = match logic.max_turns() {
        0 => DEFAULT_MAX_TURNS,
        limit => limit,
    };

    let mut working = prompt_messages.to_vec();
    // Messages appended after the prompt; the scored response is the last
    // assistant turn here, never one from few-shot history.
    let mut completion: Vec<ChatMessage> = Vec::new();
    let mut state = logic.initial_state(answer);
    let mut turn = 0;

    while turn < max_turns {
        if logic.is_completed(&working, &state) {
            break;
        }

        let response = client
            .create_chat_completion(model, &working, sampling)
            .await
            .with_context(|| format!("failed to get model response at turn {turn}"))?;
        let has_error = response.starts_with(ERROR_PREFIX);

        let assistant = ChatMessage::assistant(response);
        working.push(assistant.clone());
        completion.push(assistant);
        turn += 1;

        if logic.is_completed(&working, &state) || turn >= max_turns || has_error {
            break;
        }

        let env_message = logic
            .env_response(&working, &mut state)
            .await
            .with_context(|| format!("failed to get environment response at turn {turn}"))?;
        working.push(env_message.clone());
        completion.push(env_message);
    }

    let response = completion
        .iter()
        .rev()
        .find(|message| message.role == Role::Assistant)
        .map(|message| message.content.clone())
        .unwrap_or_default();

    let score = logic
        .score_rollout(&response, answer, &state)
        .await
        .context("failed to score rollout")?;

    Ok(Rollout {
        messages: working,
        response,
        score,
    })
}

// ---------------------------------------------------------------------------
// Dialog environment
// ---------------------------------------------------------------------------

/// Free-form conversation that ends when any message contains a completion
/// keyword.
///
/// The environment turn nudges the model to continue or say the keyword;
/// since the nudge itself contains the keyword, the conversation also ends
/// after the first nudge is delivered.
#[derive(Debug, Clone)]
pub struct DialogEnv {
    core: EnvCore,
    keyword: String,
    max_turns: usize,
}

impl DialogEnv {
    /// An empty keyword falls back to `"DONE"`, a zero `max_turns` to
    /// [`DEFAULT_MAX_TURNS`].
    pub fn new(config: EnvConfig, max_turns: usize, keyword: &str) -> Self {
        Self {
            core: EnvCore::new(config),
            keyword: if keyword.is_empty() {
                "DONE".to_string()
            } else {
                keyword.to_string()
            },
            max_turns: if max_turns == 0 {
                DEFAULT_MAX_TURNS
            } else {
                max_turns
            },
        }
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

    pub fn keyword(&self) -> &str {
        &self.keyword
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

impl MultiTurnLogic for DialogEnv {
    type State = ();

    fn max_turns(&self) -> usize {
        self.max_turns
    }

    fn is_completed(&self, messages: &[ChatMessage], _state: &()) -> bool {
        messages
            .last()
            .is_some_and(|message| message.content.contains(&self.keyword))
    }

    async fn env_response(
        &self,
        _messages: &[ChatMessage],
        _state: &mut (),
    ) -> Result<ChatMessage> {
        Ok(ChatMessage::user(format!(
            "Please continue or say '{}' when finished.",
            self.keyword
        )))
    }

    async fn score_rollout(&self, response: &str, ground_truth: &str, _state: &()) -> Result<f64> {
        let Some(parser) = &self.core.parser else {
            return Ok(0.0);
        };
        if response.is_empty() {
            return Ok(0.0);
        }
        let parsed = parser.parse(response);
        match &self.core.rubric {
            Some(rubric) => rubric.compute_reward(&parsed, ground_truth).await,
            None => Ok(0.0),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
