//! LLM-as-judge rubric.
//!
//! Delegates correctness decisions to a judge model behind an
//! [`InferenceClient`], for tasks where string comparison is too brittle
//! (semantic equivalence, free-form answers).

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::model::{AnyClient, ChatMessage, InferenceClient, SamplingArgs};
use crate::rubric::{Metric, Rubric};

/// Judge model used when none is configured.
pub const DEFAULT_JUDGE_MODEL: &str = "gpt-4-turbo-preview";

/// System prompt framing the judge's task.
pub const DEFAULT_JUDGE_SYSTEM_PROMPT: &str = "You are a fair and accurate judge that evaluates whether model responses are correct.

Consider the following when making judgments:
1. Mathematical equivalence (e.g., 0.5 = 1/2 = 50%)
2. Semantic equivalence (same meaning, different wording)
3. Acceptable variations in formatting or presentation
4. Partial credit is not given - responses are either correct or incorrect

Be strict but fair in your evaluations.";

// ---------------------------------------------------------------------------
// Judge
// ---------------------------------------------------------------------------

/// The judge call itself, shared between the metric closure and the
/// reasoning entry point.
#[derive(Debug)]
struct Judge {
    client: Arc<AnyClient>,
    model: String,
    system_prompt: String,
}

impl Judge {
    /// Ask for a bare Yes/No verdict; 1.0 when the judge says yes.
    async fn score(&self, response: &str, ground_truth: &str) -> Result<f64> {
        let prompt = format!(
            "Please evaluate if the model's response is correct.\n\n\
             Ground Truth Answer: {ground_truth}\n\n\
             Model Response: {response}\n\n\
             Is the model's response correct? Reply with only \"Yes\" or \"No\"."
        );
        let messages = [
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user(prompt),
        ];
        let sampling = SamplingArgs {
            temperature: Some(0.0),
            max_tokens: Some(10),
            ..SamplingArgs::default()
        };
        let judgment = self
            .client
            .create_chat_completion(&self.model, &messages, &sampling)
            .await
            .context("judge evaluation failed")?;

        Ok(if judgment.trim().to_lowercase().contains("yes") {
            1.0
        } else {
            0.0
        })
    }

    /// Ask for a tagged verdict with an explanation.
    async fn reasoned(&self, response: &str, ground_truth: &str) -> Result<(f64, String)> {
        let prompt = format!(
            "Please evaluate if the model's response is correct.\n\n\
             Ground Truth Answer: {ground_truth}\n\n\
             Model Response: {response}\n\n\
             Provide your evaluation in the following format:\n\
             <reasoning>\n\
             Explain why the response is correct or incorrect\n\
             </reasoning>\n\
             <judgment>\n\
             Yes or No\n\
             </judgment>"
        );
        let messages = [
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user(prompt),
        ];
        let sampling = SamplingArgs {
            temperature: Some(0.0),
            max_tokens: Some(200),
            ..SamplingArgs::default()
        };
        let evaluation = self
            .client
            .create_chat_completion(&self.model, &messages, &sampling)
            .await
            .context("judge evaluation failed")?;

        let reasoning = extract_block(&evaluation, "reasoning").unwrap_or_default();
        let judgment = extract_block(&evaluation, "judgment").unwrap_or_default();
        let score = if judgment.to_lowercase().contains("yes") {
            1.0
        } else {
            0.0
        };
        Ok((score, reasoning.to_string()))
    }
}

/// The first `<tag>..</tag>` block's trimmed content, if well-formed.
fn extract_block<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = text.find(&open)? + open.len();
    let end = text.find(&close)?;
    (start < end).then(|| text[start..end].trim())
}

// ---------------------------------------------------------------------------
// Rubric
// ---------------------------------------------------------------------------

/// Rubric with a single `judge` metric (weight 1.0) scored by a judge model.
#[derive(Debug, Clone)]
pub struct JudgeRubric {
    rubric: Rubric,
    judge: Arc<Judge>,
}

impl JudgeRubric {
    /// Create a judge rubric; an empty `model` selects
    /// [`DEFAULT_JUDGE_MODEL`].
    pub fn new(client: Arc<AnyClient>, model: &str) -> Self {
        let model = if model.is_empty() {
            DEFAULT_JUDGE_MODEL
        } else {
            model
        };
        Self::build(Judge {
            client,
            model: model.to_string(),
            system_prompt: DEFAULT_JUDGE_SYSTEM_PROMPT.to_string(),
        })
    }

    fn build(judge: Judge) -> Self {
        let judge = Arc::new(judge);
        let metric_judge = Arc::clone(&judge);
        let metric = Metric::new(
            "judge",
            1.0,
            Arc::new(move |response, ground_truth| {
                let judge = Arc::clone(&metric_judge);
                let response = response.to_string();
                let ground_truth = ground_truth.to_string();
                Box::pin(async move { judge.score(&response, &ground_truth).await })
            }),
        );
        Self {
            rubric: Rubric::new().with_metric(metric),
            judge,
        }
    }

    /// Replace the judge's system prompt.
    pub fn with_system_prompt(self, prompt: impl Into<String>) -> Self {
        Self::build(Judge {
            client: Arc::clone(&self.judge.client),
            model: self.judge.model.clone(),
            system_prompt: prompt.into(),
        })
    }

    /// The judge model in use.
    pub fn model(&self) -> &str {
        &self.judge.model
    }

    pub fn metrics(&self) -> &[Metric] {
        self.rubric.metrics()
    }

    pub async fn compute_reward(&self, response: &str, ground_truth: &str) -> Result<f64> {
        self.rubric.compute_reward(response, ground_truth).await
    }

    /// Judge with an explanation: returns the score and the judge's
    /// reasoning text (empty when the judge skipped the format).
    pub async fn judge_with_reasoning(
        &self,
        response: &str,
        ground_truth: &str,
    ) -> Result<(f64, String)> {
        self.judge.reasoned(response, ground_truth).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
