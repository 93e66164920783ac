//! Dataset-level evaluation: batched rollouts reduced to one report.
//!
//! The [`Evaluator`] pulls an environment's evaluation dataset, fans every
//! item through [`BatchProcessor`](crate::batch::BatchProcessor), and folds
//! the outcomes into an [`EvalReport`] carrying per-item results and
//! aggregate score statistics.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::batch::BatchProcessor;
use crate::config::MessageType;
use crate::env::{AnyEnv, Prompt};
use crate::model::AnyClient;

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

/// The outcome of one evaluated dataset item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemOutcome {
    /// Position of the item in the evaluated dataset.
    pub index: usize,
    /// The question posed to the model.
    pub question: String,
    /// The ground-truth answer scored against.
    pub answer: String,
    /// The model's final response text (empty when the rollout failed).
    pub response: String,
    /// The rubric score for this item.
    pub score: f64,
    /// The rollout error, when one occurred.
    pub error: Option<String>,
}

/// Score statistics over the items that completed successfully.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ScoreStats {
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
}

/// The result of one evaluation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalReport {
    /// Unique identifier for this run.
    pub run_id: String,
    /// Model the rollouts were sampled from.
    pub model: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Number of items evaluated.
    pub total: usize,
    /// Number of items whose rollout failed.
    pub failed: usize,
    /// Statistics over successful items' scores.
    pub stats: ScoreStats,
    /// Per-item outcomes, in dataset order.
    pub outcomes: Vec<ItemOutcome>,
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

/// Runs an environment over its dataset and aggregates the scores.
#[derive(Debug, Clone)]
pub struct Evaluator {
    /// How many examples to evaluate (0 = the whole dataset).
    num_examples: usize,
    /// Seed for the dataset shuffle applied when truncating.
    seed: u64,
}

impl Evaluator {
    pub fn new(num_examples: usize, seed: u64) -> Self {
        Self { num_examples, seed }
    }

    /// Evaluate `env` against `client` over its evaluation dataset (falling
    /// back to the training dataset when no held-out split is set).
    ///
    /// Concurrency and the per-item deadline come from the environment's
    /// config. Per-item rollout failures are recorded in the report, not
    /// propagated.
    pub async fn evaluate(&self, env: Arc<AnyEnv>, client: Arc<AnyClient>) -> Result<EvalReport> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4().to_string();

        let dataset = env
            .eval_dataset(self.num_examples, self.seed)
            .or_else(|| env.dataset(self.num_examples, self.seed))
            .context("environment has no dataset to evaluate")?;

        let mut inputs = Vec::with_capacity(dataset.len());
        for (idx, item) in dataset.iter().enumerate() {
            let question = item
                .question()
                .with_context(|| format!("dataset item {idx} has no question"))?
                .to_string();
            let answer = item
                .answer()
                .with_context(|| format!("dataset item {idx} has no answer"))?
                .to_string();
            inputs.push((question, answer));
        }

        let config = env.core().config.clone();
        let model = config.model.clone();
        info!(
            run_id = %run_id,
            model = %model,
            items = inputs.len(),
            max_concurrent = config.max_concurrent,
            "starting evaluation"
        );

        let processor = BatchProcessor::new(
            config.max_concurrent,
            Duration::from_secs(config.timeout_secs),
        );
        let cancel = CancellationToken::new();

        let results = {
            let env = Arc::clone(&env);
            let model = model.clone();
            processor
                .process(inputs.clone(), &cancel, move |_, (question, answer)| {
                    let env = Arc::clone(&env);
                    let client = Arc::clone(&client);
                    let model = model.clone();
                    async move {
                        let prompt = match env.core().config.message_type {
                            MessageType::Chat => {
                                Prompt::Chat(env.core().format_prompt(&question))
                            }
                            MessageType::Completion => Prompt::from(question.clone()),
                        };
                        let sampling = env.core().config.sampling.clone();
                        env.rollout(&*client, &model, &prompt, &answer, &sampling)
                            .await
                    }
                })
                .await
        };

        let mut outcomes = Vec::with_capacity(results.len());
        let mut scores = Vec::new();
        let mut failed = 0usize;
        for ((index, result), (question, answer)) in
            results.into_iter().enumerate().zip(inputs)
        {
            match result {
                Ok(rollout) => {
                    scores.push(rollout.score);
                    outcomes.push(ItemOutcome {
                        index,
                        question,
                        answer,
                        response: rollout.response,
                        score: rollout.score,
                        error: None,
                    });
                }
                Err(err) => {
                    warn!(item = index, error = %format!("{err:#}"), "rollout failed");
                    failed += 1;
                    outcomes.push(ItemOutcome {
                        index,
                        question,
                        answer,
                        response: String::new(),
                        score: 0.0,
                        error: Some(format!("{err:#}")),
                    });
                }
            }
        }

        let stats = score_stats(&scores);
        let finished_at = Utc::now();
        info!(
            run_id = %run_id,
            total = outcomes.len(),
            failed,
            mean = stats.mean,
            "evaluation finished"
        );

        Ok(EvalReport {
            run_id,
            model,
            started_at,
            finished_at,
            total: outcomes.len(),
            failed,
            stats,
            outcomes,
        })
    }
}

/// Mean/median/min/max over `scores`; all zero when the slice is empty.
fn score_stats(scores: &[f64]) -> ScoreStats {
    if scores.is_empty() {
        return ScoreStats::default();
    }

    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mean = sorted.iter().sum::<f64>() / sorted.len() as f64;
    let mid = sorted.len() / 2;
    let median = if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    };

    ScoreStats {
        mean,
        median,
        min: sorted[0],
        max: sorted[sorted.len() - 1],
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnvConfig;
    use crate::dataset::question_answer_pairs;
    use crate::env::SingleTurnEnv;
    use crate::model::ScriptedClient;
    use crate::parser::TrimParser;
    use crate::rubric::Rubric;

    fn serial_env(dataset: crate::dataset::Dataset) -> Arc<AnyEnv> {
        let config = EnvConfig {
            model: "test-model".to_string(),
            max_concurrent: 1,
            ..EnvConfig::default()
        };
        let env = SingleTurnEnv::new(config)
            .with_parser(TrimParser)
            .with_rubric(Rubric::exact_match())
            .with_eval_dataset(dataset);
        Arc::new(AnyEnv::from(env))
    }

    #[tokio::test]
    async fn test_evaluate_aggregates_scores() {
        // Both answers are "4", so whichever worker drains which scripted
        // response, exactly one item scores 1.0.
        let dataset = question_answer_pairs([("2+2?", "4"), ("1+3?", "4")]);
        let env = serial_env(dataset);
        let client = Arc::new(AnyClient::Scripted(ScriptedClient::new(["4", "nope"])));

        let report = Evaluator::new(0, 0).evaluate(env, client).await.unwrap();

        assert_eq!(report.model, "test-model");
        assert_eq!(report.total, 2);
        assert_eq!(report.failed, 0);
        assert!((report.stats.mean - 0.5).abs() < 1e-9);
        assert!((report.stats.median - 0.5).abs() < 1e-9);
        assert!((report.stats.min - 0.0).abs() < 1e-9);
        assert!((report.stats.max - 1.0).abs() < 1e-9);

        // Outcomes stay in dataset order even though completion order is
        // scheduler-dependent.
        assert_eq!(report.outcomes[0].question, "2+2?");
        assert_eq!(report.outcomes[1].question, "1+3?");
        assert!(report.outcomes.iter().all(|o| o.error.is_none()));
    }

    #[tokio::test]
    async fn test_failed_rollouts_stay_per_item() {
        let dataset = question_answer_pairs([("q0", "a"), ("q1", "a")]);
        let env = serial_env(dataset);
        // Only one scripted response: one of the two rollouts fails.
        let client = Arc::new(AnyClient::Scripted(ScriptedClient::new(["a"])));

        let report = Evaluator::new(0, 0).evaluate(env, client).await.unwrap();

        assert_eq!(report.total, 2);
        assert_eq!(report.failed, 1);
        let errors: Vec<_> = report
            .outcomes
            .iter()
            .filter_map(|o| o.error.as_deref())
            .collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("no responses left"), "unexpected: {}", errors[0]);
        // Stats cover only the item that completed.
        assert!((report.stats.mean - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_evaluate_without_dataset_errors() {
        let env = Arc::new(AnyEnv::from(SingleTurnEnv::new(EnvConfig::default())));
        let client = Arc::new(AnyClient::Scripted(ScriptedClient::new(["x"])));

        let err = Evaluator::new(0, 0).evaluate(env, client).await.unwrap_err();
        assert!(err.to_string().contains("no dataset"));
    }

    #[test]
    fn test_score_stats_even_and_odd() {
        let stats = score_stats(&[0.0, 1.0, 0.5]);
        assert!((stats.median - 0.5).abs() < 1e-9);
        assert!((stats.mean - 0.5).abs() < 1e-9);

        let stats = score_stats(&[0.2, 0.8]);
        assert!((stats.median - 0.5).abs() < 1e-9);
        assert!((stats.min - 0.2).abs() < 1e-9);
        assert!((stats.max - 0.8).abs() < 1e-9);

        let empty = score_stats(&[]);
        assert!((empty.mean - 0.0).abs() < 1e-9);
    }
}
