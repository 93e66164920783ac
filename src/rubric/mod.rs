//! Scoring rubrics: weighted metric aggregation over model responses.
//!
//! A [`Rubric`] owns named [`Metric`]s, each a reward function with a
//! weight; [`Rubric::compute_reward`] returns the weighted average of their
//! scores. Specialized rubrics bundle domain metrics:
//!
//! - [`MathRubric`]: math correctness plus think/answer format
//! - [`CodeMathRubric`]: math correctness plus code execution quality
//! - [`ToolRubric`] / [`SmolaToolRubric`]: answer, format, and tool-usage
//!   scoring for tool-calling transcripts
//! - [`JudgeRubric`]: delegates correctness to a judge model
//! - [`RubricGroup`]: aggregates whole rubrics, skipping failures
//!
//! Concrete rubrics are dispatched through the sealed [`AnyRubric`] enum.

pub mod code_math;
pub mod group;
pub mod judge;
pub mod math;
pub mod numeric;
pub mod smola;
pub mod tool;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::{Context, Result};

pub use code_math::{CodeExecution, CodeMathRubric};
pub use group::RubricGroup;
pub use judge::JudgeRubric;
pub use math::MathRubric;
pub use smola::{SmolaToolRubric, ToolExecution};
pub use tool::ToolRubric;

/// Future returned by a metric function.
pub type MetricFuture = Pin<Box<dyn Future<Output = Result<f64>> + Send>>;

/// A reward function over `(response, ground_truth)`.
pub type MetricFn = Arc<dyn Fn(&str, &str) -> MetricFuture + Send + Sync>;

// ---------------------------------------------------------------------------
// Metric
// ---------------------------------------------------------------------------

/// A named, weighted reward function.
#[derive(Clone)]
pub struct Metric {
    pub name: String,
    pub weight: f64,
    pub func: MetricFn,
}

impl Metric {
    pub fn new(name: impl Into<String>, weight: f64, func: MetricFn) -> Self {
        Self {
            name: name.into(),
            weight,
            func,
        }
    }

    /// Wrap a synchronous reward function.
    pub fn from_sync<F>(name: impl Into<String>, weight: f64, func: F) -> Self
    where
        F: Fn(&str, &str) -> Result<f64> + Send + Sync + 'static,
    {
        Self::new(
            name,
            weight,
            Arc::new(move |response, ground_truth| {
                let result = func(response, ground_truth);
                Box::pin(async move { result })
            }),
        )
    }

    async fn score(&self, response: &str, ground_truth: &str) -> Result<f64> {
        (self.func)(response, ground_truth)
            .await
            .with_context(|| format!("metric '{}' failed", self.name))
    }
}

impl fmt::Debug for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metric")
            .field("name", &self.name)
            .field("weight", &self.weight)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Rubric
// ---------------------------------------------------------------------------

/// An ordered collection of weighted metrics.
///
/// `new` starts empty; use [`Rubric::exact_match`] for the classic
/// trimmed-string-equality baseline.
#[derive(Debug, Clone, Default)]
pub struct Rubric {
    metrics: Vec<Metric>,
}

impl Rubric {
    pub fn new() -> Self {
        Self::default()
    }

    /// A rubric with a single exact-match metric at weight 1.0. Both sides
    /// are trimmed before comparison.
    pub fn exact_match() -> Self {
        let mut rubric = Self::new();
        rubric.add_metric(Metric::from_sync("exact_match", 1.0, |response, truth| {
            Ok(if response.trim() == truth.trim() {
                1.0
            } else {
                0.0
            })
        }));
        rubric
    }

    pub fn add_metric(&mut self, metric: Metric) {
        self.metrics.push(metric);
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.add_metric(metric);
        self
    }

    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    pub fn metric(&self, name: &str) -> Option<&Metric> {
        self.metrics.iter().find(|metric| metric.name == name)
    }

    pub fn weights(&self) -> Vec<f64> {
        self.metrics.iter().map(|metric| metric.weight).collect()
    }

    /// Weighted average of all metric scores. An empty rubric and an
    /// all-zero-weight rubric both score 0.0; a failing metric aborts the
    /// whole computation.
    pub async fn compute_reward(&self, response: &str, ground_truth: &str) -> Result<f64> {
        if self.metrics.is_empty() {
            return Ok(0.0);
        }
        let mut total_reward = 0.0;
        let mut total_weight = 0.0;
        for metric in &self.metrics {
            let score = metric.score(response, ground_truth).await?;
            total_reward += score * metric.weight;
            total_weight += metric.weight;
        }
        if total_weight > 0.0 {
            Ok(total_reward / total_weight)
        } else {
            Ok(0.0)
        }
    }
}

// ---------------------------------------------------------------------------
// AnyRubric
// ---------------------------------------------------------------------------

/// All rubric implementations, dispatched without trait objects.
#[derive(Debug, Clone)]
pub enum AnyRubric {
    Basic(Rubric),
    Math(MathRubric),
    CodeMath(CodeMathRubric),
    Tool(ToolRubric),
    Smola(SmolaToolRubric),
    Judge(JudgeRubric),
    Group(RubricGroup),
}

impl AnyRubric {
    pub async fn compute_reward(&self, response: &str, ground_truth: &str) -> Result<f64> {
        match self {
            AnyRubric::Basic(rubric) => rubric.compute_reward(response, ground_truth).await,
            AnyRubric::Math(rubric) => rubric.compute_reward(response, ground_truth).await,
            AnyRubric::CodeMath(rubric) => rubric.compute_reward(response, ground_truth).await,
            AnyRubric::Tool(rubric) => rubric.compute_reward(response, ground_truth).await,
            AnyRubric::Smola(rubric) => rubric.compute_reward(response, ground_truth).await,
            AnyRubric::Judge(rubric) => rubric.compute_reward(response, ground_truth).await,
            AnyRubric::Group(group) => group.compute_reward(response, ground_truth).await,
        }
    }

    /// The rubric's metrics; group rubrics return their combined view.
    pub fn metrics(&self) -> Vec<Metric> {
        match self {
            AnyRubric::Basic(rubric) => rubric.metrics().to_vec(),
            AnyRubric::Math(rubric) => rubric.metrics().to_vec(),
            AnyRubric::CodeMath(rubric) => rubric.metrics().to_vec(),
            AnyRubric::Tool(rubric) => rubric.metrics().to_vec(),
            AnyRubric::Smola(rubric) => rubric.metrics().to_vec(),
            AnyRubric::Judge(rubric) => rubric.metrics().to_vec(),
            AnyRubric::Group(group) => group.metrics(),
        }
    }

    pub fn weights(&self) -> Vec<f64> {
        self.metrics().iter().map(|metric| metric.weight).collect()
    }
}

impl From<Rubric> for AnyRubric {
    fn from(rubric: Rubric) -> Self {
        AnyRubric::Basic(rubric)
    }
}

impl From<MathRubric> for AnyRubric {
    fn from(rubric: MathRubric) -> Self {
        AnyRubric::Math(rubric)
    }
}

impl From<CodeMathRubric> for AnyRubric {
    fn from(rubric: CodeMathRubric) -> Self {
        AnyRubric::CodeMath(rubric)
    }
}

impl From<ToolRubric> for AnyRubric {
    fn from(rubric: ToolRubric) -> Self {
        AnyRubric::Tool(rubric)
    }
}

impl From<SmolaToolRubric> for AnyRubric {
    fn from(rubric: SmolaToolRubric) -> Self {
        AnyRubric::Smola(rubric)
    }
}

impl From<JudgeRubric> for AnyRubric {
    fn from(rubric: JudgeRubric) -> Self {
        AnyRubric::Judge(rubric)
    }
}

impl From<RubricGroup> for AnyRubric {
    fn from(group: RubricGroup) -> Self {
        AnyRubric::Group(group)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_rubric_scores_zero() {
        let rubric = Rubric::new();
        let score = rubric.compute_reward("anything", "anything").await.unwrap();
        assert!((score - 0.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn exact_match_trims_both_sides() {
        let rubric = Rubric::exact_match();
        let score = rubric.compute_reward("  42\n", "42").await.unwrap();
        assert!((score - 1.0).abs() < 1e-9);
        let score = rubric.compute_reward("41", "42").await.unwrap();
        assert!((score - 0.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn weighted_average_over_metrics() {
        let rubric = Rubric::new()
            .with_metric(Metric::from_sync("always_right", 0.8, |_, _| Ok(1.0)))
            .with_metric(Metric::from_sync("always_wrong", 0.2, |_, _| Ok(0.0)));
        let score = rubric.compute_reward("x", "y").await.unwrap();
        assert!((score - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn zero_total_weight_scores_zero() {
        let rubric = Rubric::new().with_metric(Metric::from_sync("ignored", 0.0, |_, _| Ok(1.0)));
        let score = rubric.compute_reward("x", "y").await.unwrap();
        assert!((score - 0.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn failing_metric_aborts_scoring() {
        let rubric = Rubric::new()
            .with_metric(Metric::from_sync("fine", 0.5, |_, _| Ok(1.0)))
            .with_metric(Metric::from_sync("broken", 0.5, |_, _| {
                anyhow::bail!("no ground truth")
            }));
        let err = rubric.compute_reward("x", "y").await.unwrap_err();
        assert!(err.to_string().contains("metric 'broken' failed"));
    }

    #[tokio::test]
    async fn metric_lookup_by_name() {
        let rubric = Rubric::exact_match();
        assert!(rubric.metric("exact_match").is_some());
        assert!(rubric.metric("missing").is_none());
        assert_eq!(rubric.weights(), vec![1.0]);
    }
}
