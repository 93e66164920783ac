//! Weighted combination of several rubrics.

use std::sync::Arc;

use anyhow::Result;
use tracing::warn;

use crate::rubric::{AnyRubric, Metric, MetricFn, MetricFuture};

/// An ordered collection of named rubrics scored together.
///
/// Each member contributes its own score weighted by the sum of its metric
/// weights (1.0 for a rubric with no metrics). A member that fails is
/// skipped with a warning instead of failing the whole group.
#[derive(Debug, Clone, Default)]
pub struct RubricGroup {
    members: Vec<(String, AnyRubric)>,
    merge_weights: bool,
}

impl RubricGroup {
    /// Create an empty group. With `merge_weights`, [`metrics`](Self::metrics)
    /// deduplicates metrics shared between members (by function identity) and
    /// splits the group's total weight evenly across the deduplicated set.
    pub fn new(merge_weights: bool) -> Self {
        Self {
            members: Vec::new(),
            merge_weights,
        }
    }

    pub fn add_rubric(&mut self, name: impl Into<String>, rubric: impl Into<AnyRubric>) {
        self.members.push((name.into(), rubric.into()));
    }

    pub fn with_rubric(mut self, name: impl Into<String>, rubric: impl Into<AnyRubric>) -> Self {
        self.add_rubric(name, rubric);
        self
    }

    /// Look up a member by name.
    pub fn rubric(&self, name: &str) -> Option<&AnyRubric> {
        self.members
            .iter()
            .find(|(member, _)| member == name)
            .map(|(_, rubric)| rubric)
    }

    /// Member names, in insertion order.
    pub fn names(&self) -> Vec<&str> {
        self.members.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub async fn compute_reward(&self, response: &str, ground_truth: &str) -> Result<f64> {
        let mut total_score = 0.0;
        let mut total_weight = 0.0;
        for (name, rubric) in &self.members {
            // Boxed because groups can nest.
            let outcome = Box::pin(rubric.compute_reward(response, ground_truth)).await;
            let score = match outcome {
                Ok(score) => score,
                Err(err) => {
                    warn!(rubric = name.as_str(), error = %err, "rubric failed, skipping");
                    continue;
                }
            };
            let weights = rubric.weights();
            let weight = if weights.is_empty() {
                1.0
            } else {
                weights.iter().sum()
            };
            total_score += score * weight;
            total_weight += weight;
        }
        if total_weight > 0.0 {
            Ok(total_score / total_weight)
        } else {
            Ok(0.0)
        }
    }

    /// The group's combined metric list.
    ///
    /// Without weight merging this is the concatenation of every member's
    /// metrics. With merging, a metric appearing in several members is listed
    /// once and scored by averaging one run per occurrence.
    pub fn metrics(&self) -> Vec<Metric> {
        if !self.merge_weights {
            return self
                .members
                .iter()
                .flat_map(|(_, rubric)| rubric.metrics())
                .collect();
        }

        let mut entries: Vec<(Metric, usize)> = Vec::new();
        let mut total_weight = 0.0;
        for (_, rubric) in &self.members {
            for metric in rubric.metrics() {
                total_weight += metric.weight;
                let seen = entries
                    .iter()
                    .position(|(existing, _)| Arc::ptr_eq(&existing.func, &metric.func));
                match seen {
                    Some(index) => entries[index].1 += 1,
                    None => entries.push((metric, 1)),
                }
            }
        }
        if entries.is_empty() {
            return Vec::new();
        }

        let shared_weight = total_weight / entries.len() as f64;
        entries
            .into_iter()
            .map(|(metric, occurrences)| {
                let func = if occurrences > 1 {
                    merged_func(metric.func, occurrences)
                } else {
                    metric.func
                };
                Metric::new(metric.name, shared_weight, func)
            })
            .collect()
    }

    pub fn weights(&self) -> Vec<f64> {
        self.metrics().iter().map(|metric| metric.weight).collect()
    }
}

/// Average `copies` runs of a shared metric function; failed runs are
/// dropped, and a fully failed set scores 0.
fn merged_func(func: MetricFn, copies: usize) -> MetricFn {
    Arc::new(move |response, ground_truth| {
        let runs: Vec<MetricFuture> = (0..copies).map(|_| func(response, ground_truth)).collect();
        Box::pin(async move {
            let mut sum = 0.0;
            let mut succeeded = 0usize;
            for run in runs {
                if let Ok(score) = run.await {
                    sum += score;
                    succeeded += 1;
                }
            }
            if succeeded > 0 {
                Ok(sum / succeeded as f64)
            } else {
                Ok(0.0)
            }
        })
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
