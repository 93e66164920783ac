//! Routing environment that serves several tasks behind one surface.
//!
//! Members are registered under task names, and ground truths carry a
//! `task:answer` prefix: rollouts are routed to the named member, combined
//! datasets label every item with its task (and prefix its answer), and
//! member metrics are wrapped to score 0.0 for other tasks' rollouts. A
//! ground truth without a prefix belongs to the first registered member.

use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;

use crate::config::EnvConfig;
use crate::dataset::Dataset;
use crate::env::{AnyEnv, EnvCore, Prompt, Rollout};
use crate::model::{InferenceClient, SamplingArgs};
use crate::rubric::{Metric, MetricFn};

/// A named collection of environments routed by task.
#[derive(Debug, Clone)]
pub struct EnvGroup {
    core: EnvCore,
    /// Members in registration order; the first is the default task.
    envs: Vec<(String, AnyEnv)>,
}

impl EnvGroup {
    pub fn new(config: EnvConfig) -> Self {
        Self {
            core: EnvCore::new(config),
            envs: Vec::new(),
        }
    }

    pub fn add_env(&mut self, name: impl Into<String>, env: impl Into<AnyEnv>) {
        self.envs.push((name.into(), env.into()));
    }

    pub fn with_env(mut self, name: impl Into<String>, env: impl Into<AnyEnv>) -> Self {
        self.add_env(name, env);
        self
    }

    pub fn env(&self, name: &str) -> Option<&AnyEnv> {
        self.envs
            .iter()
            .find(|(registered, _)| registered == name)
            .map(|(_, env)| env)
    }

    /// Registered task names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.envs.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn core(&self) -> &EnvCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut EnvCore {
        &mut self.core
    }

    /// Split a `task:answer` ground truth. Without a prefix, the task
    /// defaults to the first registered member.
    fn parse_task_answer<'a>(&'a self, answer: &'a str) -> (&'a str, &'a str) {
        match answer.split_once(':') {
            Some((task, actual)) => (task, actual),
            None => match self.envs.first() {
                Some((name, _)) => (name.as_str(), answer),
                None => ("", answer),
            },
        }
    }

    /// Route one rollout to the member owning the ground truth's task.
    pub async fn rollout<C: InferenceClient>(
        &self,
        client: &C,
        model: &str,
        prompt: &Prompt,
        answer: &str,
        sampling: &SamplingArgs,
    ) -> Result<Rollout> {
        let (task, actual) = self.parse_task_answer(answer);
        let Some((_, env)) = self.envs.iter().find(|(name, _)| name.as_str() == task) else {
            anyhow::bail!("unknown task: {task}");
        };
        // Boxed because groups can nest.
        Box::pin(env.rollout(client, model, prompt, actual, sampling)).await
    }

    /// The members' training datasets combined, task-labeled, and sampled.
    pub fn dataset(&self, n: usize, seed: u64) -> Option<Dataset> {
        self.combined(n, seed, |env| env.dataset(0, seed))
    }

    /// The members' evaluation datasets, combined like [`EnvGroup::dataset`].
    pub fn eval_dataset(&self, n: usize, seed: u64) -> Option<Dataset> {
        self.combined(n, seed, |env| env.eval_dataset(0, seed))
    }

    fn combined(
        &self,
        n: usize,
        seed: u64,
        member_dataset: impl Fn(&AnyEnv) -> Option<Dataset>,
    ) -> Option<Dataset> {
        let mut parts = Vec::new();
        for (name, env) in &self.envs {
            let Some(dataset) = member_dataset(env) else {
                continue;
            };
            let labeled = dataset.map(|mut item| {
                let prefixed = item.answer().map(|answer| format!("{name}:{answer}"));
                if let Some(prefixed) = prefixed {
                    item.insert("answer", Value::String(prefixed));
                }
                item.insert("task", Value::String(name.clone()));
                item
            });
            parts.push(labeled);
        }

        if parts.is_empty() {
            return None;
        }
        let combined = Dataset::concatenate(&parts);
        if n > 0 && n < combined.len() {
            let indices: Vec<usize> = (0..n).collect();
            Some(combined.shuffle(seed).select(&indices))
        } else {
            Some(combined)
        }
    }

    /// Every member's metrics, wrapped with task routing: a metric scores
    /// its member's rollouts normally and everyone else's as 0.0.
    pub fn metrics(&self) -> Vec<Metric> {
        let mut metrics = Vec::new();
        for (name, env) in &self.envs {
            for metric in env.metrics() {
                metrics.push(self.wrap_metric(name, metric));
            }
        }
        metrics
    }

    /// The weights of [`EnvGroup::metrics`], in the same order.
    pub fn weights(&self) -> Vec<f64> {
        self.metrics().iter().map(|metric| metric.weight).collect()
    }

    fn wrap_metric(&self, env_name: &str, metric: Metric) -> Metric {
        let env_name = env_name.to_string();
        let default_task = self
            .envs
            .first()
            .map(|(name, _)| name.clone())
            .unwrap_or_default();
        let inner = Arc::clone(&metric.func);
        let func: MetricFn = Arc::new(move |response, ground_truth| {
            let (task, actual) = match ground_truth.split_once(':') {
                Some(split) => split,
                None => (default_task.as_str(), ground_truth),
            };
            let routed = (task == env_name).then(|| inner(response, actual));
            Box::pin(async move {
                match routed {
                    Some(future) => future.await,
                    None => Ok(0.0),
                }
            })
        });
        Metric::new(metric.name, metric.weight, func)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
