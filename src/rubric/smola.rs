//! Rubric for SmolaAgents-style tool transcripts.
//!
//! Text-only scoring works like [`ToolRubric`](super::ToolRubric); when the
//! environment recorded the actual tool executions, the per-tool usage
//! metrics are scored from those instead of re-parsing the response.

use std::collections::HashMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::parser::SmolaParser;
use crate::rubric::tool::extract_tool_json;
use crate::rubric::{Metric, Rubric};
use crate::tool::{AnyTool, Tool};

/// One tool invocation observed while running an environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolExecution {
    pub tool_name: String,
    pub args: Map<String, Value>,
    pub result: String,
    pub success: bool,
}

/// Scores Smola-format responses with `correct_answer` (weight 0.7, trimmed
/// exact match on the final field), `format` (weight 0.3, the parser's
/// format-adherence score), and one `{tool}_usage` metric (weight 0.1) per
/// registered tool.
#[derive(Debug, Clone)]
pub struct SmolaToolRubric {
    rubric: Rubric,
    parser: SmolaParser,
    include_usage: bool,
}

impl SmolaToolRubric {
    pub fn new(tools: &[AnyTool], parser: SmolaParser) -> Self {
        let mut rubric = Rubric::new();

        let answer_parser = parser.clone();
        rubric.add_metric(Metric::from_sync(
            "correct_answer",
            0.7,
            move |response, ground_truth| {
                let parsed = answer_parser.parse_structured(response, true);
                let candidate = answer_parser
                    .last_field_value(&parsed)
                    .filter(|value| !value.is_empty())
                    .unwrap_or(response);
                Ok(if candidate.trim() == ground_truth.trim() {
                    1.0
                } else {
                    0.0
                })
            },
        ));

        let format_parser = parser.clone();
        rubric.add_metric(Metric::from_sync("format", 0.3, move |response, _| {
            Ok(format_parser.follows_format(response))
        }));

        for tool in tools {
            let name = tool.name().to_string();
            let usage_parser = parser.clone();
            let usage_name = name.clone();
            rubric.add_metric(Metric::from_sync(
                format!("{name}_usage"),
                0.1,
                move |response, _| Ok(usage_score(&usage_parser, &usage_name, response)),
            ));
        }

        Self {
            rubric,
            parser,
            include_usage: true,
        }
    }

    /// Disable trace-derived usage scoring; text heuristics still apply.
    pub fn set_include_usage(&mut self, include: bool) {
        self.include_usage = include;
    }

    pub fn parser(&self) -> &SmolaParser {
        &self.parser
    }

    pub fn metrics(&self) -> &[Metric] {
        self.rubric.metrics()
    }

    pub async fn compute_reward(&self, response: &str, ground_truth: &str) -> Result<f64> {
        self.rubric.compute_reward(response, ground_truth).await
    }

    /// Score with observed executions: each `{tool}_usage` metric whose tool
    /// appears in `trace` takes the recorded success rate; everything else
    /// runs against the response text as usual.
    pub async fn compute_reward_with_trace(
        &self,
        response: &str,
        ground_truth: &str,
        trace: &[ToolExecution],
    ) -> Result<f64> {
        if trace.is_empty() || !self.include_usage {
            return self.compute_reward(response, ground_truth).await;
        }

        let mut totals: HashMap<&str, f64> = HashMap::new();
        let mut successes: HashMap<&str, f64> = HashMap::new();
        for execution in trace {
            *totals.entry(execution.tool_name.as_str()).or_default() += 1.0;
            if execution.success {
                *successes.entry(execution.tool_name.as_str()).or_default() += 1.0;
            }
        }

        let mut total_score = 0.0;
        let mut total_weight = 0.0;
        for metric in self.rubric.metrics() {
            let observed = metric
                .name
                .strip_suffix("_usage")
                .and_then(|tool| totals.get(tool).map(|total| (tool, *total)));
            let score = match observed {
                Some((tool, total)) => successes.get(tool).copied().unwrap_or(0.0) / total,
                None => metric.score(response, ground_truth).await?,
            };
            total_score += score * metric.weight;
            total_weight += metric.weight;
        }

        if total_weight > 0.0 {
            Ok(total_score / total_weight)
        } else {
            Ok(0.0)
        }
    }
}

/// Success ratio of `tool` calls found in the response text: decoded calls
/// naming the tool count toward the total, those carrying non-null args
/// count as successes. Zero when the tool is never called.
fn usage_score(parser: &SmolaParser, tool: &str, response: &str) -> f64 {
    let mut total = 0.0;
    let mut success = 0.0;
    for raw in extract_tool_calls(parser, response) {
        let Ok(Value::Object(call)) = serde_json::from_str::<Value>(&raw) else {
            continue;
        };
        if call.get("name").and_then(Value::as_str) != Some(tool) {
            continue;
        }
        total += 1.0;
        if call.get("args").is_some_and(|args| !args.is_null()) {
            success += 1.0;
        }
    }
    if total > 0.0 {
        success / total
    } else {
        0.0
    }
}

/// Tool-call JSON from both the parser's `tool` field and raw `<tool>`
/// blocks, deduplicated by content.
fn extract_tool_calls(parser: &SmolaParser, response: &str) -> Vec<String> {
    let parsed = parser.parse_structured(response, true);
    let mut calls: Vec<String> = Vec::new();
    for (key, value) in parsed.fields.iter() {
        if key == "tool" && !value.is_empty() {
            calls.push(value.to_string());
        }
    }
    for raw in extract_tool_json(response) {
        if !calls.iter().any(|existing| existing.as_str() == raw) {
            calls.push(raw.to_string());
        }
    }
    calls
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
