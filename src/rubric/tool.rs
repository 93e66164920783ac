//! Rubric for XML-style tool-use transcripts.

use anyhow::Result;
use serde_json::Value;

use crate::parser::XmlParser;
use crate::rubric::{Metric, Rubric};
use crate::tool::{AnyTool, Tool};

/// Scores tool-calling responses with three metrics: `correct_answer`
/// (weight 0.6, trimmed exact match on the extracted answer), `format`
/// (weight 0.2, per-message structure credit), and `tool_usage`
/// (weight 0.2, whether calls name registered tools with arguments).
#[derive(Debug, Clone)]
pub struct ToolRubric {
    rubric: Rubric,
    parser: XmlParser,
}

impl ToolRubric {
    pub fn new(tools: &[AnyTool], parser: XmlParser) -> Self {
        let mut rubric = Rubric::new();

        let answer_parser = parser.clone();
        rubric.add_metric(Metric::from_sync(
            "correct_answer",
            0.6,
            move |response, ground_truth| {
                let fields = answer_parser.parse_fields(response, true);
                let candidate = match fields.get("answer") {
                    Some(answer) if !answer.is_empty() => answer,
                    _ => response,
                };
                Ok(if candidate.trim() == ground_truth.trim() {
                    1.0
                } else {
                    0.0
                })
            },
        ));

        let format_parser = parser.clone();
        rubric.add_metric(Metric::from_sync("format", 0.2, move |response, _| {
            Ok(format_score(&format_parser, response))
        }));

        let tool_names: Vec<String> = tools.iter().map(|tool| tool.name().to_string()).collect();
        rubric.add_metric(Metric::from_sync("tool_usage", 0.2, move |response, _| {
            Ok(usage_score(&tool_names, response))
        }));

        Self { rubric, parser }
    }

    pub fn parser(&self) -> &XmlParser {
        &self.parser
    }

    pub fn metrics(&self) -> &[Metric] {
        self.rubric.metrics()
    }

    pub async fn compute_reward(&self, response: &str, ground_truth: &str) -> Result<f64> {
        self.rubric.compute_reward(response, ground_truth).await
    }
}

/// Per-message format credit, averaged over `\n---\n`-separated messages:
/// 0.3 for think tags, 0.4 for a tool or answer block, 0.3 for parseable
/// structure with small bonuses for non-empty fields, capped at 1.0.
fn format_score(parser: &XmlParser, response: &str) -> f64 {
    let messages: Vec<&str> = response.split("\n---\n").collect();
    let mut total = 0.0;
    for message in &messages {
        let mut score: f64 = 0.0;
        if message.contains("<think>") && message.contains("</think>") {
            score += 0.3;
        }
        let has_tool = message.contains("<tool>") && message.contains("</tool>");
        let has_answer = message.contains("<answer>") && message.contains("</answer>");
        if has_tool || has_answer {
            score += 0.4;
        }

        let fields = parser.parse_fields(message, true);
        score += 0.3;
        if fields.get("think").is_some_and(|v| !v.is_empty()) {
            score += 0.1;
        }
        if fields.get("tool").is_some_and(|v| !v.is_empty())
            || fields.get("answer").is_some_and(|v| !v.is_empty())
        {
            score += 0.1;
        }

        total += score.min(1.0);
    }
    total / messages.len() as f64
}

/// 0.5 when no tool is called at all; otherwise 1.0 as soon as one call
/// names a registered tool and carries non-null args, 0.0 when none do.
fn usage_score(tool_names: &[String], response: &str) -> f64 {
    let calls = extract_tool_json(response);
    if calls.is_empty() {
        return 0.5;
    }
    for raw in calls {
        let Ok(Value::Object(call)) = serde_json::from_str::<Value>(raw) else {
            continue;
        };
        let Some(name) = call.get("name").and_then(Value::as_str) else {
            continue;
        };
        if name.is_empty() {
            continue;
        }
        if tool_names.iter().any(|registered| registered == name)
            && call.get("args").is_some_and(|args| !args.is_null())
        {
            return 1.0;
        }
    }
    0.0
}

/// All non-empty `<tool>..</tool>` bodies in order of appearance.
pub(crate) fn extract_tool_json(response: &str) -> Vec<&str> {
    let mut calls = Vec::new();
    for part in response.split("<tool>").skip(1) {
        if let Some(end) = part.find("</tool>") {
            if end > 0 {
                let body = part[..end].trim();
                if !body.is_empty() {
                    calls.push(body);
                }
            }
        }
    }
    calls
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::Calculator;

    fn rubric() -> ToolRubric {
        let parser = XmlParser::new(&[&["think"], &["tool", "answer"]], "answer").unwrap();
        ToolRubric::new(&[Calculator::new().into()], parser)
    }

    #[tokio::test]
    async fn correct_answer_with_valid_tool_call_scores_full() {
        let rubric = rubric();
        let response = "<think>\nUse the calculator.\n</think>\n<tool>\n{\"name\": \"calculate\", \"args\": {\"expression\": \"2 + 2\"}}\n</tool>\n---\n<think>\nDone.\n</think>\n<answer>\n4\n</answer>";
        let score = rubric.compute_reward(response, "4").await.unwrap();
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn no_tool_call_earns_half_usage_credit() {
        let rubric = rubric();
        let response = "<think>\nNo tool needed.\n</think>\n<answer>\n4\n</answer>";
        let score = rubric.compute_reward(response, "4").await.unwrap();
        // correct 0.6 + format 0.2 + usage 0.5 * 0.2.
        assert!((score - 0.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn unregistered_tool_zeroes_usage() {
        let rubric = rubric();
        let response = "<think>\nt\n</think>\n<tool>\n{\"name\": \"translate\", \"args\": {}}\n</tool>";
        let score = rubric.compute_reward(response, "4").await.unwrap();
        // correct misses (whole text), format is full, usage 0.
        assert!((score - 0.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn null_args_do_not_count_as_valid_usage() {
        let rubric = rubric();
        let response = "<tool>\n{\"name\": \"calculate\", \"args\": null}\n</tool>";
        let score = rubric.compute_reward(response, "4").await.unwrap();
        // format: tool tags 0.4 + parse 0.3 + non-empty tool field 0.1 = 0.8.
        assert!((score - 0.8 * 0.2).abs() < 1e-9);
    }

    #[test]
    fn tool_json_extraction_skips_empty_blocks() {
        let calls = extract_tool_json("<tool>{\"name\":\"a\"}</tool> text <tool>  </tool><tool>{\"name\":\"b\"}</tool>");
        assert_eq!(calls, vec!["{\"name\":\"a\"}", "{\"name\":\"b\"}"]);
    }
}
