//! Rubric for math responses that compute via `<code>` blocks.

use anyhow::Result;

use crate::parser::XmlParser;
use crate::rubric::numeric::{compare_math_answers, extract_boxed_answer};
use crate::rubric::{Metric, Rubric};

const ERROR_INDICATORS: &[&str] = &[
    "error:",
    "traceback",
    "exception",
    "syntaxerror",
    "nameerror",
    "typeerror",
    "valueerror",
    "zerodivisionerror",
    "code execution error",
];

const SUCCESS_INDICATORS: &[&str] = &["code output:", "result:", "output:"];

/// One evaluated code block from an environment interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeExecution {
    pub code: String,
    pub output: String,
    pub success: bool,
}

/// Scores reasoning/code/answer responses: `correct_answer` (weight 0.7)
/// compares numerically, `code_execution` (weight 0.3) inspects the
/// transcript for execution success or error indicators.
///
/// When the environment recorded actual executions,
/// [`CodeMathRubric::compute_reward_with_trace`] replaces the indicator scan
/// with the measured success rate.
#[derive(Debug, Clone)]
pub struct CodeMathRubric {
    rubric: Rubric,
    parser: XmlParser,
}

impl CodeMathRubric {
    pub fn new() -> Result<Self> {
        let parser = XmlParser::new(&[&["reasoning"], &["code"], &["answer"]], "answer")?;
        let mut rubric = Rubric::new();

        let answer_parser = parser.clone();
        rubric.add_metric(Metric::from_sync(
            "correct_answer",
            0.7,
            move |response, ground_truth| {
                let fields = answer_parser.parse_fields(response, true);
                let candidate = match fields.get("answer") {
                    Some(answer) if !answer.is_empty() => answer,
                    _ => response,
                };
                Ok(if compare_math_answers(candidate, ground_truth) {
                    1.0
                } else {
                    0.0
                })
            },
        ));

        let execution_parser = parser.clone();
        rubric.add_metric(Metric::from_sync(
            "code_execution",
            0.3,
            move |response, _| Ok(execution_score(&execution_parser, response)),
        ));

        Ok(Self { rubric, parser })
    }

    pub fn parser(&self) -> &XmlParser {
        &self.parser
    }

    pub fn metrics(&self) -> &[Metric] {
        self.rubric.metrics()
    }

    pub async fn compute_reward(&self, response: &str, ground_truth: &str) -> Result<f64> {
        let ground_truth = extract_boxed_answer(ground_truth);
        self.rubric.compute_reward(response, ground_truth).await
    }

    /// Score with the recorded execution trace: the answer component keeps
    /// its 0.7 share of the base score while the execution component becomes
    /// the fraction of successful executions.
    pub async fn compute_reward_with_trace(
        &self,
        response: &str,
        ground_truth: &str,
        trace: &[CodeExecution],
    ) -> Result<f64> {
        let base = self.compute_reward(response, ground_truth).await?;
        if trace.is_empty() {
            return Ok(base);
        }
        let successes = trace.iter().filter(|exec| exec.success).count();
        let execution_score = successes as f64 / trace.len() as f64;
        let answer_component = base / (0.7 + 0.3) * 0.7;
        Ok(answer_component + execution_score * 0.3)
    }
}

/// Indicator scan over the raw transcript: no code scores 0.0, error
/// keywords score 0.0, success keywords score 1.0, and bare code with no
/// signal either way gets 0.5.
fn execution_score(parser: &XmlParser, response: &str) -> f64 {
    let fields = parser.parse_fields(response, true);
    if fields.get("code").map_or(true, str::is_empty) {
        return 0.0;
    }

    let lower = response.to_lowercase();
    let has_error = ERROR_INDICATORS
        .iter()
        .any(|indicator| lower.contains(indicator));
    let has_success = !has_error
        && SUCCESS_INDICATORS
            .iter()
            .any(|indicator| lower.contains(indicator));

    if has_success {
        1.0
    } else if has_error {
        0.0
    } else {
        0.5
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn response(code: &str, tail: &str) -> String {
        format!("<reasoning>compute</reasoning>\n<code>{code}</code>\n<answer>4</answer>{tail}")
    }

    #[tokio::test]
    async fn success_indicator_earns_full_execution_credit() {
        let rubric = CodeMathRubric::new().unwrap();
        let text = response("2 + 2", "\nCode output: 4");
        let score = rubric.compute_reward(&text, "4").await.unwrap();
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn error_indicator_zeroes_execution_credit() {
        let rubric = CodeMathRubric::new().unwrap();
        let text = response("1 / 0", "\nZeroDivisionError: division by zero");
        let score = rubric.compute_reward(&text, "4").await.unwrap();
        assert!((score - 0.7).abs() < 1e-9);
    }

    #[tokio::test]
    async fn bare_code_gets_partial_execution_credit() {
        let rubric = CodeMathRubric::new().unwrap();
        let text = response("2 + 2", "");
        let score = rubric.compute_reward(&text, "4").await.unwrap();
        assert!((score - (0.7 + 0.3 * 0.5)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn missing_code_scores_zero_execution() {
        let rubric = CodeMathRubric::new().unwrap();
        let text = "<reasoning>no code</reasoning>\n<answer>4</answer>";
        let score = rubric.compute_reward(text, "4").await.unwrap();
        assert!((score - 0.7).abs() < 1e-9);
    }

    #[tokio::test]
    async fn trace_replaces_indicator_scan() {
        let rubric = CodeMathRubric::new().unwrap();
        let text = response("2 + 2", "");
        // Base: 0.7 * 1.0 + 0.3 * 0.5 = 0.85.
        let trace = vec![
            CodeExecution {
                code: "2 + 2".to_string(),
                output: "4".to_string(),
                success: true,
            },
            CodeExecution {
                code: "1 / 0".to_string(),
                output: "Error".to_string(),
                success: false,
            },
        ];
        let score = rubric
            .compute_reward_with_trace(&text, "4", &trace)
            .await
            .unwrap();
        let expected = 0.85 * 0.7 + 0.5 * 0.3;
        assert!((score - expected).abs() < 1e-9);
    }

    #[tokio::test]
    async fn empty_trace_keeps_base_score() {
        let rubric = CodeMathRubric::new().unwrap();
        let text = response("2 + 2", "\nCode output: 4");
        let score = rubric
            .compute_reward_with_trace(&text, "4", &[])
            .await
            .unwrap();
        assert!((score - 1.0).abs() < 1e-9);
    }
}
