//! Rubric for math responses in `<think>`/`<answer>` format.

use anyhow::Result;

use crate::parser::XmlParser;
use crate::rubric::numeric::{compare_math_answers, extract_boxed_answer};
use crate::rubric::{Metric, Rubric};

/// Scores math responses: `correct_answer` (weight 0.8) compares the
/// extracted answer numerically against the ground truth, `format`
/// (weight 0.2) rewards well-formed think/answer structure.
///
/// Ground truths may carry a `\boxed{..}` wrapper, which is stripped before
/// comparison.
#[derive(Debug, Clone)]
pub struct MathRubric {
    rubric: Rubric,
    parser: XmlParser,
}

impl MathRubric {
    pub fn new() -> Result<Self> {
        let parser = XmlParser::new(&[&["think"], &["answer"]], "answer")?;
        let mut rubric = Rubric::new();

        let answer_parser = parser.clone();
        rubric.add_metric(Metric::from_sync(
            "correct_answer",
            0.8,
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

        let format_parser = parser.clone();
        rubric.add_metric(Metric::from_sync("format", 0.2, move |response, _| {
            Ok(format_score(&format_parser, response))
        }));

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
}

/// Partial credit for structure: 0.4 per non-empty `think`/`answer` field,
/// plus 0.2 when both declared fields were actually captured.
fn format_score(parser: &XmlParser, response: &str) -> f64 {
    let fields = parser.parse_fields(response, true);
    let mut score = 0.0;
    if fields.get("think").is_some_and(|v| !v.is_empty()) {
        score += 0.4;
    }
    if fields.get("answer").is_some_and(|v| !v.is_empty()) {
        score += 0.4;
    }
    if parser.has_field("think") && parser.has_field("answer") && fields.len() >= 2 {
        score += 0.2;
    }
    score
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn full_credit_for_correct_formatted_response() {
        let rubric = MathRubric::new().unwrap();
        let response = "<think>\n15% of 80 is 12.\n</think>\n<answer>\n12\n</answer>";
        let score = rubric.compute_reward(response, "12").await.unwrap();
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn boxed_ground_truth_is_unwrapped() {
        let rubric = MathRubric::new().unwrap();
        let response = "<think>sum</think>\n<answer>42</answer>";
        let score = rubric.compute_reward(response, "\\boxed{42}").await.unwrap();
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn bare_answer_earns_correctness_only() {
        let rubric = MathRubric::new().unwrap();
        let score = rubric.compute_reward("12", "12").await.unwrap();
        assert!((score - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn wrong_answer_keeps_format_credit() {
        let rubric = MathRubric::new().unwrap();
        let response = "<think>guess</think>\n<answer>11</answer>";
        let score = rubric.compute_reward(response, "12").await.unwrap();
        assert!((score - 0.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn numeric_formatting_differences_match() {
        let rubric = MathRubric::new().unwrap();
        let response = "<think>t</think>\n<answer>1,000</answer>";
        let score = rubric.compute_reward(response, "1000").await.unwrap();
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn think_only_response_gets_partial_format() {
        let rubric = MathRubric::new().unwrap();
        let response = "<think>no answer given</think>";
        let score = rubric.compute_reward(response, "12").await.unwrap();
        // correct_answer falls back to the whole text and misses; format
        // earns 0.4 for the think field alone.
        assert!((score - 0.2 * 0.4).abs() < 1e-9);
    }
}
