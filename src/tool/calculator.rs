//! Calculator tool backed by [`ExprEvaluator`].

use anyhow::Result;
use serde_json::{Map, Value};

use crate::tool::expr::{format_number, preprocess_expression, Expr, ExprEvaluator, FunctionTable};
use crate::tool::{ArgumentSchema, Tool, ToolSchema};

/// Evaluates mathematical expressions passed as the `expression` argument.
#[derive(Debug, Clone)]
pub struct Calculator {
    schema: ToolSchema,
    evaluator: ExprEvaluator,
}

impl Calculator {
    pub fn new() -> Self {
        let mut schema = ToolSchema {
            name: "calculate".to_string(),
            description: "Evaluate mathematical expressions. Supports basic arithmetic, trigonometry, logarithms, and more.".to_string(),
            args: Default::default(),
            returns: "The result of the mathematical expression as a number".to_string(),
            examples: vec![
                r#"{"name": "calculate", "args": {"expression": "2 + 2"}}"#.to_string(),
                r#"{"name": "calculate", "args": {"expression": "sqrt(16) + log(100)"}}"#.to_string(),
                r#"{"name": "calculate", "args": {"expression": "sin(pi/2) * cos(0)"}}"#.to_string(),
            ],
        };
        schema.args.insert(
            "expression".to_string(),
            ArgumentSchema {
                kind: "string".to_string(),
                description: "Mathematical expression to evaluate".to_string(),
                default: None,
                required: true,
            },
        );
        Self {
            schema,
            evaluator: ExprEvaluator::new(FunctionTable::calculator()),
        }
    }
}

impl Default for Calculator {
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for Calculator {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<Value> {
        let Some(raw) = args.get("expression") else {
            anyhow::bail!("missing required argument 'expression'");
        };
        let Some(expression) = raw.as_str() else {
            anyhow::bail!("expression must be a string");
        };

        let processed = preprocess_expression(expression);
        let parsed =
            Expr::parse(&processed).map_err(|err| anyhow::anyhow!("invalid expression: {err}"))?;
        let value = self
            .evaluator
            .eval(&parsed)
            .map_err(|err| anyhow::anyhow!("evaluation error: {err}"))?;

        if value.is_finite() {
            if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
                Ok(Value::from(value as i64))
            } else {
                Ok(Value::from(value))
            }
        } else {
            // NaN and infinities have no JSON number form.
            Ok(Value::from(format_number(value)))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn run(expression: &str) -> Result<Value> {
        let mut args = Map::new();
        args.insert("expression".to_string(), json!(expression));
        Calculator::new().execute(&args).await
    }

    #[tokio::test]
    async fn evaluates_to_integer_when_exact() {
        assert_eq!(run("2 + 2").await.unwrap(), json!(4));
        assert_eq!(run("sqrt(16) + log(100)").await.unwrap(), json!(6));
    }

    #[tokio::test]
    async fn keeps_fractional_results() {
        assert_eq!(run("10 / 4").await.unwrap(), json!(2.5));
    }

    #[tokio::test]
    async fn preprocesses_notation() {
        let value = run("2π").await.unwrap();
        let expected = 2.0 * std::f64::consts::PI;
        assert!((value.as_f64().unwrap() - expected).abs() < 1e-9);
    }

    #[tokio::test]
    async fn rejects_missing_or_non_string_expression() {
        let err = Calculator::new().execute(&Map::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "missing required argument 'expression'");

        let mut args = Map::new();
        args.insert("expression".to_string(), json!(7));
        let err = Calculator::new().execute(&args).await.unwrap_err();
        assert_eq!(err.to_string(), "expression must be a string");
    }

    #[tokio::test]
    async fn reports_parse_and_eval_errors_distinctly() {
        let err = run("2 +").await.unwrap_err();
        assert_eq!(err.to_string(), "invalid expression: unexpected end of expression");

        let err = run("nope(3)").await.unwrap_err();
        assert_eq!(err.to_string(), "evaluation error: unknown function 'nope'");
    }
}
