//! Math environment that evaluates `<code>` blocks line by line.
//!
//! Assistant turns carry arithmetic in `<code>` tags; the environment
//! evaluates each line with the expression evaluator (assignments bind
//! variables for later lines) and feeds the results back. Every evaluated
//! block is recorded as a [`CodeExecution`] for trace-aware scoring.

use anyhow::Result;

use crate::config::EnvConfig;
use crate::dataset::Dataset;
use crate::env::{run_multi_turn, EnvCore, MultiTurnLogic, Prompt, Rollout, DEFAULT_MAX_TURNS};
use crate::model::prompt::CODE_MATH_PROMPT;
use crate::model::{ChatMessage, InferenceClient, Role, SamplingArgs};
use crate::parser::XmlParser;
use crate::rubric::{CodeExecution, CodeMathRubric};
use crate::tool::expr::{format_number, preprocess_expression};
use crate::tool::{ExprEvaluator, FunctionTable};

/// Conversation state for one code-math rollout.
#[derive(Debug, Clone, Default)]
pub struct CodeMathState {
    /// Evaluated code blocks, in turn order.
    pub executions: Vec<CodeExecution>,
}

/// Multi-turn environment backed by the expression evaluator.
#[derive(Debug, Clone)]
pub struct CodeMathEnv {
    core: EnvCore,
    parser: XmlParser,
    rubric: CodeMathRubric,
    max_turns: usize,
}

impl CodeMathEnv {
    pub fn new(mut config: EnvConfig, max_turns: usize) -> Result<Self> {
        if config.system_prompt.as_deref().map_or(true, str::is_empty) {
            config.system_prompt = Some(CODE_MATH_PROMPT.to_string());
        }

        let parser = XmlParser::new(&[&["reasoning"], &["code"], &["answer"]], "answer")?;
        let rubric = CodeMathRubric::new()?;
        let mut core = EnvCore::new(config);
        core.parser = Some(parser.clone().into());
        core.rubric = Some(rubric.clone().into());

        Ok(Self {
            core,
            parser,
            rubric,
            max_turns: if max_turns == 0 {
                DEFAULT_MAX_TURNS
            } else {
                max_turns
            },
        })
    }

    pub fn with_dataset(mut self, dataset: Dataset) -> Self {
        self.core.dataset = Some(dataset);
        self
    }

    pub fn with_eval_dataset(mut self, dataset: Dataset) -> Self {
        self.core.eval_dataset = Some(dataset);
        self
    }

    pub fn core(&self) -> &EnvCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut EnvCore {
        &mut self.core
    }

    pub async fn rollout<C: InferenceClient>(
        &self,
        client: &C,
        model: &str,
        prompt: &Prompt,
        answer: &str,
        sampling: &SamplingArgs,
    ) -> Result<Rollout> {
        run_multi_turn(self, client, model, prompt, answer, sampling).await
    }
}

impl MultiTurnLogic for CodeMathEnv {
    type State = CodeMathState;

    fn max_turns(&self) -> usize {
        self.max_turns
    }

    fn is_completed(&self, messages: &[ChatMessage], _state: &CodeMathState) -> bool {
        messages.iter().any(|message| {
            message.role == Role::Assistant
                && self
                    .parser
                    .parse_fields(&message.content, true)
                    .get("answer")
                    .is_some_and(|answer| !answer.is_empty())
        })
    }

    async fn env_response(
        &self,
        messages: &[ChatMessage],
        state: &mut CodeMathState,
    ) -> Result<ChatMessage> {
        let Some(last) = messages.last() else {
            anyhow::bail!("no messages to process");
        };
        if last.role != Role::Assistant {
            anyhow::bail!("last message must be from assistant");
        }

        let fields = self.parser.parse_fields(&last.content, true);
        let Some(code) = fields.get("code").filter(|code| !code.is_empty()) else {
            return Ok(ChatMessage::user(
                "No mathematical expressions found. Please provide expressions or calculations in <code> tags.",
            ));
        };

        let (output, success) = evaluate_lines(code);
        let response = if success {
            format!("Evaluation results:\n{output}")
        } else {
            format!("Evaluation error:\n{output}")
        };

        state.executions.push(CodeExecution {
            code: code.to_string(),
            output,
            success,
        });

        Ok(ChatMessage::user(response))
    }

    async fn score_rollout(
        &self,
        response: &str,
        ground_truth: &str,
        state: &CodeMathState,
    ) -> Result<f64> {
        self.rubric
            .compute_reward_with_trace(response, ground_truth, &state.executions)
            .await
    }
}

/// Evaluate a code block line by line.
///
/// Blank lines and `#`/`//` comments are skipped. A line containing a single
/// `=` is an assignment: the right-hand side is evaluated and bound so later
/// lines can use it. Anything else is evaluated standalone. A failing line
/// is reported inline and flips the overall success flag, but evaluation
/// continues.
fn evaluate_lines(code: &str) -> (String, bool) {
    let mut evaluator = ExprEvaluator::new(FunctionTable::code_math());
    let mut results = Vec::new();
    let mut success = true;

    for line in code.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
            continue;
        }

        if line.contains('=') && !line.contains("==") {
            if let Some((name, expr)) = line.split_once('=') {
                let name = name.trim();
                let expr = expr.trim();
                match evaluator.evaluate(&preprocess_expression(expr)) {
                    Ok(value) => {
                        evaluator.set_variable(name, value);
                        results.push(format!("{name} = {}", format_number(value)));
                    }
                    Err(err) => {
                        results.push(format!("Error in '{line}': {err}"));
                        success = false;
                    }
                }
                continue;
            }
        }

        match evaluator.evaluate(&preprocess_expression(line)) {
            Ok(value) => results.push(format!("{line} = {}", format_number(value))),
            Err(err) => {
                results.push(format!("Error in '{line}': {err}"));
                success = false;
            }
        }
    }

    (results.join("\n"), success)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
