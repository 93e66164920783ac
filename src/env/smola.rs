//! SmolaAgents-style tool environment.
//!
//! Same conversation shape as [`ToolEnv`](super::ToolEnv), but every tool
//! invocation is recorded as a [`ToolExecution`] so the rubric can score
//! observed success rates instead of re-parsing the response text.

use anyhow::Result;
use serde_json::{Map, Value};

use crate::config::EnvConfig;
use crate::dataset::Dataset;
use crate::env::tool::{call_tool, result_block, MAX_RESULT_CHARS};
use crate::env::{run_multi_turn, EnvCore, MultiTurnLogic, Prompt, Rollout, DEFAULT_MAX_TURNS};
use crate::model::prompt::{render_tool_prompt, DEFAULT_SMOLA_PROMPT};
use crate::model::{ChatMessage, InferenceClient, Role, SamplingArgs};
use crate::parser::SmolaParser;
use crate::rubric::{SmolaToolRubric, ToolExecution};
use crate::tool::{format_tool_descriptions, AnyTool};

/// Conversation state for one Smola rollout.
#[derive(Debug, Clone, Default)]
pub struct SmolaState {
    /// Tool invocations observed so far, in call order.
    pub executions: Vec<ToolExecution>,
    /// Assistant turns that carried a tool call.
    pub tool_steps: usize,
}

/// Tool environment that scores against the recorded execution trace.
#[derive(Debug, Clone)]
pub struct SmolaToolEnv {
    core: EnvCore,
    parser: SmolaParser,
    rubric: SmolaToolRubric,
    tools: Vec<AnyTool>,
    max_turns: usize,
}

impl SmolaToolEnv {
    pub fn new(mut config: EnvConfig, tools: Vec<AnyTool>, max_turns: usize) -> Result<Self> {
        let parser = SmolaParser::new(&[&["think"], &["tool"], &["answer"]])?;

        let template = config
            .system_prompt
            .take()
            .filter(|prompt| !prompt.is_empty())
            .unwrap_or_else(|| DEFAULT_SMOLA_PROMPT.to_string());
        config.system_prompt = Some(render_tool_prompt(
            &template,
            &format_tool_descriptions(&tools),
        ));

        let rubric = SmolaToolRubric::new(&tools, parser.clone());
        let mut core = EnvCore::new(config);
        core.parser = Some(parser.clone().into());
        core.rubric = Some(rubric.clone().into());

        Ok(Self {
            core,
            parser,
            rubric,
            tools,
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

    pub fn tools(&self) -> &[AnyTool] {
        &self.tools
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

impl MultiTurnLogic for SmolaToolEnv {
    type State = SmolaState;

    fn max_turns(&self) -> usize {
        self.max_turns
    }

    fn is_completed(&self, messages: &[ChatMessage], _state: &SmolaState) -> bool {
        messages.iter().any(|message| {
            message.role == Role::Assistant
                && self
                    .parser
                    .parse_structured(&message.content, true)
                    .fields
                    .get("answer")
                    .is_some_and(|answer| !answer.is_empty())
        })
    }

    async fn env_response(
        &self,
        messages: &[ChatMessage],
        state: &mut SmolaState,
    ) -> Result<ChatMessage> {
        let Some(last) = messages.last() else {
            anyhow::bail!("no messages to process");
        };
        if last.role != Role::Assistant {
            anyhow::bail!("last message must be from assistant");
        }

        let parsed = self.parser.parse_structured(&last.content, true);
        let Some(raw_call) = parsed.fields.get("tool").filter(|raw| !raw.is_empty()) else {
            return Ok(ChatMessage::user(result_block(
                "No tool call found. Use <tool>{json}</tool> to call a tool.",
            )));
        };

        let result = call_tool(&self.tools, raw_call, MAX_RESULT_CHARS).await;

        // Trace metadata comes from the decoded call when the JSON was
        // valid; a call that failed to decode is recorded as a failure.
        let (tool_name, args, decoded) = match &parsed.tool_json {
            Some(call) => (
                call.get("name")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
                call.get("args")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default(),
                true,
            ),
            None => ("unknown".to_string(), Map::new(), false),
        };
        state.executions.push(ToolExecution {
            tool_name,
            args,
            result: result.clone(),
            success: decoded && !result.starts_with("Error:"),
        });
        state.tool_steps += 1;

        Ok(ChatMessage::user(result_block(&result)))
    }

    async fn score_rollout(
        &self,
        response: &str,
        ground_truth: &str,
        state: &SmolaState,
    ) -> Result<f64> {
        tracing::debug!(
            tool_steps = state.tool_steps,
            executions = state.executions.len(),
            "scoring smola rollout"
        );
        self.rubric
            .compute_reward_with_trace(response, ground_truth, &state.executions)
            .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScriptedClient;
    use crate::tool::Calculator;

    fn env() -> SmolaToolEnv {
        SmolaToolEnv::new(EnvConfig::default(), vec![Calculator::new().into()], 5).unwrap()
    }

    fn tool_call_message() -> ChatMessage {
        ChatMessage::assistant(
            "<think>\nUse the calculator.\n</think>\n<tool>\n{\"name\": \"calculate\", \"args\": {\"expression\": \"2 + 2\"}}\n</tool>",
        )
    }

    #[tokio::test]
    async fn test_smola_loop_scores_from_trace() {
        let env = env();
        let client = ScriptedClient::new([
            "<think>\nUse the calculator.\n</think>\n<tool>\n{\"name\": \"calculate\", \"args\": {\"expression\": \"2 + 2\"}}\n</tool>",
            "<think>\nDone.\n</think>\n<answer>\n4\n</answer>",
        ]);
        let prompt = Prompt::Chat(vec![ChatMessage::user("What is 2 + 2?")]);

        let rollout = env
            .rollout(&client, "m", &prompt, "4", &SamplingArgs::default())
            .await
            .unwrap();

        assert_eq!(rollout.messages.len(), 4);
        assert_eq!(rollout.messages[2].content, "<result>\n4\n</result>");
        // correct answer, 2 of 3 fields in the final message, and a fully
        // successful calculate trace.
        let format_score = 0.4 * (2.0 / 3.0) + 0.6;
        let expected = (0.7 + 0.3 * format_score + 0.1) / 1.1;
        assert!((rollout.score - expected).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_env_response_records_execution() {
        let env = env();
        let mut state = SmolaState::default();
        let messages = vec![ChatMessage::user("What is 2 + 2?"), tool_call_message()];

        let reply = env.env_response(&messages, &mut state).await.unwrap();

        assert_eq!(reply.content, "<result>\n4\n</result>");
        assert_eq!(state.tool_steps, 1);
        assert_eq!(state.executions.len(), 1);
        let execution = &state.executions[0];
        assert_eq!(execution.tool_name, "calculate");
        assert_eq!(
            execution.args.get("expression"),
            Some(&Value::String("2 + 2".to_string()))
        );
        assert_eq!(execution.result, "4");
        assert!(execution.success);
    }

    #[tokio::test]
    async fn test_undecodable_call_is_recorded_as_failure() {
        let env = env();
        let mut state = SmolaState::default();
        let messages = vec![ChatMessage::assistant("<tool>\nnot json at all\n</tool>")];

        let reply = env.env_response(&messages, &mut state).await.unwrap();

        assert!(reply.content.starts_with("<result>\nError: invalid JSON:"));
        let execution = &state.executions[0];
        assert_eq!(execution.tool_name, "unknown");
        assert!(execution.args.is_empty());
        assert!(!execution.success);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_recorded_as_failure() {
        let env = env();
        let mut state = SmolaState::default();
        let messages = vec![ChatMessage::assistant(
            "<tool>\n{\"name\": \"translate\", \"args\": {}}\n</tool>",
        )];

        let reply = env.env_response(&messages, &mut state).await.unwrap();

        assert_eq!(
            reply.content,
            "<result>\nError: Unknown tool 'translate'. Available tools: calculate\n</result>"
        );
        let execution = &state.executions[0];
        assert_eq!(execution.tool_name, "translate");
        assert!(!execution.success);
    }

    #[tokio::test]
    async fn test_missing_tool_call_leaves_trace_untouched() {
        let env = env();
        let mut state = SmolaState::default();
        let messages = vec![ChatMessage::assistant("Let me think about this.")];

        let reply = env.env_response(&messages, &mut state).await.unwrap();

        assert_eq!(
            reply.content,
            "<result>\nNo tool call found. Use <tool>{json}</tool> to call a tool.\n</result>"
        );
        assert!(state.executions.is_empty());
        assert_eq!(state.tool_steps, 0);
    }
}
