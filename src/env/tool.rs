//! Tool-calling environment driven by XML `<tool>` blocks.
//!
//! Assistant turns carry a JSON tool call inside `<tool>` tags; the
//! environment executes the call against the registry and replies with the
//! outcome wrapped in `<result>` tags. The conversation ends once an
//! assistant turn carries a non-empty `<answer>` block.

use anyhow::Result;

use crate::config::EnvConfig;
use crate::dataset::Dataset;
use crate::env::{run_multi_turn, EnvCore, MultiTurnLogic, Prompt, Rollout, DEFAULT_MAX_TURNS};
use crate::model::prompt::{render_tool_prompt, DEFAULT_TOOL_PROMPT};
use crate::model::{ChatMessage, InferenceClient, Role, SamplingArgs};
use crate::parser::XmlParser;
use crate::rubric::ToolRubric;
use crate::tool::{execute_tool, format_tool_descriptions, parse_tool_call, AnyTool};

/// Cap on tool result text fed back into the conversation.
pub(crate) const MAX_RESULT_CHARS: usize = 1024;

/// Wrap environment feedback in the `<result>` tags the prompts advertise.
pub(crate) fn result_block(body: &str) -> String {
    format!("<result>\n{body}\n</result>")
}

/// Decode and execute one raw tool call. Failures come back as `Error:`
/// text the model can react to, never as errors.
pub(crate) async fn call_tool(tools: &[AnyTool], raw: &str, max_chars: usize) -> String {
    match parse_tool_call(raw) {
        Ok(call) => execute_tool(tools, &call, max_chars).await,
        Err(err) => format!(
            "Error: {err}. Please format your tool call as '{{\"name\": \"tool_name\", \"args\": {{\"arg1\": \"value1\"}}}}'"
        ),
    }
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// Multi-turn environment exposing a tool registry through `<tool>` calls.
#[derive(Debug, Clone)]
pub struct ToolEnv {
    core: EnvCore,
    parser: XmlParser,
    tools: Vec<AnyTool>,
    max_turns: usize,
}

impl ToolEnv {
    /// The system prompt (the config's, or the default tool template) has
    /// its `{tool_descriptions}` placeholder filled from the registry.
    /// A zero `max_turns` falls back to [`DEFAULT_MAX_TURNS`].
    pub fn new(mut config: EnvConfig, tools: Vec<AnyTool>, max_turns: usize) -> Result<Self> {
        let parser = XmlParser::new(&[&["think"], &["tool", "answer"]], "answer")?;

        let template = config
            .system_prompt
            .take()
            .filter(|prompt| !prompt.is_empty())
            .unwrap_or_else(|| DEFAULT_TOOL_PROMPT.to_string());
        config.system_prompt = Some(render_tool_prompt(
            &template,
            &format_tool_descriptions(&tools),
        ));

        let mut core = EnvCore::new(config);
        core.parser = Some(parser.clone().into());
        core.rubric = Some(ToolRubric::new(&tools, parser.clone()).into());

        Ok(Self {
            core,
            parser,
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

impl MultiTurnLogic for ToolEnv {
    type State = ();

    fn max_turns(&self) -> usize {
        self.max_turns
    }

    fn is_completed(&self, messages: &[ChatMessage], _state: &()) -> bool {
        messages.iter().any(|message| {
            message.role == Role::Assistant
                && self
                    .parser
                    .parse_fields(&message.content, true)
                    .get("answer")
                    .is_some_and(|answer| !answer.is_empty())
        })
    }

    async fn env_response(&self, messages: &[ChatMessage], _state: &mut ()) -> Result<ChatMessage> {
        let Some(last) = messages.last() else {
            anyhow::bail!("no messages to process");
        };
        if last.role != Role::Assistant {
            anyhow::bail!("last message must be from assistant");
        }

        let fields = self.parser.parse_fields(&last.content, true);
        let Some(raw_call) = fields.get("tool").filter(|raw| !raw.is_empty()) else {
            return Ok(ChatMessage::user(result_block(
                "No tool call found. Use <tool>{json}</tool> to call a tool.",
            )));
        };

        let result = call_tool(&self.tools, raw_call, MAX_RESULT_CHARS).await;
        Ok(ChatMessage::user(result_block(&result)))
    }

    async fn score_rollout(&self, response: &str, ground_truth: &str, _state: &()) -> Result<f64> {
        if response.is_empty() {
            return Ok(0.0);
        }
        match &self.core.rubric {
            Some(rubric) => rubric.compute_reward(response, ground_truth).await,
            None => Ok(0.0),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
