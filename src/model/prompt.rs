//! System prompts and few-shot examples for the built-in environments.
//!
//! Tool-using prompts carry a `{tool_descriptions}` placeholder that
//! [`render_tool_prompt`] fills in from the registered tool schemas, so the
//! same template works for any tool set.

use crate::model::api::ChatMessage;

/// Placeholder replaced with formatted tool descriptions in tool prompts.
pub const TOOL_DESCRIPTIONS_PLACEHOLDER: &str = "{tool_descriptions}";

// ---------------------------------------------------------------------------
// System prompts
// ---------------------------------------------------------------------------

/// Basic reasoning/answer format.
pub const SIMPLE_PROMPT: &str = r#"Please provide your reasoning followed by your answer.

Format your response as:
<reasoning>
Your step-by-step reasoning here
</reasoning>
<answer>
Your final answer here
</answer>"#;

/// Math problem-solving with Python code execution.
pub const CODE_PROMPT: &str = r#"You are a helpful assistant that solves math problems by writing Python code.

For each problem:
1. First, think through the problem step by step
2. Write Python code to solve it
3. Provide the final answer based on the code output

Format your response as:
<reasoning>
Explain your approach
</reasoning>
<code>
# Your Python code here
</code>
<answer>
Your final answer
</answer>

The code environment will execute your Python code and provide the output."#;

/// Default system prompt for tool-calling environments.
pub const DEFAULT_TOOL_PROMPT: &str = r#"You are a helpful assistant with access to tools. You can use tools by wrapping your tool calls in XML tags.

Available tools:
{tool_descriptions}

To use a tool, format your request as:
<think>
...your reasoning...
</think>
<tool>
{"name": "tool_name", "args": {"arg1": "value1", "arg2": "value2"}}
</tool>

After receiving the tool result, you can either call another tool or provide your final answer:
<think>
...your reasoning...
</think>
<answer>
...your final answer...
</answer>

Always think before using tools or providing answers."#;

/// Default system prompt for SmolaAgents-style tool environments.
pub const DEFAULT_SMOLA_PROMPT: &str = r#"You are a helpful assistant that uses tools to solve problems.

You have access to the following tools:
{tool_descriptions}

You must use the tools by outputting a specific XML format:
<tool>
{"name": "tool_name", "args": {"parameter": "value"}}
</tool>

The result will be provided in <result> tags.

Always think step-by-step before using tools or providing answers."#;

/// Math-specific SmolaAgents prompt.
pub const MATH_SMOLA_PROMPT: &str = r#"You are a mathematical problem solver with access to tools.

Available tools:
{tool_descriptions}

For each problem:
1. Analyze what needs to be calculated
2. Use tools as needed to perform calculations
3. Provide the final numerical answer

Format:
<think>
Analysis and approach
</think>
<tool>
{"name": "tool_name", "args": {"parameter": "value"}}
</tool>
...
<answer>
Final numerical answer only
</answer>"#;

/// Default system prompt for expression-evaluating math environments.
pub const CODE_MATH_PROMPT: &str = r#"You are a helpful assistant that solves math problems by writing mathematical expressions.

For each problem:
1. First, think through the problem step by step
2. Write mathematical expressions or step-by-step calculations to solve it
3. Provide the final answer based on your calculations

Format your response as:
<reasoning>
Explain your approach
</reasoning>
<code>
# Mathematical expressions or calculations
# e.g., 2 + 2 = 4
# e.g., sqrt(16) = 4
# e.g., sin(pi/2) = 1
</code>
<answer>
Your final answer
</answer>

The system will evaluate your mathematical expressions."#;

/// Fill the `{tool_descriptions}` placeholder in a prompt template.
pub fn render_tool_prompt(template: &str, tool_descriptions: &str) -> String {
    template.replace(TOOL_DESCRIPTIONS_PLACEHOLDER, tool_descriptions)
}

// ---------------------------------------------------------------------------
// Few-shot examples
// ---------------------------------------------------------------------------

/// Few-shot example for reasoning/answer math environments.
pub fn math_few_shot() -> Vec<ChatMessage> {
    vec![
        ChatMessage::user("What is 15% of 80?"),
        ChatMessage::assistant(
            r#"<reasoning>
To find 15% of 80:
15% = 15/100 = 0.15
0.15 × 80 = 12
</reasoning>
<answer>
12
</answer>"#,
        ),
    ]
}

/// Few-shot example for code-writing math environments.
pub fn code_few_shot() -> Vec<ChatMessage> {
    vec![
        ChatMessage::user("Calculate the sum of squares from 1 to 10."),
        ChatMessage::assistant(
            r#"<reasoning>
I need to calculate 1² + 2² + 3² + ... + 10².
I'll write a Python program to compute this sum.
</reasoning>
<code>
# Calculate sum of squares from 1 to 10
sum_of_squares = sum(i**2 for i in range(1, 11))
print(f"The sum of squares from 1 to 10 is: {sum_of_squares}")
</code>
<answer>
385
</answer>"#,
        ),
    ]
}

/// Few-shot example showing a full calculator tool exchange.
pub fn calculator_few_shot() -> Vec<ChatMessage> {
    vec![
        ChatMessage::user("What is sin(π/4) + cos(π/4)?"),
        ChatMessage::assistant(
            r#"<think>
I need to calculate sin(π/4) + cos(π/4). Both sin(π/4) and cos(π/4) equal √2/2.
</think>
<tool>
{"name": "calculate", "args": {"expression": "sin(pi/4) + cos(pi/4)"}}
</tool>"#,
        ),
        ChatMessage::user(
            r#"<result>
1.4142135623730951
</result>"#,
        ),
        ChatMessage::assistant(
            r#"<answer>
√2 ≈ 1.414
</answer>"#,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::api::Role;

    #[test]
    fn test_render_tool_prompt_fills_placeholder() {
        let rendered = render_tool_prompt(DEFAULT_TOOL_PROMPT, "calculate: does math");
        assert!(rendered.contains("calculate: does math"));
        assert!(!rendered.contains(TOOL_DESCRIPTIONS_PLACEHOLDER));
    }

    #[test]
    fn test_render_tool_prompt_leaves_plain_templates_alone() {
        assert_eq!(render_tool_prompt(SIMPLE_PROMPT, "unused"), SIMPLE_PROMPT);
    }

    #[test]
    fn test_few_shot_roles() {
        let shots = math_few_shot();
        assert_eq!(shots.len(), 2);
        assert_eq!(shots[0].role, Role::User);
        assert_eq!(shots[1].role, Role::Assistant);
        assert!(shots[1].content.contains("<answer>"));

        let shots = calculator_few_shot();
        assert_eq!(shots.len(), 4);
        assert_eq!(shots[1].role, Role::Assistant);
        assert!(shots[1].content.contains(r#""name": "calculate""#));
        assert!(shots[2].content.contains("<result>"));
    }
}
