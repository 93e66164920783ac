//! Tool registry: schemas, JSON call parsing, and dispatch.
//!
//! Tools are described by a [`ToolSchema`] that renders into the prompt, and
//! invoked through JSON calls of the form
//! `{"name": "tool_name", "args": {"arg1": "value1"}}`. Concrete tools are
//! dispatched through the sealed [`AnyTool`] enum:
//!
//! - [`Calculator`]: arithmetic expression evaluation
//! - [`SearchTool`]: web search with a simulated fallback

pub mod calculator;
pub mod expr;
pub mod search;

use std::collections::BTreeMap;

use anyhow::Result;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub use calculator::Calculator;
pub use expr::{ExprEvaluator, FunctionTable};
pub use search::{SearchEngine, SearchTool};

// ---------------------------------------------------------------------------
// Schema types
// ---------------------------------------------------------------------------

/// Declared interface of a tool, rendered into tool-use prompts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// Argument name to schema, ordered for stable prompt rendering.
    #[serde(default)]
    pub args: BTreeMap<String, ArgumentSchema>,
    #[serde(default)]
    pub returns: String,
    #[serde(default)]
    pub examples: Vec<String>,
}

/// Schema for a single tool argument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgumentSchema {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default)]
    pub required: bool,
}

/// A parsed JSON tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty_map")]
    pub args: Map<String, Value>,
}

fn null_as_empty_map<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Tool trait and dispatch
// ---------------------------------------------------------------------------

/// A callable tool.
#[allow(async_fn_in_trait)]
pub trait Tool: Send + Sync {
    fn schema(&self) -> &ToolSchema;

    fn name(&self) -> &str {
        &self.schema().name
    }

    fn description(&self) -> &str {
        &self.schema().description
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<Value>;
}

/// All tool implementations, dispatched without trait objects.
#[derive(Debug, Clone)]
pub enum AnyTool {
    Calculator(Calculator),
    Search(SearchTool),
}

impl Tool for AnyTool {
    fn schema(&self) -> &ToolSchema {
        match self {
            AnyTool::Calculator(tool) => tool.schema(),
            AnyTool::Search(tool) => tool.schema(),
        }
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<Value> {
        match self {
            AnyTool::Calculator(tool) => tool.execute(args).await,
            AnyTool::Search(tool) => tool.execute(args).await,
        }
    }
}

impl From<Calculator> for AnyTool {
    fn from(tool: Calculator) -> Self {
        AnyTool::Calculator(tool)
    }
}

impl From<SearchTool> for AnyTool {
    fn from(tool: SearchTool) -> Self {
        AnyTool::Search(tool)
    }
}

// ---------------------------------------------------------------------------
// Registry operations
// ---------------------------------------------------------------------------

/// Render tool schemas into the prompt block models see: name and
/// description, then arguments (with defaults and required markers),
/// examples, and the return description.
pub fn format_tool_descriptions(tools: &[AnyTool]) -> String {
    let mut descriptions = Vec::with_capacity(tools.len());
    for tool in tools {
        let schema = tool.schema();
        let mut lines = vec![format!("{}: {}", schema.name, schema.description)];
        if !schema.args.is_empty() {
            lines.push("\nArguments:".to_string());
            for (name, arg) in &schema.args {
                let default = match &arg.default {
                    Some(value) => format!(" (default: {})", display_value(value)),
                    None => String::new(),
                };
                let required = if arg.required { " [required]" } else { "" };
                lines.push(format!("  - {}: {}{}{}", name, arg.description, default, required));
            }
        }
        if !schema.examples.is_empty() {
            lines.push("\nExamples:".to_string());
            for example in &schema.examples {
                lines.push(format!("  {example}"));
            }
        }
        if !schema.returns.is_empty() {
            lines.push(format!("\nReturns: {}", schema.returns));
        }
        descriptions.push(lines.join("\n"));
    }
    descriptions.join("\n\n")
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Decode a JSON tool call. The name is mandatory; missing or null args
/// become an empty map.
pub fn parse_tool_call(raw: &str) -> Result<ToolCall> {
    let call: ToolCall =
        serde_json::from_str(raw).map_err(|err| anyhow::anyhow!("invalid JSON: {err}"))?;
    if call.name.is_empty() {
        anyhow::bail!("tool call must specify 'name'");
    }
    Ok(call)
}

/// Execute a tool call against the registry, rendering the outcome as the
/// string fed back to the model. Failures come back as `Error: ...` text
/// rather than errors, and long results are truncated to `max_chars`.
pub async fn execute_tool(tools: &[AnyTool], call: &ToolCall, max_chars: usize) -> String {
    let Some(tool) = tools.iter().find(|tool| tool.name() == call.name) else {
        let available: Vec<&str> = tools.iter().map(Tool::name).collect();
        return format!(
            "Error: Unknown tool '{}'. Available tools: {}",
            call.name,
            available.join(", ")
        );
    };

    let value = match tool.execute(&call.args).await {
        Ok(value) => value,
        Err(err) => return format!("Error: {err}"),
    };

    let mut rendered = match value {
        Value::String(s) => s,
        other => other.to_string(),
    };
    if max_chars > 0 && rendered.len() > max_chars {
        let mut cut = max_chars;
        while !rendered.is_char_boundary(cut) {
            cut -= 1;
        }
        rendered.truncate(cut);
        rendered.push_str("...");
    }
    rendered
}

/// Validate arguments against a schema: required arguments must be present,
/// and known arguments must match their declared type. Extra arguments are
/// allowed.
pub fn validate_args(schema: &ToolSchema, args: &Map<String, Value>) -> Result<()> {
    for (name, arg) in &schema.args {
        if arg.required && !args.contains_key(name) {
            anyhow::bail!("missing required argument: {name}");
        }
    }
    for (name, value) in args {
        let Some(arg) = schema.args.get(name) else {
            continue;
        };
        match arg.kind.as_str() {
            "string" => {
                if !value.is_string() {
                    anyhow::bail!("argument {name} must be a string");
                }
            }
            "int" | "integer" | "float" | "number" => {
                if !value.is_number() {
                    anyhow::bail!("argument {name} must be a number");
                }
            }
            "bool" | "boolean" => {
                if !value.is_boolean() {
                    anyhow::bail!("argument {name} must be a boolean");
                }
            }
            _ => {}
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
