//! verifiers: evaluate LLM rollouts against parsers, rubrics and tools.
//!
//! Provides one subcommand per workflow:
//!
//! - `eval`         -- Run an environment over a dataset and report scores
//! - `rollout`      -- Run one rollout for a single question and print it
//! - `check-server` -- Wait until the inference server is ready

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use verifiers::config::EnvConfig;
use verifiers::dataset::Dataset;
use verifiers::env::{
    AnyEnv, CodeMathEnv, DoubleCheckEnv, Prompt, SingleTurnEnv, ToolEnv, DEFAULT_MAX_TURNS,
};
use verifiers::eval::Evaluator;
use verifiers::model::prompt::{math_few_shot, SIMPLE_PROMPT};
use verifiers::model::{AnyClient, LlmClient, Role};
use verifiers::rubric::MathRubric;
use verifiers::tool::Calculator;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

/// verifiers: rollout evaluation for OpenAI-compatible models.
#[derive(Parser)]
#[command(name = "verifiers", version, about)]
struct Cli {
    /// Path to a JSON environment configuration file (uses defaults if not
    /// provided).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Which built-in environment to use.
    #[arg(long, global = true, default_value = "math")]
    env: EnvChoice,

    /// Base URL of the inference server.
    #[arg(long, global = true, default_value = "http://localhost:8000/v1")]
    api_base: String,

    /// API key (falls back to the OPENAI_API_KEY environment variable).
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Model identifier (overrides the config file).
    #[arg(long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, clap::ValueEnum)]
enum EnvChoice {
    /// Single-turn math with a think/answer parser.
    Math,
    /// Multi-turn calculator tool use.
    Tool,
    /// Multi-turn math over `<code>` expression evaluation.
    CodeMath,
    /// Two-turn answer-then-verify math.
    DoubleCheck,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate the environment over a dataset and report scores.
    Eval {
        /// Path to a JSON or JSONL dataset file with question/answer fields.
        #[arg(long)]
        dataset: PathBuf,

        /// Number of examples to evaluate (0 = all).
        #[arg(long, default_value_t = 0)]
        num_examples: usize,

        /// Shuffle seed used when truncating the dataset.
        #[arg(long, default_value_t = 0)]
        seed: u64,

        /// Path to write the JSON report to.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Run a single rollout and print the transcript and score.
    Rollout {
        /// The question to pose.
        question: String,

        /// Ground-truth answer to score against.
        #[arg(long, default_value = "")]
        answer: String,
    },

    /// Poll the inference server until it responds.
    CheckServer {
        /// Give up after this many seconds.
        #[arg(long, default_value_t = 60)]
        timeout_secs: u64,
    },
}

// ---------------------------------------------------------------------------
// Entrypoint
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing (reads RUST_LOG env var, defaults to info).
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(model) = &cli.model {
        config.model = model.clone();
    }

    let api_key = cli
        .api_key
        .clone()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok())
        .unwrap_or_default();
    let client = LlmClient::with_timeout(
        &cli.api_base,
        &api_key,
        Duration::from_secs(config.timeout_secs),
    );

    match cli.command {
        Commands::Eval {
            dataset,
            num_examples,
            seed,
            output,
        } => {
            cmd_eval(
                &cli.env,
                config,
                client,
                &dataset,
                num_examples,
                seed,
                output.as_deref(),
            )
            .await
        }
        Commands::Rollout { question, answer } => {
            cmd_rollout(&cli.env, config, client, &question, &answer).await
        }
        Commands::CheckServer { timeout_secs } => {
            cmd_check_server(client, timeout_secs).await
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<EnvConfig> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        }
        None => Ok(EnvConfig::default()),
    }
}

/// Build the chosen environment over `config`.
fn create_env(choice: &EnvChoice, mut config: EnvConfig) -> Result<AnyEnv> {
    match choice {
        EnvChoice::Math => {
            if config.system_prompt.as_deref().map_or(true, str::is_empty) {
                config.system_prompt = Some(SIMPLE_PROMPT.to_string());
            }
            if config.few_shot.is_empty() {
                config.few_shot = math_few_shot();
            }
            let rubric = MathRubric::new()?;
            let parser = rubric.parser().clone();
            Ok(SingleTurnEnv::new(config)
                .with_parser(parser)
                .with_rubric(rubric)
                .into())
        }
        EnvChoice::Tool => {
            let tools = vec![Calculator::new().into()];
            Ok(ToolEnv::new(config, tools, DEFAULT_MAX_TURNS)?.into())
        }
        EnvChoice::CodeMath => Ok(CodeMathEnv::new(config, DEFAULT_MAX_TURNS)?.into()),
        EnvChoice::DoubleCheck => Ok(DoubleCheckEnv::new(config)?.into()),
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_eval(
    env_choice: &EnvChoice,
    config: EnvConfig,
    client: LlmClient,
    dataset_path: &Path,
    num_examples: usize,
    seed: u64,
    output: Option<&Path>,
) -> Result<()> {
    anyhow::ensure!(!config.model.is_empty(), "no model configured; pass --model");

    let dataset = Dataset::from_file(dataset_path)
        .with_context(|| format!("Failed to load dataset from {}", dataset_path.display()))?;
    tracing::info!(path = %dataset_path.display(), items = dataset.len(), "Loaded dataset");

    let mut env = create_env(env_choice, config)?;
    env.core_mut().eval_dataset = Some(dataset);

    let report = Evaluator::new(num_examples, seed)
        .evaluate(Arc::new(env), Arc::new(AnyClient::Http(client)))
        .await?;

    tracing::info!(
        run_id = %report.run_id,
        total = report.total,
        failed = report.failed,
        mean = report.stats.mean,
        median = report.stats.median,
        min = report.stats.min,
        max = report.stats.max,
        "Evaluation complete"
    );

    if let Some(path) = output {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Report saved");
    }

    Ok(())
}

async fn cmd_rollout(
    env_choice: &EnvChoice,
    config: EnvConfig,
    client: LlmClient,
    question: &str,
    answer: &str,
) -> Result<()> {
    anyhow::ensure!(!config.model.is_empty(), "no model configured; pass --model");

    let env = create_env(env_choice, config)?;
    let core = env.core();
    let prompt = Prompt::Chat(core.format_prompt(question));
    let model = core.config.model.clone();
    let sampling = core.config.sampling.clone();

    let rollout = env
        .rollout(&client, &model, &prompt, answer, &sampling)
        .await?;

    for message in &rollout.messages {
        let role = match message.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        println!("[{role}]\n{}\n", message.content);
    }
    println!("score: {:.3}", rollout.score);

    Ok(())
}

async fn cmd_check_server(client: LlmClient, timeout_secs: u64) -> Result<()> {
    client
        .check_server(Duration::from_secs(timeout_secs), Duration::from_secs(2))
        .await?;
    tracing::info!(api_base = %client.api_base, "Inference server is ready");
    Ok(())
}
