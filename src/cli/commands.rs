//! CLI command definitions for swebench-harness.

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::HarnessConfig;
use crate::llm::{LiteLlmClient, LlmProvider};
use crate::scaffold::tools::tool_definitions;
use crate::swe::{
    docker_factory, load_instances, local_factory, select_instances, BatchRunner, BatchSummary,
    EnvironmentFactory, InstanceSelection, SweInstance,
};

/// Run a tool-calling LLM agent on SWE-bench instances.
#[derive(Parser)]
#[command(name = "swebench-harness")]
#[command(about = "Run a tool-calling LLM agent on SWE-bench instances")]
#[command(version)]
#[command(
    long_about = "swebench-harness runs an LLM agent against SWE-bench instances inside disposable containers.\n\nPredictions are written to <output>/preds.json after every instance; re-running the same command resumes where it stopped.\n\nExample usage:\n  swebench-harness run swe-bench-lite.jsonl --slice 0:10 -w 4 -o results/"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// YAML configuration file.
    #[arg(short, long, global = true, env = "SWEBENCH_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the agent over a dataset, checkpointing predictions.
    Run(RunArgs),

    /// Run one instance and print its prediction.
    Instance(InstanceArgs),

    /// Print the tool catalogue as JSON function schemas.
    Tools,
}

/// Agent and environment options shared by `run` and `instance`.
///
/// Every option left unset keeps the value from the config file or the
/// environment.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct AgentArgs {
    /// Model identifier.
    #[arg(short = 'm', long)]
    pub model: Option<String>,

    /// Maximum model queries per instance.
    #[arg(long)]
    pub step_limit: Option<u32>,

    /// Maximum estimated spend per instance, in dollars.
    #[arg(long)]
    pub cost_limit: Option<f64>,

    /// Sampling temperature.
    #[arg(long)]
    pub temperature: Option<f64>,

    /// Tool binary; copied into containers, or run directly with --no-docker.
    #[arg(long)]
    pub ash_binary: Option<String>,

    /// Run tools on the host instead of in containers.
    #[arg(long)]
    pub no_docker: bool,

    /// Container image to use for every instance.
    #[arg(long)]
    pub image: Option<String>,

    /// Output directory for preds.json and trajectories.
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// OpenRouter API key; without it LITELLM_API_BASE/LITELLM_API_KEY are used.
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
}

impl AgentArgs {
    /// Apply the flags that were given on top of `config`.
    pub fn apply(&self, config: &mut HarnessConfig) {
        if let Some(ref model) = self.model {
            config.agent.model = model.clone();
        }
        if let Some(step_limit) = self.step_limit {
            config.agent.step_limit = step_limit;
        }
        if let Some(cost_limit) = self.cost_limit {
            config.agent.cost_limit = cost_limit;
        }
        if let Some(temperature) = self.temperature {
            config.agent.temperature = temperature;
        }
        if let Some(ref binary) = self.ash_binary {
            config.agent.ash_binary = binary.clone();
            config.docker.ash_binary = Some(PathBuf::from(binary));
        }
        if self.no_docker {
            config.batch.use_sandbox = false;
        }
        if let Some(ref image) = self.image {
            config.docker.image = Some(image.clone());
        }
        if let Some(ref output) = self.output {
            config.batch.output_dir = output.clone();
        }
    }
}

/// Arguments for `swebench-harness run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Dataset file: a JSON array or JSON Lines of SWE-bench instances.
    pub dataset: PathBuf,

    /// Number of instances to run concurrently.
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Run only this instance id (or index).
    #[arg(short = 'i', long)]
    pub instance: Option<String>,

    /// Slice of the selection, e.g. "0:10", ":5" or "10:".
    #[arg(long)]
    pub slice: Option<String>,

    /// Regex on instance ids.
    #[arg(long)]
    pub filter: Option<String>,

    /// Reorder instances deterministically before slicing.
    #[arg(long)]
    pub shuffle: bool,

    #[command(flatten)]
    pub agent: AgentArgs,

    /// Output the summary as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

impl RunArgs {
    fn selection(&self) -> InstanceSelection {
        InstanceSelection {
            instance: self.instance.clone(),
            slice: self.slice.clone(),
            filter: self.filter.clone(),
            shuffle: self.shuffle,
        }
    }
}

/// Arguments for `swebench-harness instance`.
#[derive(Parser, Debug)]
pub struct InstanceArgs {
    /// Dataset file: a JSON array or JSON Lines of SWE-bench instances.
    pub dataset: PathBuf,

    /// Instance id, or index into the dataset.
    pub instance: String,

    #[command(flatten)]
    pub agent: AgentArgs,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parse CLI args and run the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config;
    match cli.command {
        Commands::Run(args) => run_batch_command(config_path.as_deref(), args).await,
        Commands::Instance(args) => run_instance_command(config_path.as_deref(), args).await,
        Commands::Tools => {
            println!("{}", serde_json::to_string_pretty(&tool_definitions())?);
            Ok(())
        }
    }
}

fn resolve_config(
    path: Option<&Path>,
    agent_args: &AgentArgs,
    workers: Option<usize>,
) -> anyhow::Result<HarnessConfig> {
    let mut config = HarnessConfig::load(path).context("Failed to load configuration")?;
    agent_args.apply(&mut config);
    if let Some(workers) = workers {
        config.batch.workers = workers;
    }
    config.validate()?;
    Ok(config)
}

fn build_llm_client(api_key: Option<String>) -> anyhow::Result<Arc<dyn LlmProvider>> {
    let resolved_api_key = api_key.filter(|k| !k.trim().is_empty());

    if let Some(key) = resolved_api_key {
        info!("Using OpenRouter with specified API key");
        Ok(Arc::new(LiteLlmClient::new_with_defaults(key)))
    } else {
        info!("Using LiteLLM client from environment");
        Ok(Arc::new(LiteLlmClient::from_env().map_err(|e| {
            anyhow::anyhow!(
                "Failed to initialize LLM client: {}. Please provide --api-key or set OPENROUTER_API_KEY/LITELLM_API_BASE env vars.",
                e
            )
        })?))
    }
}

fn build_environment_factory(config: &HarnessConfig) -> EnvironmentFactory {
    if config.batch.use_sandbox {
        return docker_factory(config.docker.clone());
    }

    let cwd = Path::new(&config.agent.cwd);
    let working_dir = if cwd.is_dir() {
        cwd.to_path_buf()
    } else {
        let current = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        warn!(
            cwd = %config.agent.cwd,
            using = %current.display(),
            "Configured cwd does not exist on the host"
        );
        current
    };
    local_factory(config.agent.ash_binary.clone(), working_dir)
}

/// Shutdown signal flipped by the first Ctrl-C; a second one exits at once.
fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Interrupt received, stopping containers and saving progress (Ctrl-C again to abort)");
        let _ = tx.send(true);
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
    rx
}

async fn load_selection(
    dataset: &Path,
    selection: &InstanceSelection,
) -> anyhow::Result<Vec<SweInstance>> {
    let instances = load_instances(dataset)
        .await
        .with_context(|| format!("Failed to load dataset {}", dataset.display()))?;
    let selected = select_instances(instances, selection)?;
    if selected.is_empty() {
        anyhow::bail!("No instances selected from {}", dataset.display());
    }
    Ok(selected)
}

async fn run_batch_command(config_path: Option<&Path>, args: RunArgs) -> anyhow::Result<()> {
    let config = resolve_config(config_path, &args.agent, args.workers)?;
    let instances = load_selection(&args.dataset, &args.selection()).await?;
    let llm_client = build_llm_client(args.agent.api_key.clone())?;

    info!(
        instances = instances.len(),
        model = %config.agent.model,
        workers = config.batch.workers,
        sandbox = config.batch.use_sandbox,
        output = %config.batch.output_dir.display(),
        "Running batch"
    );

    let runner = BatchRunner::new(
        llm_client,
        config.agent.clone(),
        build_environment_factory(&config),
        config.batch.output_dir.clone(),
    )
    .with_workers(config.batch.workers);
    let summary = runner.run(instances, shutdown_on_ctrl_c()).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
        for (model, cost) in runner.cost_tracker().report().by_model {
            println!("  {model}: ${cost:.2}");
        }
    }
    Ok(())
}

fn print_summary(summary: &BatchSummary) {
    println!("\n=== SWE-bench Batch Results ===");
    println!("Total instances:    {}", summary.total);
    println!("Resumed (skipped):  {}", summary.skipped);
    println!("Processed:          {}", summary.processed);
    println!("Submitted:          {}", summary.submitted);
    println!("Non-empty patches:  {}", summary.patches);
    println!("Environment errors: {}", summary.environment_errors);
    println!("Errors:             {}", summary.errors);
    println!("Cancelled:          {}", summary.cancelled);
    println!("Total cost:         ${:.2}", summary.total_cost);
    if let Some(secs) = summary.duration_secs() {
        println!("Duration:           {}s", secs);
    }
    println!("Predictions:        {}", summary.predictions_path.display());
    if summary.interrupted() {
        println!("\nInterrupted: re-run the same command to resume.");
    }
}

async fn run_instance_command(config_path: Option<&Path>, args: InstanceArgs) -> anyhow::Result<()> {
    let config = resolve_config(config_path, &args.agent, None)?;
    let selection = InstanceSelection {
        instance: Some(args.instance.clone()),
        ..Default::default()
    };
    let mut instances = load_selection(&args.dataset, &selection).await?;
    let instance = instances.remove(0);
    let llm_client = build_llm_client(args.agent.api_key.clone())?;

    let runner = BatchRunner::new(
        llm_client,
        config.agent.clone(),
        build_environment_factory(&config),
        config.batch.output_dir.clone(),
    );
    match runner.run_single(instance, shutdown_on_ctrl_c()).await? {
        Some(prediction) => println!("{}", serde_json::to_string_pretty(&prediction)?),
        None => warn!(instance = %args.instance, "Run cancelled before completion"),
    }
    Ok(())
}
