//! Shot-Tuner CLI
//!
//! The `shotctl` command drives the camera-shot model pipeline.
//!
//! ## Commands
//!
//! - `generate`: Build a training dataset locally or through a hosted LLM
//! - `validate`: Check a dataset artifact and report rejected records
//! - `train`: Fine-tune a LoRA adapter through a training backend
//! - `infer`: Turn a shot description into structured parameters
//! - `export`: Register a GGUF artifact with Ollama

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Instrument, Level};

use shot_client::{
    export_to_ollama, GenerationParams, InferenceBackend, ModelArtifact, OllamaBackend,
    OllamaCli, OpenAiCompatBackend, ShotClient, DEFAULT_OLLAMA_URL,
};
use shot_core::obs;
use shot_core::StageSpan;
use shot_datagen::{GenerationMode, Provider, ProviderConfig, RemoteOptions};
use shot_schema::{ShotParameterRecord, TrainingExample};
use shot_trainer::{estimate_memory, CommandBackend, TrainConfig, Trainer};

/// Examples shown after generation.
const PREVIEW_COUNT: usize = 3;

#[derive(Parser)]
#[command(name = "shotctl")]
#[command(author = "Drama Toolset Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Camera-shot parameter model toolkit", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    Local,
    Siliconflow,
    Deepseek,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a training dataset
    Generate {
        /// Where examples come from
        #[arg(short, long, value_enum, default_value = "local")]
        mode: Mode,

        /// Number of examples
        #[arg(short, long, default_value = "1000")]
        count: usize,

        /// Dataset artifact to write
        #[arg(short, long, default_value = "dataset.json")]
        output: PathBuf,

        /// Seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,

        /// Provider API key (default: SILICONFLOW_API_KEY / DEEPSEEK_API_KEY)
        #[arg(long)]
        api_key: Option<String>,

        /// Override the provider model
        #[arg(long)]
        provider_model: Option<String>,

        /// Examples requested per provider call
        #[arg(long, default_value = "1")]
        per_request: usize,

        /// Provider calls in flight at once
        #[arg(long, default_value = "4")]
        concurrency: usize,

        /// Retries per provider call
        #[arg(long, default_value = "3")]
        max_retries: u32,
    },

    /// Validate a dataset artifact
    Validate {
        /// Dataset artifact to check
        dataset: PathBuf,
    },

    /// Fine-tune a LoRA adapter
    Train {
        /// Dataset artifact
        #[arg(short, long)]
        dataset: PathBuf,

        /// Output directory (default: ./camera_shot_model)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Hugging Face id of the base model
        #[arg(long)]
        base_model: Option<String>,

        /// Training epochs (default: 3)
        #[arg(long)]
        epochs: Option<u32>,

        /// Per-device batch size (default: 4)
        #[arg(long)]
        batch_size: Option<u32>,

        /// Learning rate (default: 2e-4)
        #[arg(long)]
        lr: Option<f64>,

        /// TOML file with the full training configuration
        #[arg(long)]
        config: Option<PathBuf>,

        /// Command that performs the training run; receives the plan path
        #[arg(long, env = "SHOT_TRAIN_CMD")]
        backend_cmd: Option<String>,

        /// Abort the backend after this many seconds (0 = no limit)
        #[arg(long, default_value = "0")]
        timeout: u64,

        /// Validate, prepare and estimate memory without training
        #[arg(long)]
        dry_run: bool,

        /// Parameter count in billions when the model id does not say
        #[arg(long)]
        params_billion: Option<f64>,

        /// Accelerator memory available, in GiB
        #[arg(long)]
        available_gb: Option<f64>,
    },

    /// Generate shot parameters from a description
    Infer {
        /// Trained model artifact (adapter dir, merged dir or GGUF)
        #[arg(short, long)]
        model: PathBuf,

        /// Natural-language shot description
        description: String,

        /// JSON file with a shot to refine instead of starting fresh
        #[arg(long)]
        refine: Option<PathBuf>,

        /// Ollama server
        #[arg(long, env = "SHOT_OLLAMA_URL", default_value = DEFAULT_OLLAMA_URL)]
        ollama_url: String,

        /// OpenAI-compatible completions server; replaces Ollama when set
        #[arg(long, env = "SHOT_OPENAI_URL")]
        openai_url: Option<String>,

        /// Bearer key for the OpenAI-compatible server
        #[arg(long, env = "SHOT_OPENAI_API_KEY")]
        openai_key: Option<String>,

        /// Served model name (default: derived from the artifact)
        #[arg(long)]
        model_name: Option<String>,
    },

    /// Register a GGUF artifact with Ollama
    Export {
        /// GGUF file or directory containing one
        #[arg(short, long)]
        model: PathBuf,

        /// Ollama model name (default: derived from the artifact)
        #[arg(short, long)]
        name: Option<String>,

        /// Path to the ollama binary
        #[arg(long, default_value = "ollama")]
        ollama_bin: PathBuf,
    },
}

impl Commands {
    fn stage(&self) -> &'static str {
        match self {
            Commands::Generate { .. } => "generate",
            Commands::Validate { .. } => "validate",
            Commands::Train { .. } => "train",
            Commands::Infer { .. } => "infer",
            Commands::Export { .. } => "export",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    shot_core::init_tracing(cli.json, level);

    let stage = StageSpan::start(cli.command.stage());
    let result = run(cli.command).instrument(stage.span().clone()).await;
    stage.finish(&result);
    result
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Generate {
            mode,
            count,
            output,
            seed,
            api_key,
            provider_model,
            per_request,
            concurrency,
            max_retries,
        } => {
            let mode = generation_mode(
                mode,
                seed,
                api_key,
                provider_model,
                RemoteOptions {
                    per_request,
                    concurrency,
                    max_retries,
                    retry_backoff: Duration::from_secs(1),
                    seed,
                },
            )?;
            cmd_generate(mode, count, &output).await
        }
        Commands::Validate { dataset } => cmd_validate(&dataset),
        Commands::Train {
            dataset,
            output,
            base_model,
            epochs,
            batch_size,
            lr,
            config,
            backend_cmd,
            timeout,
            dry_run,
            params_billion,
            available_gb,
        } => {
            let mut train_config = match config {
                Some(path) => TrainConfig::load(&path)
                    .with_context(|| format!("Failed to load training config {:?}", path))?,
                None => TrainConfig::default(),
            };
            apply_overrides(&mut train_config, output, base_model, epochs, batch_size, lr);

            if dry_run {
                cmd_train_dry_run(train_config, &dataset, params_billion, available_gb)
            } else {
                cmd_train(train_config, &dataset, backend_cmd.as_deref(), timeout).await
            }
        }
        Commands::Infer {
            model,
            description,
            refine,
            ollama_url,
            openai_url,
            openai_key,
            model_name,
        } => {
            let backend = inference_backend(
                &model,
                &ollama_url,
                openai_url.as_deref(),
                openai_key,
                model_name,
            )?;
            cmd_infer(&model, backend, &description, refine.as_deref()).await
        }
        Commands::Export {
            model,
            name,
            ollama_bin,
        } => cmd_export(&model, name.as_deref(), &OllamaCli::new(ollama_bin)).await,
    }
}

/// Resolve the generation mode, reading provider keys from the environment
/// when none is passed.
fn generation_mode(
    mode: Mode,
    seed: Option<u64>,
    api_key: Option<String>,
    provider_model: Option<String>,
    options: RemoteOptions,
) -> Result<GenerationMode> {
    let provider = match mode {
        Mode::Local => return Ok(GenerationMode::Local { seed }),
        Mode::Siliconflow => Provider::SiliconFlow,
        Mode::Deepseek => Provider::DeepSeek,
    };
    let mut config = ProviderConfig::resolve(provider, api_key, |var| std::env::var(var).ok())?;
    if let Some(model) = provider_model {
        config = config.with_model(model);
    }
    Ok(GenerationMode::Remote { config, options })
}

/// Generate a dataset and write it to `output`
async fn cmd_generate(mode: GenerationMode, count: usize, output: &Path) -> Result<()> {
    let (examples, report) = shot_datagen::generate_dataset(mode, count)
        .await
        .context("Dataset generation failed")?;
    obs::emit_generation_finished(&report);

    if examples.is_empty() {
        anyhow::bail!(
            "No examples were generated ({} provider calls failed)",
            report.failed_requests
        );
    }

    shot_datagen::save_dataset(output, &examples)
        .with_context(|| format!("Failed to write dataset to {:?}", output))?;

    println!(
        "Generated {}/{} examples ({}) -> {:?}",
        report.produced, report.requested, report.mode, output
    );
    if !report.is_complete() {
        println!(
            "Short by {}: {} failed calls, {} rejected records",
            report.shortfall(),
            report.failed_requests,
            report.rejected_records.len()
        );
        for error in &report.errors {
            println!("  {}", error);
        }
        for rejection in &report.rejected_records {
            println!("  record {}: {}", rejection.index, rejection.reason);
        }
    }

    println!("\nSample examples:");
    for example in examples.iter().take(PREVIEW_COUNT) {
        print_example(example)?;
    }
    Ok(())
}

fn print_example(example: &TrainingExample) -> Result<()> {
    println!("\n输入: {}", example.input);
    println!("输出: {}", serde_json::to_string_pretty(&example.output)?);
    Ok(())
}

/// Validate a dataset artifact
fn cmd_validate(dataset: &Path) -> Result<()> {
    let (_, report) = shot_schema::read_dataset(dataset)
        .with_context(|| format!("Failed to read dataset {:?}", dataset))?;
    obs::emit_dataset_validated(dataset, &report);

    println!("Dataset:  {:?}", dataset);
    println!("Records:  {}", report.total);
    println!("Valid:    {}", report.valid);
    println!("Rejected: {}", report.rejected_count());
    for rejection in &report.rejected {
        println!("  record {}: {}", rejection.index, rejection.reason);
    }

    if report.valid == 0 {
        anyhow::bail!("Dataset {:?} has no valid records", dataset);
    }
    Ok(())
}

fn apply_overrides(
    config: &mut TrainConfig,
    output: Option<PathBuf>,
    base_model: Option<String>,
    epochs: Option<u32>,
    batch_size: Option<u32>,
    lr: Option<f64>,
) {
    if let Some(output) = output {
        config.output_dir = output;
    }
    if let Some(base_model) = base_model {
        config.base_model = base_model;
    }
    if let Some(epochs) = epochs {
        config.epochs = epochs;
    }
    if let Some(batch_size) = batch_size {
        config.batch_size = batch_size;
    }
    if let Some(lr) = lr {
        config.learning_rate = lr;
    }
}

/// Prepare the run and report the plan and memory estimate
fn cmd_train_dry_run(
    config: TrainConfig,
    dataset: &Path,
    params_billion: Option<f64>,
    available_gb: Option<f64>,
) -> Result<()> {
    let trainer = Trainer::new(config, Arc::new(NoBackend));
    let (prepared, plan) = trainer
        .plan(dataset)
        .with_context(|| format!("Failed to prepare {:?}", dataset))?;
    obs::emit_dataset_validated(dataset, &prepared.report);

    println!("Base model:    {}", plan.base_model);
    println!(
        "Records:       {} valid / {} total ({} rejected)",
        prepared.report.valid,
        prepared.report.total,
        prepared.report.rejected_count()
    );
    println!(
        "Split:         {} train / {} eval",
        prepared.train_count, prepared.eval_count
    );
    println!("Total steps:   {}", plan.total_steps);

    let estimate = match estimate_memory(trainer.config(), params_billion, available_gb) {
        Ok(estimate) => estimate,
        Err(err) => {
            warn!(error = %err, "Skipping memory estimate");
            println!("Memory:        unknown ({}; pass --params-billion)", err);
            return Ok(());
        }
    };
    obs::emit_memory_estimated(&estimate);
    println!(
        "Memory:        ~{:.1} GiB (weights {:.1}, adapter {:.1}, activations {:.1})",
        estimate.total_gb, estimate.weights_gb, estimate.adapter_state_gb, estimate.activations_gb
    );
    if estimate.exceeds_available() {
        println!("Warning: estimate exceeds the available memory");
    }
    for recommendation in &estimate.recommendations {
        println!("  - {}", recommendation);
    }
    Ok(())
}

/// Train through the configured backend command
async fn cmd_train(
    config: TrainConfig,
    dataset: &Path,
    backend_cmd: Option<&str>,
    timeout_secs: u64,
) -> Result<()> {
    let command = backend_cmd.context(
        "No training backend configured: pass --backend-cmd or set SHOT_TRAIN_CMD",
    )?;
    let backend = CommandBackend::from_command_line(command)?.with_timeout_secs(timeout_secs);

    info!(dataset = %dataset.display(), backend = %command, "Starting training");
    let trainer = Trainer::new(config, Arc::new(backend));
    let outcome = trainer
        .train(dataset)
        .await
        .with_context(|| format!("Training on {:?} failed", dataset))?;
    let manifest = &outcome.manifest;
    obs::emit_training_finished(manifest);

    println!("Run:       {}", manifest.run_id);
    println!(
        "Records:   {} valid / {} total ({} rejected)",
        manifest.valid_records,
        manifest.total_records,
        manifest.rejected_records.len()
    );
    if let Some(loss) = manifest.final_loss {
        println!("Loss:      {:.4}", loss);
    }
    println!("Adapter:   {:?}", manifest.outputs.adapter_weights);
    println!("Duration:  {}s", manifest.duration_secs());
    Ok(())
}

/// Placeholder backend for plan-only runs; never invoked.
struct NoBackend;

#[async_trait::async_trait]
impl shot_trainer::TrainingBackend for NoBackend {
    fn name(&self) -> &str {
        "none"
    }

    async fn run(
        &self,
        _plan: &shot_trainer::TrainingPlan,
        _plan_path: &Path,
    ) -> shot_trainer::Result<shot_trainer::BackendOutcome> {
        Err(shot_trainer::TrainError::Backend(
            "dry run has no training backend".to_string(),
        ))
    }
}

fn inference_backend(
    model: &Path,
    ollama_url: &str,
    openai_url: Option<&str>,
    openai_key: Option<String>,
    model_name: Option<String>,
) -> Result<Arc<dyn InferenceBackend>> {
    let model_name = match model_name {
        Some(name) => name,
        None => ModelArtifact::inspect(model)?.serving_name(),
    };
    Ok(match openai_url {
        Some(url) => {
            let mut backend = OpenAiCompatBackend::new(url, model_name)?;
            if let Some(key) = openai_key {
                backend = backend.with_api_key(key);
            }
            Arc::new(backend)
        }
        None => Arc::new(OllamaBackend::new(ollama_url, model_name)?),
    })
}

/// Generate or refine a shot and print it as JSON
async fn cmd_infer(
    model: &Path,
    backend: Arc<dyn InferenceBackend>,
    description: &str,
    refine: Option<&Path>,
) -> Result<()> {
    let client = ShotClient::with_backend(model, backend)?;
    if !client.is_available().await {
        anyhow::bail!(
            "Inference backend '{}' is not reachable",
            client.backend_name()
        );
    }

    let shot = match refine {
        Some(path) => {
            let current = read_shot(path)?;
            client.refine_shot(&current, description).await?
        }
        None => client.generate_shot_params(description).await?,
    };
    obs::emit_shot_generated(&shot);

    println!("{}", serde_json::to_string_pretty(&shot)?);
    Ok(())
}

fn read_shot(path: &Path) -> Result<ShotParameterRecord> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read shot file {:?}", path))?;
    let value: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("Shot file is not valid JSON: {:?}", path))?;
    ShotParameterRecord::from_value(value)
        .with_context(|| format!("Shot file is not a valid shot record: {:?}", path))
}

/// Write a Modelfile and register the model with Ollama
async fn cmd_export(model: &Path, name: Option<&str>, cli: &OllamaCli) -> Result<()> {
    let artifact = ModelArtifact::inspect(model)?;
    let name = name
        .map(str::to_string)
        .unwrap_or_else(|| artifact.serving_name());
    let modelfile = export_to_ollama(&artifact, &name, &GenerationParams::default(), cli)
        .await
        .with_context(|| format!("Failed to export {:?} to Ollama", model))?;

    println!("Modelfile: {:?}", modelfile);
    println!("Registered Ollama model '{}'", name);
    println!("Try: ollama run {} \"### 输入:\\n<描述>\\n\\n### 输出:\\n\"", name);
    Ok(())
}
