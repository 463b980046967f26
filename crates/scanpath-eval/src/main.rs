//! Evaluation binary for scanpath and explanation models

use anyhow::{Context, Result};
use clap::Parser;
use scanpath_data::{EvalSplit, Split, Vocabulary};
use scanpath_eval::{evaluate, EvalConfig, EvalContext, MetricSuite, PrecomputedModel};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Command-line arguments for evaluation
#[derive(Parser, Debug)]
#[command(name = "scanpath-eval")]
#[command(about = "Evaluate scanpath prediction and explanation generation on a held-out split")]
struct Args {
    /// Checkpoint directory holding exported rollouts
    #[arg(long, short = 'm')]
    checkpoint: PathBuf,

    /// Directory containing the ground-truth split files
    #[arg(long, short = 'd')]
    data_dir: PathBuf,

    /// Split to evaluate (dev or test)
    #[arg(long, default_value = "test")]
    split: String,

    /// Evaluation config file (JSON)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Output directory for metric.json and predictions.json
    #[arg(long, short = 'o')]
    save_path: Option<PathBuf>,

    /// Number of data-parallel workers
    #[arg(long)]
    num_workers: Option<usize>,

    /// Samples per worker per batch
    #[arg(long)]
    batch_size: Option<usize>,

    /// Rollouts requested per sample
    #[arg(long)]
    repeat_num: Option<usize>,

    /// External metric scorer, e.g. "python3 metrics_bridge.py"
    #[arg(long)]
    metrics_command: Option<String>,

    /// Working directory for the metric scorer
    #[arg(long)]
    metrics_workdir: Option<PathBuf>,

    /// Environment variable for the metric scorer (KEY=VALUE, repeatable)
    #[arg(long)]
    metrics_env: Vec<String>,

    /// Disable the batch progress bar
    #[arg(long)]
    no_progress: bool,

    /// WordPiece vocabulary for decoding explanations
    #[arg(long)]
    vocab: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let split: Split = args.split.parse()?;

    let mut config = match &args.config {
        Some(path) => EvalConfig::from_file(path)?,
        None => EvalConfig::default(),
    };
    if let Some(num_workers) = args.num_workers {
        config.num_workers = num_workers;
    }
    if let Some(batch_size) = args.batch_size {
        config.test_batch = batch_size;
    }
    if let Some(repeat_num) = args.repeat_num {
        config.eval_repeat_num = repeat_num;
    }
    if let Some(command) = &args.metrics_command {
        config.metrics_command = Some(command.split_whitespace().map(String::from).collect());
    }
    if let Some(dir) = args.metrics_workdir {
        config.metrics_working_dir = Some(dir);
    }
    for pair in &args.metrics_env {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("Invalid --metrics-env {:?}, expected KEY=VALUE", pair))?;
        config.metrics_env.insert(key.to_string(), value.to_string());
    }
    if args.no_progress {
        config.show_progress = false;
    }
    if let Some(vocab) = args.vocab {
        config.vocab_path = Some(vocab);
    }
    config.validate()?;

    let metrics = config.metric_scorer()?;
    info!(command = %metrics.command_line(), "Using external metric scorer");

    info!("Loading {} split from {:?}", split, args.data_dir);
    let eval_split = EvalSplit::load(&args.data_dir, split)?;
    info!(samples = eval_split.len(), "Ground truth loaded");

    let model = PrecomputedModel::load(&args.checkpoint, split, config.max_fixations)?;
    info!(samples = model.len(), "Rollouts loaded from {:?}", args.checkpoint);

    let vocab = config
        .vocab_path
        .as_deref()
        .map(Vocabulary::from_file)
        .transpose()?;

    let ctx = EvalContext {
        split: &eval_split,
        model: &model,
        metrics: MetricSuite::uniform(&metrics),
        decoder: vocab.as_ref(),
        config: &config,
    };
    let outcome = evaluate(&ctx, config.num_workers)?;

    print!("{}", outcome.summary.to_table());

    if let Some(save_path) = &args.save_path {
        let (metric_path, predictions_path) = outcome.save(save_path)?;
        println!("Metrics saved to {:?}", metric_path);
        println!("Predictions saved to {:?}", predictions_path);
    }
    println!("Finished at {}", outcome.finished_at);

    Ok(())
}
