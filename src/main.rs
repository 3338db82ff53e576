#![recursion_limit = "256"]

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use burn::backend::{Autodiff, NdArray, Wgpu};
use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use transfer_harness::config::AppConfig;
use transfer_harness::training::{
    run_experiment, CancellationToken, RunOutcome, SaveDecision, TrainReport,
};

/// Fine-tune a pretrained ResNet on a class-folder image dataset.
#[derive(Parser)]
#[command(name = "transfer-harness", about = "Transfer-learning training harness")]
struct Cli {
    /// Path to TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Print the default configuration as TOML and exit
    #[arg(long)]
    print_config: bool,

    /// Override the experiment id
    #[arg(long)]
    experiment_id: Option<u32>,

    /// Override the dataset root (must contain train/ and test/)
    #[arg(long)]
    dataset_dir: Option<PathBuf>,

    /// Override the performance root
    #[arg(long)]
    performance_dir: Option<PathBuf>,

    /// Backbone: resnet18, resnet50, resnet101 or resnet152
    #[arg(long)]
    backbone: Option<String>,

    /// Override number of epochs
    #[arg(long)]
    epochs: Option<usize>,

    /// Override starting learning rate
    #[arg(long)]
    lr: Option<f64>,

    /// Optimizer: adam or sgd
    #[arg(long)]
    optimizer: Option<String>,

    /// Scheduler: reduce_on_plateau or step_lr
    #[arg(long)]
    scheduler: Option<String>,

    /// Continue from a previous checkpoint
    #[arg(long)]
    resume: Option<PathBuf>,

    /// Start from a custom weight file
    #[arg(long)]
    custom_checkpoint: Option<PathBuf>,

    /// Minimum validation loss reached by the weights being loaded
    #[arg(long)]
    valid_loss: Option<f64>,

    /// Also save the complete network after testing
    #[arg(long)]
    save_full_model: bool,

    /// Train on the CPU (NdArray) instead of the GPU (Wgpu)
    #[arg(long)]
    cpu: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if cli.print_config {
        print!("{}", AppConfig::default_toml());
        return Ok(());
    }

    let mut config = AppConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    apply_overrides(&mut config, &cli);
    config.validate().context("validating config")?;

    // Ctrl-C stops training at the next batch boundary and asks whether to
    // keep the model. The final test pass is not interruptible: once it has
    // started, Ctrl-C is only acknowledged and the run completes.
    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        if handler_token.is_cancelled() {
            warn!("stop already requested, waiting for the current pass to finish");
        } else {
            info!("stop requested");
        }
        handler_token.cancel();
    })
    .context("installing Ctrl-C handler")?;

    let mut ask = prompt_save;
    let outcome = if cli.cpu {
        run_experiment::<Autodiff<NdArray<f32>>>(&config, &Default::default(), &cancel, &mut ask)
    } else {
        run_experiment::<Autodiff<Wgpu<f32, i32>>>(&config, &Default::default(), &cancel, &mut ask)
    }
    .with_context(|| format!("running experiment {}", config.experiment.id))?;

    report(&outcome);
    Ok(())
}

fn apply_overrides(config: &mut AppConfig, cli: &Cli) {
    if let Some(id) = cli.experiment_id {
        config.experiment.id = id;
    }
    if let Some(dir) = &cli.dataset_dir {
        config.data.dataset_dir = dir.clone();
    }
    if let Some(dir) = &cli.performance_dir {
        config.experiment.performance_dir = dir.clone();
    }
    if let Some(backbone) = &cli.backbone {
        config.model.backbone = backbone.clone();
    }
    if let Some(epochs) = cli.epochs {
        config.training.epochs = epochs;
    }
    if let Some(lr) = cli.lr {
        config.optim.learning_rate = lr;
    }
    if let Some(optimizer) = &cli.optimizer {
        config.optim.optimizer = optimizer.clone();
    }
    if let Some(scheduler) = &cli.scheduler {
        config.optim.scheduler = scheduler.clone();
    }
    if let Some(path) = &cli.resume {
        config.training.resume_from = Some(path.clone());
    }
    if let Some(path) = &cli.custom_checkpoint {
        config.training.custom_checkpoint = Some(path.clone());
    }
    if let Some(loss) = cli.valid_loss {
        config.training.prior_valid_loss = Some(loss);
    }
    if cli.save_full_model {
        config.training.save_full_model = true;
    }
}

/// Ask on the terminal whether an interrupted run should keep its model.
fn prompt_save() -> SaveDecision {
    print!("Training interrupted. Save the current model? [y/N] ");
    if let Err(e) = io::stdout().flush() {
        debug!(error = %e, "could not flush the save prompt");
    }

    let mut answer = String::new();
    if let Err(e) = io::stdin().lock().read_line(&mut answer) {
        warn!(error = %e, "could not read answer, discarding run");
        return SaveDecision::Discard;
    }
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => SaveDecision::Save,
        _ => SaveDecision::Discard,
    }
}

fn report(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Completed(report) => print_summary(report),
        RunOutcome::NoImprovement { history } => {
            println!(
                "No improvement in validation loss over {} epochs; experiment removed",
                history.epochs()
            );
        }
        RunOutcome::Interrupted { saved, history } => {
            info!(epochs = history.epochs(), saved, "run interrupted");
            if *saved {
                println!("Interrupted after {} epochs; model saved", history.epochs());
            } else {
                println!("Interrupted after {} epochs; experiment removed", history.epochs());
            }
        }
    }
}

fn print_summary(report: &TrainReport) {
    println!(
        "Finished {} epochs with {} improvements",
        report.history.epochs(),
        report.improvements
    );
    println!(
        "  best valid loss {:.6} at lr {}",
        report.best_valid_loss, report.best_learning_rate
    );
    if let Some((epoch, loss)) = report.history.best_epoch() {
        println!("  lowest epoch valid loss {loss:.6} in epoch {epoch}");
    }
    println!("  checkpoint: {}", report.checkpoint.display());
    println!("  test loss: {:.6}", report.test.loss);
    let accuracy = &report.test.accuracy;
    if let Some(top1) = accuracy.overall_top1() {
        println!("  top-1 accuracy: {top1:.2}%");
    }
    if let Some(topk) = accuracy.overall_topk() {
        println!("  top-{} accuracy: {topk:.2}%", accuracy.k());
    }
    if let Some(path) = &report.full_model {
        println!("  full model: {}", path.display());
    }
}
