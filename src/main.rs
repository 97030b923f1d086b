//! MedNIST Classifier CLI
//!
//! Entry point for the MedNIST workflow: fetch the dataset, train a
//! DenseNet-121 with best-AUC checkpointing, plot the curves and report on
//! the held-out test set.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use burn::data::dataset::Dataset;
use burn::tensor::backend::Backend;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use mednist_classifier::backend::{backend_name, default_device, DefaultBackend, TrainingBackend};
use mednist_classifier::dataset::download::DATASET_DIR_NAME;
use mednist_classifier::dataset::{
    ensure_mednist, Catalog, DatasetSplits, MedNistDataset, Pipeline, RunWorkspace, SplitConfig,
    SplitDatasets, DATA_DIR_ENV,
};
use mednist_classifier::inference::evaluate_test;
use mednist_classifier::model::checkpoint::{
    checkpoint_exists, load_checkpoint, CheckpointMetadata, METADATA_FILE,
};
use mednist_classifier::model::{DenseNetConfig, TrainingConfig};
use mednist_classifier::training::Trainer;
use mednist_classifier::utils::charts::plot_training_curves;
use mednist_classifier::utils::{format_duration, format_number};
use mednist_classifier::utils::logging::{init_logging, LogConfig, LogLevel};

/// MedNIST Medical Image Classification
///
/// Trains and evaluates a DenseNet-121 on the six-class MedNIST dataset
/// using the Burn framework. Without a subcommand the full `run` workflow
/// starts, taking the `run` options directly.
#[derive(Parser, Debug)]
#[command(name = "mednist")]
#[command(version)]
#[command(about = "MedNIST image classification with Burn", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true, default_value = "false")]
    verbose: bool,

    /// Minimum log level (overrides the level chosen by --verbose)
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,

    /// Subcommand to execute (defaults to `run`)
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    run: RunArgs,
}

impl Cli {
    fn log_config(&self) -> LogConfig {
        let config = if self.verbose {
            LogConfig::verbose()
        } else {
            LogConfig::default()
        };
        match self.log_level {
            Some(level) => config.with_level(level),
            None => config,
        }
    }

    fn into_command(self) -> Commands {
        self.command.unwrap_or(Commands::Run(self.run))
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch, train, plot and evaluate in one go
    Run(RunArgs),

    /// Download and extract the MedNIST dataset
    Download {
        /// Data root (defaults to $MONAI_DATA_DIRECTORY)
        #[arg(short, long)]
        data_dir: Option<PathBuf>,
    },

    /// Show dataset statistics and split sizes
    Stats {
        /// Data root (defaults to $MONAI_DATA_DIRECTORY)
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        #[command(flatten)]
        split: SplitArgs,
    },

    /// Report on the test subset using a saved checkpoint
    Evaluate {
        /// Data root holding the dataset and the checkpoint
        #[arg(short, long)]
        data_dir: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Clone)]
struct SplitArgs {
    /// Fraction of each class held out for validation
    #[arg(long, default_value = "0.1")]
    val_frac: f64,

    /// Fraction of each class held out for testing
    #[arg(long, default_value = "0.1")]
    test_frac: f64,

    /// Random seed for splitting, shuffling and augmentation
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Split the whole catalog at once instead of per class
    #[arg(long, default_value = "false")]
    no_stratify: bool,
}

impl SplitArgs {
    fn to_config(&self) -> Result<SplitConfig> {
        Ok(SplitConfig::new(
            self.val_frac,
            self.test_frac,
            self.seed,
            !self.no_stratify,
        )?)
    }
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// Data root (defaults to $MONAI_DATA_DIRECTORY, else a temporary directory)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Number of training epochs
    #[arg(short, long, default_value = "4")]
    epochs: usize,

    /// Batch size for all loaders
    #[arg(short, long, default_value = "100")]
    batch_size: usize,

    /// Adam learning rate
    #[arg(short, long, default_value = "0.00001")]
    learning_rate: f64,

    /// Validate every N epochs
    #[arg(long, default_value = "1")]
    val_interval: usize,

    /// Data loader worker threads
    #[arg(long, default_value = "2")]
    num_workers: usize,

    #[command(flatten)]
    split: SplitArgs,

    /// Skip writing the loss/AUC charts
    #[arg(long, default_value = "false")]
    no_plots: bool,
}

impl RunArgs {
    fn to_config(&self) -> Result<TrainingConfig> {
        let config = TrainingConfig {
            epochs: self.epochs,
            batch_size: self.batch_size,
            learning_rate: self.learning_rate,
            val_interval: self.val_interval,
            num_workers: self.num_workers,
            seed: self.split.seed,
            split: self.split.to_config()?,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Written into the data root for reproducibility
const SPLITS_FILE: &str = "splits.json";
const CONFIG_FILE: &str = "training_config.json";

fn main() -> Result<()> {
    let cli = Cli::parse();

    let _ = init_logging(&cli.log_config());

    print_banner();

    match cli.into_command() {
        Commands::Run(args) => cmd_run(&args)?,
        Commands::Download { data_dir } => cmd_download(data_dir)?,
        Commands::Stats { data_dir, split } => cmd_stats(data_dir, &split)?,
        Commands::Evaluate { data_dir } => cmd_evaluate(data_dir)?,
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ╔══════════════════════════════════════════════════════════╗
 ║   MedNIST Classifier                                     ║
 ║   DenseNet-121 medical image classification with Burn    ║
 ╚══════════════════════════════════════════════════════════╝
  "#
        .green()
    );
}

/// Resolve a root that outlives the command
fn persistent_workspace(data_dir: Option<PathBuf>, command: &str) -> Result<RunWorkspace> {
    let workspace = RunWorkspace::resolve(data_dir)?;
    if workspace.is_temporary() {
        workspace.cleanup()?;
        bail!(
            "`{}` needs a data root: pass --data-dir or set {}",
            command,
            DATA_DIR_ENV
        );
    }
    Ok(workspace)
}

fn cmd_run(args: &RunArgs) -> Result<()> {
    let config = args.to_config()?;
    let workspace = RunWorkspace::resolve(args.data_dir.clone())?;
    println!("  Data root: {:?}", workspace.path());

    let outcome = run_workflow(workspace.path(), &config, !args.no_plots);
    workspace.cleanup()?;
    outcome
}

fn run_workflow(root: &Path, config: &TrainingConfig, plots: bool) -> Result<()> {
    println!("{}", "Preparing Dataset...".cyan());
    let dataset_dir = ensure_mednist(root)?;

    let catalog = Catalog::from_dir(&dataset_dir)?;
    catalog.stats()?.print();

    println!();
    println!("{}", "Creating Data Splits...".cyan());
    let splits = DatasetSplits::from_catalog(&catalog, config.split.clone())?;
    print!("{}", splits.stats());

    splits.save(&root.join(SPLITS_FILE))?;
    config.save(&root.join(CONFIG_FILE))?;

    let datasets = SplitDatasets::new(&catalog, &splits, config.seed);
    let device = default_device();

    println!();
    println!("{}", "Training Configuration:".cyan().bold());
    println!("  Train samples:   {}", format_number(datasets.train.len()));
    println!("  Val samples:     {}", format_number(datasets.validation.len()));
    println!("  Test samples:    {}", format_number(datasets.test.len()));
    println!("  Epochs:          {}", config.epochs);
    println!("  Batch size:      {}", config.batch_size);
    println!("  Learning rate:   {}", config.learning_rate);
    println!("  Val interval:    {}", config.val_interval);
    println!("  Backend:         {}", backend_name());
    println!();

    let trainer = Trainer::<TrainingBackend>::new(
        config.clone(),
        DenseNetConfig::new(catalog.num_classes()),
        catalog.class_names.clone(),
        root,
        device.clone(),
    )?;
    let summary = trainer.fit(datasets.train, datasets.validation)?;
    println!("  Training took {}", format_duration(summary.elapsed_secs));

    if plots {
        let (loss_path, auc_path) =
            plot_training_curves(&summary.epoch_losses, &summary.metric_points, root)
                .context("Failed to write training curves")?;
        println!("  Curves written to {:?} and {:?}", loss_path, auc_path);
    }

    if !summary.has_checkpoint() {
        bail!("No checkpoint was saved: validation AUC was undefined in every epoch");
    }

    report_on_test(root, &datasets.test, &device)
}

/// Load the best checkpoint from `root` and print the test report
fn report_on_test(
    root: &Path,
    test: &MedNistDataset,
    device: &<DefaultBackend as Backend>::Device,
) -> Result<()> {
    println!();
    println!("{}", "Evaluating Best Model on Test Set...".cyan());
    let (model, metadata) = load_checkpoint::<DefaultBackend>(root, device)?;
    info!(
        "Evaluating checkpoint from epoch {} (AUC {:.4})",
        metadata.epoch, metadata.metric
    );

    let report = evaluate_test(
        &model,
        test,
        &metadata.class_names,
        metadata.training.batch_size,
        metadata.training.num_workers,
        device,
    )?;

    println!();
    println!("{}", "Classification Report:".cyan().bold());
    println!("{}", report);
    println!("{}", report.confusion_matrix.display(&report.class_names));
    Ok(())
}

fn cmd_download(data_dir: Option<PathBuf>) -> Result<()> {
    let workspace = persistent_workspace(data_dir, "download")?;
    info!("Downloading MedNIST to: {:?}", workspace.path());

    let dataset_dir = ensure_mednist(workspace.path())?;
    println!();
    println!("{}", "After download, run:".green());
    println!("  mednist run --data-dir {:?}", workspace.path());
    info!("Dataset available at {:?}", dataset_dir);
    Ok(())
}

fn cmd_stats(data_dir: Option<PathBuf>, split: &SplitArgs) -> Result<()> {
    let workspace = persistent_workspace(data_dir, "stats")?;
    let dataset_dir = workspace.path().join(DATASET_DIR_NAME);
    info!("Computing dataset statistics for: {:?}", dataset_dir);

    if !dataset_dir.is_dir() {
        bail!(
            "Dataset directory not found: {:?}; download it first with `mednist download --data-dir {:?}`",
            dataset_dir,
            workspace.path()
        );
    }

    let catalog = Catalog::from_dir(&dataset_dir)?;
    catalog.stats()?.print();

    println!();
    let splits = DatasetSplits::from_catalog(&catalog, split.to_config()?)?;
    print!("{}", splits.stats());
    Ok(())
}

fn cmd_evaluate(data_dir: Option<PathBuf>) -> Result<()> {
    let workspace = persistent_workspace(data_dir, "evaluate")?;
    let root = workspace.path();

    if !checkpoint_exists(root) {
        bail!("No checkpoint found in {:?}; run training first", root);
    }

    let dataset_dir = ensure_mednist(root)?;
    let catalog = Catalog::from_dir(&dataset_dir)?;

    let metadata = CheckpointMetadata::load(&root.join(METADATA_FILE))?;
    if metadata.class_names != catalog.class_names {
        bail!(
            "Checkpoint classes {:?} do not match the dataset classes {:?}",
            metadata.class_names,
            catalog.class_names
        );
    }

    // Same split config and seed as training, so the test subset matches
    let splits = DatasetSplits::from_catalog(&catalog, metadata.training.split.clone())?;
    print!("{}", splits.stats());
    let test = MedNistDataset::new(
        catalog.subset(&splits.indices.test),
        Pipeline::eval(),
        metadata.training.seed,
    );

    report_on_test(root, &test, &default_device())
}
