use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use mae_pretrain::backend::default_device;
use mae_pretrain::checkpoint::CheckpointManager;
use mae_pretrain::config::AppConfig;
use mae_pretrain::data::CifarDataset;
use mae_pretrain::training::{ExperimentKind, Pretrainer};

#[derive(Parser, Debug)]
#[command(
    name = "pretrain",
    about = "MAE pretraining on CIFAR-10 across masking experiments"
)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Override the CIFAR-10 binary data directory
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Override the number of pretraining epochs
    #[arg(long)]
    epochs: Option<usize>,

    /// Comma-separated experiment roster: baseline, w_masktoken, block, grid
    #[arg(long)]
    experiments: Option<String>,

    /// Print the default configuration as TOML and exit
    #[arg(long)]
    print_default_config: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.print_default_config {
        print!("{}", AppConfig::default_toml());
        return Ok(());
    }

    let mut config = AppConfig::load_or_default(&cli.config)?;
    if let Some(dir) = cli.data_dir {
        config.data.data_dir = dir;
    }
    if let Some(epochs) = cli.epochs {
        if epochs == 0 {
            bail!("--epochs must be greater than zero");
        }
        config.pretrain.epochs = epochs;
    }
    if let Some(list) = &cli.experiments {
        config.pretrain.experiments = parse_roster(list)?;
    }
    config.validate()?;

    let train = CifarDataset::load_train(&config.data.data_dir).with_context(|| {
        format!(
            "loading CIFAR-10 training batches from {}",
            config.data.data_dir.display()
        )
    })?;
    let test = CifarDataset::load_test(&config.data.data_dir).with_context(|| {
        format!(
            "loading CIFAR-10 test batch from {}",
            config.data.data_dir.display()
        )
    })?;
    println!(
        "Loaded {} training and {} test images.",
        train.len(),
        test.len()
    );

    let store = config.storage.build().context("building artifact store")?;
    let checkpoints = CheckpointManager::new(config.checkpoint.clone());
    let trainer = Pretrainer::new(
        &config.pretrain,
        &config.model,
        config.data.batch_size,
        &checkpoints,
        store.as_ref(),
        default_device(),
    );
    trainer.run_all(&train, &test)?;

    Ok(())
}

fn parse_roster(list: &str) -> Result<Vec<ExperimentKind>> {
    let mut roster = Vec::new();
    for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match name.parse::<ExperimentKind>() {
            Ok(kind) => roster.push(kind),
            Err(e) => bail!("invalid --experiments: {}", e),
        }
    }
    if roster.is_empty() {
        bail!("--experiments must name at least one experiment");
    }
    Ok(roster)
}
