use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use mae_pretrain::backend::default_device;
use mae_pretrain::checkpoint::CheckpointManager;
use mae_pretrain::config::AppConfig;
use mae_pretrain::data::CifarDataset;
use mae_pretrain::training::{ClassifyMode, ClassifyTrainer};

#[derive(Parser, Debug)]
#[command(
    name = "classify",
    about = "CIFAR-10 classification with a pretrained MAE encoder"
)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Override the CIFAR-10 binary data directory
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Training mode: linear_probe, fine_tune, or from_scratch
    #[arg(long, default_value = "linear_probe")]
    mode: String,

    /// Checkpointed pretraining experiment to load the encoder from,
    /// e.g. e_100_pretrain_w_masktoken_0.75_4
    #[arg(long)]
    experiment: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mode = match cli.mode.parse::<ClassifyMode>() {
        Ok(mode) => mode,
        Err(e) => bail!("invalid --mode: {}", e),
    };
    if mode.needs_pretrained() && cli.experiment.is_none() {
        bail!("--experiment is required for mode '{}'", mode);
    }

    let mut config = AppConfig::load_or_default(&cli.config)?;
    if let Some(dir) = cli.data_dir {
        config.data.data_dir = dir;
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
    let trainer = ClassifyTrainer::new(
        &config.classify,
        &config.model,
        config.data.batch_size,
        &checkpoints,
        store.as_ref(),
        default_device(),
    );
    let history = trainer.run(mode, cli.experiment.as_deref(), &train, &test)?;
    println!(
        "Finished {} epochs; best validation accuracy {:.4}.",
        history.epochs(),
        history.best_val_acc
    );

    Ok(())
}
