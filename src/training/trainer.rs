use burn::module::AutodiffModule;
use burn::optim::{AdamWConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::backend::{Device, InferBackend, TrainBackend};
use crate::checkpoint::{CheckpointManager, CheckpointMetadata};
use crate::data::loader::{batches_per_epoch, BatchIter};
use crate::data::CifarDataset;
use crate::error::TrainingError;
use crate::model::{masked_mse_loss, MaeVit, ModelConfig, PatchMask};
use crate::storage::ObjectStore;
use crate::training::experiment::ExperimentKind;
use crate::training::history::PretrainHistory;
use crate::training::metrics::LossMeter;
use crate::training::schedule::WarmupCosine;
use crate::viz;

/// Reference batch size the configured learning rate is stated for. The
/// effective rate is scaled linearly with the actual batch size.
pub(crate) const LR_REFERENCE_BATCH: f64 = 256.0;

/// Pretraining hyperparameters and the experiment roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PretrainConfig {
    pub epochs: usize,
    pub base_learning_rate: f64,
    pub weight_decay: f64,
    pub beta_1: f64,
    pub beta_2: f64,
    /// Fraction of total optimizer steps spent on linear warmup.
    pub warmup_fraction: f64,
    pub mask_ratio: f64,
    pub decoder_depth: usize,
    /// Images per row in the per-epoch reconstruction panel.
    pub viz_panels: usize,
    pub seed: u64,
    pub experiments: Vec<ExperimentKind>,
}

impl Default for PretrainConfig {
    fn default() -> Self {
        PretrainConfig {
            epochs: 100,
            base_learning_rate: 1.5e-4,
            weight_decay: 0.05,
            beta_1: 0.9,
            beta_2: 0.95,
            warmup_fraction: 0.15,
            mask_ratio: 0.75,
            decoder_depth: 4,
            viz_panels: 8,
            seed: 42,
            experiments: vec![ExperimentKind::WMasktoken],
        }
    }
}

/// Drives MAE pretraining: for each experiment it trains a model variant from
/// scratch, overwrites the checkpoint every epoch, uploads a reconstruction
/// panel per epoch, and uploads the loss history when the run finishes.
pub struct Pretrainer<'a> {
    config: &'a PretrainConfig,
    model_config: &'a ModelConfig,
    batch_size: usize,
    checkpoints: &'a CheckpointManager,
    store: &'a dyn ObjectStore,
    device: Device,
}

impl<'a> Pretrainer<'a> {
    pub fn new(
        config: &'a PretrainConfig,
        model_config: &'a ModelConfig,
        batch_size: usize,
        checkpoints: &'a CheckpointManager,
        store: &'a dyn ObjectStore,
        device: Device,
    ) -> Self {
        Pretrainer {
            config,
            model_config,
            batch_size,
            checkpoints,
            store,
            device,
        }
    }

    /// Run every configured experiment in order.
    pub fn run_all(
        &self,
        train: &CifarDataset,
        test: &CifarDataset,
    ) -> Result<Vec<PretrainHistory>, TrainingError> {
        let mut histories = Vec::with_capacity(self.config.experiments.len());
        for &kind in &self.config.experiments {
            let history = self.run(kind, train, test)?;
            println!("Experiment {} is done!", history.experiment);
            histories.push(history);
        }
        Ok(histories)
    }

    /// Pretrain one experiment variant end to end.
    pub fn run(
        &self,
        kind: ExperimentKind,
        train: &CifarDataset,
        test: &CifarDataset,
    ) -> Result<PretrainHistory, TrainingError> {
        let cfg = self.config;
        let name = kind.experiment_name(cfg.epochs, cfg.mask_ratio, cfg.decoder_depth);
        println!(
            "Starting experiment {} ({} epochs, batch size {}).",
            name, cfg.epochs, self.batch_size
        );

        TrainBackend::seed(cfg.seed);
        let mut rng = StdRng::seed_from_u64(cfg.seed);

        let mut model = MaeVit::<TrainBackend>::new(
            self.model_config,
            kind.with_mask_token(),
            cfg.decoder_depth,
            &self.device,
        );
        let mut optimizer = AdamWConfig::new()
            .with_beta_1(cfg.beta_1 as f32)
            .with_beta_2(cfg.beta_2 as f32)
            .with_weight_decay(cfg.weight_decay as f32)
            .init();

        let steps_per_epoch = batches_per_epoch(train.len(), self.batch_size);
        let total_steps = steps_per_epoch * cfg.epochs;
        let base_lr = cfg.base_learning_rate * self.batch_size as f64 / LR_REFERENCE_BATCH;
        let warmup_steps = (cfg.warmup_fraction * total_steps as f64).round() as usize;
        let mut schedule = WarmupCosine::new(base_lr, 0.0, warmup_steps, total_steps);

        let strategy = kind.strategy();
        let grid = self.model_config.grid_size();

        // The panel shows the same test images under the same masks every
        // epoch, so successive uploads are directly comparable.
        let panel_count = cfg.viz_panels.min(test.len());
        let panel = (panel_count > 0).then(|| {
            let images = test.head_images::<InferBackend>(panel_count, &self.device);
            let masks: Vec<PatchMask> = (0..panel_count)
                .map(|_| strategy.sample(grid, cfg.mask_ratio, &mut rng))
                .collect();
            (images, masks)
        });

        let mut history = PretrainHistory::new(name.clone());
        for epoch in 0..cfg.epochs {
            let mut meter = LossMeter::new();
            let mut batches = BatchIter::new(train, self.batch_size, &mut rng);
            while let Some((images, _)) = batches.next_batch::<TrainBackend>(&self.device) {
                let [b, _, _, _] = images.dims();
                let masks: Vec<PatchMask> = (0..b)
                    .map(|_| strategy.sample(grid, cfg.mask_ratio, &mut rng))
                    .collect();

                let (reconstruction, mask) = model.forward(images.clone(), &masks);
                let loss = masked_mse_loss(reconstruction, images, mask, cfg.mask_ratio);
                let loss_value = loss.clone().into_scalar() as f64;
                if !loss_value.is_finite() {
                    return Err(TrainingError::NonFiniteLoss {
                        epoch,
                        step: schedule.current_step(),
                    });
                }
                meter.record(loss_value);

                let grads = GradientsParams::from_grads(loss.backward(), &model);
                let lr = schedule.next();
                model = optimizer.step(lr, model, grads);
            }

            let average = meter.mean();
            history.record_epoch(average);
            println!("In epoch {}, average training loss is {:.6}.", epoch, average);

            if let Some((images, masks)) = &panel {
                self.upload_panel(&model, &name, epoch, images.clone(), masks)?;
            }
            self.save_checkpoint(&model, kind, &name, epoch, average)?;
        }

        let key = format!("{}/history.json", name);
        self.store
            .put_bytes(&key, history.to_json().as_bytes(), "application/json")?;
        Ok(history)
    }

    /// Encode and upload the reconstruction panel for one epoch: masked
    /// inputs on top, reconstructions composited with the visible pixels in
    /// the middle, originals on the bottom.
    fn upload_panel(
        &self,
        model: &MaeVit<TrainBackend>,
        name: &str,
        epoch: usize,
        images: Tensor<InferBackend, 4>,
        masks: &[PatchMask],
    ) -> Result<(), TrainingError> {
        let eval = model.valid();
        let (reconstruction, mask) = eval.forward(images.clone(), masks);
        let visible = mask.clone().neg().add_scalar(1.0);

        let masked_input = images.clone() * visible.clone();
        let composite = reconstruction * mask + images.clone() * visible;
        let jpeg = viz::reconstruction_panel(masked_input, composite, images)
            .map_err(|e| TrainingError::Viz(e.to_string()))?;

        let key = format!("{}/images/epoch_{}.jpg", name, epoch);
        self.store.put_bytes(&key, &jpeg, "image/jpeg")?;
        Ok(())
    }

    fn save_checkpoint(
        &self,
        model: &MaeVit<TrainBackend>,
        kind: ExperimentKind,
        name: &str,
        epoch: usize,
        last_loss: f64,
    ) -> Result<(), TrainingError> {
        let metadata = CheckpointMetadata {
            experiment: name.to_string(),
            epoch,
            mask_ratio: self.config.mask_ratio,
            decoder_depth: self.config.decoder_depth,
            with_mask_token: kind.with_mask_token(),
            last_loss,
            timestamp: unix_timestamp(),
        };
        self.checkpoints.save(model, &metadata)?;
        Ok(())
    }
}

fn unix_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
