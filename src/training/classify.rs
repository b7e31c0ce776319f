use std::fmt;
use std::str::FromStr;

use burn::module::AutodiffModule;
use burn::nn::loss::CrossEntropyLossConfig;
use burn::optim::{AdamWConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::ElementConversion;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::backend::{Device, InferBackend, TrainBackend};
use crate::checkpoint::CheckpointManager;
use crate::data::loader::{batches_per_epoch, BatchIter};
use crate::data::CifarDataset;
use crate::error::TrainingError;
use crate::model::{ModelConfig, ViTClassifier};
use crate::storage::ObjectStore;
use crate::training::history::ClassifyHistory;
use crate::training::metrics::LossMeter;
use crate::training::schedule::WarmupCosine;
use crate::training::trainer::LR_REFERENCE_BATCH;

/// How the encoder is used for classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifyMode {
    /// Frozen pretrained encoder, only the linear head trains.
    LinearProbe,
    /// Pretrained encoder, everything trains.
    FineTune,
    /// Random-initialized encoder, everything trains.
    FromScratch,
}

impl ClassifyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassifyMode::LinearProbe => "linear_probe",
            ClassifyMode::FineTune => "fine_tune",
            ClassifyMode::FromScratch => "from_scratch",
        }
    }

    pub fn needs_pretrained(&self) -> bool {
        !matches!(self, ClassifyMode::FromScratch)
    }

    fn freeze_encoder(&self) -> bool {
        matches!(self, ClassifyMode::LinearProbe)
    }
}

impl fmt::Display for ClassifyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClassifyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear_probe" => Ok(ClassifyMode::LinearProbe),
            "fine_tune" => Ok(ClassifyMode::FineTune),
            "from_scratch" => Ok(ClassifyMode::FromScratch),
            other => Err(format!(
                "unknown mode '{}' (expected 'linear_probe', 'fine_tune', or 'from_scratch')",
                other
            )),
        }
    }
}

/// Downstream classification hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifyConfig {
    pub epochs: usize,
    pub base_learning_rate: f64,
    pub weight_decay: f64,
    pub beta_1: f64,
    pub beta_2: f64,
    pub warmup_fraction: f64,
    pub num_classes: usize,
    pub seed: u64,
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        ClassifyConfig {
            epochs: 20,
            base_learning_rate: 1e-3,
            weight_decay: 0.05,
            beta_1: 0.9,
            beta_2: 0.999,
            warmup_fraction: 0.15,
            num_classes: 10,
            seed: 42,
        }
    }
}

/// Evaluates an encoder on CIFAR-10 classification, either probing or
/// fine-tuning a pretrained checkpoint, or training from scratch as the
/// control.
pub struct ClassifyTrainer<'a> {
    config: &'a ClassifyConfig,
    model_config: &'a ModelConfig,
    batch_size: usize,
    checkpoints: &'a CheckpointManager,
    store: &'a dyn ObjectStore,
    device: Device,
}

impl<'a> ClassifyTrainer<'a> {
    pub fn new(
        config: &'a ClassifyConfig,
        model_config: &'a ModelConfig,
        batch_size: usize,
        checkpoints: &'a CheckpointManager,
        store: &'a dyn ObjectStore,
        device: Device,
    ) -> Self {
        ClassifyTrainer {
            config,
            model_config,
            batch_size,
            checkpoints,
            store,
            device,
        }
    }

    /// Train and evaluate one classification run. `pretrained` names the
    /// checkpointed experiment to start from; `from_scratch` ignores it.
    pub fn run(
        &self,
        mode: ClassifyMode,
        pretrained: Option<&str>,
        train: &CifarDataset,
        test: &CifarDataset,
    ) -> Result<ClassifyHistory, TrainingError> {
        let cfg = self.config;

        TrainBackend::seed(cfg.seed);
        let mut rng = StdRng::seed_from_u64(cfg.seed);

        let (mut model, model_label) = self.build_model(mode, pretrained)?;
        println!(
            "Classifying with mode {} on encoder {} ({} epochs).",
            mode, model_label, cfg.epochs
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

        let train_loss_fn = CrossEntropyLossConfig::new().init::<TrainBackend>(&self.device);
        let valid_loss_fn = CrossEntropyLossConfig::new().init::<InferBackend>(&self.device);
        let freeze = mode.freeze_encoder();

        let mut history = ClassifyHistory::new(mode.as_str(), model_label.clone());
        for epoch in 0..cfg.epochs {
            let mut loss_meter = LossMeter::new();
            let mut acc_meter = LossMeter::new();
            let mut batches = BatchIter::new(train, self.batch_size, &mut rng);
            while let Some((images, labels)) = batches.next_batch::<TrainBackend>(&self.device) {
                let logits = model.forward(images, freeze);
                let loss = train_loss_fn.forward(logits.clone(), labels.clone());
                let loss_value = loss.clone().into_scalar() as f64;
                if !loss_value.is_finite() {
                    return Err(TrainingError::NonFiniteLoss {
                        epoch,
                        step: schedule.current_step(),
                    });
                }
                loss_meter.record(loss_value);
                acc_meter.record(accuracy(logits, labels));

                let grads = GradientsParams::from_grads(loss.backward(), &model);
                let lr = schedule.next();
                model = optimizer.step(lr, model, grads);
            }

            let (val_loss, val_acc) = {
                let eval = model.valid();
                let mut loss_meter = LossMeter::new();
                let mut acc_meter = LossMeter::new();
                let mut batches = BatchIter::new(test, self.batch_size, &mut rng);
                while let Some((images, labels)) = batches.next_batch::<InferBackend>(&self.device)
                {
                    let logits = eval.forward(images, true);
                    let loss = valid_loss_fn.forward(logits.clone(), labels.clone());
                    loss_meter.record(loss.into_scalar() as f64);
                    acc_meter.record(accuracy(logits, labels));
                }
                (loss_meter.mean(), acc_meter.mean())
            };

            history.record_epoch(loss_meter.mean(), acc_meter.mean(), val_loss, val_acc);
            println!(
                "In epoch {}: train loss {:.4}, train acc {:.4}, val loss {:.4}, val acc {:.4}.",
                epoch,
                loss_meter.mean(),
                acc_meter.mean(),
                val_loss,
                val_acc
            );
        }

        println!("Best validation accuracy: {:.4}.", history.best_val_acc);

        let key = format!("{}/classify_{}/history.json", model_label, mode.as_str());
        self.store
            .put_bytes(&key, history.to_json().as_bytes(), "application/json")?;
        Ok(history)
    }

    fn build_model(
        &self,
        mode: ClassifyMode,
        pretrained: Option<&str>,
    ) -> Result<(ViTClassifier<TrainBackend>, String), TrainingError> {
        if !mode.needs_pretrained() {
            let model = ViTClassifier::<TrainBackend>::new(
                self.model_config,
                self.config.num_classes,
                &self.device,
            );
            return Ok((model, "from_scratch".to_string()));
        }

        let experiment = pretrained.ok_or_else(|| TrainingError::MissingPretrained {
            mode: mode.to_string(),
        })?;
        let (mae, _metadata) =
            self.checkpoints
                .load::<TrainBackend>(experiment, self.model_config, &self.device)?;
        let model = ViTClassifier::from_encoder(
            mae.into_encoder(),
            self.model_config,
            self.config.num_classes,
            &self.device,
        );
        Ok((model, experiment.to_string()))
    }
}

/// Fraction of correctly classified samples in one batch.
fn accuracy<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> f64 {
    let [b, _] = logits.dims();
    let predicted = logits.argmax(1).reshape([b as i32]);
    let correct: f64 = predicted.equal(targets).int().sum().into_scalar().elem();
    correct / b as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::CheckpointConfig;
    use crate::data::cifar::IMAGE_BYTES;
    use crate::model::MaeVit;
    use crate::storage::FsObjectStore;
    use crate::training::experiment::ExperimentKind;
    use crate::training::trainer::{PretrainConfig, Pretrainer};

    fn small_model_config() -> ModelConfig {
        ModelConfig {
            image_size: 32,
            patch_size: 8,
            embed_dim: 16,
            encoder_layers: 1,
            encoder_heads: 2,
            decoder_dim: 16,
            decoder_heads: 2,
            ff_mult: 2,
            layer_norm_eps: 1e-6,
        }
    }

    fn synthetic_dataset(n: usize) -> CifarDataset {
        let images = (0..n * IMAGE_BYTES).map(|i| (i % 239) as u8).collect();
        let labels = (0..n).map(|i| (i % 10) as u8).collect();
        CifarDataset::from_parts(images, labels)
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!(
            "linear_probe".parse::<ClassifyMode>().unwrap(),
            ClassifyMode::LinearProbe
        );
        assert_eq!(
            "from_scratch".parse::<ClassifyMode>().unwrap(),
            ClassifyMode::FromScratch
        );
        assert!("probe".parse::<ClassifyMode>().is_err());
        assert!(ClassifyMode::FineTune.needs_pretrained());
        assert!(!ClassifyMode::FromScratch.needs_pretrained());
    }

    #[test]
    fn test_accuracy() {
        let device = Default::default();
        let logits = Tensor::<InferBackend, 2>::from_data(
            TensorData::from([[0.9f32, 0.1], [0.2, 0.8], [0.7, 0.3]]),
            &device,
        );
        let targets =
            Tensor::<InferBackend, 1, Int>::from_data(TensorData::from([0i32, 1, 1]), &device);
        let acc = accuracy(logits, targets);
        assert!((acc - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_from_scratch_run() {
        let artifact_dir = tempfile::tempdir().unwrap();
        let model_dir = tempfile::tempdir().unwrap();

        let config = ClassifyConfig {
            epochs: 1,
            ..Default::default()
        };
        let model_config = small_model_config();
        let store = FsObjectStore::new(artifact_dir.path().to_path_buf());
        let checkpoints = CheckpointManager::new(CheckpointConfig {
            model_dir: model_dir.path().to_path_buf(),
        });

        let train = synthetic_dataset(8);
        let test = synthetic_dataset(4);

        let trainer = ClassifyTrainer::new(
            &config,
            &model_config,
            4,
            &checkpoints,
            &store,
            Default::default(),
        );
        let history = trainer
            .run(ClassifyMode::FromScratch, None, &train, &test)
            .unwrap();

        assert_eq!(history.epochs(), 1);
        assert!(history.acc_val[0] >= 0.0 && history.acc_val[0] <= 1.0);
        assert!(artifact_dir
            .path()
            .join("from_scratch/classify_from_scratch/history.json")
            .exists());
    }

    #[test]
    fn test_probe_requires_pretrained_name() {
        let artifact_dir = tempfile::tempdir().unwrap();
        let model_dir = tempfile::tempdir().unwrap();

        let config = ClassifyConfig::default();
        let model_config = small_model_config();
        let store = FsObjectStore::new(artifact_dir.path().to_path_buf());
        let checkpoints = CheckpointManager::new(CheckpointConfig {
            model_dir: model_dir.path().to_path_buf(),
        });

        let train = synthetic_dataset(4);
        let test = synthetic_dataset(4);

        let trainer = ClassifyTrainer::new(
            &config,
            &model_config,
            4,
            &checkpoints,
            &store,
            Default::default(),
        );
        let err = trainer
            .run(ClassifyMode::LinearProbe, None, &train, &test)
            .unwrap_err();
        assert!(matches!(err, TrainingError::MissingPretrained { .. }));
    }

    #[test]
    fn test_probe_loads_pretrained_checkpoint() {
        let artifact_dir = tempfile::tempdir().unwrap();
        let model_dir = tempfile::tempdir().unwrap();

        let model_config = small_model_config();
        let store = FsObjectStore::new(artifact_dir.path().to_path_buf());
        let checkpoints = CheckpointManager::new(CheckpointConfig {
            model_dir: model_dir.path().to_path_buf(),
        });

        let train = synthetic_dataset(4);
        let test = synthetic_dataset(4);

        // Pretrain one epoch to produce a checkpoint to probe.
        let pretrain_config = PretrainConfig {
            epochs: 1,
            viz_panels: 0,
            ..Default::default()
        };
        let pretrainer = Pretrainer::new(
            &pretrain_config,
            &model_config,
            4,
            &checkpoints,
            &store,
            Default::default(),
        );
        let pretrain_history = pretrainer
            .run(ExperimentKind::Baseline, &train, &test)
            .unwrap();

        let config = ClassifyConfig {
            epochs: 1,
            ..Default::default()
        };
        let trainer = ClassifyTrainer::new(
            &config,
            &model_config,
            4,
            &checkpoints,
            &store,
            Default::default(),
        );
        let history = trainer
            .run(
                ClassifyMode::LinearProbe,
                Some(&pretrain_history.experiment),
                &train,
                &test,
            )
            .unwrap();

        assert_eq!(history.model, pretrain_history.experiment);
        assert_eq!(history.experiment, "linear_probe");
    }

    #[test]
    fn test_mae_checkpoint_feeds_classifier() {
        // into_encoder keeps the encoder weights usable for classification.
        let device = Default::default();
        let cfg = small_model_config();
        let mae = MaeVit::<InferBackend>::new(&cfg, true, 1, &device);
        let classifier = ViTClassifier::from_encoder(mae.into_encoder(), &cfg, 10, &device);

        let images = Tensor::zeros([2, 3, 32, 32], &device);
        let logits = classifier.forward(images, true);
        assert_eq!(logits.shape().dims, [2, 10]);
    }
}
