use std::fs;
use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::prelude::*;
use burn::record::DefaultRecorder;

use crate::checkpoint::metadata::CheckpointMetadata;
use crate::error::CheckpointError;
use crate::model::{MaeVit, ModelConfig};

/// Where checkpoints live. One directory per experiment, overwritten each
/// epoch; only the latest model is kept.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    pub model_dir: PathBuf,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        CheckpointConfig {
            model_dir: PathBuf::from("./model"),
        }
    }
}

/// Saves and restores MAE checkpoints under `model_dir/<experiment>/`.
pub struct CheckpointManager {
    config: CheckpointConfig,
}

impl CheckpointManager {
    pub fn new(config: CheckpointConfig) -> Self {
        fs::create_dir_all(&config.model_dir).ok();
        CheckpointManager { config }
    }

    fn experiment_dir(&self, experiment: &str) -> PathBuf {
        self.config.model_dir.join(experiment)
    }

    /// Save weights and metadata, replacing any previous checkpoint for the
    /// experiment. Writes into a sibling `.tmp` directory first so a crash
    /// mid-save cannot corrupt the latest good checkpoint.
    pub fn save<B: Backend>(
        &self,
        model: &MaeVit<B>,
        metadata: &CheckpointMetadata,
    ) -> Result<PathBuf, CheckpointError> {
        let final_dir = self.experiment_dir(&metadata.experiment);
        let tmp_dir = self
            .config
            .model_dir
            .join(format!("{}.tmp", metadata.experiment));

        if tmp_dir.exists() {
            fs::remove_dir_all(&tmp_dir)?;
        }
        fs::create_dir_all(&tmp_dir)?;

        let recorder = DefaultRecorder::default();
        model
            .clone()
            .save_file(tmp_dir.join("model"), &recorder)
            .map_err(|e| CheckpointError::ModelSave(e.to_string()))?;

        let meta_json = serde_json::to_string_pretty(metadata)?;
        fs::write(tmp_dir.join("metadata.json"), meta_json)?;

        if final_dir.exists() {
            fs::remove_dir_all(&final_dir)?;
        }
        fs::rename(&tmp_dir, &final_dir)?;

        Ok(final_dir)
    }

    /// Read checkpoint metadata for an experiment.
    pub fn load_metadata(&self, experiment: &str) -> Result<CheckpointMetadata, CheckpointError> {
        let dir = self.experiment_dir(experiment);
        if !dir.exists() {
            return Err(CheckpointError::NotFound(dir));
        }
        read_metadata(&dir.join("metadata.json"))
    }

    /// Rebuild the model variant described by the stored metadata and load
    /// its weights.
    pub fn load<B: Backend>(
        &self,
        experiment: &str,
        model_cfg: &ModelConfig,
        device: &B::Device,
    ) -> Result<(MaeVit<B>, CheckpointMetadata), CheckpointError> {
        let metadata = self.load_metadata(experiment)?;
        let dir = self.experiment_dir(experiment);

        let recorder = DefaultRecorder::default();
        let model = MaeVit::<B>::new(
            model_cfg,
            metadata.with_mask_token,
            metadata.decoder_depth,
            device,
        )
        .load_file(dir.join("model"), &recorder, device)
        .map_err(|e| CheckpointError::ModelLoad(e.to_string()))?;

        Ok((model, metadata))
    }
}

fn read_metadata(path: &Path) -> Result<CheckpointMetadata, CheckpointError> {
    let json = fs::read_to_string(path).map_err(|e| CheckpointError::MetadataRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_str(&json).map_err(|e| CheckpointError::MetadataParse {
        path: path.to_path_buf(),
        source: e,
    })
}
