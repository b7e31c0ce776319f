//! TOML application configuration. Every section has defaults, so an absent
//! or partial config file still yields a runnable setup; `validate` rejects
//! combinations the trainers cannot run with.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::checkpoint::CheckpointConfig;
use crate::data::DataConfig;
use crate::error::ConfigError;
use crate::model::ModelConfig;
use crate::storage::{StorageBackend, StorageConfig};
use crate::training::{ClassifyConfig, PretrainConfig};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data: DataConfig,
    pub model: ModelConfig,
    pub pretrain: PretrainConfig,
    pub classify: ClassifyConfig,
    pub checkpoint: CheckpointConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Load from a TOML file and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            eprintln!(
                "Warning: config file {} not found, using defaults",
                path.display()
            );
            Ok(AppConfig::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |msg: String| Err(ConfigError::Validation(msg));

        if self.data.batch_size == 0 {
            return fail("data.batch_size must be > 0".to_string());
        }
        if self.model.patch_size == 0 || self.model.image_size % self.model.patch_size != 0 {
            return fail(format!(
                "model.patch_size {} must divide model.image_size {}",
                self.model.patch_size, self.model.image_size
            ));
        }
        if self.model.embed_dim == 0 || self.model.embed_dim % self.model.encoder_heads != 0 {
            return fail(format!(
                "model.embed_dim {} must be a nonzero multiple of encoder_heads {}",
                self.model.embed_dim, self.model.encoder_heads
            ));
        }
        if self.model.decoder_dim == 0 || self.model.decoder_dim % self.model.decoder_heads != 0 {
            return fail(format!(
                "model.decoder_dim {} must be a nonzero multiple of decoder_heads {}",
                self.model.decoder_dim, self.model.decoder_heads
            ));
        }
        if self.model.encoder_layers == 0 {
            return fail("model.encoder_layers must be > 0".to_string());
        }

        if self.pretrain.epochs == 0 {
            return fail("pretrain.epochs must be > 0".to_string());
        }
        if !(self.pretrain.mask_ratio > 0.0 && self.pretrain.mask_ratio < 1.0) {
            return fail(format!(
                "pretrain.mask_ratio {} must be in (0, 1)",
                self.pretrain.mask_ratio
            ));
        }
        if self.pretrain.decoder_depth == 0 {
            return fail("pretrain.decoder_depth must be > 0".to_string());
        }
        if self.pretrain.base_learning_rate <= 0.0 {
            return fail("pretrain.base_learning_rate must be > 0".to_string());
        }
        if !(0.0..1.0).contains(&self.pretrain.warmup_fraction) {
            return fail(format!(
                "pretrain.warmup_fraction {} must be in [0, 1)",
                self.pretrain.warmup_fraction
            ));
        }
        if self.pretrain.experiments.is_empty() {
            return fail("pretrain.experiments must name at least one experiment".to_string());
        }

        if self.classify.epochs == 0 {
            return fail("classify.epochs must be > 0".to_string());
        }
        if self.classify.base_learning_rate <= 0.0 {
            return fail("classify.base_learning_rate must be > 0".to_string());
        }
        if !(0.0..1.0).contains(&self.classify.warmup_fraction) {
            return fail(format!(
                "classify.warmup_fraction {} must be in [0, 1)",
                self.classify.warmup_fraction
            ));
        }
        if self.classify.num_classes == 0 {
            return fail("classify.num_classes must be > 0".to_string());
        }

        if self.storage.backend == StorageBackend::Gcs && self.storage.bucket.is_empty() {
            return fail("storage.bucket is required for the gcs backend".to_string());
        }

        Ok(())
    }

    /// The default configuration rendered as TOML, for bootstrapping a
    /// config file.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&AppConfig::default()).unwrap_or_default()
    }
}
