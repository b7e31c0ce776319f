//! MAE model family: masking strategies, the masked autoencoder itself, and
//! the classifier head used for downstream evaluation of a pretrained encoder.

pub mod classifier;
pub mod mae;
pub mod masking;

pub use classifier::ViTClassifier;
pub use mae::{masked_mse_loss, MaeDecoder, MaeEncoder, MaeVit};
pub use masking::{MaskStrategy, PatchMask};

/// Architecture hyperparameters shared by the autoencoder and the classifier.
///
/// Defaults follow the ViT-tiny-style encoder used for 32x32 CIFAR inputs:
/// 2x2 patches (256 tokens), 192-dim embeddings, 12 encoder layers.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub image_size: usize,
    pub patch_size: usize,
    pub embed_dim: usize,
    pub encoder_layers: usize,
    pub encoder_heads: usize,
    pub decoder_dim: usize,
    pub decoder_heads: usize,
    pub ff_mult: usize,
    pub layer_norm_eps: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            image_size: 32,
            patch_size: 2,
            embed_dim: 192,
            encoder_layers: 12,
            encoder_heads: 3,
            decoder_dim: 192,
            decoder_heads: 3,
            ff_mult: 4,
            layer_norm_eps: 1e-6,
        }
    }
}

impl ModelConfig {
    /// Patches per side of the token grid.
    pub fn grid_size(&self) -> usize {
        self.image_size / self.patch_size
    }

    pub fn n_patches(&self) -> usize {
        let g = self.grid_size();
        g * g
    }

    /// A reduced configuration for fast unit tests.
    #[cfg(test)]
    pub(crate) fn tiny() -> Self {
        ModelConfig {
            image_size: 8,
            patch_size: 2,
            embed_dim: 16,
            encoder_layers: 1,
            encoder_heads: 2,
            decoder_dim: 16,
            decoder_heads: 2,
            ff_mult: 2,
            layer_norm_eps: 1e-6,
        }
    }
}
