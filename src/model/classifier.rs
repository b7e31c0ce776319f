use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;

use crate::model::mae::MaeEncoder;
use crate::model::ModelConfig;

/// Classifier over a (pretrained or fresh) MAE encoder: full-sequence
/// encoding, class-token readout, linear head.
#[derive(Module, Debug)]
pub struct ViTClassifier<B: Backend> {
    encoder: MaeEncoder<B>,
    head: Linear<B>,
}

impl<B: Backend> ViTClassifier<B> {
    /// Random-initialized encoder (the from-scratch baseline).
    pub fn new(cfg: &ModelConfig, num_classes: usize, device: &B::Device) -> Self {
        Self::from_encoder(MaeEncoder::new(cfg, device), cfg, num_classes, device)
    }

    /// Wrap a pretrained encoder.
    pub fn from_encoder(
        encoder: MaeEncoder<B>,
        cfg: &ModelConfig,
        num_classes: usize,
        device: &B::Device,
    ) -> Self {
        ViTClassifier {
            encoder,
            head: LinearConfig::new(cfg.embed_dim, num_classes).init(device),
        }
    }

    /// [B, 3, H, W] -> [B, num_classes] logits. With `freeze_encoder` the
    /// encoder output is detached so only the head receives gradients
    /// (linear probing).
    pub fn forward(&self, images: Tensor<B, 4>, freeze_encoder: bool) -> Tensor<B, 2> {
        let features = self.encoder.forward_all(images); // [B, n+1, D]
        let features = if freeze_encoder {
            features.detach()
        } else {
            features
        };
        let [b, _, d] = features.dims();
        let cls = features.slice([0..b, 0..1, 0..d]).squeeze::<2>(1); // [B, D]
        self.head.forward(cls)
    }
}
