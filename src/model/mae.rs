use burn::module::{Ignored, Param};
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::transformer::{TransformerEncoder, TransformerEncoderConfig, TransformerEncoderInput};
use burn::nn::{Initializer, LayerNorm, LayerNormConfig, Linear, LinearConfig};
use burn::prelude::*;

use crate::model::masking::PatchMask;
use crate::model::ModelConfig;

const EMBED_STD: f64 = 0.02;

/// ViT encoder operating on the visible subset of patch tokens.
///
/// Patch embedding is a strided convolution; tokens get learned positional
/// embeddings before masking so each surviving token keeps its own position.
/// A class token is prepended and carried through the transformer.
#[derive(Module, Debug)]
pub struct MaeEncoder<B: Backend> {
    patch_embed: Conv2d<B>,
    pos_embed: Param<Tensor<B, 2>>,
    cls_token: Param<Tensor<B, 2>>,
    transformer: TransformerEncoder<B>,
    norm: LayerNorm<B>,
    grid: Ignored<usize>,
}

impl<B: Backend> MaeEncoder<B> {
    pub fn new(cfg: &ModelConfig, device: &B::Device) -> Self {
        let init = Initializer::Normal {
            mean: 0.0,
            std: EMBED_STD,
        };
        MaeEncoder {
            patch_embed: Conv2dConfig::new([3, cfg.embed_dim], [cfg.patch_size, cfg.patch_size])
                .with_stride([cfg.patch_size, cfg.patch_size])
                .init(device),
            pos_embed: init.init([cfg.n_patches(), cfg.embed_dim], device),
            cls_token: init.init([1, cfg.embed_dim], device),
            transformer: TransformerEncoderConfig::new(
                cfg.embed_dim,
                cfg.embed_dim * cfg.ff_mult,
                cfg.encoder_heads,
                cfg.encoder_layers,
            )
            .with_norm_first(true)
            .with_dropout(0.0)
            .init(device),
            norm: LayerNormConfig::new(cfg.embed_dim)
                .with_epsilon(cfg.layer_norm_eps)
                .init(device),
            grid: Ignored(cfg.grid_size()),
        }
    }

    /// Embed all patches and add positional embeddings: [B, 3, H, W] -> [B, n, D].
    /// Token j corresponds to grid cell (j / grid, j % grid).
    fn patch_tokens(&self, images: Tensor<B, 4>) -> Tensor<B, 3> {
        let [b, _, _, _] = images.dims();
        let grid = self.grid.0;
        let n = grid * grid;

        let x = self.patch_embed.forward(images); // [B, D, g, g]
        let [_, d, _, _] = x.dims();
        let x = x.reshape([b as i32, d as i32, n as i32]).swap_dims(1, 2); // [B, n, D]
        x + self.pos_embed.val().unsqueeze::<3>()
    }

    /// Encode only the visible tokens of each sample: [B, 3, H, W] -> [B, k+1, D]
    /// with the class token at position 0.
    pub fn forward_visible(&self, images: Tensor<B, 4>, masks: &[PatchMask]) -> Tensor<B, 3> {
        let device = images.device();
        let [b, _, _, _] = images.dims();
        assert_eq!(masks.len(), b, "one mask per sample required");

        let tokens = self.patch_tokens(images); // [B, n, D]
        let [_, n, d] = tokens.dims();
        let k = masks[0].visible.len();

        let mut visible = Vec::with_capacity(b);
        for (i, mask) in masks.iter().enumerate() {
            assert_eq!(mask.visible.len(), k, "masks must keep equal token counts");
            let idx: Vec<i32> = mask.visible.iter().map(|&v| v as i32).collect();
            let idx = Tensor::<B, 1, Int>::from_data(TensorData::from(idx.as_slice()), &device);
            let sample = tokens.clone().slice([i..i + 1, 0..n, 0..d]).squeeze::<2>(0);
            visible.push(sample.select(0, idx)); // [k, D]
        }
        let x = Tensor::stack(visible, 0); // [B, k, D]

        self.encode(x)
    }

    /// Encode the full token sequence (no masking): [B, 3, H, W] -> [B, n+1, D].
    /// Used by the downstream classifier.
    pub fn forward_all(&self, images: Tensor<B, 4>) -> Tensor<B, 3> {
        let tokens = self.patch_tokens(images);
        self.encode(tokens)
    }

    fn encode(&self, tokens: Tensor<B, 3>) -> Tensor<B, 3> {
        let [b, _, d] = tokens.dims();
        let cls = self
            .cls_token
            .val()
            .unsqueeze::<3>()
            .expand([b as i32, 1, d as i32]);
        let x = Tensor::cat(vec![cls, tokens], 1);
        let x = self.transformer.forward(TransformerEncoderInput::new(x));
        self.norm.forward(x)
    }
}

/// Lightweight transformer decoder regressing masked pixels.
///
/// The encoded visible tokens are projected to the decoder width, scattered
/// back into a full-length sequence whose masked slots hold either a learned
/// mask token or zeros, and run through a shallow transformer before the
/// per-patch pixel head.
#[derive(Module, Debug)]
pub struct MaeDecoder<B: Backend> {
    embed: Linear<B>,
    mask_token: Option<Param<Tensor<B, 1>>>,
    pos_embed: Param<Tensor<B, 2>>,
    transformer: TransformerEncoder<B>,
    head: Linear<B>,
    patch_size: Ignored<usize>,
    grid: Ignored<usize>,
}

impl<B: Backend> MaeDecoder<B> {
    pub fn new(
        cfg: &ModelConfig,
        depth: usize,
        with_mask_token: bool,
        device: &B::Device,
    ) -> Self {
        let init = Initializer::Normal {
            mean: 0.0,
            std: EMBED_STD,
        };
        let patch_dim = cfg.patch_size * cfg.patch_size * 3;
        MaeDecoder {
            embed: LinearConfig::new(cfg.embed_dim, cfg.decoder_dim).init(device),
            mask_token: with_mask_token.then(|| init.init([cfg.decoder_dim], device)),
            pos_embed: init.init([cfg.n_patches() + 1, cfg.decoder_dim], device),
            transformer: TransformerEncoderConfig::new(
                cfg.decoder_dim,
                cfg.decoder_dim * cfg.ff_mult,
                cfg.decoder_heads,
                depth,
            )
            .with_norm_first(true)
            .with_dropout(0.0)
            .init(device),
            head: LinearConfig::new(cfg.decoder_dim, patch_dim).init(device),
            patch_size: Ignored(cfg.patch_size),
            grid: Ignored(cfg.grid_size()),
        }
    }

    /// Reconstruct full images from encoded visible tokens:
    /// [B, k+1, D] -> [B, 3, H, W].
    pub fn forward(&self, encoded: Tensor<B, 3>, masks: &[PatchMask]) -> Tensor<B, 4> {
        let device = encoded.device();
        let grid = self.grid.0;
        let n = grid * grid;

        let x = self.embed.forward(encoded); // [B, k+1, Dd]
        let [b, k1, dd] = x.dims();
        let k = k1 - 1;

        let fill_row = match &self.mask_token {
            Some(token) => token.val(),
            None => Tensor::zeros([dd], &device),
        };
        let fill = fill_row
            .unsqueeze::<2>()
            .expand([(n - k) as i32, dd as i32]); // [n-k, Dd]

        // Rebuild the full-length sequence per sample: visible tokens return
        // to their original patch slots, everything else gets the fill row.
        let mut full = Vec::with_capacity(b);
        for (i, mask) in masks.iter().enumerate() {
            let sample = x.clone().slice([i..i + 1, 0..k1, 0..dd]).squeeze::<2>(0);
            let cls = sample.clone().slice([0..1, 0..dd]);
            let vis = sample.slice([1..k1, 0..dd]); // ordered by mask.visible

            let combined = Tensor::cat(vec![vis, fill.clone()], 0); // [n, Dd]
            let mut perm = vec![0i32; n];
            for (row, &patch) in mask.visible.iter().enumerate() {
                perm[patch] = row as i32;
            }
            for (row, &patch) in mask.masked.iter().enumerate() {
                perm[patch] = (k + row) as i32;
            }
            let perm = Tensor::<B, 1, Int>::from_data(TensorData::from(perm.as_slice()), &device);
            let seq = combined.select(0, perm); // [n, Dd], patch order

            full.push(Tensor::cat(vec![cls, seq], 0)); // [n+1, Dd]
        }
        let x = Tensor::stack(full, 0); // [B, n+1, Dd]

        let x = x + self.pos_embed.val().unsqueeze::<3>();
        let x = self.transformer.forward(TransformerEncoderInput::new(x));
        let tokens = x.slice([0..b, 1..n + 1, 0..dd]); // drop cls
        let pixels = self.head.forward(tokens); // [B, n, p*p*3]

        self.unpatchify(pixels)
    }

    /// [B, n, 3*p*p] patch vectors -> [B, 3, H, W] images. Patch vectors are
    /// laid out channel-major: [3, p, p].
    fn unpatchify(&self, pixels: Tensor<B, 3>) -> Tensor<B, 4> {
        let p = self.patch_size.0;
        let g = self.grid.0;
        let [b, _, _] = pixels.dims();

        pixels
            .reshape([b as i32, g as i32, g as i32, 3, p as i32, p as i32])
            .permute([0, 3, 1, 4, 2, 5]) // [B, 3, g, p, g, p]
            .reshape([b as i32, 3, (g * p) as i32, (g * p) as i32])
    }
}

/// The full masked autoencoder.
#[derive(Module, Debug)]
pub struct MaeVit<B: Backend> {
    pub encoder: MaeEncoder<B>,
    decoder: MaeDecoder<B>,
    image_size: Ignored<usize>,
    patch_size: Ignored<usize>,
}

impl<B: Backend> MaeVit<B> {
    pub fn new(
        cfg: &ModelConfig,
        with_mask_token: bool,
        decoder_depth: usize,
        device: &B::Device,
    ) -> Self {
        MaeVit {
            encoder: MaeEncoder::new(cfg, device),
            decoder: MaeDecoder::new(cfg, decoder_depth, with_mask_token, device),
            image_size: Ignored(cfg.image_size),
            patch_size: Ignored(cfg.patch_size),
        }
    }

    /// Forward pass. Returns `(reconstruction, mask)` where both are
    /// [B, 3, H, W] and `mask` is 1.0 over the pixels of masked patches.
    pub fn forward(
        &self,
        images: Tensor<B, 4>,
        masks: &[PatchMask],
    ) -> (Tensor<B, 4>, Tensor<B, 4>) {
        let device = images.device();
        let encoded = self.encoder.forward_visible(images, masks);
        let reconstruction = self.decoder.forward(encoded, masks);
        let mask = self.pixel_mask(masks, &device);
        (reconstruction, mask)
    }

    /// Take the encoder for downstream use, dropping the decoder.
    pub fn into_encoder(self) -> MaeEncoder<B> {
        self.encoder
    }

    /// Expand patch-level masks to a [B, 3, H, W] pixel mask (1.0 = masked).
    fn pixel_mask(&self, masks: &[PatchMask], device: &B::Device) -> Tensor<B, 4> {
        let size = self.image_size.0;
        let p = self.patch_size.0;
        let grid = size / p;
        let b = masks.len();

        let mut data = vec![0.0f32; b * size * size];
        for (i, mask) in masks.iter().enumerate() {
            let base = i * size * size;
            for &patch in &mask.masked {
                let (pr, pc) = (patch / grid, patch % grid);
                for dr in 0..p {
                    let row = pr * p + dr;
                    let start = base + row * size + pc * p;
                    for slot in &mut data[start..start + p] {
                        *slot = 1.0;
                    }
                }
            }
        }

        Tensor::<B, 1>::from_data(TensorData::from(data.as_slice()), device)
            .reshape([b as i32, 1, size as i32, size as i32])
            .repeat_dim(1, 3)
    }
}

/// Reconstruction objective: MSE restricted to masked pixels, normalized by
/// the mask ratio so the magnitude is comparable across ratios.
pub fn masked_mse_loss<B: Backend>(
    pred: Tensor<B, 4>,
    target: Tensor<B, 4>,
    mask: Tensor<B, 4>,
    mask_ratio: f64,
) -> Tensor<B, 1> {
    let diff = pred - target;
    (diff.clone() * diff * mask).mean() / mask_ratio as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::masking::MaskStrategy;
    use burn::backend::NdArray;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    type TestBackend = NdArray<f32>;

    fn test_masks(cfg: &ModelConfig, batch: usize, seed: u64) -> Vec<PatchMask> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..batch)
            .map(|_| MaskStrategy::Random.sample(cfg.grid_size(), 0.75, &mut rng))
            .collect()
    }

    #[test]
    fn test_forward_shapes() {
        let device = Default::default();
        let cfg = ModelConfig::tiny();
        let model = MaeVit::<TestBackend>::new(&cfg, true, 1, &device);

        let images = Tensor::zeros([2, 3, cfg.image_size, cfg.image_size], &device);
        let masks = test_masks(&cfg, 2, 1);
        let (recon, mask) = model.forward(images, &masks);

        assert_eq!(recon.shape().dims, [2, 3, cfg.image_size, cfg.image_size]);
        assert_eq!(mask.shape().dims, [2, 3, cfg.image_size, cfg.image_size]);
    }

    #[test]
    fn test_forward_without_mask_token() {
        let device = Default::default();
        let cfg = ModelConfig::tiny();
        let model = MaeVit::<TestBackend>::new(&cfg, false, 1, &device);

        let images = Tensor::zeros([1, 3, cfg.image_size, cfg.image_size], &device);
        let masks = test_masks(&cfg, 1, 2);
        let (recon, _) = model.forward(images, &masks);
        assert_eq!(recon.shape().dims, [1, 3, cfg.image_size, cfg.image_size]);
    }

    #[test]
    fn test_pixel_mask_fraction_matches_ratio() {
        let device: <TestBackend as Backend>::Device = Default::default();
        let cfg = ModelConfig::tiny();
        let model = MaeVit::<TestBackend>::new(&cfg, true, 1, &device);

        let masks = test_masks(&cfg, 2, 3);
        let mask = model.pixel_mask(&masks, &device);
        let mean: Vec<f32> = mask
            .mean()
            .into_data()
            .to_vec()
            .expect("mask mean extraction");

        // 12 of 16 patches masked at ratio 0.75
        assert!((mean[0] - 0.75).abs() < 1e-6, "got {}", mean[0]);
    }

    #[test]
    fn test_pixel_mask_is_binary_and_patch_aligned() {
        let device: <TestBackend as Backend>::Device = Default::default();
        let cfg = ModelConfig::tiny();
        let model = MaeVit::<TestBackend>::new(&cfg, true, 1, &device);

        let masks = test_masks(&cfg, 1, 4);
        let data: Vec<f32> = model
            .pixel_mask(&masks, &device)
            .into_data()
            .to_vec()
            .expect("mask data extraction");

        assert!(data.iter().all(|&v| v == 0.0 || v == 1.0));

        // Every pixel of a masked patch is set, in every channel.
        let size = cfg.image_size;
        let grid = cfg.grid_size();
        let p = cfg.patch_size;
        for &patch in &masks[0].masked {
            let (pr, pc) = (patch / grid, patch % grid);
            for ch in 0..3 {
                for dr in 0..p {
                    for dc in 0..p {
                        let idx = ch * size * size + (pr * p + dr) * size + pc * p + dc;
                        assert_eq!(data[idx], 1.0);
                    }
                }
            }
        }
    }

    #[test]
    fn test_masked_mse_loss_ignores_visible_pixels() {
        let device: <TestBackend as Backend>::Device = Default::default();
        let target = Tensor::<TestBackend, 4>::zeros([1, 3, 4, 4], &device);
        let pred = Tensor::<TestBackend, 4>::ones([1, 3, 4, 4], &device);
        let mask = Tensor::<TestBackend, 4>::zeros([1, 3, 4, 4], &device);

        let loss: Vec<f32> = masked_mse_loss(pred, target, mask, 0.75)
            .into_data()
            .to_vec()
            .expect("loss extraction");
        assert_eq!(loss[0], 0.0);
    }

    #[test]
    fn test_masked_mse_loss_normalizes_by_ratio() {
        let device: <TestBackend as Backend>::Device = Default::default();
        let target = Tensor::<TestBackend, 4>::zeros([1, 3, 4, 4], &device);
        let pred = Tensor::<TestBackend, 4>::ones([1, 3, 4, 4], &device);
        let mask = Tensor::<TestBackend, 4>::ones([1, 3, 4, 4], &device);

        // All pixels masked, unit squared error: loss = 1 / ratio.
        let loss: Vec<f32> = masked_mse_loss(pred, target, mask, 0.5)
            .into_data()
            .to_vec()
            .expect("loss extraction");
        assert!((loss[0] - 2.0).abs() < 1e-6, "got {}", loss[0]);
    }

    #[test]
    fn test_unpatchify_roundtrips_patch_layout() {
        // One token per 2x2 patch on a 4x4 grid-of-2: encode a recognizable
        // per-patch constant and check where it lands.
        let device: <TestBackend as Backend>::Device = Default::default();
        let cfg = ModelConfig {
            image_size: 4,
            patch_size: 2,
            ..ModelConfig::tiny()
        };
        let decoder = MaeDecoder::<TestBackend>::new(&cfg, 1, true, &device);

        // 4 patches, each patch vector is 3*2*2 = 12 values, all equal to the
        // patch index.
        let mut data = Vec::new();
        for patch in 0..4 {
            data.extend(std::iter::repeat(patch as f32).take(12));
        }
        let pixels = Tensor::<TestBackend, 1>::from_data(TensorData::from(data.as_slice()), &device)
            .reshape([1, 4, 12]);
        let images = decoder.unpatchify(pixels);
        let out: Vec<f32> = images.into_data().to_vec().expect("image extraction");

        // Channel 0, top-left 2x2 is patch 0; top-right is patch 1.
        assert_eq!(out[0], 0.0); // (0,0)
        assert_eq!(out[2], 1.0); // (0,2)
        assert_eq!(out[4 * 2], 2.0); // (2,0)
        assert_eq!(out[4 * 2 + 2], 3.0); // (2,2)
    }
}
