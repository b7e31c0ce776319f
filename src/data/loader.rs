use burn::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::data::cifar::CifarDataset;

/// One epoch of shuffled mini-batches over a dataset. The final batch may be
/// short.
pub struct BatchIter<'a> {
    dataset: &'a CifarDataset,
    order: Vec<usize>,
    batch_size: usize,
    pos: usize,
}

impl<'a> BatchIter<'a> {
    pub fn new(dataset: &'a CifarDataset, batch_size: usize, rng: &mut StdRng) -> Self {
        assert!(batch_size > 0, "batch_size must be > 0");
        let mut order: Vec<usize> = (0..dataset.len()).collect();
        order.shuffle(rng);
        BatchIter {
            dataset,
            order,
            batch_size,
            pos: 0,
        }
    }

    /// Next `(images, labels)` batch, or `None` once the epoch is exhausted.
    pub fn next_batch<B: Backend>(
        &mut self,
        device: &B::Device,
    ) -> Option<(Tensor<B, 4>, Tensor<B, 1, Int>)> {
        if self.pos >= self.order.len() {
            return None;
        }
        let end = (self.pos + self.batch_size).min(self.order.len());
        let indices = &self.order[self.pos..end];
        self.pos = end;

        let images = self.dataset.batch_images::<B>(indices, device);
        let labels = self.dataset.batch_labels::<B>(indices, device);
        Some((images, labels))
    }
}

/// Batches per epoch for a dataset/batch-size pair (partial batch included).
pub fn batches_per_epoch(dataset_len: usize, batch_size: usize) -> usize {
    dataset_len.div_ceil(batch_size)
}
