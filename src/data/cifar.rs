use std::fs;
use std::path::Path;

use burn::prelude::*;

use crate::error::DataError;

pub const IMAGE_SIZE: usize = 32;
pub const CHANNELS: usize = 3;
/// Bytes per image in the CIFAR-10 binary format (channel-planar RGB).
pub const IMAGE_BYTES: usize = CHANNELS * IMAGE_SIZE * IMAGE_SIZE;
/// One record: label byte + pixels.
const RECORD_BYTES: usize = 1 + IMAGE_BYTES;

const TRAIN_BATCHES: [&str; 5] = [
    "data_batch_1.bin",
    "data_batch_2.bin",
    "data_batch_3.bin",
    "data_batch_4.bin",
    "data_batch_5.bin",
];
const TEST_BATCH: &str = "test_batch.bin";

/// In-memory CIFAR-10 split. Pixels stay as raw bytes (CHW, channel-planar as
/// on disk) and are normalized to [-1, 1] when a batch tensor is built.
#[derive(Debug)]
pub struct CifarDataset {
    images: Vec<u8>,
    labels: Vec<u8>,
}

impl CifarDataset {
    /// Load the five training batches from `dir`.
    pub fn load_train(dir: &Path) -> Result<Self, DataError> {
        let mut dataset = CifarDataset {
            images: Vec::new(),
            labels: Vec::new(),
        };
        for name in TRAIN_BATCHES {
            dataset.read_batch_file(&dir.join(name))?;
        }
        Ok(dataset)
    }

    /// Load the held-out test batch from `dir`.
    pub fn load_test(dir: &Path) -> Result<Self, DataError> {
        let mut dataset = CifarDataset {
            images: Vec::new(),
            labels: Vec::new(),
        };
        dataset.read_batch_file(&dir.join(TEST_BATCH))?;
        Ok(dataset)
    }

    /// Build a dataset from raw parts (tests, synthetic data). `images` is
    /// CHW bytes, `IMAGE_BYTES` per sample.
    pub fn from_parts(images: Vec<u8>, labels: Vec<u8>) -> Self {
        assert_eq!(images.len(), labels.len() * IMAGE_BYTES, "length mismatch");
        CifarDataset { images, labels }
    }

    fn read_batch_file(&mut self, path: &Path) -> Result<(), DataError> {
        if !path.exists() {
            return Err(DataError::FileNotFound(path.to_path_buf()));
        }
        let bytes = fs::read(path).map_err(|e| DataError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        if bytes.is_empty() || bytes.len() % RECORD_BYTES != 0 {
            return Err(DataError::Malformed {
                path: path.to_path_buf(),
                reason: format!(
                    "file length {} is not a multiple of the {}-byte record",
                    bytes.len(),
                    RECORD_BYTES
                ),
            });
        }
        for record in bytes.chunks_exact(RECORD_BYTES) {
            self.labels.push(record[0]);
            self.images.extend_from_slice(&record[1..]);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn label(&self, index: usize) -> usize {
        self.labels[index] as usize
    }

    /// Batch of images as a [N, 3, 32, 32] tensor normalized to [-1, 1].
    pub fn batch_images<B: Backend>(&self, indices: &[usize], device: &B::Device) -> Tensor<B, 4> {
        let mut data = Vec::with_capacity(indices.len() * IMAGE_BYTES);
        for &i in indices {
            let start = i * IMAGE_BYTES;
            data.extend(
                self.images[start..start + IMAGE_BYTES]
                    .iter()
                    .map(|&b| b as f32 / 255.0 * 2.0 - 1.0),
            );
        }
        Tensor::<B, 1>::from_data(TensorData::from(data.as_slice()), device).reshape([
            indices.len() as i32,
            CHANNELS as i32,
            IMAGE_SIZE as i32,
            IMAGE_SIZE as i32,
        ])
    }

    /// Batch of labels as a [N] Int tensor.
    pub fn batch_labels<B: Backend>(
        &self,
        indices: &[usize],
        device: &B::Device,
    ) -> Tensor<B, 1, Int> {
        let data: Vec<i32> = indices.iter().map(|&i| self.labels[i] as i32).collect();
        Tensor::<B, 1, Int>::from_data(TensorData::from(data.as_slice()), device)
    }

    /// The first `n` images, in order. Used for the fixed visualization panel.
    pub fn head_images<B: Backend>(&self, n: usize, device: &B::Device) -> Tensor<B, 4> {
        let indices: Vec<usize> = (0..n.min(self.len())).collect();
        self.batch_images(&indices, device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use std::io::Write;

    type TestBackend = NdArray<f32>;

    fn write_records(path: &Path, n: usize) {
        let mut f = fs::File::create(path).unwrap();
        for i in 0..n {
            let mut record = vec![(i % 10) as u8];
            record.extend(std::iter::repeat((i * 7 % 256) as u8).take(IMAGE_BYTES));
            f.write_all(&record).unwrap();
        }
    }

    #[test]
    fn test_load_test_batch() {
        let dir = tempfile::tempdir().unwrap();
        write_records(&dir.path().join(TEST_BATCH), 4);

        let dataset = CifarDataset::load_test(dir.path()).unwrap();
        assert_eq!(dataset.len(), 4);
        assert_eq!(dataset.label(3), 3);
    }

    #[test]
    fn test_load_train_concatenates_batches() {
        let dir = tempfile::tempdir().unwrap();
        for name in TRAIN_BATCHES {
            write_records(&dir.path().join(name), 2);
        }

        let dataset = CifarDataset::load_train(dir.path()).unwrap();
        assert_eq!(dataset.len(), 10);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = CifarDataset::load_test(dir.path()).unwrap_err();
        assert!(matches!(err, DataError::FileNotFound(_)));
    }

    #[test]
    fn test_truncated_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(TEST_BATCH);
        fs::write(&path, vec![0u8; RECORD_BYTES + 17]).unwrap();

        let err = CifarDataset::load_test(dir.path()).unwrap_err();
        assert!(matches!(err, DataError::Malformed { .. }));
    }

    #[test]
    fn test_normalization_range() {
        let images = vec![0u8, 128, 255]
            .into_iter()
            .cycle()
            .take(IMAGE_BYTES)
            .collect();
        let dataset = CifarDataset::from_parts(images, vec![5]);

        let device = Default::default();
        let tensor = dataset.batch_images::<TestBackend>(&[0], &device);
        assert_eq!(tensor.shape().dims, [1, 3, 32, 32]);

        let data: Vec<f32> = tensor.into_data().to_vec().unwrap();
        assert!((data[0] - (-1.0)).abs() < 1e-6);
        assert!((data[2] - 1.0).abs() < 1e-6);
        assert!(data.iter().all(|&v| (-1.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_batch_labels() {
        let dataset = CifarDataset::from_parts(vec![0u8; 3 * IMAGE_BYTES], vec![1, 2, 3]);
        let device = Default::default();
        let labels = dataset.batch_labels::<TestBackend>(&[2, 0], &device);
        let data: Vec<i64> = labels.into_data().to_vec().unwrap();
        assert_eq!(data, vec![3, 1]);
    }
}
