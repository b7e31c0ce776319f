//! CIFAR-10 loading and batching: binary-format parsing, [-1, 1]
//! normalization, and a shuffling mini-batch iterator over device tensors.

pub mod cifar;
pub mod loader;

pub use cifar::CifarDataset;
pub use loader::BatchIter;

use std::path::PathBuf;

/// Dataset location and batching parameters.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub data_dir: PathBuf,
    pub batch_size: usize,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            data_dir: PathBuf::from("./data"),
            batch_size: 512,
        }
    }
}
