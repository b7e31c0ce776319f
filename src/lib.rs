//! Masked autoencoder (MAE) pretraining experiments on CIFAR-10.
//!
//! The crate pretrains small ViT autoencoders under different patch-masking
//! strategies, checkpoints the latest model each epoch, uploads per-epoch
//! reconstruction panels and final loss histories to object storage, and
//! evaluates pretrained encoders on CIFAR-10 classification.
//!
//! - [`config`]: TOML application configuration
//! - [`data`]: CIFAR-10 binary loading and batching
//! - [`model`]: masking strategies, the autoencoder, the classifier
//! - [`training`]: pretraining and classification drivers
//! - [`checkpoint`]: per-experiment model persistence
//! - [`storage`]: filesystem and GCS artifact stores
//! - [`viz`]: reconstruction panel rendering

#![recursion_limit = "256"]

pub mod backend;
pub mod checkpoint;
pub mod config;
pub mod data;
pub mod error;
pub mod model;
pub mod storage;
pub mod training;
pub mod viz;
