//! Training drivers: MAE pretraining across masking experiments, and the
//! downstream classification runs that evaluate the pretrained encoders.

pub mod classify;
pub mod experiment;
pub mod history;
pub mod metrics;
pub mod schedule;
pub mod trainer;

pub use classify::{ClassifyConfig, ClassifyMode, ClassifyTrainer};
pub use experiment::ExperimentKind;
pub use history::{ClassifyHistory, PretrainHistory};
pub use schedule::WarmupCosine;
pub use trainer::{PretrainConfig, Pretrainer};
