use serde::{Deserialize, Serialize};

/// Metadata written next to the model weights. Carries everything needed to
/// rebuild the model variant for loading, plus the run state at save time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub experiment: String,
    pub epoch: usize,
    pub mask_ratio: f64,
    pub decoder_depth: usize,
    pub with_mask_token: bool,
    pub last_loss: f64,
    pub timestamp: u64,
}
