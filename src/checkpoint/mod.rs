mod manager;
mod metadata;

pub use manager::{CheckpointConfig, CheckpointManager};
pub use metadata::CheckpointMetadata;
