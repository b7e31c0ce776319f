use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::model::masking::MaskStrategy;

/// The four pretraining variants under comparison: random masking with and
/// without a learned mask token, block masking, and grid masking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentKind {
    Baseline,
    WMasktoken,
    Block,
    Grid,
}

impl ExperimentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExperimentKind::Baseline => "baseline",
            ExperimentKind::WMasktoken => "w_masktoken",
            ExperimentKind::Block => "block",
            ExperimentKind::Grid => "grid",
        }
    }

    pub fn with_mask_token(&self) -> bool {
        matches!(self, ExperimentKind::WMasktoken)
    }

    pub fn strategy(&self) -> MaskStrategy {
        match self {
            ExperimentKind::Block => MaskStrategy::Block,
            ExperimentKind::Grid => MaskStrategy::Grid,
            _ => MaskStrategy::Random,
        }
    }

    /// Experiment label used for checkpoint and storage paths, e.g.
    /// `e_100_pretrain_w_masktoken_0.75_4`.
    pub fn experiment_name(&self, epochs: usize, mask_ratio: f64, decoder_depth: usize) -> String {
        format!(
            "e_{}_pretrain_{}_{}_{}",
            epochs,
            self.as_str(),
            mask_ratio,
            decoder_depth
        )
    }
}

impl fmt::Display for ExperimentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExperimentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "baseline" => Ok(ExperimentKind::Baseline),
            "w_masktoken" => Ok(ExperimentKind::WMasktoken),
            "block" => Ok(ExperimentKind::Block),
            "grid" => Ok(ExperimentKind::Grid),
            other => Err(format!(
                "unknown experiment '{}' (expected 'baseline', 'w_masktoken', 'block', or 'grid')",
                other
            )),
        }
    }
}
