//! Host-side masking strategies. Each strategy partitions the patch grid of a
//! single sample into visible and masked index sets; the model only ever sees
//! the partition, so strategies stay pure and independently testable.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// How patches are hidden from the encoder during pretraining.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaskStrategy {
    /// Uniformly random patch selection (standard MAE).
    Random,
    /// One contiguous rectangular region.
    Block,
    /// Regular strided pattern with a random phase.
    Grid,
}

/// Visible/masked partition of one sample's patch grid.
///
/// Invariants: `visible` and `masked` are disjoint, sorted ascending, and
/// together cover `0..grid*grid`; `masked.len()` equals the rounded mask
/// ratio for every strategy so batches stack into rectangular tensors.
#[derive(Debug, Clone)]
pub struct PatchMask {
    pub visible: Vec<usize>,
    pub masked: Vec<usize>,
    pub grid: usize,
}

impl PatchMask {
    pub fn n_patches(&self) -> usize {
        self.grid * self.grid
    }
}

/// Number of patches hidden at a given ratio.
pub fn masked_count(n_patches: usize, mask_ratio: f64) -> usize {
    ((n_patches as f64) * mask_ratio).round() as usize
}

impl MaskStrategy {
    /// Sample a partition of a `grid` x `grid` patch grid.
    pub fn sample(&self, grid: usize, mask_ratio: f64, rng: &mut StdRng) -> PatchMask {
        let n = grid * grid;
        // At least one patch stays visible, even on a degenerate 1x1 grid.
        let target = masked_count(n, mask_ratio).max(1).min(n.saturating_sub(1));

        let mut masked = match self {
            MaskStrategy::Random => sample_random(n, target, rng),
            MaskStrategy::Block => sample_block(grid, target, rng),
            MaskStrategy::Grid => sample_grid(grid, target, rng),
        };
        adjust_to_target(&mut masked, n, target, rng);
        masked.sort_unstable();

        let masked_set: Vec<bool> = {
            let mut set = vec![false; n];
            for &m in &masked {
                set[m] = true;
            }
            set
        };
        let visible: Vec<usize> = (0..n).filter(|&i| !masked_set[i]).collect();

        PatchMask {
            visible,
            masked,
            grid,
        }
    }
}

fn sample_random(n: usize, target: usize, rng: &mut StdRng) -> Vec<usize> {
    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(rng);
    order.truncate(target);
    order
}

/// Mask a square-ish block anchored at a random position. The block is
/// clipped to the grid, so the caller-side adjustment pass tops it up or
/// trims it to the exact target count.
fn sample_block(grid: usize, target: usize, rng: &mut StdRng) -> Vec<usize> {
    let side = ((target as f64).sqrt().ceil() as usize).clamp(1, grid);
    let r0 = rng.random_range(0..=(grid - side));
    let c0 = rng.random_range(0..=(grid - side));

    let mut masked = Vec::with_capacity(side * side);
    for r in r0..r0 + side {
        for c in c0..c0 + side {
            masked.push(r * grid + c);
        }
    }
    masked
}

/// Keep patches on a regular lattice with stride derived from the mask ratio
/// (stride 2 keeps one patch per 2x2 cell at ratio 0.75), masking the rest.
fn sample_grid(grid: usize, target: usize, rng: &mut StdRng) -> Vec<usize> {
    let n = grid * grid;
    let keep = n - target;
    let stride = if keep == 0 {
        grid
    } else {
        (((n as f64) / (keep as f64)).sqrt().round() as usize).clamp(1, grid)
    };
    let phase_r = rng.random_range(0..stride);
    let phase_c = rng.random_range(0..stride);

    let mut masked = Vec::with_capacity(target);
    for r in 0..grid {
        for c in 0..grid {
            if r % stride != phase_r || c % stride != phase_c {
                masked.push(r * grid + c);
            }
        }
    }
    masked
}

/// Trim or grow `masked` to exactly `target` entries so every sample in a
/// batch has the same visible token count.
fn adjust_to_target(masked: &mut Vec<usize>, n: usize, target: usize, rng: &mut StdRng) {
    if masked.len() > target {
        masked.shuffle(rng);
        masked.truncate(target);
        return;
    }
    if masked.len() < target {
        let mut in_mask = vec![false; n];
        for &m in masked.iter() {
            in_mask[m] = true;
        }
        let mut candidates: Vec<usize> = (0..n).filter(|&i| !in_mask[i]).collect();
        candidates.shuffle(rng);
        let deficit = target - masked.len();
        masked.extend(candidates.into_iter().take(deficit));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn check_partition(mask: &PatchMask, grid: usize, ratio: f64) {
        let n = grid * grid;
        assert_eq!(mask.masked.len(), masked_count(n, ratio));
        assert_eq!(mask.visible.len() + mask.masked.len(), n);

        let mut seen = vec![false; n];
        for &i in mask.visible.iter().chain(mask.masked.iter()) {
            assert!(i < n, "index {} out of range", i);
            assert!(!seen[i], "index {} appears twice", i);
            seen[i] = true;
        }
        assert!(seen.iter().all(|&s| s), "partition does not cover the grid");
    }

    #[test]
    fn test_random_partition_exact_counts() {
        let mut rng = StdRng::seed_from_u64(7);
        for &ratio in &[0.3, 0.5, 0.75, 0.85] {
            let mask = MaskStrategy::Random.sample(16, ratio, &mut rng);
            check_partition(&mask, 16, ratio);
        }
    }

    #[test]
    fn test_block_partition_exact_counts() {
        let mut rng = StdRng::seed_from_u64(7);
        for &ratio in &[0.3, 0.5, 0.75, 0.85] {
            let mask = MaskStrategy::Block.sample(16, ratio, &mut rng);
            check_partition(&mask, 16, ratio);
        }
    }

    #[test]
    fn test_grid_partition_exact_counts() {
        let mut rng = StdRng::seed_from_u64(7);
        for &ratio in &[0.5, 0.75] {
            let mask = MaskStrategy::Grid.sample(16, ratio, &mut rng);
            check_partition(&mask, 16, ratio);
        }
    }

    #[test]
    fn test_small_grids() {
        let mut rng = StdRng::seed_from_u64(11);
        for grid in [2, 4, 8] {
            for strategy in [MaskStrategy::Random, MaskStrategy::Block, MaskStrategy::Grid] {
                let mask = strategy.sample(grid, 0.75, &mut rng);
                check_partition(&mask, grid, 0.75);
            }
        }
    }

    #[test]
    fn test_block_is_contiguous_when_unclipped() {
        // 0.5 of a 16-grid needs an ~12x12 block that fits without clipping,
        // so the masked set should span a tight bounding box.
        let mut rng = StdRng::seed_from_u64(3);
        let mask = MaskStrategy::Block.sample(16, 0.5, &mut rng);

        let rows: Vec<usize> = mask.masked.iter().map(|&i| i / 16).collect();
        let cols: Vec<usize> = mask.masked.iter().map(|&i| i % 16).collect();
        let (rmin, rmax) = (*rows.iter().min().unwrap(), *rows.iter().max().unwrap());
        let (cmin, cmax) = (*cols.iter().min().unwrap(), *cols.iter().max().unwrap());

        let bbox = (rmax - rmin + 1) * (cmax - cmin + 1);
        assert!(
            bbox <= mask.masked.len() + 2 * 16,
            "block mask scattered: bbox {} for {} masked",
            bbox,
            mask.masked.len()
        );
    }

    #[test]
    fn test_grid_keeps_one_phase_at_three_quarters() {
        // 16x16 at ratio 0.75 divides evenly, so no adjustment happens and
        // every kept patch must share the same (row % 2, col % 2) phase.
        let mut rng = StdRng::seed_from_u64(5);
        let mask = MaskStrategy::Grid.sample(16, 0.75, &mut rng);
        assert_eq!(mask.visible.len(), 64);

        let pr = mask.visible[0] / 16 % 2;
        let pc = mask.visible[0] % 16 % 2;
        for &v in &mask.visible {
            assert_eq!(v / 16 % 2, pr);
            assert_eq!(v % 16 % 2, pc);
        }
    }

    #[test]
    fn test_masked_count_rounds() {
        assert_eq!(masked_count(256, 0.75), 192);
        assert_eq!(masked_count(256, 0.5), 128);
        assert_eq!(masked_count(10, 0.85), 9); // 8.5 rounds up
    }

    #[test]
    fn test_sample_never_masks_everything() {
        let mut rng = StdRng::seed_from_u64(9);
        let mask = MaskStrategy::Random.sample(4, 0.99, &mut rng);
        assert!(!mask.visible.is_empty());

        // A single-patch grid cannot be masked at all.
        for strategy in [MaskStrategy::Random, MaskStrategy::Block, MaskStrategy::Grid] {
            let mask = strategy.sample(1, 0.75, &mut rng);
            assert_eq!(mask.visible, vec![0]);
            assert!(mask.masked.is_empty());
        }
    }

    #[test]
    fn test_strategy_serde_names() {
        assert_eq!(
            serde_json::to_string(&MaskStrategy::Block).unwrap(),
            "\"block\""
        );
        let s: MaskStrategy = serde_json::from_str("\"grid\"").unwrap();
        assert_eq!(s, MaskStrategy::Grid);
    }
}
