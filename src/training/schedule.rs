use std::f64::consts::PI;

/// Warmup-cosine learning-rate schedule: linear ramp from `warmup_lr` to
/// `base_lr` over `warmup_steps`, then cosine decay to zero at `total_steps`.
#[derive(Debug, Clone)]
pub struct WarmupCosine {
    base_lr: f64,
    warmup_lr: f64,
    warmup_steps: usize,
    total_steps: usize,
    step: usize,
}

impl WarmupCosine {
    /// `warmup_steps` is clamped below `total_steps` so there is always at
    /// least one decay step, whatever fraction it was derived from.
    pub fn new(base_lr: f64, warmup_lr: f64, warmup_steps: usize, total_steps: usize) -> Self {
        assert!(total_steps > 0, "total_steps must be > 0");
        let warmup_steps = warmup_steps.min(total_steps - 1);
        WarmupCosine {
            base_lr,
            warmup_lr,
            warmup_steps,
            total_steps,
            step: 0,
        }
    }

    /// Learning rate at an arbitrary step.
    pub fn lr_at(&self, step: usize) -> f64 {
        if step < self.warmup_steps {
            let progress = step as f64 / self.warmup_steps as f64;
            return self.warmup_lr + (self.base_lr - self.warmup_lr) * progress;
        }
        if step >= self.total_steps {
            return 0.0;
        }
        let progress =
            (step - self.warmup_steps) as f64 / (self.total_steps - self.warmup_steps) as f64;
        0.5 * self.base_lr * (1.0 + (PI * progress).cos())
    }

    /// Learning rate for the current optimizer step, advancing the schedule.
    pub fn next(&mut self) -> f64 {
        let lr = self.lr_at(self.step);
        self.step += 1;
        lr
    }

    pub fn current_step(&self) -> usize {
        self.step
    }
}
