/// Accumulates per-batch scalars within one epoch.
pub struct LossMeter {
    values: Vec<f64>,
}

impl LossMeter {
    pub fn new() -> Self {
        LossMeter { values: Vec::new() }
    }

    pub fn record(&mut self, value: f64) {
        self.values.push(value);
    }

    /// Mean of recorded values; 0.0 when empty.
    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    pub fn count(&self) -> usize {
        self.values.len()
    }

    pub fn reset(&mut self) {
        self.values.clear();
    }
}

impl Default for LossMeter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean() {
        let mut m = LossMeter::new();
        m.record(1.0);
        m.record(3.0);
        assert!((m.mean() - 2.0).abs() < 1e-12);
        assert_eq!(m.count(), 2);
    }

    #[test]
    fn test_empty_mean_is_zero() {
        assert_eq!(LossMeter::new().mean(), 0.0);
    }

    #[test]
    fn test_reset() {
        let mut m = LossMeter::new();
        m.record(5.0);
        m.reset();
        assert_eq!(m.count(), 0);
        assert_eq!(m.mean(), 0.0);
    }
}
