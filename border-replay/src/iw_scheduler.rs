//! Annealing of the importance sampling exponent.
use crate::PerConfig;

/// Anneals $\beta$, the exponent of importance sampling weights.
///
/// $\beta$ moves linearly from `beta_0` to `beta_final` over `n_opts_final`
/// priority updates and stays at `beta_final` afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct IwScheduler {
    beta_0: f32,
    beta_final: f32,
    n_opts_final: usize,

    /// Priority updates so far.
    n_opts: usize,
}

impl From<&PerConfig> for IwScheduler {
    fn from(config: &PerConfig) -> Self {
        Self::new(config.beta_0, config.beta_final, config.n_opts_final)
    }
}

impl IwScheduler {
    /// Creates a scheduler starting at `beta_0`.
    pub fn new(beta_0: f32, beta_final: f32, n_opts_final: usize) -> Self {
        Self {
            beta_0,
            beta_final,
            n_opts_final,
            n_opts: 0,
        }
    }

    /// Current $\beta$.
    pub fn beta(&self) -> f32 {
        if self.n_opts >= self.n_opts_final {
            return self.beta_final;
        }
        let progress = self.n_opts as f32 / self.n_opts_final as f32;
        self.beta_0 + (self.beta_final - self.beta_0) * progress
    }

    /// Counts one priority update.
    pub fn add_n_opts(&mut self) {
        self.n_opts = self.n_opts.saturating_add(1);
    }

    /// Number of priority updates counted so far.
    pub fn n_opts(&self) -> usize {
        self.n_opts
    }
}

#[cfg(test)]
mod tests {
    use super::IwScheduler;
    use crate::PerConfig;

    #[test]
    fn test_beta_annealing() {
        let mut scheduler = IwScheduler::new(0.4, 1.0, 4);
        assert_eq!(scheduler.beta(), 0.4);

        scheduler.add_n_opts();
        scheduler.add_n_opts();
        assert!((scheduler.beta() - 0.7).abs() < 1e-6);

        (0..10).for_each(|_| scheduler.add_n_opts());
        assert_eq!(scheduler.beta(), 1.0);
        assert_eq!(scheduler.n_opts(), 12);
    }

    #[test]
    fn test_zero_steps() {
        let scheduler = IwScheduler::new(0.4, 1.0, 0);
        assert_eq!(scheduler.beta(), 1.0);
    }

    #[test]
    fn test_from_per_config() {
        let config = PerConfig::default().beta_0(0.5).n_opts_final(10);
        let scheduler = IwScheduler::from(&config);
        assert_eq!(scheduler.beta(), 0.5);
    }
}
