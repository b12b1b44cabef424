//! Configuration of [`ReplayBuffer`](crate::ReplayBuffer).
//!
//! This module provides:
//! - [`BufferVariant`], the five storage/sampling policies
//! - [`PerConfig`], parameters of prioritized experience replay
//! - [`EpisodeConfig`], parameters of episode replay
//! - [`ReplayBufferConfig`], which bundles them with capacity, batch size and seed
use crate::{error::ReplayError, EpisodeSampling, WeightNormalizer};
use anyhow::Result;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::{
    default::Default,
    fmt,
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Storage and sampling policy of a replay buffer.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Hash, Clone, Copy)]
pub enum BufferVariant {
    /// Uniform replay of transitions.
    ER,

    /// Prioritized replay of transitions.
    PER,

    /// Uniform replay of n-step transitions.
    NstepER,

    /// Prioritized replay of n-step transitions.
    NstepPER,

    /// Replay of episode segments for recurrent models.
    EpisodeER,
}

impl BufferVariant {
    /// Returns `true` for variants sampling by priority.
    pub fn is_prioritized(&self) -> bool {
        matches!(self, BufferVariant::PER | BufferVariant::NstepPER)
    }

    /// Returns `true` for variants folding n-step returns.
    pub fn is_n_step(&self) -> bool {
        matches!(self, BufferVariant::NstepER | BufferVariant::NstepPER)
    }

    /// Returns `true` for the variant storing whole episodes.
    pub fn is_episodic(&self) -> bool {
        matches!(self, BufferVariant::EpisodeER)
    }
}

impl fmt::Display for BufferVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Configuration for Prioritized Experience Replay (PER).
///
/// # Examples
///
/// ```rust
/// use border_replay::{PerConfig, WeightNormalizer};
///
/// let config = PerConfig::default()
///     .alpha(0.6)
///     .beta_0(0.4)
///     .beta_final(1.0)
///     .n_opts_final(500_000)
///     .normalize(WeightNormalizer::Batch);
/// ```
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct PerConfig {
    /// Exponent for prioritization. A value of 0 results in uniform sampling.
    pub alpha: f32,

    /// Initial value of the importance sampling exponent.
    pub beta_0: f32,

    /// Final value of the importance sampling exponent, typically 1.0.
    pub beta_final: f32,

    /// Number of optimization steps after which `beta` reaches its final value.
    pub n_opts_final: usize,

    /// Lower bound of priorities. Prevents transitions from never being sampled.
    pub epsilon: f32,

    /// Upper bound of priorities, unbounded if `None`.
    pub max_priority: Option<f32>,

    /// Method for normalizing importance sampling weights.
    pub normalize: WeightNormalizer,
}

impl Default for PerConfig {
    /// Creates a default PER configuration with commonly used values:
    /// - `alpha = 0.6`
    /// - `beta_0 = 0.4`
    /// - `beta_final = 1.0`
    /// - `n_opts_final = 500_000`
    /// - `epsilon = 0.01`
    /// - `max_priority = None`
    /// - `normalize = Batch`
    fn default() -> Self {
        Self {
            alpha: 0.6,
            beta_0: 0.4,
            beta_final: 1.0,
            n_opts_final: 500_000,
            epsilon: 0.01,
            max_priority: None,
            normalize: WeightNormalizer::Batch,
        }
    }
}

impl PerConfig {
    /// Sets the prioritization exponent `alpha`.
    pub fn alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    /// Sets the initial importance sampling exponent `beta_0`.
    pub fn beta_0(mut self, beta_0: f32) -> Self {
        self.beta_0 = beta_0;
        self
    }

    /// Sets the final importance sampling exponent `beta_final`.
    pub fn beta_final(mut self, beta_final: f32) -> Self {
        self.beta_final = beta_final;
        self
    }

    /// Sets the number of optimization steps to reach the final beta value.
    pub fn n_opts_final(mut self, n_opts_final: usize) -> Self {
        self.n_opts_final = n_opts_final;
        self
    }

    /// Sets the lower bound of priorities.
    pub fn epsilon(mut self, epsilon: f32) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Sets the upper bound of priorities.
    pub fn max_priority(mut self, max_priority: Option<f32>) -> Self {
        self.max_priority = max_priority;
        self
    }

    /// Sets the method for normalizing importance weights.
    pub fn normalize(mut self, normalize: WeightNormalizer) -> Self {
        self.normalize = normalize;
        self
    }
}

/// Configuration of episode replay.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct EpisodeConfig {
    /// Steps at the head of each sequence used only to warm up recurrent state.
    pub burn_in_length: usize,

    /// Steps of each sequence used for training.
    pub segment_length: usize,

    /// How episodes are chosen.
    pub sampling: EpisodeSampling,
}

impl Default for EpisodeConfig {
    fn default() -> Self {
        Self {
            burn_in_length: 0,
            segment_length: 8,
            sampling: EpisodeSampling::Uniform,
        }
    }
}

impl EpisodeConfig {
    /// Sets the burn-in length.
    pub fn burn_in_length(mut self, burn_in_length: usize) -> Self {
        self.burn_in_length = burn_in_length;
        self
    }

    /// Sets the segment length.
    pub fn segment_length(mut self, segment_length: usize) -> Self {
        self.segment_length = segment_length;
        self
    }

    /// Sets the episode sampling policy.
    pub fn sampling(mut self, sampling: EpisodeSampling) -> Self {
        self.sampling = sampling;
        self
    }
}

/// Configuration of [`ReplayBuffer`](crate::ReplayBuffer).
///
/// `capacity` and `batch_size` count transitions, or episodes for
/// [`BufferVariant::EpisodeER`].
///
/// # Examples
///
/// ```rust
/// use border_replay::{BufferVariant, PerConfig, ReplayBufferConfig};
///
/// let config = ReplayBufferConfig::default()
///     .variant(BufferVariant::NstepPER)
///     .capacity(100_000)
///     .n_step(3)
///     .per_config(PerConfig::default().alpha(0.6));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct ReplayBufferConfig {
    /// Storage and sampling policy.
    pub variant: BufferVariant,

    /// Maximum number of stored items. The oldest ones are overwritten.
    pub capacity: usize,

    /// Default number of items per batch.
    pub batch_size: usize,

    /// Number of agents (vectorized environments) pushing transitions.
    pub agents_num: usize,

    /// Discount factor.
    pub gamma: f32,

    /// Length of n-step windows, used by n-step variants.
    pub n_step: usize,

    /// Random seed used for sampling.
    pub seed: u64,

    /// Parameters of prioritized variants.
    pub per_config: PerConfig,

    /// Parameters of the episodic variant.
    pub episode_config: EpisodeConfig,
}

impl Default for ReplayBufferConfig {
    /// Creates a default configuration: uniform replay of 10000 transitions,
    /// `batch_size = 32`, `gamma = 0.99`, `n_step = 3`, `seed = 42`.
    fn default() -> Self {
        Self {
            variant: BufferVariant::ER,
            capacity: 10000,
            batch_size: 32,
            agents_num: 1,
            gamma: 0.99,
            n_step: 3,
            seed: 42,
            per_config: PerConfig::default(),
            episode_config: EpisodeConfig::default(),
        }
    }
}

impl ReplayBufferConfig {
    /// Sets the variant.
    pub fn variant(mut self, variant: BufferVariant) -> Self {
        self.variant = variant;
        self
    }

    /// Sets the capacity of the replay buffer.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the default batch size.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the number of agents.
    pub fn agents_num(mut self, agents_num: usize) -> Self {
        self.agents_num = agents_num;
        self
    }

    /// Sets the discount factor.
    pub fn gamma(mut self, gamma: f32) -> Self {
        self.gamma = gamma;
        self
    }

    /// Sets the length of n-step windows.
    pub fn n_step(mut self, n_step: usize) -> Self {
        self.n_step = n_step;
        self
    }

    /// Sets the random seed for sampling.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the configuration for prioritized experience replay.
    pub fn per_config(mut self, per_config: PerConfig) -> Self {
        self.per_config = per_config;
        self
    }

    /// Sets the configuration for episode replay.
    pub fn episode_config(mut self, episode_config: EpisodeConfig) -> Self {
        self.episode_config = episode_config;
        self
    }

    /// Checks the configuration.
    ///
    /// Fails with [`ReplayError::Configuration`] on the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| -> Result<()> { Err(ReplayError::Configuration(msg).into()) };

        if self.capacity == 0 {
            return fail("capacity must be positive".into());
        }
        if self.batch_size == 0 {
            return fail("batch_size must be positive".into());
        }
        if self.capacity < self.batch_size {
            return fail(format!(
                "capacity ({}) must not be smaller than batch_size ({})",
                self.capacity, self.batch_size
            ));
        }
        if self.agents_num == 0 {
            return fail("agents_num must be positive".into());
        }
        if !(self.gamma > 0.0 && self.gamma <= 1.0) {
            return fail(format!("gamma must be in (0, 1], got {}", self.gamma));
        }

        if self.variant.is_n_step() {
            if self.n_step < 1 {
                return fail(format!("n_step must be at least 1 for {}", self.variant));
            }
            if self.n_step == 1 {
                warn!("{} with n_step = 1 behaves like 1-step replay", self.variant);
            }
        }

        if self.variant.is_prioritized() {
            let per = &self.per_config;
            if !(per.alpha >= 0.0 && per.alpha.is_finite()) {
                return fail(format!("alpha must be non-negative, got {}", per.alpha));
            }
            if !(0.0..=1.0).contains(&per.beta_0) || !(0.0..=1.0).contains(&per.beta_final) {
                return fail(format!(
                    "beta_0 and beta_final must be in [0, 1], got {} and {}",
                    per.beta_0, per.beta_final
                ));
            }
            if !(per.epsilon > 0.0 && per.epsilon.is_finite()) {
                return fail(format!("epsilon must be positive, got {}", per.epsilon));
            }
            if let Some(max_priority) = per.max_priority {
                if !(max_priority >= per.epsilon) {
                    return fail(format!(
                        "max_priority ({}) must not be smaller than epsilon ({})",
                        max_priority, per.epsilon
                    ));
                }
            }
        }

        if self.variant.is_episodic() && self.episode_config.segment_length == 0 {
            return fail("segment_length must be positive".into());
        }

        Ok(())
    }

    /// Logs the effective settings at `info` level.
    pub fn log_summary(&self) {
        let mut rows = vec![
            ("variant", self.variant.to_string()),
            ("capacity", self.capacity.to_string()),
            ("batch_size", self.batch_size.to_string()),
            ("agents_num", self.agents_num.to_string()),
            ("gamma", self.gamma.to_string()),
            ("seed", self.seed.to_string()),
        ];
        if self.variant.is_n_step() {
            rows.push(("n_step", self.n_step.to_string()));
        }
        if self.variant.is_prioritized() {
            let per = &self.per_config;
            rows.push(("alpha", per.alpha.to_string()));
            rows.push(("beta_0", per.beta_0.to_string()));
            rows.push(("beta_final", per.beta_final.to_string()));
            rows.push(("n_opts_final", per.n_opts_final.to_string()));
            rows.push(("epsilon", per.epsilon.to_string()));
            rows.push(("max_priority", format!("{:?}", per.max_priority)));
            rows.push(("normalize", format!("{:?}", per.normalize)));
        }
        if self.variant.is_episodic() {
            let ep = &self.episode_config;
            rows.push(("burn_in_length", ep.burn_in_length.to_string()));
            rows.push(("segment_length", ep.segment_length.to_string()));
            rows.push(("sampling", format!("{:?}", ep.sampling)));
        }

        for (key, value) in rows {
            info!("{}", "-".repeat(58));
            info!("|{:<28}{:>28}|", key, value);
        }
        info!("{}", "-".repeat(58));
    }

    /// Loads the configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves the configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
