//! Selection of a buffer variant from properties of a learning algorithm.
use crate::{BufferVariant, ReplayBufferConfig};
use serde::{Deserialize, Serialize};

/// Whether an algorithm learns from its own current policy only.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy)]
pub enum PolicyMode {
    /// Learns from experiences of older policies; needs a replay buffer.
    OffPolicy,

    /// Learns from fresh rollouts only; needs no replay buffer.
    OnPolicy,
}

/// Properties of a learning algorithm relevant to experience replay.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy)]
pub struct AlgorithmProfile {
    /// On- or off-policy.
    pub policy_mode: PolicyMode,

    /// The model is recurrent and trains on sequences.
    pub use_rnn: bool,

    /// Prioritized sampling.
    pub use_priority: bool,

    /// N-step returns.
    pub use_n_step: bool,
}

impl Default for AlgorithmProfile {
    fn default() -> Self {
        Self {
            policy_mode: PolicyMode::OffPolicy,
            use_rnn: false,
            use_priority: false,
            use_n_step: false,
        }
    }
}

impl AlgorithmProfile {
    /// Sets the policy mode.
    pub fn policy_mode(mut self, policy_mode: PolicyMode) -> Self {
        self.policy_mode = policy_mode;
        self
    }

    /// Sets `use_rnn`.
    pub fn use_rnn(mut self, v: bool) -> Self {
        self.use_rnn = v;
        self
    }

    /// Sets `use_priority`.
    pub fn use_priority(mut self, v: bool) -> Self {
        self.use_priority = v;
        self
    }

    /// Sets `use_n_step`.
    pub fn use_n_step(mut self, v: bool) -> Self {
        self.use_n_step = v;
        self
    }
}

impl BufferVariant {
    /// Selects the variant for an algorithm, `None` for on-policy algorithms.
    ///
    /// A recurrent model takes precedence over priority and n-step settings.
    pub fn select(profile: &AlgorithmProfile) -> Option<Self> {
        if profile.policy_mode == PolicyMode::OnPolicy {
            return None;
        }

        let variant = match (profile.use_rnn, profile.use_priority, profile.use_n_step) {
            (true, _, _) => Self::EpisodeER,
            (false, true, true) => Self::NstepPER,
            (false, true, false) => Self::PER,
            (false, false, true) => Self::NstepER,
            (false, false, false) => Self::ER,
        };
        Some(variant)
    }
}

impl ReplayBufferConfig {
    /// Returns `base` with the variant selected for `profile`.
    ///
    /// `None` means the algorithm uses no replay buffer and nothing should be prefilled.
    pub fn for_algorithm(profile: &AlgorithmProfile, base: ReplayBufferConfig) -> Option<Self> {
        BufferVariant::select(profile).map(|variant| base.variant(variant))
    }
}
