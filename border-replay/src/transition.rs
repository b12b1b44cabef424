//! Transitions and episodes stored in replay buffers.
use crate::error::ReplayError;
use anyhow::Result;

/// One environment step `(o_t, a_t, r_t, o_t+1)` of a single agent.
///
/// Observations and actions are flattened into `Vec<f32>`. Discrete actions
/// are stored as a single element.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Transition {
    /// Observation.
    pub obs: Vec<f32>,

    /// Action.
    pub act: Vec<f32>,

    /// Reward.
    pub reward: f32,

    /// Next observation.
    pub next_obs: Vec<f32>,

    /// Flag denoting if the episode is terminated.
    pub is_terminated: i8,

    /// Flag denoting if the episode is truncated.
    pub is_truncated: i8,

    /// Log-probability of the action under the behavior policy.
    pub log_prob: Option<f32>,

    /// Hidden state of a recurrent policy before taking the action.
    pub hidden: Option<Vec<f32>>,

    /// Flattened visual observation.
    pub visual: Option<Vec<f32>>,
}

impl Transition {
    /// Constructs a transition without auxiliary fields.
    pub fn new(
        obs: Vec<f32>,
        act: Vec<f32>,
        reward: f32,
        next_obs: Vec<f32>,
        is_terminated: bool,
        is_truncated: bool,
    ) -> Self {
        Self {
            obs,
            act,
            reward,
            next_obs,
            is_terminated: is_terminated as i8,
            is_truncated: is_truncated as i8,
            log_prob: None,
            hidden: None,
            visual: None,
        }
    }

    /// Sets the log-probability of the action.
    pub fn log_prob(mut self, log_prob: f32) -> Self {
        self.log_prob = Some(log_prob);
        self
    }

    /// Sets the recurrent hidden state.
    pub fn hidden(mut self, hidden: Vec<f32>) -> Self {
        self.hidden = Some(hidden);
        self
    }

    /// Sets the visual observation.
    pub fn visual(mut self, visual: Vec<f32>) -> Self {
        self.visual = Some(visual);
        self
    }

    /// Terminated or truncated.
    #[inline]
    pub fn is_done(&self) -> bool {
        self.is_terminated == 1 || self.is_truncated == 1
    }
}

/// Transitions of one agent from reset to termination or truncation.
///
/// An episode is sealed on construction and never modified afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct Episode {
    transitions: Vec<Transition>,
}

impl Episode {
    /// Seals a sequence of transitions into an episode.
    ///
    /// Fails with [`ReplayError::EmptyEpisode`] if `transitions` is empty.
    pub fn new(transitions: Vec<Transition>) -> Result<Self> {
        if transitions.is_empty() {
            return Err(ReplayError::EmptyEpisode.into());
        }
        Ok(Self { transitions })
    }

    /// Number of transitions.
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    /// Always `false`; episodes are never empty.
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    /// Transitions in time order.
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Sum of rewards.
    pub fn total_reward(&self) -> f32 {
        self.transitions.iter().map(|tr| tr.reward).sum()
    }
}

/// An item pushed into a [`ReplayBuffer`](crate::ReplayBuffer).
#[derive(Clone, Debug, PartialEq)]
pub enum Experience {
    /// A single step of the agent `agent_id`.
    Step {
        /// Index of the agent (environment) in a vectorized setup.
        agent_id: usize,
        /// The transition.
        transition: Transition,
    },

    /// A sealed episode. Only accepted by the episodic variant.
    Episode(Episode),
}

impl From<Transition> for Experience {
    fn from(transition: Transition) -> Self {
        Experience::Step {
            agent_id: 0,
            transition,
        }
    }
}

impl From<Episode> for Experience {
    fn from(episode: Episode) -> Self {
        Experience::Episode(episode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_episode_is_rejected() {
        let err = Episode::new(vec![]).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ReplayError>(),
            Some(&ReplayError::EmptyEpisode)
        );
    }

    #[test]
    fn test_is_done() {
        let tr = Transition::new(vec![0.], vec![0.], 1., vec![1.], false, false);
        assert!(!tr.is_done());
        let tr = Transition::new(vec![0.], vec![0.], 1., vec![1.], false, true);
        assert!(tr.is_done());
        let tr = Transition::new(vec![0.], vec![0.], 1., vec![1.], true, false);
        assert!(tr.is_done());
    }
}
