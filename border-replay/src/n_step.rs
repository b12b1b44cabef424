//! Folding consecutive transitions into n-step transitions.
use crate::{error::ReplayError, Transition};
use anyhow::Result;
use std::collections::VecDeque;

/// A transition folded from a window of consecutive transitions.
///
/// `transition.reward` is the discounted sum of the rewards in the window,
/// `transition.next_obs` and the done flags are those of the newest entry.
#[derive(Clone, Debug, PartialEq)]
pub struct FoldedTransition {
    /// The folded transition.
    pub transition: Transition,

    /// Number of transitions folded into it.
    pub n_steps: usize,
}

impl From<Transition> for FoldedTransition {
    /// A window of the single transition `transition`.
    fn from(transition: Transition) -> Self {
        Self {
            transition,
            n_steps: 1,
        }
    }
}

/// Sliding windows of the last `n` transitions, one per agent.
///
/// Once a window holds `n` transitions, every push emits one folded
/// transition and drops the oldest entry. A transition with `is_done()` drains
/// the window, emitting one folded transition per pending entry.
#[derive(Debug, Clone)]
pub struct NStepAccumulator {
    n: usize,
    gamma: f32,
    discount: f32,
    windows: Vec<VecDeque<Transition>>,
}

impl NStepAccumulator {
    /// Creates windows of length `n` for `agents_num` agents.
    pub fn new(n: usize, gamma: f32, agents_num: usize) -> Self {
        assert!(n >= 1, "n of NStepAccumulator must be positive");
        Self {
            n,
            gamma,
            discount: gamma.powi(n as i32),
            windows: (0..agents_num).map(|_| VecDeque::with_capacity(n)).collect(),
        }
    }

    fn window_mut(&mut self, agent_id: usize) -> Result<&mut VecDeque<Transition>> {
        let agents_num = self.windows.len();
        self.windows.get_mut(agent_id).ok_or_else(|| {
            ReplayError::InvalidAgent {
                agent_id,
                agents_num,
            }
            .into()
        })
    }

    // `window` is never empty here.
    fn fold(window: &VecDeque<Transition>, gamma: f32) -> FoldedTransition {
        let first = &window[0];
        let last = &window[window.len() - 1];

        let mut g = 1f32;
        let mut reward = 0f32;
        for tr in window.iter() {
            reward += g * tr.reward;
            g *= gamma;
        }

        FoldedTransition {
            transition: Transition {
                obs: first.obs.clone(),
                act: first.act.clone(),
                reward,
                next_obs: last.next_obs.clone(),
                is_terminated: last.is_terminated,
                is_truncated: last.is_truncated,
                log_prob: first.log_prob,
                hidden: first.hidden.clone(),
                visual: first.visual.clone(),
            },
            n_steps: window.len(),
        }
    }

    fn drain(window: &mut VecDeque<Transition>, gamma: f32) -> Vec<FoldedTransition> {
        let mut folded = Vec::with_capacity(window.len());
        while !window.is_empty() {
            folded.push(Self::fold(window, gamma));
            window.pop_front();
        }
        folded
    }

    /// Pushes a transition of `agent_id`.
    ///
    /// Returns nothing while the window warms up, one folded transition per
    /// push afterwards, and all pending ones when the episode ends.
    pub fn push(&mut self, agent_id: usize, tr: Transition) -> Result<Vec<FoldedTransition>> {
        let (n, gamma) = (self.n, self.gamma);
        let is_done = tr.is_done();
        let window = self.window_mut(agent_id)?;
        window.push_back(tr);

        if is_done {
            Ok(Self::drain(window, gamma))
        } else if window.len() == n {
            let folded = Self::fold(window, gamma);
            window.pop_front();
            Ok(vec![folded])
        } else {
            Ok(vec![])
        }
    }

    /// Drains the window of `agent_id`, used when an episode is truncated externally.
    pub fn flush(&mut self, agent_id: usize) -> Result<Vec<FoldedTransition>> {
        let gamma = self.gamma;
        let window = self.window_mut(agent_id)?;
        Ok(Self::drain(window, gamma))
    }

    /// Number of transitions waiting in the window of `agent_id`.
    pub fn pending(&self, agent_id: usize) -> usize {
        self.windows.get(agent_id).map_or(0, |w| w.len())
    }

    /// Length of the windows.
    pub fn n(&self) -> usize {
        self.n
    }

    /// `gamma^n`, the discount to apply to the bootstrapped value of a folded transition.
    pub fn discount(&self) -> f32 {
        self.discount
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transition(t: usize, reward: f32, done: bool) -> Transition {
        Transition::new(
            vec![t as f32],
            vec![0.0],
            reward,
            vec![(t + 1) as f32],
            done,
            false,
        )
    }

    #[test]
    fn test_sliding_window() {
        let mut acc = NStepAccumulator::new(3, 0.9, 1);

        assert!(acc.push(0, transition(0, 1.0, false)).unwrap().is_empty());
        assert!(acc.push(0, transition(1, 1.0, false)).unwrap().is_empty());

        let folded = acc.push(0, transition(2, 1.0, false)).unwrap();
        assert_eq!(folded.len(), 1);
        let f = &folded[0];
        assert!((f.transition.reward - 2.71).abs() < 1e-5);
        assert_eq!(f.transition.obs, vec![0.0]);
        // Bootstraps from the state reached by the third push.
        assert_eq!(f.transition.next_obs, vec![3.0]);
        assert_eq!(f.n_steps, 3);
        assert_eq!(acc.pending(0), 2);

        for t in 3..5 {
            let folded = acc.push(0, transition(t, 1.0, false)).unwrap();
            assert_eq!(folded.len(), 1);
            assert_eq!(folded[0].transition.obs, vec![(t - 2) as f32]);
            assert_eq!(folded[0].transition.next_obs, vec![(t + 1) as f32]);
            assert!((folded[0].transition.reward - 2.71).abs() < 1e-5);
        }
    }

    #[test]
    fn test_drain_on_done() {
        let mut acc = NStepAccumulator::new(5, 0.9, 1);
        assert!(acc.push(0, transition(0, 1.0, false)).unwrap().is_empty());

        let folded = acc.push(0, transition(1, 2.0, true)).unwrap();
        assert_eq!(folded.len(), 2);
        assert_eq!(folded[0].n_steps, 2);
        assert_eq!(folded[1].n_steps, 1);
        assert!((folded[0].transition.reward - (1.0 + 0.9 * 2.0)).abs() < 1e-6);
        assert!((folded[1].transition.reward - 2.0).abs() < 1e-6);
        assert!(folded.iter().all(|f| f.transition.is_terminated == 1));
        assert!(folded.iter().all(|f| f.transition.next_obs == vec![2.0]));
        assert_eq!(acc.pending(0), 0);
    }

    #[test]
    fn test_done_with_full_window() {
        let mut acc = NStepAccumulator::new(2, 0.5, 1);
        acc.push(0, transition(0, 1.0, false)).unwrap();
        let folded = acc.push(0, transition(1, 1.0, true)).unwrap();
        assert_eq!(
            folded.iter().map(|f| f.n_steps).collect::<Vec<_>>(),
            vec![2, 1]
        );
    }

    #[test]
    fn test_agents_are_independent() {
        let mut acc = NStepAccumulator::new(2, 0.9, 2);
        assert!(acc.push(0, transition(0, 1.0, false)).unwrap().is_empty());
        assert!(acc.push(1, transition(10, 1.0, false)).unwrap().is_empty());

        let folded = acc.push(1, transition(11, 1.0, false)).unwrap();
        assert_eq!(folded[0].transition.obs, vec![10.0]);
        assert_eq!(acc.pending(0), 1);

        let err = acc.push(2, transition(0, 1.0, false)).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ReplayError>(),
            Some(&ReplayError::InvalidAgent {
                agent_id: 2,
                agents_num: 2
            })
        );
    }

    #[test]
    fn test_flush() {
        let mut acc = NStepAccumulator::new(4, 0.9, 1);
        acc.push(0, transition(0, 1.0, false)).unwrap();
        acc.push(0, transition(1, 1.0, false)).unwrap();
        let folded = acc.flush(0).unwrap();
        assert_eq!(folded.len(), 2);
        assert_eq!(folded[0].transition.is_terminated, 0);
        assert!(acc.flush(0).unwrap().is_empty());
    }

    #[test]
    fn test_discount() {
        let acc = NStepAccumulator::new(3, 0.9, 1);
        assert!((acc.discount() - 0.729).abs() < 1e-6);
    }
}
