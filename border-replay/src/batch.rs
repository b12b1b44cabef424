//! Batches sampled from replay buffers.
//!
//! Fields are stacked into [`ndarray`] arrays with the batch along the first
//! axis. Sequence batches have time along the second axis.
use crate::Transition;
use anyhow::{bail, Result};
use ndarray::{Array2, Array3};

/// Stacks rows of equal length into a `(rows, dim)` array.
pub(crate) fn stack_rows<'a>(rows: impl Iterator<Item = &'a [f32]>) -> Result<Array2<f32>> {
    let mut data = vec![];
    let mut n_rows = 0;
    let mut dim = None;

    for row in rows {
        match dim {
            None => dim = Some(row.len()),
            Some(d) if d != row.len() => {
                bail!("Inconsistent dimensions in batch: {} and {}", d, row.len())
            }
            _ => {}
        }
        data.extend_from_slice(row);
        n_rows += 1;
    }

    Ok(Array2::from_shape_vec((n_rows, dim.unwrap_or(0)), data)?)
}

/// A batch of transitions `(o_t, a_t, o_t+1, r_t)`.
#[derive(Clone, Debug, PartialEq)]
pub struct TransitionBatch {
    /// Observations, `(batch, obs_dim)`.
    pub obs: Array2<f32>,

    /// Actions, `(batch, act_dim)`.
    pub act: Array2<f32>,

    /// Next observations, `(batch, obs_dim)`.
    pub next_obs: Array2<f32>,

    /// Rewards. For n-step variants, discounted sums over the window.
    pub reward: Vec<f32>,

    /// Episode termination flags.
    pub is_terminated: Vec<i8>,

    /// Episode truncation flags.
    pub is_truncated: Vec<i8>,

    /// Log-probabilities, if every sampled transition has one.
    pub log_prob: Option<Vec<f32>>,

    /// Recurrent hidden states, if every sampled transition has one.
    pub hidden: Option<Array2<f32>>,

    /// Visual observations, if every sampled transition has one.
    pub visual: Option<Array2<f32>>,

    /// Slots of the sampled transitions, used for priority updates.
    pub ix_sample: Vec<usize>,

    /// Importance sampling weights for prioritized variants.
    pub weight: Option<Vec<f32>>,

    /// Number of steps folded into each transition, for n-step variants.
    ///
    /// Windows cut short by the end of an episode hold fewer than `n` steps.
    pub n_steps: Option<Vec<usize>>,
}

impl TransitionBatch {
    /// Stacks sampled transitions.
    pub fn from_transitions(
        transitions: &[&Transition],
        ix_sample: Vec<usize>,
        weight: Option<Vec<f32>>,
    ) -> Result<Self> {
        let log_prob = transitions
            .iter()
            .map(|tr| tr.log_prob)
            .collect::<Option<Vec<_>>>();
        let hidden = match transitions.iter().all(|tr| tr.hidden.is_some()) {
            true => Some(stack_rows(
                transitions.iter().filter_map(|tr| tr.hidden.as_deref()),
            )?),
            false => None,
        };
        let visual = match transitions.iter().all(|tr| tr.visual.is_some()) {
            true => Some(stack_rows(
                transitions.iter().filter_map(|tr| tr.visual.as_deref()),
            )?),
            false => None,
        };

        Ok(Self {
            obs: stack_rows(transitions.iter().map(|tr| tr.obs.as_slice()))?,
            act: stack_rows(transitions.iter().map(|tr| tr.act.as_slice()))?,
            next_obs: stack_rows(transitions.iter().map(|tr| tr.next_obs.as_slice()))?,
            reward: transitions.iter().map(|tr| tr.reward).collect(),
            is_terminated: transitions.iter().map(|tr| tr.is_terminated).collect(),
            is_truncated: transitions.iter().map(|tr| tr.is_truncated).collect(),
            log_prob,
            hidden,
            visual,
            ix_sample,
            weight,
            n_steps: None,
        })
    }

    /// Sets the number of folded steps of each transition.
    pub fn with_n_steps(mut self, n_steps: Vec<usize>) -> Self {
        self.n_steps = Some(n_steps);
        self
    }

    /// Discount of the bootstrapped value of each transition, `gamma^k` for `k` folded steps.
    pub fn discounts(&self, gamma: f32) -> Vec<f32> {
        match &self.n_steps {
            Some(n_steps) => n_steps.iter().map(|&k| gamma.powi(k as i32)).collect(),
            None => vec![gamma; self.len()],
        }
    }

    /// Returns the number of transitions in the batch.
    pub fn len(&self) -> usize {
        self.reward.len()
    }

    /// Returns `true` if the batch has no transitions.
    pub fn is_empty(&self) -> bool {
        self.reward.is_empty()
    }

    /// Decomposes the batch into
    /// `(obs, act, next_obs, reward, is_terminated, is_truncated, ix_sample, weight)`.
    #[allow(clippy::type_complexity)]
    pub fn unpack(
        self,
    ) -> (
        Array2<f32>,
        Array2<f32>,
        Array2<f32>,
        Vec<f32>,
        Vec<i8>,
        Vec<i8>,
        Vec<usize>,
        Option<Vec<f32>>,
    ) {
        (
            self.obs,
            self.act,
            self.next_obs,
            self.reward,
            self.is_terminated,
            self.is_truncated,
            self.ix_sample,
            self.weight,
        )
    }
}

/// A batch of fixed-length windows cut out of stored episodes.
///
/// Every window has `burn_in_length + segment_length` steps. Windows taken from
/// shorter episodes are zero-padded at the start; `mask` is 0 on padded steps.
#[derive(Clone, Debug, PartialEq)]
pub struct SequenceBatch {
    /// Observations, `(batch, time, obs_dim)`.
    pub obs: Array3<f32>,

    /// Actions, `(batch, time, act_dim)`.
    pub act: Array3<f32>,

    /// Next observations, `(batch, time, obs_dim)`.
    pub next_obs: Array3<f32>,

    /// Rewards, `(batch, time)`.
    pub reward: Array2<f32>,

    /// Episode termination flags, `(batch, time)`.
    pub is_terminated: Array2<i8>,

    /// Episode truncation flags, `(batch, time)`.
    pub is_truncated: Array2<i8>,

    /// 1 on real steps, 0 on padding, `(batch, time)`.
    pub mask: Array2<i8>,

    /// Hidden state recorded at the first real step of each window, `(batch, hidden_dim)`.
    pub initial_hidden: Option<Array2<f32>>,

    /// Number of leading steps used only to warm up recurrent state.
    pub burn_in_length: usize,

    /// Slots of the sampled episodes.
    pub ix_sample: Vec<usize>,
}

impl SequenceBatch {
    /// Returns the number of sequences in the batch.
    pub fn len(&self) -> usize {
        self.ix_sample.len()
    }

    /// Returns `true` if the batch has no sequences.
    pub fn is_empty(&self) -> bool {
        self.ix_sample.is_empty()
    }

    /// Number of steps of every sequence.
    pub fn seq_len(&self) -> usize {
        self.reward.ncols()
    }
}

/// A batch returned by [`ReplayBuffer::sample()`](crate::ReplayBuffer::sample).
#[derive(Clone, Debug, PartialEq)]
pub enum Batch {
    /// Sampled from a transition store.
    Transitions(TransitionBatch),

    /// Sampled from an episode store.
    Sequences(SequenceBatch),
}

impl Batch {
    /// Number of transitions or sequences.
    pub fn len(&self) -> usize {
        match self {
            Batch::Transitions(b) => b.len(),
            Batch::Sequences(b) => b.len(),
        }
    }

    /// Returns `true` if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slots of the sampled items.
    pub fn ix_sample(&self) -> &[usize] {
        match self {
            Batch::Transitions(b) => &b.ix_sample,
            Batch::Sequences(b) => &b.ix_sample,
        }
    }

    /// Importance sampling weights, only for prioritized variants.
    pub fn weight(&self) -> Option<&[f32]> {
        match self {
            Batch::Transitions(b) => b.weight.as_deref(),
            Batch::Sequences(_) => None,
        }
    }

    /// Returns the transition batch, if any.
    pub fn transitions(&self) -> Option<&TransitionBatch> {
        match self {
            Batch::Transitions(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the sequence batch, if any.
    pub fn sequences(&self) -> Option<&SequenceBatch> {
        match self {
            Batch::Sequences(b) => Some(b),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transitions() {
        let t0 = Transition::new(vec![0., 1.], vec![2.], 1., vec![3., 4.], false, false)
            .log_prob(-0.5);
        let t1 = Transition::new(vec![5., 6.], vec![7.], 2., vec![8., 9.], true, false)
            .log_prob(-1.0)
            .hidden(vec![0.1]);
        let batch = TransitionBatch::from_transitions(&[&t0, &t1], vec![3, 7], None).unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.obs, Array2::from_shape_vec((2, 2), vec![0., 1., 5., 6.]).unwrap());
        assert_eq!(batch.act.shape(), &[2, 1]);
        assert_eq!(batch.is_terminated, vec![0, 1]);
        assert_eq!(batch.log_prob, Some(vec![-0.5, -1.0]));
        assert!(batch.hidden.is_none());
        assert!(batch.visual.is_none());
        assert_eq!(batch.ix_sample, vec![3, 7]);
        assert_eq!(batch.discounts(0.5), vec![0.5, 0.5]);

        let batch = batch.with_n_steps(vec![3, 1]);
        assert_eq!(batch.discounts(0.5), vec![0.125, 0.5]);
    }

    #[test]
    fn test_inconsistent_dimensions() {
        let t0 = Transition::new(vec![0., 1.], vec![2.], 1., vec![3., 4.], false, false);
        let t1 = Transition::new(vec![5.], vec![7.], 2., vec![8.], false, false);
        assert!(TransitionBatch::from_transitions(&[&t0, &t1], vec![0, 1], None).is_err());
    }
}
