//! Storage of whole episodes for recurrent training.
use crate::{
    batch::{stack_rows, SequenceBatch},
    error::ReplayError,
    Episode, RingStore, Transition,
};
use anyhow::{bail, Result};
use log::debug;
use ndarray::{Array2, Array3};
use rand::{distributions::WeightedIndex, prelude::Distribution, Rng};
use serde::{Deserialize, Serialize};

/// How episodes are chosen when sampling sequences.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Copy)]
pub enum EpisodeSampling {
    /// Every stored episode is equally likely.
    Uniform,

    /// Episodes are chosen with probability proportional to their length,
    /// so that short episodes are not over-represented.
    LengthWeighted,
}

/// Circular storage of sealed episodes.
///
/// Eviction works like [`RingStore`] with an episode as the unit.
#[derive(Debug)]
pub struct EpisodeStore {
    store: RingStore<Episode>,
    sampling: EpisodeSampling,
    total_steps: usize,
}

impl EpisodeStore {
    /// Creates a store holding up to `capacity` episodes.
    pub fn new(capacity: usize, sampling: EpisodeSampling) -> Self {
        Self {
            store: RingStore::new(capacity),
            sampling,
            total_steps: 0,
        }
    }

    /// Stores a sealed episode and returns its slot.
    pub fn put(&mut self, episode: Episode) -> usize {
        if self.store.is_full() {
            if let Ok(evicted) = self.store.get(self.store.cursor()) {
                debug!(
                    "Evict episode in slot {} ({} steps)",
                    self.store.cursor(),
                    evicted.len()
                );
                self.total_steps -= evicted.len();
            }
        }
        self.total_steps += episode.len();
        self.store.put(episode)
    }

    /// Returns the episode stored at `slot`.
    pub fn get(&self, slot: usize) -> Result<&Episode> {
        self.store.get(slot)
    }

    /// Number of stored episodes.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Returns `true` if no episode is stored.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Maximum number of episodes.
    pub fn capacity(&self) -> usize {
        self.store.capacity()
    }

    /// Number of transitions over all stored episodes.
    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    fn sample_slots<R: Rng>(&self, k: usize, rng: &mut R) -> Result<Vec<usize>> {
        match self.sampling {
            EpisodeSampling::Uniform => self.store.sample_uniform(k, rng),
            EpisodeSampling::LengthWeighted => {
                if self.store.is_empty() {
                    return Err(ReplayError::EmptyStore.into());
                }
                let lengths = (0..self.store.len())
                    .map(|ix| self.store.get(ix).map(|ep| ep.len()))
                    .collect::<Result<Vec<_>>>()?;
                let dist = WeightedIndex::new(&lengths)?;
                Ok((0..k).map(|_| dist.sample(rng)).collect())
            }
        }
    }

    /// Samples `k` windows of `burn_in_length + segment_length` consecutive steps.
    ///
    /// The start of a window is uniform over the valid offsets of its episode.
    /// Episodes shorter than the window are used whole and zero-padded at the start.
    pub fn sample<R: Rng>(
        &self,
        k: usize,
        segment_length: usize,
        burn_in_length: usize,
        rng: &mut R,
    ) -> Result<SequenceBatch> {
        let seq_len = burn_in_length + segment_length;
        if k == 0 || seq_len == 0 {
            return Err(ReplayError::Configuration(format!(
                "cannot sample {} sequences of length {}",
                k, seq_len
            ))
            .into());
        }
        let ix_sample = self.sample_slots(k, rng)?;

        let mut windows = Vec::with_capacity(k);
        for &ix in ix_sample.iter() {
            let trs = self.store.get(ix)?.transitions();
            let window = if trs.len() >= seq_len {
                let start = rng.gen_range(0..=trs.len() - seq_len);
                (0, &trs[start..start + seq_len])
            } else {
                (seq_len - trs.len(), trs)
            };
            windows.push(window);
        }

        let first = &windows[0].1[0];
        let (obs_dim, act_dim) = (first.obs.len(), first.act.len());

        let mut obs = Array3::<f32>::zeros((k, seq_len, obs_dim));
        let mut act = Array3::<f32>::zeros((k, seq_len, act_dim));
        let mut next_obs = Array3::<f32>::zeros((k, seq_len, obs_dim));
        let mut reward = Array2::<f32>::zeros((k, seq_len));
        let mut is_terminated = Array2::<i8>::zeros((k, seq_len));
        let mut is_truncated = Array2::<i8>::zeros((k, seq_len));
        let mut mask = Array2::<i8>::zeros((k, seq_len));

        for (b, (pad, steps)) in windows.iter().enumerate() {
            for (j, tr) in steps.iter().enumerate() {
                let t = pad + j;
                check_dims(tr, obs_dim, act_dim)?;
                for (d, v) in tr.obs.iter().enumerate() {
                    obs[[b, t, d]] = *v;
                }
                for (d, v) in tr.act.iter().enumerate() {
                    act[[b, t, d]] = *v;
                }
                for (d, v) in tr.next_obs.iter().enumerate() {
                    next_obs[[b, t, d]] = *v;
                }
                reward[[b, t]] = tr.reward;
                is_terminated[[b, t]] = tr.is_terminated;
                is_truncated[[b, t]] = tr.is_truncated;
                mask[[b, t]] = 1;
            }
        }

        let initial_hidden = match windows.iter().all(|(_, steps)| steps[0].hidden.is_some()) {
            true => Some(stack_rows(
                windows.iter().filter_map(|(_, steps)| steps[0].hidden.as_deref()),
            )?),
            false => None,
        };

        Ok(SequenceBatch {
            obs,
            act,
            next_obs,
            reward,
            is_terminated,
            is_truncated,
            mask,
            initial_hidden,
            burn_in_length,
            ix_sample,
        })
    }
}

fn check_dims(tr: &Transition, obs_dim: usize, act_dim: usize) -> Result<()> {
    if tr.obs.len() != obs_dim || tr.next_obs.len() != obs_dim || tr.act.len() != act_dim {
        bail!(
            "Inconsistent dimensions in episodes: obs {}/{}, act {}/{}",
            tr.obs.len(),
            obs_dim,
            tr.act.len(),
            act_dim
        );
    }
    Ok(())
}

/// Collects transitions of each agent until its episode ends.
#[derive(Debug, Clone)]
pub struct EpisodeAccumulator {
    pending: Vec<Vec<Transition>>,
}

impl EpisodeAccumulator {
    /// Creates empty episodes for `agents_num` agents.
    pub fn new(agents_num: usize) -> Self {
        Self {
            pending: vec![vec![]; agents_num],
        }
    }

    fn pending_mut(&mut self, agent_id: usize) -> Result<&mut Vec<Transition>> {
        let agents_num = self.pending.len();
        self.pending.get_mut(agent_id).ok_or_else(|| {
            ReplayError::InvalidAgent {
                agent_id,
                agents_num,
            }
            .into()
        })
    }

    /// Appends a transition; returns the sealed episode when `tr.is_done()`.
    pub fn push(&mut self, agent_id: usize, tr: Transition) -> Result<Option<Episode>> {
        let is_done = tr.is_done();
        let pending = self.pending_mut(agent_id)?;
        pending.push(tr);

        if is_done {
            let episode = Episode::new(std::mem::take(pending))?;
            debug!("Seal episode of agent {} ({} steps)", agent_id, episode.len());
            Ok(Some(episode))
        } else {
            Ok(None)
        }
    }

    /// Seals the pending transitions of `agent_id` on external truncation.
    pub fn flush(&mut self, agent_id: usize) -> Result<Option<Episode>> {
        let pending = self.pending_mut(agent_id)?;
        if pending.is_empty() {
            return Ok(None);
        }
        Ok(Some(Episode::new(std::mem::take(pending))?))
    }

    /// Number of pending transitions of `agent_id`.
    pub fn pending(&self, agent_id: usize) -> usize {
        self.pending.get(agent_id).map_or(0, |p| p.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    /// Episode whose step `t` has observation `[offset + t]` and reward `offset + t`.
    fn episode(offset: usize, len: usize) -> Episode {
        let trs = (0..len)
            .map(|t| {
                let x = (offset + t) as f32;
                Transition::new(vec![x], vec![0.], x, vec![x + 1.], t + 1 == len, false)
                    .hidden(vec![x, x])
            })
            .collect();
        Episode::new(trs).unwrap()
    }

    #[test]
    fn test_evict_oldest_episode() {
        let mut store = EpisodeStore::new(2, EpisodeSampling::Uniform);
        store.put(episode(0, 3));
        store.put(episode(100, 4));
        assert_eq!(store.total_steps(), 7);

        store.put(episode(200, 5));
        assert_eq!(store.len(), 2);
        assert_eq!(store.total_steps(), 9);
        assert_eq!(store.get(0).unwrap().transitions()[0].obs, vec![200.]);
    }

    #[test]
    fn test_empty_store() {
        let mut rng = StdRng::seed_from_u64(0);
        for sampling in [EpisodeSampling::Uniform, EpisodeSampling::LengthWeighted] {
            let store = EpisodeStore::new(2, sampling);
            let err = store.sample(2, 4, 0, &mut rng).unwrap_err();
            assert_eq!(err.downcast_ref::<ReplayError>(), Some(&ReplayError::EmptyStore));
        }
    }

    #[test]
    fn test_contiguous_windows() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut store = EpisodeStore::new(4, EpisodeSampling::Uniform);
        store.put(episode(0, 20));

        let batch = store.sample(32, 5, 3, &mut rng).unwrap();
        assert_eq!(batch.obs.shape(), &[32, 8, 1]);
        assert_eq!(batch.seq_len(), 8);
        assert_eq!(batch.burn_in_length, 3);
        assert!(batch.mask.iter().all(|&m| m == 1));

        for b in 0..32 {
            let start = batch.obs[[b, 0, 0]];
            assert!(start >= 0. && start <= 12.);
            for t in 0..8 {
                assert_eq!(batch.obs[[b, t, 0]], start + t as f32);
                assert_eq!(batch.reward[[b, t]], start + t as f32);
            }
            let initial_hidden = batch.initial_hidden.as_ref().unwrap();
            assert_eq!(initial_hidden[[b, 0]], start);
        }
    }

    #[test]
    fn test_short_episode_is_padded_at_start() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut store = EpisodeStore::new(4, EpisodeSampling::Uniform);
        store.put(episode(10, 3));

        let batch = store.sample(2, 4, 2, &mut rng).unwrap();
        assert_eq!(batch.seq_len(), 6);
        for b in 0..2 {
            let mask = batch.mask.row(b).to_vec();
            assert_eq!(mask, vec![0, 0, 0, 1, 1, 1]);
            let obs = (0..6).map(|t| batch.obs[[b, t, 0]]).collect::<Vec<_>>();
            assert_eq!(obs, vec![0., 0., 0., 10., 11., 12.]);
            assert_eq!(batch.is_terminated[[b, 5]], 1);
        }
    }

    fn frequency_of_long_episode(sampling: EpisodeSampling) -> f32 {
        let mut rng = StdRng::seed_from_u64(7);
        let mut store = EpisodeStore::new(2, sampling);
        store.put(episode(0, 1));
        store.put(episode(100, 9));

        let batch = store.sample(10_000, 1, 0, &mut rng).unwrap();
        let n_long = batch.ix_sample.iter().filter(|&&ix| ix == 1).count();
        n_long as f32 / 10_000.
    }

    #[test]
    fn test_uniform_episode_sampling() {
        let freq = frequency_of_long_episode(EpisodeSampling::Uniform);
        assert!((freq - 0.5).abs() < 0.03, "freq = {}", freq);
    }

    #[test]
    fn test_length_weighted_episode_sampling() {
        let freq = frequency_of_long_episode(EpisodeSampling::LengthWeighted);
        assert!((freq - 0.9).abs() < 0.03, "freq = {}", freq);
    }

    #[test]
    fn test_episode_accumulator() {
        let mut acc = EpisodeAccumulator::new(2);
        let tr = |done| Transition::new(vec![0.], vec![0.], 1., vec![1.], done, false);

        assert!(acc.push(0, tr(false)).unwrap().is_none());
        assert!(acc.push(1, tr(false)).unwrap().is_none());
        let episode = acc.push(0, tr(true)).unwrap().unwrap();
        assert_eq!(episode.len(), 2);
        assert_eq!(acc.pending(0), 0);
        assert_eq!(acc.pending(1), 1);

        let episode = acc.flush(1).unwrap().unwrap();
        assert_eq!(episode.len(), 1);
        assert!(acc.flush(1).unwrap().is_none());
        assert!(acc.push(2, tr(false)).is_err());
    }
}
