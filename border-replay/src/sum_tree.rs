//! Sum tree for prioritized sampling.
//!
//! The layout follows https://github.com/jaromiru/AI-blog/blob/master/SumTree.py and
//! https://github.com/openai/baselines/blob/master/baselines/deepq/replay_buffer.py
//! with stratified sampling.
use crate::error::ReplayError;
use anyhow::Result;
use rand::Rng;
use segment_tree::{
    ops::{MaxIgnoreNaN, MinIgnoreNaN},
    SegmentPoint,
};
use serde::{Deserialize, Serialize};

/// Priority given to the first transition of an empty tree.
const INITIAL_PRIORITY: f32 = 1.0;

/// How importance sampling weights are normalized.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Copy)]
pub enum WeightNormalizer {
    /// Divide by the weight of the least likely transition in the buffer.
    All,

    /// Divide by the maximum weight in the sampled batch.
    Batch,
}

/// Priorities of the slots of a [`RingStore`](crate::RingStore).
///
/// Leaves hold `p^alpha` where `p` is the priority clamped to
/// `[eps, max_priority]`. Min and max trees hold the clamped priorities
/// themselves.
#[derive(Debug)]
pub struct SumTree {
    eps: f32,
    alpha: f32,
    max_priority: Option<f32>,
    capacity: usize,
    n_samples: usize,
    normalize: WeightNormalizer,
    tree: Vec<f32>,
    min_tree: SegmentPoint<f32, MinIgnoreNaN>,
    max_tree: SegmentPoint<f32, MaxIgnoreNaN>,
}

impl SumTree {
    /// Creates a sum tree with `capacity` leaves, all empty.
    pub fn new(
        capacity: usize,
        alpha: f32,
        eps: f32,
        max_priority: Option<f32>,
        normalize: WeightNormalizer,
    ) -> Self {
        assert!(capacity > 0, "capacity of SumTree must be positive");
        Self {
            eps,
            alpha,
            max_priority,
            capacity,
            n_samples: 0,
            normalize,
            tree: vec![0f32; 2 * capacity - 1],
            min_tree: SegmentPoint::build(vec![f32::MAX; capacity], MinIgnoreNaN),
            max_tree: SegmentPoint::build(vec![0f32; capacity], MaxIgnoreNaN),
        }
    }

    /// Recomputes the ancestors of the node `ix` from their children.
    fn propagate(&mut self, ix: usize) {
        let parent = (ix - 1) / 2;
        let left = 2 * parent + 1;
        self.tree[parent] = self.tree[left] + self.tree[left + 1];
        if parent != 0 {
            self.propagate(parent);
        }
    }

    fn retrieve(&self, ix: usize, s: f32) -> usize {
        let left = 2 * ix + 1;
        let right = left + 1;

        if left >= self.tree.len() {
            return ix;
        }

        if s < self.tree[left] || self.tree[right] <= 0f32 {
            self.retrieve(left, s)
        } else {
            self.retrieve(right, s - self.tree[left])
        }
    }

    /// Writes a clamped priority, or clears the slot if `p` is `None`.
    fn set(&mut self, slot: usize, p: Option<f32>) {
        let leaf = match p {
            Some(p) => {
                self.min_tree.modify(slot, p);
                self.max_tree.modify(slot, p);
                p.powf(self.alpha)
            }
            None => {
                self.min_tree.modify(slot, f32::MAX);
                self.max_tree.modify(slot, 0f32);
                0f32
            }
        };

        let ix = slot + self.capacity - 1;
        self.tree[ix] = leaf;
        if ix != 0 {
            self.propagate(ix);
        }
    }

    fn clamp(&self, p: f32) -> f32 {
        let p = p.max(self.eps);
        match self.max_priority {
            Some(max_priority) => p.min(max_priority),
            None => p,
        }
    }

    /// Sum of all leaves.
    pub fn total(&self) -> f32 {
        self.tree[0]
    }

    /// Number of slots that have been inserted.
    pub fn len(&self) -> usize {
        self.n_samples
    }

    /// Returns `true` if nothing has been inserted.
    pub fn is_empty(&self) -> bool {
        self.n_samples == 0
    }

    /// Number of leaves.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Largest priority currently stored, or the initial priority if the tree is empty.
    pub fn max(&self) -> f32 {
        let p = self.max_tree.query(0, self.max_tree.len());
        if p > 0f32 {
            p
        } else {
            self.clamp(INITIAL_PRIORITY)
        }
    }

    /// Smallest priority currently stored, `None` if the tree is empty.
    pub fn min(&self) -> Option<f32> {
        let p = self.min_tree.query(0, self.min_tree.len());
        if p < f32::MAX {
            Some(p)
        } else {
            None
        }
    }

    /// Leaf value `p^alpha` of `slot`.
    pub fn leaf(&self, slot: usize) -> f32 {
        self.tree[slot + self.capacity - 1]
    }

    /// Assigns the current maximum priority to `slot`, which has just been (over)written.
    ///
    /// The previous priority of the slot is cleared first so that it does not
    /// take part in the maximum.
    pub fn insert(&mut self, slot: usize) {
        debug_assert!(slot < self.capacity);
        debug_assert!(slot <= self.n_samples);

        self.set(slot, None);
        let p = self.max();
        self.set(slot, Some(p));

        if self.n_samples < self.capacity {
            self.n_samples += 1;
        }
    }

    /// Updates the priority of `slot`.
    pub fn update(&mut self, slot: usize, p: f32) -> Result<()> {
        if !p.is_finite() || p < 0f32 {
            return Err(ReplayError::InvalidPriority(p).into());
        }
        if slot >= self.n_samples {
            return Err(ReplayError::SlotOutOfRange {
                slot,
                len: self.n_samples,
            }
            .into());
        }

        let p = self.clamp(p);
        self.set(slot, Some(p));
        Ok(())
    }

    /// Returns the slot whose cumulative interval covers `s`.
    pub fn get(&self, s: f32) -> usize {
        let ix = self.retrieve(0, s);
        debug_assert!(ix >= (self.capacity - 1));
        ix + 1 - self.capacity
    }

    /// Samples `k` slots proportionally to their leaf values.
    ///
    /// `[0, total)` is split into `k` strata of equal mass and one point is
    /// drawn uniformly from each. Returns pairs of slot and sampling probability.
    pub fn sample_proportional<R: Rng>(&self, k: usize, rng: &mut R) -> Result<Vec<(usize, f32)>> {
        let p_sum = self.total();
        if self.n_samples == 0 || p_sum <= 0f32 {
            return Err(ReplayError::EmptyStore.into());
        }

        let segment = p_sum / k as f32;
        let samples = (0..k)
            .map(|i| {
                let s = (segment * (i as f32 + rng.gen::<f32>())).min(p_sum);
                let slot = self.get(s);
                (slot, self.leaf(slot) / p_sum)
            })
            .collect();

        Ok(samples)
    }

    /// Importance sampling weights of sampled slots.
    ///
    /// The weight is $w_i=\left(N^{-1}P(i)^{-1}\right)^{\beta}$, normalized
    /// according to [`WeightNormalizer`], so that every weight is at most 1.
    pub fn importance_weights(&self, samples: &[(usize, f32)], beta: f32) -> Vec<f32> {
        let n = self.n_samples as f32;
        let ws = samples
            .iter()
            .map(|&(_, p)| (n * p).powf(-beta))
            .collect::<Vec<_>>();

        let w_max = match self.normalize {
            WeightNormalizer::Batch => ws.iter().fold(f32::MIN_POSITIVE, |m, &w| w.max(m)),
            WeightNormalizer::All => match self.min() {
                Some(p_min) => (n * p_min.powf(self.alpha) / self.total()).powf(-beta),
                None => 1f32,
            },
        };

        ws.iter().map(|w| w / w_max).collect()
    }
}
