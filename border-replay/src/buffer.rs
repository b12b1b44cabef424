//! Replay buffer combining stores, priorities and n-step folding.
use crate::{
    error::ReplayError, Batch, BufferVariant, Episode, EpisodeAccumulator, EpisodeStore,
    Experience, ExperienceBufferBase, FoldedTransition, IwScheduler, NStepAccumulator,
    PerConfig, ReplayBufferBase, ReplayBufferConfig, RingStore, SumTree, Transition,
    TransitionBatch,
};
use anyhow::Result;
use log::info;
use rand::{rngs::StdRng, SeedableRng};

/// Filling state of a replay buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// Nothing stored; sampling fails.
    Empty,

    /// Some items stored, less than the capacity.
    Filling,

    /// Capacity reached; new items overwrite the oldest ones.
    Full,
}

/// State for Prioritized Experience Replay (PER).
struct PerState {
    /// A sum tree data structure for efficient priority sampling.
    sum_tree: SumTree,

    /// Scheduler for importance sampling weights.
    iw_scheduler: IwScheduler,
}

impl PerState {
    fn new(capacity: usize, per_config: &PerConfig) -> Self {
        Self {
            sum_tree: SumTree::new(
                capacity,
                per_config.alpha,
                per_config.epsilon,
                per_config.max_priority,
                per_config.normalize,
            ),
            iw_scheduler: IwScheduler::from(per_config),
        }
    }
}

/// Transitions with a priority per slot.
struct PrioritizedStore {
    store: RingStore<FoldedTransition>,
    per_state: PerState,
}

impl PrioritizedStore {
    fn new(capacity: usize, per_config: &PerConfig) -> Self {
        Self {
            store: RingStore::new(capacity),
            per_state: PerState::new(capacity, per_config),
        }
    }

    /// Writes a transition; its slot gets the current maximum priority.
    fn put(&mut self, tr: FoldedTransition) {
        let slot = self.store.put(tr);
        self.per_state.sum_tree.insert(slot);
    }

    fn sample(&self, size: usize, is_n_step: bool, rng: &mut StdRng) -> Result<TransitionBatch> {
        let sum_tree = &self.per_state.sum_tree;
        let beta = self.per_state.iw_scheduler.beta();
        let samples = sum_tree.sample_proportional(size, rng)?;
        let weight = sum_tree.importance_weights(&samples, beta);
        let ixs = samples.iter().map(|&(ix, _)| ix).collect::<Vec<_>>();
        sample_transitions(&self.store, ixs, Some(weight), is_n_step)
    }

    /// Applies all updates, or none of them if any is invalid.
    fn update(&mut self, ixs: &[usize], priorities: &[f32]) -> Result<()> {
        let len = self.per_state.sum_tree.len();
        for (&ix, &p) in ixs.iter().zip(priorities.iter()) {
            if !p.is_finite() || p < 0f32 {
                return Err(ReplayError::InvalidPriority(p).into());
            }
            if ix >= len {
                return Err(ReplayError::SlotOutOfRange { slot: ix, len }.into());
            }
        }

        for (&ix, &p) in ixs.iter().zip(priorities.iter()) {
            self.per_state.sum_tree.update(ix, p)?;
        }
        self.per_state.iw_scheduler.add_n_opts();
        Ok(())
    }
}

fn sample_transitions(
    store: &RingStore<FoldedTransition>,
    ixs: Vec<usize>,
    weight: Option<Vec<f32>>,
    is_n_step: bool,
) -> Result<TransitionBatch> {
    let folded = ixs
        .iter()
        .map(|&ix| store.get(ix))
        .collect::<Result<Vec<_>>>()?;
    let trs = folded.iter().map(|f| &f.transition).collect::<Vec<_>>();
    let batch = TransitionBatch::from_transitions(&trs, ixs, weight)?;

    match is_n_step {
        true => Ok(batch.with_n_steps(folded.iter().map(|f| f.n_steps).collect())),
        false => Ok(batch),
    }
}

/// One case per [`BufferVariant`], each holding only what it uses.
enum Inner {
    Er(RingStore<FoldedTransition>),
    Per(PrioritizedStore),
    NstepEr(NStepAccumulator, RingStore<FoldedTransition>),
    NstepPer(NStepAccumulator, PrioritizedStore),
    EpisodeEr(EpisodeAccumulator, EpisodeStore),
}

#[cfg_attr(doc, aquamarine::aquamarine)]
/// A replay buffer of one of the five [`BufferVariant`]s.
///
/// The variant is fixed when the buffer is built. Transitions flow as follows:
///
/// ```mermaid
/// graph LR
///     Transition --> NStepAccumulator
///     Transition --> EpisodeAccumulator
///     Transition --> RingStore
///     NStepAccumulator --> RingStore
///     EpisodeAccumulator --> EpisodeStore
///     RingStore --> SumTree
///     RingStore --> Batch
///     SumTree --> Batch
///     EpisodeStore --> Batch
/// ```
///
/// Slot ids in a [`Batch`] may be passed back to
/// [`update_priorities()`](ReplayBuffer::update_priorities). If a slot has
/// been overwritten in between, the update applies to its new occupant.
///
/// # Examples
///
/// ```rust
/// use border_replay::{BufferVariant, ReplayBuffer, ReplayBufferConfig, Transition};
///
/// let config = ReplayBufferConfig::default()
///     .variant(BufferVariant::PER)
///     .capacity(100)
///     .batch_size(4);
/// let mut buffer = ReplayBuffer::new(config).unwrap();
///
/// for t in 0..10 {
///     let tr = Transition::new(vec![t as f32], vec![0.], 1., vec![t as f32 + 1.], false, false);
///     buffer.store(tr).unwrap();
/// }
///
/// let batch = buffer.sample(4).unwrap();
/// let td_errs = vec![0.5; batch.len()];
/// buffer.update_priorities(batch.ix_sample(), &td_errs).unwrap();
/// ```
pub struct ReplayBuffer {
    config: ReplayBufferConfig,
    inner: Inner,
    rng: StdRng,
}

impl ReplayBuffer {
    /// Builds a buffer after validating `config`.
    pub fn new(config: ReplayBufferConfig) -> Result<Self> {
        config.validate()?;

        let capacity = config.capacity;
        let inner = match config.variant {
            BufferVariant::ER => Inner::Er(RingStore::new(capacity)),
            BufferVariant::PER => Inner::Per(PrioritizedStore::new(capacity, &config.per_config)),
            BufferVariant::NstepER => Inner::NstepEr(
                NStepAccumulator::new(config.n_step, config.gamma, config.agents_num),
                RingStore::new(capacity),
            ),
            BufferVariant::NstepPER => Inner::NstepPer(
                NStepAccumulator::new(config.n_step, config.gamma, config.agents_num),
                PrioritizedStore::new(capacity, &config.per_config),
            ),
            BufferVariant::EpisodeER => Inner::EpisodeEr(
                EpisodeAccumulator::new(config.agents_num),
                EpisodeStore::new(capacity, config.episode_config.sampling),
            ),
        };

        info!("Build replay buffer: {}", config.variant);
        config.log_summary();

        Ok(Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            inner,
        })
    }

    fn check_agent(&self, agent_id: usize) -> Result<()> {
        if agent_id >= self.config.agents_num {
            return Err(ReplayError::InvalidAgent {
                agent_id,
                agents_num: self.config.agents_num,
            }
            .into());
        }
        Ok(())
    }

    /// Stores a transition of agent 0.
    pub fn store(&mut self, tr: Transition) -> Result<()> {
        self.store_agent(0, tr)
    }

    /// Stores a transition of `agent_id`.
    ///
    /// N-step variants store folded transitions as their windows fill up;
    /// the episodic variant stores an episode when `tr.is_done()`.
    pub fn store_agent(&mut self, agent_id: usize, tr: Transition) -> Result<()> {
        self.check_agent(agent_id)?;

        match &mut self.inner {
            Inner::Er(store) => {
                store.put(tr.into());
            }
            Inner::Per(store) => store.put(tr.into()),
            Inner::NstepEr(acc, store) => {
                for folded in acc.push(agent_id, tr)? {
                    store.put(folded);
                }
            }
            Inner::NstepPer(acc, store) => {
                for folded in acc.push(agent_id, tr)? {
                    store.put(folded);
                }
            }
            Inner::EpisodeEr(acc, store) => {
                if let Some(episode) = acc.push(agent_id, tr)? {
                    store.put(episode);
                }
            }
        }
        Ok(())
    }

    /// Stores one transition per agent; `trs[i]` belongs to agent `i`.
    pub fn store_vectorized(&mut self, trs: Vec<Transition>) -> Result<()> {
        if trs.len() > self.config.agents_num {
            return Err(ReplayError::InvalidAgent {
                agent_id: trs.len() - 1,
                agents_num: self.config.agents_num,
            }
            .into());
        }
        for (agent_id, tr) in trs.into_iter().enumerate() {
            self.store_agent(agent_id, tr)?;
        }
        Ok(())
    }

    /// Stores a sealed episode. Only [`BufferVariant::EpisodeER`] accepts episodes.
    pub fn store_episode(&mut self, episode: Episode) -> Result<()> {
        match &mut self.inner {
            Inner::EpisodeEr(_, store) => {
                store.put(episode);
                Ok(())
            }
            _ => Err(self.episodes_unsupported()),
        }
    }

    fn episodes_unsupported(&self) -> anyhow::Error {
        ReplayError::Configuration(format!("{} does not store episodes", self.config.variant))
            .into()
    }

    /// Checks whether `item` would be accepted by
    /// [`push()`](ExperienceBufferBase::push) without storing it.
    pub fn check(&self, item: &Experience) -> Result<()> {
        match item {
            Experience::Step { agent_id, .. } => self.check_agent(*agent_id),
            Experience::Episode(_) if self.config.variant.is_episodic() => Ok(()),
            Experience::Episode(_) => Err(self.episodes_unsupported()),
        }
    }

    /// Stores all of `items`, or none of them if any would be rejected.
    pub fn store_all(&mut self, items: Vec<Experience>) -> Result<()> {
        for item in items.iter() {
            self.check(item)?;
        }
        for item in items {
            self.push(item)?;
        }
        Ok(())
    }

    /// Ends the current episode of `agent_id` on an external truncation signal.
    ///
    /// Drains the n-step window or seals the pending episode of the agent.
    pub fn end_episode(&mut self, agent_id: usize) -> Result<()> {
        self.check_agent(agent_id)?;

        match &mut self.inner {
            Inner::Er(_) | Inner::Per(_) => {}
            Inner::NstepEr(acc, store) => {
                for folded in acc.flush(agent_id)? {
                    store.put(folded);
                }
            }
            Inner::NstepPer(acc, store) => {
                for folded in acc.flush(agent_id)? {
                    store.put(folded);
                }
            }
            Inner::EpisodeEr(acc, store) => {
                if let Some(episode) = acc.flush(agent_id)? {
                    store.put(episode);
                }
            }
        }
        Ok(())
    }

    /// Samples a batch of `batch_size` transitions, or sequences for the episodic variant.
    ///
    /// Fails with [`ReplayError::EmptyStore`] if nothing has been stored.
    pub fn sample(&mut self, batch_size: usize) -> Result<Batch> {
        if batch_size == 0 {
            return Err(ReplayError::Configuration("batch_size must be positive".into()).into());
        }

        let rng = &mut self.rng;
        let is_n_step = self.config.variant.is_n_step();
        let batch = match &self.inner {
            Inner::Er(store) | Inner::NstepEr(_, store) => {
                let ixs = store.sample_uniform(batch_size, rng)?;
                Batch::Transitions(sample_transitions(store, ixs, None, is_n_step)?)
            }
            Inner::Per(store) | Inner::NstepPer(_, store) => {
                Batch::Transitions(store.sample(batch_size, is_n_step, rng)?)
            }
            Inner::EpisodeEr(_, store) => {
                let episode_config = &self.config.episode_config;
                Batch::Sequences(store.sample(
                    batch_size,
                    episode_config.segment_length,
                    episode_config.burn_in_length,
                    rng,
                )?)
            }
        };
        Ok(batch)
    }

    /// Samples a batch of the configured `batch_size`.
    pub fn sample_default(&mut self) -> Result<Batch> {
        self.sample(self.config.batch_size)
    }

    /// Updates priorities of sampled slots and advances the schedule of `beta`.
    ///
    /// Does nothing for variants without priorities. Either all pairs are
    /// applied or, on error, none.
    pub fn update_priorities(&mut self, ixs: &[usize], priorities: &[f32]) -> Result<()> {
        match &mut self.inner {
            Inner::Per(store) | Inner::NstepPer(_, store) => {
                if ixs.len() != priorities.len() {
                    return Err(ReplayError::LengthMismatch {
                        ids: ixs.len(),
                        priorities: priorities.len(),
                    }
                    .into());
                }
                store.update(ixs, priorities)
            }
            _ => Ok(()),
        }
    }

    /// Number of stored transitions, or episodes for the episodic variant.
    pub fn len(&self) -> usize {
        match &self.inner {
            Inner::Er(store) | Inner::NstepEr(_, store) => store.len(),
            Inner::Per(store) | Inner::NstepPer(_, store) => store.store.len(),
            Inner::EpisodeEr(_, store) => store.len(),
        }
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of stored transitions, or episodes for the episodic variant.
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Filling state.
    pub fn state(&self) -> BufferState {
        match self.len() {
            0 => BufferState::Empty,
            n if n < self.capacity() => BufferState::Filling,
            _ => BufferState::Full,
        }
    }

    /// The variant of this buffer.
    pub fn variant(&self) -> BufferVariant {
        self.config.variant
    }

    /// The configuration this buffer was built from.
    pub fn config(&self) -> &ReplayBufferConfig {
        &self.config
    }

    /// Default batch size.
    pub fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    /// Current exponent of importance sampling weights, `None` without priorities.
    pub fn beta(&self) -> Option<f32> {
        match &self.inner {
            Inner::Per(store) | Inner::NstepPer(_, store) => {
                Some(store.per_state.iw_scheduler.beta())
            }
            _ => None,
        }
    }

    /// Sum of the priority leaves, `None` without priorities.
    pub fn priority_total(&self) -> Option<f32> {
        match &self.inner {
            Inner::Per(store) | Inner::NstepPer(_, store) => Some(store.per_state.sum_tree.total()),
            _ => None,
        }
    }

    /// Discount of bootstrapped values of full-length transitions.
    ///
    /// `gamma^n` for n-step variants, `gamma` otherwise. Transitions folded from
    /// a window cut short by the end of an episode need
    /// [`TransitionBatch::discounts()`] instead.
    pub fn discount(&self) -> f32 {
        match &self.inner {
            Inner::NstepEr(acc, _) | Inner::NstepPer(acc, _) => acc.discount(),
            _ => self.config.gamma,
        }
    }

    /// Number of transitions over all stored episodes; equals `len()` for other variants.
    pub fn total_steps(&self) -> usize {
        match &self.inner {
            Inner::EpisodeEr(_, store) => store.total_steps(),
            _ => self.len(),
        }
    }
}

impl ExperienceBufferBase for ReplayBuffer {
    type Item = Experience;

    fn push(&mut self, tr: Self::Item) -> Result<()> {
        match tr {
            Experience::Step {
                agent_id,
                transition,
            } => self.store_agent(agent_id, transition),
            Experience::Episode(episode) => self.store_episode(episode),
        }
    }

    fn len(&self) -> usize {
        ReplayBuffer::len(self)
    }
}

impl ReplayBufferBase for ReplayBuffer {
    type Config = ReplayBufferConfig;
    type Batch = Batch;

    fn build(config: &Self::Config) -> Result<Self> {
        Self::new(config.clone())
    }

    fn batch(&mut self, size: usize) -> Result<Self::Batch> {
        self.sample(size)
    }

    fn update_priority(&mut self, ixs: &[usize], td_errs: &[f32]) -> Result<()> {
        self.update_priorities(ixs, td_errs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EpisodeConfig, EpisodeSampling};

    const VARIANTS: [BufferVariant; 5] = [
        BufferVariant::ER,
        BufferVariant::PER,
        BufferVariant::NstepER,
        BufferVariant::NstepPER,
        BufferVariant::EpisodeER,
    ];

    fn transition(t: usize, reward: f32, done: bool) -> Transition {
        Transition::new(
            vec![t as f32, 0.],
            vec![1.],
            reward,
            vec![(t + 1) as f32, 0.],
            done,
            false,
        )
    }

    fn buffer(variant: BufferVariant, capacity: usize) -> ReplayBuffer {
        let _ = env_logger::builder().is_test(true).try_init();
        let config = ReplayBufferConfig::default()
            .variant(variant)
            .capacity(capacity)
            .batch_size(2)
            .gamma(0.9)
            .per_config(PerConfig::default().alpha(1.0))
            .episode_config(EpisodeConfig::default().segment_length(2));
        ReplayBuffer::new(config).unwrap()
    }

    fn replay_error(err: &anyhow::Error) -> Option<&ReplayError> {
        err.downcast_ref::<ReplayError>()
    }

    #[test]
    fn test_sample_empty_buffer() {
        for variant in VARIANTS {
            let mut buffer = buffer(variant, 8);
            assert_eq!(buffer.state(), BufferState::Empty);
            let err = buffer.sample(2).unwrap_err();
            assert_eq!(replay_error(&err), Some(&ReplayError::EmptyStore), "{}", variant);
        }
    }

    #[test]
    fn test_invalid_config() {
        let config = ReplayBufferConfig::default()
            .variant(BufferVariant::NstepPER)
            .n_step(0);
        let err = ReplayBuffer::new(config).err().unwrap();
        assert!(matches!(
            replay_error(&err),
            Some(ReplayError::Configuration(_))
        ));
    }

    #[test]
    fn test_state_machine() {
        let mut buffer = buffer(BufferVariant::ER, 4);
        buffer.store(transition(0, 1., false)).unwrap();
        assert_eq!(buffer.state(), BufferState::Filling);
        assert!(buffer.sample(2).is_ok());

        for t in 1..10 {
            buffer.store(transition(t, 1., false)).unwrap();
        }
        assert_eq!(buffer.state(), BufferState::Full);
        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.capacity(), 4);
    }

    #[test]
    fn test_uniform_batch() {
        let mut buffer = buffer(BufferVariant::ER, 4);
        for t in 0..10 {
            buffer.store(transition(t, t as f32, false)).unwrap();
        }

        let batch = buffer.sample(16).unwrap();
        let batch = batch.transitions().unwrap();
        assert_eq!(batch.obs.shape(), &[16, 2]);
        assert_eq!(batch.act.shape(), &[16, 1]);
        assert!(batch.weight.is_none());
        for (i, &ix) in batch.ix_sample.iter().enumerate() {
            // Only the 4 most recent transitions (rewards 6..=9) survive.
            assert!(batch.reward[i] >= 6.);
            assert_eq!(batch.obs[[i, 0]], batch.reward[i]);
            assert_eq!(ix, (batch.reward[i] as usize) % 4);
        }
    }

    #[test]
    fn test_prioritized_batch() {
        let mut buffer = buffer(BufferVariant::PER, 8);
        for t in 0..4 {
            buffer.store(transition(t, t as f32, false)).unwrap();
        }

        // New transitions share the initial priority.
        assert!((buffer.priority_total().unwrap() - 4.0).abs() < 1e-6);

        let batch = buffer.sample(4).unwrap();
        let weight = batch.weight().unwrap();
        assert!(weight.iter().all(|&w| (w - 1.0).abs() < 1e-6));

        buffer
            .update_priorities(&[0, 1, 2, 3], &[100., 0., 0., 0.])
            .unwrap();
        let batch = buffer.sample(1000).unwrap();
        let n_zero = batch.ix_sample().iter().filter(|&&ix| ix == 0).count();
        assert!(n_zero > 990, "n_zero = {}", n_zero);
        let weight = batch.weight().unwrap();
        assert!(weight.iter().all(|&w| w <= 1.0 + 1e-6));

        // The next transition is assigned the maximum priority.
        buffer.store(transition(4, 4., false)).unwrap();
        assert!((buffer.priority_total().unwrap() - (200. + 0.03)).abs() < 1e-3);
    }

    #[test]
    fn test_update_priorities_errors() {
        let mut buffer = buffer(BufferVariant::PER, 8);
        buffer.store(transition(0, 0., false)).unwrap();
        buffer.store(transition(1, 0., false)).unwrap();
        let total = buffer.priority_total().unwrap();

        let err = buffer.update_priorities(&[0, 1], &[1.0]).unwrap_err();
        assert_eq!(
            replay_error(&err),
            Some(&ReplayError::LengthMismatch {
                ids: 2,
                priorities: 1
            })
        );

        let err = buffer.update_priorities(&[0, 1], &[5.0, -1.0]).unwrap_err();
        assert_eq!(replay_error(&err), Some(&ReplayError::InvalidPriority(-1.0)));
        // Nothing was applied.
        assert_eq!(buffer.priority_total().unwrap(), total);

        let err = buffer.update_priorities(&[5], &[1.0]).unwrap_err();
        assert!(matches!(
            replay_error(&err),
            Some(ReplayError::SlotOutOfRange { slot: 5, len: 2 })
        ));
    }

    #[test]
    fn test_update_priorities_idempotent() {
        let mut buffer = buffer(BufferVariant::PER, 8);
        for t in 0..4 {
            buffer.store(transition(t, 0., false)).unwrap();
        }
        buffer.update_priorities(&[2], &[3.0]).unwrap();
        let total = buffer.priority_total().unwrap();
        buffer.update_priorities(&[2], &[3.0]).unwrap();
        assert_eq!(buffer.priority_total().unwrap(), total);
    }

    #[test]
    fn test_beta_annealing() {
        let config = ReplayBufferConfig::default()
            .variant(BufferVariant::PER)
            .capacity(8)
            .batch_size(2)
            .per_config(PerConfig::default().beta_0(0.5).n_opts_final(2));
        let mut buffer = ReplayBuffer::new(config).unwrap();
        buffer.store(transition(0, 0., false)).unwrap();

        assert_eq!(buffer.beta(), Some(0.5));
        buffer.update_priorities(&[0], &[1.0]).unwrap();
        assert_eq!(buffer.beta(), Some(0.75));
        buffer.update_priorities(&[0], &[1.0]).unwrap();
        assert_eq!(buffer.beta(), Some(1.0));
    }

    #[test]
    fn test_update_priorities_noop() {
        for variant in [BufferVariant::ER, BufferVariant::NstepER, BufferVariant::EpisodeER] {
            let mut buffer = buffer(variant, 8);
            assert!(buffer.update_priorities(&[0, 1], &[1.0]).is_ok());
            assert_eq!(buffer.beta(), None);
            assert_eq!(buffer.priority_total(), None);
        }
    }

    #[test]
    fn test_n_step_buffer() {
        let config = ReplayBufferConfig::default()
            .variant(BufferVariant::NstepER)
            .capacity(16)
            .batch_size(2)
            .gamma(0.9)
            .n_step(3);
        let mut buffer = ReplayBuffer::new(config).unwrap();
        assert!((buffer.discount() - 0.729).abs() < 1e-6);

        for t in 0..2 {
            buffer.store(transition(t, 1., false)).unwrap();
        }
        assert_eq!(buffer.len(), 0);
        assert!(buffer.sample(1).is_err());

        for t in 2..5 {
            buffer.store(transition(t, 1., false)).unwrap();
        }
        assert_eq!(buffer.len(), 3);

        let batch = buffer.sample(8).unwrap();
        let batch = batch.transitions().unwrap();
        assert!(batch.reward.iter().all(|r| (r - 2.71).abs() < 1e-5));
        for i in 0..8 {
            assert_eq!(batch.next_obs[[i, 0]], batch.obs[[i, 0]] + 3.);
        }

        // An external truncation drains the window.
        buffer.end_episode(0).unwrap();
        assert_eq!(buffer.len(), 5);
    }

    #[test]
    fn test_n_step_prioritized_buffer() {
        let config = ReplayBufferConfig::default()
            .variant(BufferVariant::NstepPER)
            .capacity(16)
            .batch_size(2)
            .n_step(5)
            .agents_num(2);
        let mut buffer = ReplayBuffer::new(config).unwrap();

        buffer
            .store_vectorized(vec![transition(0, 1., false), transition(10, 1., false)])
            .unwrap();
        buffer
            .store_vectorized(vec![transition(1, 1., true), transition(11, 1., false)])
            .unwrap();
        assert_eq!(buffer.len(), 2);
        assert!((buffer.priority_total().unwrap() - 2.0).abs() < 1e-6);

        let batch = buffer.sample(4).unwrap();
        assert!(batch.ix_sample().iter().all(|&ix| ix < 2));
        assert_eq!(batch.weight().unwrap().len(), 4);

        let err = buffer
            .store_vectorized(vec![transition(0, 1., false); 3])
            .unwrap_err();
        assert!(matches!(
            replay_error(&err),
            Some(ReplayError::InvalidAgent { .. })
        ));
    }

    #[test]
    fn test_episode_buffer() {
        let config = ReplayBufferConfig::default()
            .variant(BufferVariant::EpisodeER)
            .capacity(4)
            .batch_size(2)
            .agents_num(2)
            .episode_config(
                EpisodeConfig::default()
                    .burn_in_length(1)
                    .segment_length(2)
                    .sampling(EpisodeSampling::LengthWeighted),
            );
        let mut buffer = ReplayBuffer::new(config).unwrap();

        for t in 0..5 {
            buffer.store_agent(0, transition(t, 1., t == 4)).unwrap();
            buffer.store_agent(1, transition(100 + t, 1., false)).unwrap();
        }
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.total_steps(), 5);

        buffer.end_episode(1).unwrap();
        assert_eq!(buffer.len(), 2);

        let episode = Episode::new(vec![transition(200, 1., true)]).unwrap();
        buffer.push(Experience::Episode(episode)).unwrap();
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.total_steps(), 11);

        let batch = buffer.sample(8).unwrap();
        let batch = batch.sequences().unwrap();
        assert_eq!(batch.obs.shape(), &[8, 3, 2]);
        assert_eq!(batch.burn_in_length, 1);
        for (b, &ix) in batch.ix_sample.iter().enumerate() {
            let n_valid = batch.mask.row(b).iter().filter(|&&m| m == 1).count();
            if ix == 2 {
                assert_eq!(n_valid, 1);
            } else {
                assert_eq!(n_valid, 3);
            }
        }
    }

    #[test]
    fn test_store_episode_requires_episodic_variant() {
        let mut buffer = buffer(BufferVariant::ER, 8);
        let episode = Episode::new(vec![transition(0, 1., true)]).unwrap();
        let err = buffer.store_episode(episode).unwrap_err();
        assert!(matches!(
            replay_error(&err),
            Some(ReplayError::Configuration(_))
        ));
    }

    #[test]
    fn test_partial_window_n_steps() {
        let config = ReplayBufferConfig::default()
            .variant(BufferVariant::NstepER)
            .capacity(16)
            .batch_size(2)
            .gamma(0.9)
            .n_step(3);
        let mut buffer = ReplayBuffer::new(config).unwrap();

        buffer.store(transition(0, 1., false)).unwrap();
        buffer.end_episode(0).unwrap();
        assert_eq!(buffer.len(), 1);

        let batch = buffer.sample(4).unwrap();
        let batch = batch.transitions().unwrap();
        assert_eq!(batch.next_obs[[0, 0]], 1.);
        assert_eq!(batch.is_terminated, vec![0; 4]);
        assert_eq!(batch.n_steps, Some(vec![1; 4]));
        assert!(batch
            .discounts(buffer.config().gamma)
            .iter()
            .all(|d| (d - 0.9).abs() < 1e-6));

        // Full windows keep gamma^n.
        for t in 1..4 {
            buffer.store(transition(t, 1., false)).unwrap();
        }
        buffer.store(transition(4, 1., true)).unwrap();
        let batch = buffer.sample(64).unwrap();
        let batch = batch.transitions().unwrap();
        let n_steps = batch.n_steps.as_ref().unwrap();
        for (i, d) in batch.discounts(0.9).iter().enumerate() {
            assert_eq!(n_steps[i], (batch.next_obs[[i, 0]] - batch.obs[[i, 0]]) as usize);
            assert!((d - 0.9f32.powi(n_steps[i] as i32)).abs() < 1e-6);
        }
        assert!(n_steps.contains(&3));
    }

    #[test]
    fn test_uniform_batch_has_no_n_steps() {
        let mut buffer = buffer(BufferVariant::PER, 8);
        buffer.store(transition(0, 1., false)).unwrap();
        let batch = buffer.sample(2).unwrap();
        assert_eq!(batch.transitions().unwrap().n_steps, None);
    }

    #[test]
    fn test_store_all_is_atomic() {
        let mut buffer = buffer(BufferVariant::ER, 8);
        let items = vec![
            Experience::from(transition(0, 1., false)),
            Experience::Step {
                agent_id: 5,
                transition: transition(1, 1., false),
            },
        ];
        let err = buffer.store_all(items).unwrap_err();
        assert!(matches!(
            replay_error(&err),
            Some(ReplayError::InvalidAgent { agent_id: 5, .. })
        ));
        assert!(buffer.is_empty());

        let episode = Episode::new(vec![transition(0, 1., true)]).unwrap();
        let items = vec![transition(0, 1., false).into(), episode.into()];
        assert!(buffer.store_all(items).is_err());
        assert!(buffer.is_empty());

        let items = (0..3).map(|t| transition(t, 1., false).into()).collect();
        buffer.store_all(items).unwrap();
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_invalid_agent() {
        let mut buffer = buffer(BufferVariant::ER, 8);
        let err = buffer.store_agent(1, transition(0, 1., false)).unwrap_err();
        assert_eq!(
            replay_error(&err),
            Some(&ReplayError::InvalidAgent {
                agent_id: 1,
                agents_num: 1
            })
        );
    }

    #[test]
    fn test_replay_buffer_base() {
        let config = ReplayBufferConfig::default().capacity(8).batch_size(2);
        let mut buffer = <ReplayBuffer as ReplayBufferBase>::build(&config).unwrap();
        buffer.push(transition(0, 1., false).into()).unwrap();
        assert_eq!(ExperienceBufferBase::len(&buffer), 1);
        assert_eq!(buffer.batch(2).unwrap().len(), 2);
        assert!(buffer.update_priority(&[0], &[1.0]).is_ok());
    }
}
