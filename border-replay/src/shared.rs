//! A replay buffer shared between threads.
use crate::{
    error::ReplayError, Batch, Episode, Experience, ReplayBuffer, ReplayBufferBase,
    ReplayBufferConfig, Transition,
};
use anyhow::Result;
use std::sync::{Arc, Mutex, MutexGuard};

/// A cloneable handle to a [`ReplayBuffer`] behind a mutex.
///
/// Every operation takes the lock once, so a write to the ring and the
/// priority assigned to it are never observed apart.
#[derive(Clone)]
pub struct SharedReplayBuffer {
    buffer: Arc<Mutex<ReplayBuffer>>,
}

impl SharedReplayBuffer {
    /// Wraps a buffer.
    pub fn new(buffer: ReplayBuffer) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(buffer)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, ReplayBuffer>> {
        self.buffer
            .lock()
            .map_err(|_| ReplayError::LockPoisoned.into())
    }

    /// See [`ReplayBuffer::store`].
    pub fn store(&self, tr: Transition) -> Result<()> {
        self.lock()?.store(tr)
    }

    /// See [`ReplayBuffer::store_agent`].
    pub fn store_agent(&self, agent_id: usize, tr: Transition) -> Result<()> {
        self.lock()?.store_agent(agent_id, tr)
    }

    /// See [`ReplayBuffer::store_episode`].
    pub fn store_episode(&self, episode: Episode) -> Result<()> {
        self.lock()?.store_episode(episode)
    }

    /// Stores all of `items` in a single critical section, or none of them
    /// if any would be rejected. See [`ReplayBuffer::store_all`].
    pub fn store_all(&self, items: Vec<Experience>) -> Result<()> {
        self.lock()?.store_all(items)
    }

    /// See [`ReplayBuffer::end_episode`].
    pub fn end_episode(&self, agent_id: usize) -> Result<()> {
        self.lock()?.end_episode(agent_id)
    }

    /// See [`ReplayBuffer::sample`].
    pub fn sample(&self, batch_size: usize) -> Result<Batch> {
        self.lock()?.sample(batch_size)
    }

    /// See [`ReplayBuffer::update_priorities`].
    pub fn update_priorities(&self, ixs: &[usize], priorities: &[f32]) -> Result<()> {
        self.lock()?.update_priorities(ixs, priorities)
    }

    /// See [`ReplayBuffer::len`].
    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    /// See [`ReplayBuffer::is_empty`].
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.is_empty())
    }

    /// See [`ReplayBuffer::capacity`].
    pub fn capacity(&self) -> Result<usize> {
        Ok(self.lock()?.capacity())
    }

    /// See [`ReplayBuffer::discount`].
    pub fn discount(&self) -> Result<f32> {
        Ok(self.lock()?.discount())
    }
}

impl ReplayBufferBase for SharedReplayBuffer {
    type Config = ReplayBufferConfig;
    type Batch = Batch;

    fn build(config: &Self::Config) -> Result<Self> {
        Ok(Self::new(ReplayBuffer::build(config)?))
    }

    fn batch(&mut self, size: usize) -> Result<Self::Batch> {
        self.sample(size)
    }

    fn update_priority(&mut self, ixs: &[usize], td_errs: &[f32]) -> Result<()> {
        self.update_priorities(ixs, td_errs)
    }
}
