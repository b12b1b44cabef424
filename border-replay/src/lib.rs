#![warn(missing_docs)]
//! Experience replay buffers for off-policy reinforcement learning.
//!
//! [`ReplayBuffer`] stores transitions of environments and samples batches
//! for learners. It is built with one of five [`BufferVariant`]s:
//!
//! * [`BufferVariant::ER`] samples transitions uniformly.
//! * [`BufferVariant::PER`] samples transitions in proportion to priorities
//!   held in a [`SumTree`], with importance sampling weights.
//! * [`BufferVariant::NstepER`] and [`BufferVariant::NstepPER`] fold `n`
//!   consecutive steps of each agent with [`NStepAccumulator`] before storing.
//! * [`BufferVariant::EpisodeER`] stores whole episodes in an [`EpisodeStore`]
//!   and samples fixed-length segments for recurrent models.
//!
//! [`SharedReplayBuffer`] makes a buffer usable from producer and learner threads.
pub mod error;

mod base;
pub use base::{ExperienceBufferBase, ReplayBufferBase};

mod batch;
pub use batch::{Batch, SequenceBatch, TransitionBatch};

mod buffer;
pub use buffer::{BufferState, ReplayBuffer};

mod config;
pub use config::{BufferVariant, EpisodeConfig, PerConfig, ReplayBufferConfig};

mod episode_store;
pub use episode_store::{EpisodeAccumulator, EpisodeSampling, EpisodeStore};

mod iw_scheduler;
pub use iw_scheduler::IwScheduler;

mod n_step;
pub use n_step::{FoldedTransition, NStepAccumulator};

mod ring_store;
pub use ring_store::RingStore;

mod select;
pub use select::{AlgorithmProfile, PolicyMode};

mod shared;
pub use shared::SharedReplayBuffer;

mod sum_tree;
pub use sum_tree::{SumTree, WeightNormalizer};

mod transition;
pub use transition::{Episode, Experience, Transition};
