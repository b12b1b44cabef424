//! Feeds a replay buffer from producer threads.
//!
//! Each producer owns a [`ReplayBufferProxy`], which implements
//! [`ExperienceBufferBase`](border_replay::ExperienceBufferBase) and sends
//! pushed experiences in chunks over a [`crossbeam_channel`]. A [`BufferServer`]
//! receives the chunks and stores them into a
//! [`SharedReplayBuffer`](border_replay::SharedReplayBuffer), from which a
//! learner samples batches.
mod error;
mod messages;
mod replay_buffer_proxy;
mod server;
pub use error::BorderReplayAsyncError;
pub use messages::PushedItemMessage;
pub use replay_buffer_proxy::{ReplayBufferProxy, ReplayBufferProxyConfig};
pub use server::{BufferServer, BufferServerStat};
