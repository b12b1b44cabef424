use crate::{BorderReplayAsyncError, PushedItemMessage};
use anyhow::Result;
use border_replay::{Experience, ExperienceBufferBase};
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};

/// Configuration of [`ReplayBufferProxy`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ReplayBufferProxyConfig {
    /// Number of experiences buffered until sent to the server.
    pub n_buffer: usize,
}

impl Default for ReplayBufferProxyConfig {
    fn default() -> Self {
        Self { n_buffer: 100 }
    }
}

/// Stands in for a replay buffer on the producer side.
///
/// Pushed experiences are buffered and sent to a [`BufferServer`](crate::BufferServer)
/// as a single [`PushedItemMessage`] every `n_buffer` pushes.
pub struct ReplayBufferProxy {
    id: usize,

    /// Sender of [PushedItemMessage].
    sender: Sender<PushedItemMessage>,

    /// Number of experiences buffered until sent to the server.
    n_buffer: usize,

    /// Experiences not sent yet.
    buffer: Vec<Experience>,
}

impl ReplayBufferProxy {
    /// Builds a proxy sending messages tagged with `id`.
    pub fn build_with_sender(
        id: usize,
        config: &ReplayBufferProxyConfig,
        sender: Sender<PushedItemMessage>,
    ) -> Self {
        let n_buffer = config.n_buffer.max(1);
        Self {
            id,
            sender,
            n_buffer,
            buffer: Vec::with_capacity(n_buffer),
        }
    }

    /// Sends buffered experiences, if any.
    ///
    /// Fails with [`BorderReplayAsyncError::SendMsgForPush`] if the channel is
    /// full or disconnected; the experiences are dropped in that case.
    pub fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let mut buffer = Vec::with_capacity(self.n_buffer);
        std::mem::swap(&mut self.buffer, &mut buffer);

        let msg = PushedItemMessage {
            id: self.id,
            pushed_items: buffer,
        };

        match self.sender.try_send(msg) {
            Ok(()) => Ok(()),
            Err(_e) => Err(BorderReplayAsyncError::SendMsgForPush.into()),
        }
    }
}

impl ExperienceBufferBase for ReplayBufferProxy {
    type Item = Experience;

    fn push(&mut self, tr: Self::Item) -> Result<()> {
        self.buffer.push(tr);
        if self.buffer.len() == self.n_buffer {
            self.flush()?;
        }

        Ok(())
    }

    /// Number of experiences waiting to be sent.
    fn len(&self) -> usize {
        self.buffer.len()
    }
}
