use crate::PushedItemMessage;
use border_replay::SharedReplayBuffer;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::{info, warn};
use std::{
    sync::{Arc, Mutex},
    thread::JoinHandle,
    time::{Duration, SystemTime},
};

/// Stats of [`BufferServer::run()`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BufferServerStat {
    /// The number of received messages.
    pub n_messages: usize,

    /// The number of experiences stored into the replay buffer.
    pub n_items: usize,

    /// The number of messages the replay buffer rejected.
    ///
    /// A message is stored whole or not at all.
    pub n_rejected: usize,

    /// Duration of the receiving loop.
    pub duration: Duration,
}

impl BufferServerStat {
    /// Returns a formatted string.
    pub fn fmt(&self) -> String {
        let mut s = "messages, items, rejected, items/sec, duration [sec]\n".to_string();
        let d = self.duration.as_secs_f32();
        let p = match d > 0f32 {
            true => self.n_items as f32 / d,
            false => 0f32,
        };
        s += format!(
            "{}, {}, {}, {}, {}\n",
            self.n_messages, self.n_items, self.n_rejected, p, d
        )
        .as_str();
        s
    }
}

/// Receives [`PushedItemMessage`]s and stores their experiences into a replay buffer.
///
/// The loop ends when the stop flag is set or every sender has been dropped.
pub struct BufferServer {
    receiver: Receiver<PushedItemMessage>,
    buffer: SharedReplayBuffer,

    /// Flag to stop the loop.
    stop: Arc<Mutex<bool>>,

    /// Interval of checking the stop flag while no message arrives.
    timeout: Duration,
}

impl BufferServer {
    /// Creates a server.
    pub fn new(
        receiver: Receiver<PushedItemMessage>,
        buffer: SharedReplayBuffer,
        stop: Arc<Mutex<bool>>,
    ) -> Self {
        Self {
            receiver,
            buffer,
            stop,
            timeout: Duration::from_millis(100),
        }
    }

    /// Sets the interval of checking the stop flag.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn is_stopped(&self) -> bool {
        // A poisoned flag means its owner panicked.
        self.stop.lock().map_or(true, |stop| *stop)
    }

    /// Runs the receiving loop on the current thread.
    pub fn run(self) -> BufferServerStat {
        let mut stat = BufferServerStat::default();
        let time = SystemTime::now();
        info!("Starts buffer server");

        loop {
            match self.receiver.recv_timeout(self.timeout) {
                Ok(msg) => {
                    stat.n_messages += 1;
                    let (id, n) = (msg.id, msg.pushed_items.len());
                    match self.buffer.store_all(msg.pushed_items) {
                        Ok(()) => stat.n_items += n,
                        Err(e) => {
                            warn!("Rejected message from {}: {}", id, e);
                            stat.n_rejected += 1;
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    info!("All senders disconnected");
                    break;
                }
            }

            if self.is_stopped() {
                break;
            }
        }

        stat.duration = time.elapsed().unwrap_or_default();
        info!("Stopped buffer server\n{}", stat.fmt());
        stat
    }

    /// Runs the receiving loop on a new thread.
    pub fn spawn(self) -> JoinHandle<BufferServerStat> {
        std::thread::spawn(move || self.run())
    }
}
