//! Errors in the library.
use thiserror::Error;

/// Errors raised by replay buffers.
///
/// Public methods return [`anyhow::Result`]; use
/// `err.downcast_ref::<ReplayError>()` to inspect the cause.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReplayError {
    /// Sampling was requested before anything was stored.
    #[error("Replay buffer is empty")]
    EmptyStore,

    /// A priority was negative, NaN or infinite.
    #[error("Invalid priority: {0}")]
    InvalidPriority(f32),

    /// Slot ids and priorities have different lengths.
    #[error("Length mismatch: {ids} slot ids, {priorities} priorities")]
    LengthMismatch {
        /// Number of slot ids.
        ids: usize,
        /// Number of priorities.
        priorities: usize,
    },

    /// Invalid configuration, or an operation the configured variant does not support.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The slot has never been written.
    #[error("Slot {slot} is out of range (len = {len})")]
    SlotOutOfRange {
        /// Requested slot.
        slot: usize,
        /// Number of filled slots.
        len: usize,
    },

    /// Agent id is not smaller than `agents_num`.
    #[error("Invalid agent id {agent_id} (agents_num = {agents_num})")]
    InvalidAgent {
        /// Requested agent id.
        agent_id: usize,
        /// Number of agents the buffer was built for.
        agents_num: usize,
    },

    /// An episode without transitions.
    #[error("Episode has no transitions")]
    EmptyEpisode,

    /// The mutex guarding a shared buffer was poisoned.
    #[error("Lock of the shared replay buffer is poisoned")]
    LockPoisoned,
}
