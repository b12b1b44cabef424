use border_replay::Experience;

/// Experiences sent from a [`ReplayBufferProxy`](crate::ReplayBufferProxy) to a
/// [`BufferServer`](crate::BufferServer).
#[derive(Clone, Debug)]
pub struct PushedItemMessage {
    /// Id of the sender.
    pub id: usize,

    /// Experiences in the order they were pushed.
    pub pushed_items: Vec<Experience>,
}
