use thiserror::Error;

/// Errors of this crate.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BorderReplayAsyncError {
    /// A message with pushed experiences could not be sent.
    #[error("Error on sending a message of pushed experiences")]
    SendMsgForPush,
}
