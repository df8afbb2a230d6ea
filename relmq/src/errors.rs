use rustix::io::Errno;
use thiserror::Error;

/// Errors surfaced by the message queue.
///
/// Variants that concern a particular queue carry the segment name so that
/// failures can be attributed when several queues are in play.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("message queue \"{name}\" does not exist")]
    NotFound { name: String },

    #[error("message queue \"{name}\" already exists")]
    AlreadyExists { name: String },

    #[error("permission denied for message queue \"{name}\"")]
    PermissionDenied { name: String },

    #[error("invalid message queue name \"{name}\": {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("message queue \"{name}\" setup failed: {reason}")]
    Setup { name: String, reason: String },

    #[error("{op} failed on message queue \"{name}\": {source}")]
    System {
        name: String,
        op: &'static str,
        #[source]
        source: Errno,
    },

    #[error("message queue \"{name}\" is at capacity")]
    CapacityLimitReached { name: String },

    #[error("message of {size} bytes can never fit message queue \"{name}\" (at most {max} bytes)")]
    MessageTooLarge {
        name: String,
        size: usize,
        max: usize,
    },

    #[error("receive buffer of {available} bytes is smaller than the {needed}-byte message")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("operation aborted by a stop request")]
    Aborted,
}

/// A failed OS primitive, before the segment name is known. The queue layer
/// attaches the name and turns this into [`QueueError::System`].
#[derive(Debug)]
pub(crate) struct SysCallError {
    pub op: &'static str,
    pub errno: Errno,
}

impl SysCallError {
    pub(crate) fn into_queue_error(self, name: &str) -> QueueError {
        QueueError::System {
            name: name.to_owned(),
            op: self.op,
            source: self.errno,
        }
    }
}
