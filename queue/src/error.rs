use crate::{
    credential::CredentialError,
    sample::DecodeError,
};

/// The queue is unreachable, refused us, or misbehaved. Fatal for the consumer.
#[derive(thiserror::Error, Debug)]
pub enum QueueError {
    #[error("failed to connect to queue at {address}")]
    Connect {
        address: String,
        #[source]
        source: redis::RedisError,
    },
    #[error("queue command {command} failed")]
    Command {
        command: &'static str,
        #[source]
        source: redis::RedisError,
    },
    #[error("queue credential rejected")]
    Credential(#[from] CredentialError),
}

impl QueueError {
    pub(crate) fn command(command: &'static str, source: redis::RedisError) -> Self {
        QueueError::Command { command, source }
    }
}

/// Outcome of a failed [`QueueConsumer::next`](crate::QueueConsumer::next).
#[derive(thiserror::Error, Debug)]
pub enum ConsumeError {
    /// One sample could not be decoded. Skip it and keep reading.
    #[error("dropping sample from {queue}")]
    Decode {
        queue: String,
        #[source]
        source: DecodeError,
    },
    #[error(transparent)]
    Connection(#[from] QueueError),
}
