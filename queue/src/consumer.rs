use crate::{
    connection::{
        Connector,
        QueueConnection as _,
    },
    credential::{
        HttpRefresher,
        TokenRefresher,
    },
    error::ConsumeError,
    pool::{
        ConnectionPool,
        PooledConnection,
    },
    sample::{
        DecodeError,
        QueueNames,
        QueueOrigin,
        RawSample,
    },
};
use std::time::Duration;

/// Pops samples from the short and long statistics queues, short first.
///
/// One pooled connection is held across reads and only replaced after a
/// failed pop discards it.
pub struct QueueConsumer<C: Connector, R = HttpRefresher> {
    pool: ConnectionPool<C, R>,
    queues: QueueNames,
    connection: Option<PooledConnection<C, R>>,
}

impl<C: Connector, R: TokenRefresher> QueueConsumer<C, R> {
    pub fn new(pool: ConnectionPool<C, R>, queues: QueueNames) -> Self {
        Self {
            pool,
            queues,
            connection: None,
        }
    }

    pub fn queues(&self) -> &QueueNames {
        &self.queues
    }

    /// Wait up to `timeout` for the next sample.
    ///
    /// `Ok(None)` means neither queue had data in time. A payload that fails to
    /// decode is consumed and reported as [`ConsumeError::Decode`]; the caller
    /// may keep reading. Any other error means the queue is unusable.
    pub async fn next(&mut self, timeout: Duration) -> Result<Option<(QueueOrigin, RawSample)>, ConsumeError> {
        let mut connection = match self.connection.take() {
            Some(connection) => connection,
            None => self.pool.acquire().await?,
        };
        let reply = connection.pop(self.queues.as_slice(), timeout).await;
        let popped = match reply {
            Ok(popped) => popped,
            Err(err) => {
                connection.discard();
                return Err(err.into());
            }
        };
        self.connection = Some(connection);

        let Some((queue, payload)) = popped else {
            trace!("no statistics within {timeout:?}");
            return Ok(None);
        };

        let origin = self.queues.origin_of(&queue).ok_or_else(|| ConsumeError::Decode {
            queue: queue.clone(),
            source: DecodeError::UnknownQueue(queue.clone()),
        })?;
        let sample = RawSample::decode(&payload).map_err(|source| ConsumeError::Decode { queue, source })?;
        Ok(Some((origin, sample)))
    }
}
