//! Connections to the statistics queue.
//!
//! [`Connector`] opens raw sessions and [`QueueConnection`] is the handful of
//! commands the dumper issues. The Redis implementation talks TLS; whether the
//! peer certificate is verified is a configuration decision ([`TlsMode`]).

use crate::error::QueueError;
use futures::{
    future::BoxFuture,
    FutureExt as _,
};
use redis::aio::MultiplexedConnection;
use std::{
    sync::Once,
    time::Duration,
};

/// One popped payload: the queue it came from and its raw bytes.
pub type Popped = (String, Vec<u8>);

pub trait QueueConnection: Send {
    /// Liveness check.
    fn ping(&mut self) -> BoxFuture<'_, Result<(), QueueError>>;

    fn auth<'a>(&'a mut self, token: &'a str) -> BoxFuture<'a, Result<(), QueueError>>;

    /// Blocking pop across `queues`. `Ok(None)` when `timeout` elapsed without
    /// data; a zero timeout blocks indefinitely.
    fn pop<'a>(
        &'a mut self,
        queues: [&'a str; 2],
        timeout: Duration,
    ) -> BoxFuture<'a, Result<Option<Popped>, QueueError>>;
}

/// Opens new, not yet authenticated, connections.
pub trait Connector: Send + Sync {
    type Connection: QueueConnection;

    fn connect(&self) -> BoxFuture<'_, Result<Self::Connection, QueueError>>;
}

/// How the queue's TLS certificate is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    /// Verify the peer against the bundled web PKI roots.
    Verified,
    /// Accept any peer certificate. Trust comes from token possession instead.
    Insecure,
}

impl TlsMode {
    pub fn from_verify(verify: bool) -> Self {
        if verify {
            TlsMode::Verified
        } else {
            TlsMode::Insecure
        }
    }

    fn url_for(&self, address: &str) -> String {
        match self {
            TlsMode::Verified => format!("rediss://{address}/"),
            TlsMode::Insecure => format!("rediss://{address}/#insecure"),
        }
    }
}

static CRYPTO_PROVIDER: Once = Once::new();

fn install_crypto_provider() {
    CRYPTO_PROVIDER.call_once(|| {
        if rustls::crypto::ring::default_provider().install_default().is_err() {
            debug!("rustls crypto provider already installed");
        }
    });
}

/// Opens TLS sessions to a Redis-compatible statistics queue.
#[derive(Debug, Clone)]
pub struct RedisConnector {
    address: String,
    client: redis::Client,
}

impl RedisConnector {
    pub fn new(address: impl Into<String>, tls: TlsMode) -> Result<Self, QueueError> {
        install_crypto_provider();
        let address = address.into();
        if tls == TlsMode::Insecure {
            warn!(%address, "queue TLS certificate verification is disabled");
        }
        let client = redis::Client::open(tls.url_for(&address)).map_err(|source| QueueError::Connect {
            address: address.clone(),
            source,
        })?;
        Ok(Self { address, client })
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl Connector for RedisConnector {
    type Connection = RedisConnection;

    fn connect(&self) -> BoxFuture<'_, Result<RedisConnection, QueueError>> {
        async move {
            debug!(address = %self.address, "opening queue connection");
            let inner = self
                .client
                .get_multiplexed_async_connection()
                .await
                .map_err(|source| QueueError::Connect {
                    address: self.address.clone(),
                    source,
                })?;
            Ok(RedisConnection { inner })
        }
        .boxed()
    }
}

pub struct RedisConnection {
    inner: MultiplexedConnection,
}

impl QueueConnection for RedisConnection {
    fn ping(&mut self) -> BoxFuture<'_, Result<(), QueueError>> {
        async move {
            let _: String = redis::cmd("PING")
                .query_async(&mut self.inner)
                .await
                .map_err(|source| QueueError::command("PING", source))?;
            Ok(())
        }
        .boxed()
    }

    fn auth<'a>(&'a mut self, token: &'a str) -> BoxFuture<'a, Result<(), QueueError>> {
        async move {
            let _: () = redis::cmd("AUTH")
                .arg(token)
                .query_async(&mut self.inner)
                .await
                .map_err(|source| QueueError::command("AUTH", source))?;
            Ok(())
        }
        .boxed()
    }

    fn pop<'a>(
        &'a mut self,
        queues: [&'a str; 2],
        timeout: Duration,
    ) -> BoxFuture<'a, Result<Option<Popped>, QueueError>> {
        async move {
            let reply: Option<Popped> = redis::cmd("BLPOP")
                .arg(&queues[..])
                .arg(timeout.as_secs())
                .query_async(&mut self.inner)
                .await
                .map_err(|source| QueueError::command("BLPOP", source))?;
            Ok(reply)
        }
        .boxed()
    }
}
