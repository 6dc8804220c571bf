//! Reading aggregated statistics off a Redis-compatible queue.

#[macro_use]
extern crate tracing;

pub mod connection;
pub mod consumer;
pub mod credential;
pub mod error;
pub mod pool;
pub mod sample;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use connection::{
    Connector,
    QueueConnection,
    RedisConnector,
    TlsMode,
};
pub use consumer::QueueConsumer;
pub use credential::{
    Credential,
    CredentialError,
    CredentialManager,
    CredentialState,
    HttpRefresher,
    TokenRefresher,
    TokenVerifier,
    DEFAULT_PUBLIC_KEY_PEM,
    DEFAULT_REFRESH_URL,
};
pub use error::{
    ConsumeError,
    QueueError,
};
pub use pool::{
    ConnectionPool,
    PoolConfig,
    PooledConnection,
};
pub use sample::{
    QueueNames,
    QueueOrigin,
    RawSample,
    Tags,
};
