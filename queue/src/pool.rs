use crate::{
    connection::{
        Connector,
        QueueConnection as _,
    },
    credential::{
        CredentialManager,
        HttpRefresher,
        TokenRefresher,
    },
    error::QueueError,
};
use std::{
    collections::VecDeque,
    fmt,
    ops::{
        Deref,
        DerefMut,
    },
    sync::{
        Arc,
        Mutex,
        PoisonError,
    },
    time::{
        Duration,
        Instant,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Idle connections kept for reuse. Extra returned connections are closed.
    pub max_idle: usize,
    /// Idle connections older than this are closed instead of reused.
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle: 5,
            idle_timeout: Duration::from_secs(240),
        }
    }
}

struct IdleConnection<T> {
    connection: T,
    since: Instant,
}

struct PoolInner<C: Connector, R> {
    connector: C,
    credentials: Option<CredentialManager<R>>,
    config: PoolConfig,
    idle: Mutex<VecDeque<IdleConnection<C::Connection>>>,
}

/// Small pool of authenticated queue connections. Cloning shares the pool.
///
/// New connections authenticate with the managed token, or must answer a
/// PING when no token is configured. Idle connections are PINGed
/// again before they are handed out. Failures are returned to the caller,
/// the pool itself never retries.
pub struct ConnectionPool<C: Connector, R = HttpRefresher> {
    inner: Arc<PoolInner<C, R>>,
}

impl<C: Connector, R> Clone for ConnectionPool<C, R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C: Connector, R> fmt::Debug for ConnectionPool<C, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.inner.config)
            .field("authenticated", &self.inner.credentials.is_some())
            .field("idle", &self.idle_count())
            .finish()
    }
}

impl<C: Connector, R: TokenRefresher> ConnectionPool<C, R> {
    pub fn new(connector: C, credentials: Option<CredentialManager<R>>, config: PoolConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                connector,
                credentials,
                config,
                idle: Default::default(),
            }),
        }
    }

    /// Hand out a live idle connection, or open a new one.
    pub async fn acquire(&self) -> Result<PooledConnection<C, R>, QueueError> {
        if let Some(mut connection) = self.take_idle() {
            if let Err(err) = connection.ping().await {
                warn!(error = %err, "idle queue connection failed its PING, closing it");
                return Err(err);
            }
            trace!("reusing idle queue connection");
            return Ok(PooledConnection::new(connection, self.clone()));
        }

        let connection = self.open().await?;
        Ok(PooledConnection::new(connection, self.clone()))
    }

    /// Return a connection for reuse. Equivalent to dropping it.
    pub fn release(&self, connection: PooledConnection<C, R>) {
        drop(connection);
    }

    async fn open(&self) -> Result<C::Connection, QueueError> {
        let mut connection = self.inner.connector.connect().await?;
        match &self.inner.credentials {
            Some(credentials) => {
                let credential = credentials.credential().await?;
                connection.auth(credential.token()).await?;
                debug!(expires_at = ?credential.expires_at(), "opened authenticated queue connection");
            }
            None => {
                connection.ping().await?;
                debug!("opened queue connection");
            }
        }
        Ok(connection)
    }
}

impl<C: Connector, R> ConnectionPool<C, R> {
    pub fn idle_count(&self) -> usize {
        self.lock_idle().len()
    }

    fn lock_idle(&self) -> std::sync::MutexGuard<'_, VecDeque<IdleConnection<C::Connection>>> {
        self.inner.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Most recently returned first. Stale connections are closed on the way.
    fn take_idle(&self) -> Option<C::Connection> {
        let mut idle = self.lock_idle();
        while let Some(candidate) = idle.pop_front() {
            if candidate.since.elapsed() > self.inner.config.idle_timeout {
                debug!("closing queue connection idle past its timeout");
                continue;
            }
            return Some(candidate.connection);
        }
        None
    }

    fn give_back(&self, connection: C::Connection) {
        let mut idle = self.lock_idle();
        if idle.len() >= self.inner.config.max_idle {
            trace!("idle queue pool full, closing returned connection");
            return;
        }
        idle.push_front(IdleConnection {
            connection,
            since: Instant::now(),
        });
    }
}

// -=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-

/// A connection that goes back to its pool when dropped.
pub struct PooledConnection<C: Connector, R = HttpRefresher> {
    connection: Option<C::Connection>,
    pool: ConnectionPool<C, R>,
}

impl<C: Connector, R> PooledConnection<C, R> {
    fn new(connection: C::Connection, pool: ConnectionPool<C, R>) -> Self {
        Self {
            connection: Some(connection),
            pool,
        }
    }

    /// Close the connection instead of returning it, e.g. after an I/O error.
    pub fn discard(mut self) {
        self.connection.take();
    }
}

impl<C: Connector, R> Drop for PooledConnection<C, R> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.pool.give_back(connection);
        }
    }
}

impl<C: Connector, R> Deref for PooledConnection<C, R> {
    type Target = C::Connection;

    fn deref(&self) -> &Self::Target {
        self.connection.as_ref().expect("connection is present until dropped")
    }
}

impl<C: Connector, R> DerefMut for PooledConnection<C, R> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.connection.as_mut().expect("connection is present until dropped")
    }
}
