use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use parking_lot::{Mutex, MutexGuard};
use redis::{Client, Connection, RedisResult};
use tracing::warn;

use crate::TollgateError;

/// A fixed set of blocking Redis connections handed out round-robin.
///
/// Each store operation borrows one connection for the duration of the call and
/// returns it when the guard drops, whether the call succeeded or not. Callers
/// contend on a connection only when every connection is busy, which affects
/// throughput but never correctness.
pub struct RedisConnectionPool {
    client: Client,
    connections: Arc<Vec<Mutex<Connection>>>,
    track_index: AtomicUsize,
}

impl RedisConnectionPool {
    /// Create a pool with a single connection.
    pub fn default_from_client(client: Client) -> Result<Self, TollgateError> {
        Self::from_client(client, 1)
    }

    /// Open `connection_count` connections from `client`.
    pub fn from_client(client: Client, connection_count: usize) -> Result<Self, TollgateError> {
        if connection_count == 0 {
            return Err(TollgateError::InvalidRedisClientConnectionCount(
                "connection count must be > 0".to_string(),
            ));
        }

        let mut connections = Vec::with_capacity(connection_count);

        for _ in 0..connection_count {
            connections.push(Mutex::new(client.get_connection()?));
        }

        Ok(Self {
            client,
            connections: Arc::new(connections),
            track_index: AtomicUsize::new(0),
        })
    }

    /// Open a pool of `connection_count` connections to `url`.
    pub fn open(url: &str, connection_count: usize) -> Result<Self, TollgateError> {
        Self::from_client(Client::open(url)?, connection_count)
    }

    /// Number of connections in the pool.
    pub fn size(&self) -> usize {
        self.connections.len()
    }

    /// Run `f` on a borrowed connection.
    ///
    /// A connection left unusable by `f` is replaced with a fresh one before the
    /// error is returned. The failed call itself is not retried.
    pub(crate) fn with_connection<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> RedisResult<T>,
    ) -> Result<T, TollgateError> {
        let mut connection = self.checkout();

        match f(&mut *connection) {
            Ok(value) => Ok(value),
            Err(err) => {
                if err.is_unrecoverable_error() {
                    match self.client.get_connection() {
                        Ok(fresh) => {
                            *connection = fresh;
                            warn!(error = %err, "replaced broken redis connection");
                        }
                        Err(reconnect_err) => {
                            warn!(error = %reconnect_err, "failed to replace broken redis connection");
                        }
                    }
                }

                Err(err.into())
            }
        }
    } // end method with_connection

    // Prefer an idle connection starting from the round-robin slot, otherwise queue on it.
    fn checkout(&self) -> MutexGuard<'_, Connection> {
        let len = self.connections.len();
        let start = self.track_index.fetch_add(1, Ordering::Relaxed);

        for offset in 0..len {
            if let Some(guard) = self.connections[start.wrapping_add(offset) % len].try_lock() {
                return guard;
            }
        }

        self.connections[start % len].lock()
    }
}

impl Clone for RedisConnectionPool {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            connections: self.connections.clone(),
            track_index: AtomicUsize::new(0),
        }
    }
}

impl fmt::Debug for RedisConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisConnectionPool")
            .field("connections", &self.connections.len())
            .finish()
    }
}
