use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use redis::{Client, aio::ConnectionManager};

use crate::{DispatcherError, StoreError};

/// A fixed set of [`redis::aio::ConnectionManager`]s handed out round-robin.
pub struct RedisConnectionPool {
    connection_managers: Arc<Vec<ConnectionManager>>,
    track_index: AtomicUsize,
}

impl RedisConnectionPool {
    /// Create a pool holding a single connection manager.
    pub async fn default_from_client(client: Client) -> Result<Self, DispatcherError> {
        Self::from_client(client, 1).await
    }

    /// Create a pool of `connection_count` connection managers.
    pub async fn from_client(
        client: Client,
        connection_count: usize,
    ) -> Result<Self, DispatcherError> {
        if connection_count == 0 {
            return Err(DispatcherError::Configuration(
                "connection count must be > 0".to_string(),
            ));
        }

        let mut connection_managers = Vec::with_capacity(connection_count);

        for _ in 0..connection_count {
            let connection_manager = client
                .get_connection_manager()
                .await
                .map_err(|err| DispatcherError::StoreUnavailable(StoreError::Redis(err)))?;
            connection_managers.push(connection_manager);
        }

        Ok(Self::from_connection_managers(connection_managers))
    }

    /// Wrap already established connection managers. Must not be empty.
    pub(crate) fn from_connection_managers(connection_managers: Vec<ConnectionManager>) -> Self {
        Self {
            connection_managers: Arc::new(connection_managers),
            track_index: AtomicUsize::new(0),
        }
    }

    /// Get a [`redis::aio::ConnectionManager`] from the pool.
    pub(crate) fn get(&self) -> ConnectionManager {
        let index = self.track_index.fetch_add(1, Ordering::Relaxed);
        self.connection_managers[index % self.connection_managers.len()].clone()
    } // end method get

    /// Number of connection managers in the pool.
    pub fn len(&self) -> usize {
        self.connection_managers.len()
    }

    /// Always false: a pool holds at least one connection manager.
    pub fn is_empty(&self) -> bool {
        self.connection_managers.is_empty()
    }
} // end impl RedisConnectionPool

impl From<ConnectionManager> for RedisConnectionPool {
    fn from(connection_manager: ConnectionManager) -> Self {
        Self::from_connection_managers(vec![connection_manager])
    }
}

impl fmt::Debug for RedisConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisConnectionPool")
            .field("connection_count", &self.connection_managers.len())
            .field("track_index", &self.track_index.load(Ordering::Relaxed))
            .finish()
    }
}

impl Clone for RedisConnectionPool {
    fn clone(&self) -> Self {
        Self {
            connection_managers: self.connection_managers.clone(),
            track_index: AtomicUsize::new(0),
        }
    }
}
