use std::{fmt, sync::Arc};

use async_trait::async_trait;
use dashmap::DashMap;
use redis::{Client, Script};
use tracing::debug;

use crate::{
    CounterStore, DispatcherError, Procedure, ProcedureHandle, StoreError,
    config::RedisStoreConfig,
    redis::{
        RedisConnectionPool,
        scripts::{NORMAL_SCRIPT, RESET_SCRIPT},
    },
};

/// Counter store backed by Redis.
///
/// # Examples
///
/// ```ignore
/// use std::{sync::Arc, time::Duration};
/// use limit_dispatcher::{Dispatcher, redis::RedisCounterStore};
///
/// let client = redis::Client::open("redis://127.0.0.1:6379/")?;
/// let store = Arc::new(RedisCounterStore::from_client(client, 4).await?);
/// let dispatcher = Dispatcher::new(Duration::from_secs(60), 100, store).await?;
/// ```
pub struct RedisCounterStore {
    pool: RedisConnectionPool,
    // Scripts registered through this store, by SHA1.
    scripts: DashMap<Arc<str>, Arc<Script>>,
}

impl RedisCounterStore {
    /// Create a store over an existing pool.
    pub fn new(pool: impl Into<RedisConnectionPool>) -> Self {
        Self {
            pool: pool.into(),
            scripts: DashMap::new(),
        }
    }

    /// Open a single managed connection.
    pub async fn default_from_client(client: Client) -> Result<Self, DispatcherError> {
        Ok(Self::new(RedisConnectionPool::default_from_client(client).await?))
    }

    /// Open `connection_count` managed connections used round-robin.
    pub async fn from_client(
        client: Client,
        connection_count: usize,
    ) -> Result<Self, DispatcherError> {
        Ok(Self::new(
            RedisConnectionPool::from_client(client, connection_count).await?,
        ))
    }

    /// Connect as described by a [`RedisStoreConfig`].
    pub async fn from_config(config: &RedisStoreConfig) -> Result<Self, DispatcherError> {
        let client = Client::open(config.url.as_str())
            .map_err(|err| DispatcherError::Configuration(format!("invalid redis url: {err}")))?;
        Self::from_client(client, config.connection_count).await
    }

    fn source(procedure: Procedure) -> &'static str {
        match procedure {
            Procedure::Reset => RESET_SCRIPT,
            Procedure::Normal => NORMAL_SCRIPT,
        }
    }
}

impl fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCounterStore")
            .field("pool", &self.pool)
            .field("scripts", &self.scripts.len())
            .finish()
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let mut connection_manager = self.pool.get();
        let pong: String = redis::cmd("PING")
            .query_async(&mut connection_manager)
            .await?;

        if pong == "PONG" {
            Ok(())
        } else {
            Err(StoreError::UnexpectedReply(format!("PING answered {pong:?}")))
        }
    }

    async fn register(&self, procedure: Procedure) -> Result<ProcedureHandle, StoreError> {
        let script = Script::new(Self::source(procedure));
        let mut connection_manager = self.pool.get();

        let sha: String = script
            .prepare_invoke()
            .load_async(&mut connection_manager)
            .await?;

        debug!(procedure = %procedure, sha = %sha, "Registered procedure");

        let id: Arc<str> = Arc::from(sha);
        self.scripts.insert(id.clone(), Arc::new(script));

        Ok(ProcedureHandle::new(procedure, id))
    }

    async fn execute(
        &self,
        handle: &ProcedureHandle,
        keys: &[&str],
        args: &[i64],
    ) -> Result<Vec<i64>, StoreError> {
        let script = self
            .scripts
            .get(handle.id())
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::UnknownProcedure(handle.id().to_string()))?;

        let mut invocation = script.prepare_invoke();
        for key in keys {
            invocation.key(*key);
        }
        for arg in args {
            invocation.arg(*arg);
        }

        // Runs EVALSHA. If the server lost its script cache (restart, SCRIPT
        // FLUSH) the redis crate reloads the same source and evaluates it once.
        let mut connection_manager = self.pool.get();
        let reply: Vec<i64> = invocation.invoke_async(&mut connection_manager).await?;

        Ok(reply)
    } // end method execute
}
