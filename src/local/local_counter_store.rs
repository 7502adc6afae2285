use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::trace;

use crate::{CounterStore, Procedure, ProcedureHandle, StoreError, window};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CounterRecord {
    count: i64,
    deadline: i64,
}

/// Counter store held in process memory.
///
/// Expiry is driven by the `now` argument of each call rather than a clock of
/// its own: a record whose deadline has passed is treated as absent and is
/// overwritten on the next hit. Call [`LocalCounterStore::purge_expired`]
/// periodically to bound memory when client identities are unbounded.
///
/// # Examples
///
/// ```
/// use std::{sync::Arc, time::Duration};
/// use limit_dispatcher::{Dispatcher, RouteLimit, local::LocalCounterStore};
///
/// # futures::executor::block_on(async {
/// let store = Arc::new(LocalCounterStore::new());
/// let dispatcher = Dispatcher::new(Duration::from_secs(60), 100, store).await.unwrap();
///
/// let route = RouteLimit::new("GET", "/a", 10, Duration::from_secs(30)).unwrap();
/// let decision = dispatcher.check("1.2.3.4", &route, 1_700_000_000).await.unwrap();
/// assert!(decision.is_allowed());
/// # });
/// ```
#[derive(Debug, Default)]
pub struct LocalCounterStore {
    records: Mutex<HashMap<String, CounterRecord>>,
    procedures: DashMap<Arc<str>, Procedure>,
}

impl LocalCounterStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every record whose window has elapsed at `now`.
    ///
    /// Returns the number of records removed.
    pub fn purge_expired(&self, now: i64) -> usize {
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|_, record| !window::is_expired(now, record.deadline));
        before - records.len()
    }

    /// Number of records currently held, expired ones included.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Current count stored under `key`, if its window is live at `now`.
    pub fn count(&self, key: &str, now: i64) -> Option<i64> {
        self.records
            .lock()
            .get(key)
            .filter(|record| !window::is_expired(now, record.deadline))
            .map(|record| record.count)
    }

    /// Forget every registered procedure, as `SCRIPT FLUSH` does on Redis.
    pub fn flush_procedures(&self) {
        self.procedures.clear();
    }

    fn reset(
        records: &mut HashMap<String, CounterRecord>,
        keys: [&str; 2],
        args: [i64; 2],
    ) -> Vec<i64> {
        let [route_key, global_key] = keys;
        let [route_deadline, global_deadline] = args;

        records.insert(
            route_key.to_string(),
            CounterRecord {
                count: 1,
                deadline: route_deadline,
            },
        );
        records.insert(
            global_key.to_string(),
            CounterRecord {
                count: 1,
                deadline: global_deadline,
            },
        );

        vec![route_deadline, global_deadline]
    }

    fn normal(
        records: &mut HashMap<String, CounterRecord>,
        keys: [&str; 2],
        args: [i64; 5],
    ) -> Vec<i64> {
        let [route_key, global_key] = keys;
        let [route_limit, global_limit, route_deadline, global_deadline, now] = args;

        let (route_remaining, route_deadline) =
            Self::hit(records, route_key, route_limit, route_deadline, now);
        let (global_remaining, global_deadline) =
            Self::hit(records, global_key, global_limit, global_deadline, now);

        vec![
            route_remaining,
            global_remaining,
            route_deadline,
            global_deadline,
        ]
    }

    fn hit(
        records: &mut HashMap<String, CounterRecord>,
        key: &str,
        limit: i64,
        candidate_deadline: i64,
        now: i64,
    ) -> (i64, i64) {
        let record = records
            .entry(key.to_string())
            .and_modify(|record| {
                if window::is_expired(now, record.deadline) {
                    *record = CounterRecord {
                        count: 1,
                        deadline: candidate_deadline,
                    };
                } else {
                    record.count = record.count.saturating_add(1);
                }
            })
            .or_insert(CounterRecord {
                count: 1,
                deadline: candidate_deadline,
            });

        if record.count > limit {
            (-1, record.deadline)
        } else {
            (limit - record.count, record.deadline)
        }
    }
}

#[async_trait]
impl CounterStore for LocalCounterStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn register(&self, procedure: Procedure) -> Result<ProcedureHandle, StoreError> {
        let id: Arc<str> = Arc::from(format!("local:{}", procedure.name()));
        self.procedures.insert(id.clone(), procedure);
        Ok(ProcedureHandle::new(procedure, id))
    }

    async fn execute(
        &self,
        handle: &ProcedureHandle,
        keys: &[&str],
        args: &[i64],
    ) -> Result<Vec<i64>, StoreError> {
        let procedure = self
            .procedures
            .get(handle.id())
            .map(|entry| *entry.value())
            .ok_or_else(|| StoreError::UnknownProcedure(handle.id().to_string()))?;

        let keys = <[&str; 2]>::try_from(keys).map_err(|_| {
            StoreError::Backend(format!("{procedure}: expected 2 keys, got {}", keys.len()))
        })?;

        trace!(procedure = %procedure, route_key = keys[0], global_key = keys[1], "Executing procedure");

        let mut records = self.records.lock();
        let reply = match procedure {
            Procedure::Reset => {
                let args = <[i64; 2]>::try_from(args).map_err(|_| {
                    StoreError::Backend(format!("reset: expected 2 args, got {}", args.len()))
                })?;
                Self::reset(&mut records, keys, args)
            }
            Procedure::Normal => {
                let args = <[i64; 5]>::try_from(args).map_err(|_| {
                    StoreError::Backend(format!("normal: expected 5 args, got {}", args.len()))
                })?;
                Self::normal(&mut records, keys, args)
            }
        };

        Ok(reply)
    }
}
