use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    CounterStore, Dispatcher, DispatcherOptions, GlobalWindowMode, Precedence, Procedure,
    ProcedureHandle, RouteLimit, StoreError, local::LocalCounterStore,
};

/// Unix time used as `t = 0` by the scenario tests.
pub(super) const T0: i64 = 1_700_000_000;

pub(super) fn route(method: &str, path: &str, limit: i64, window_s: u64) -> RouteLimit {
    RouteLimit::new(method, path, limit, Duration::from_secs(window_s)).unwrap()
}

pub(super) async fn local_dispatcher(
    global_window_s: u64,
    global_limit: i64,
    window_mode: GlobalWindowMode,
) -> (Dispatcher, Arc<LocalCounterStore>) {
    let store = Arc::new(LocalCounterStore::new());
    let mut options =
        DispatcherOptions::new(Duration::from_secs(global_window_s), global_limit).unwrap();
    options.window_mode = window_mode;
    options.precedence = Precedence::GlobalFirst;

    let dispatcher = Dispatcher::with_options(options, store.clone())
        .await
        .unwrap();

    (dispatcher, store)
}

/// Which store call a [`FailingStore`] refuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum FailAt {
    Ping,
    Register,
    Execute,
}

/// Wraps a local store and fails one kind of call, counting every call it sees.
pub(super) struct FailingStore {
    inner: LocalCounterStore,
    fail_at: FailAt,
    pub calls: AtomicUsize,
}

impl FailingStore {
    pub(super) fn new(fail_at: FailAt) -> Self {
        Self {
            inner: LocalCounterStore::new(),
            fail_at,
            calls: AtomicUsize::new(0),
        }
    }

    fn check(&self, at: FailAt) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_at == at {
            Err(StoreError::Backend(format!("{at:?} refused")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CounterStore for FailingStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.check(FailAt::Ping)?;
        self.inner.ping().await
    }

    async fn register(&self, procedure: Procedure) -> Result<ProcedureHandle, StoreError> {
        self.check(FailAt::Register)?;
        self.inner.register(procedure).await
    }

    async fn execute(
        &self,
        handle: &ProcedureHandle,
        keys: &[&str],
        args: &[i64],
    ) -> Result<Vec<i64>, StoreError> {
        self.check(FailAt::Execute)?;
        self.inner.execute(handle, keys, args).await
    }
}
