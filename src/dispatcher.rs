//! The admission engine.
//!
//! A [`Dispatcher`] owns the global limit and window of one process and, per
//! request, composes the client's global counter and its per-route counter
//! into a single atomic store call. All counts live in the store; the only
//! in-process state is the shared global deadline used by
//! [`GlobalWindowMode::Shared`].

use std::{
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
    time::Duration,
};

use futures::lock::Mutex;
use tracing::{debug, trace, warn};

use crate::{
    CounterStore, Decision, DispatcherError, GlobalWindowMode, KeyPrefix, Limit, Precedence,
    Procedure, ProcedureHandle, Remaining, RouteLimit, ScopeStatus, StoreError,
    WindowSizeSeconds,
    keys::{CounterKeyGenerator, CounterKeys},
    store::{NormalReply, ResetReply},
    window,
};

/// `global_deadline` before the first rollover.
const UNSET_DEADLINE: i64 = 0;

/// Configuration for [`Dispatcher`].
#[derive(Clone, Debug)]
pub struct DispatcherOptions {
    /// Length of the global window.
    pub global_window: WindowSizeSeconds,

    /// Requests a client may issue across all routes per global window.
    pub global_limit: Limit,

    /// Optional prefix for all counter keys.
    ///
    /// If `None`, defaults to `"limiter"`. See [`KeyPrefix`] for the constraints.
    pub prefix: Option<KeyPrefix>,

    /// Whether global windows are tracked per client or shared by the dispatcher.
    pub window_mode: GlobalWindowMode,

    /// Which scope a rejection reports when both are exhausted.
    pub precedence: Precedence,
}

impl DispatcherOptions {
    /// Options with the given global window and limit and defaults elsewhere.
    pub fn new(global_window: Duration, global_limit: i64) -> Result<Self, DispatcherError> {
        Ok(Self {
            global_window: WindowSizeSeconds::try_from(global_window)?,
            global_limit: Limit::try_from(global_limit)?,
            prefix: None,
            window_mode: GlobalWindowMode::default(),
            precedence: Precedence::default(),
        })
    }
}

#[derive(Debug)]
struct ProcedureHandles {
    reset: ProcedureHandle,
    normal: ProcedureHandle,
}

/// Dual-scope admission engine.
///
/// One dispatcher is built per process at startup and shared by every request
/// task; it is `Send + Sync` and needs no external locking.
///
/// # Algorithm
///
/// For a request from `client` on `route` at `now`:
///
/// 1. Route candidate deadline: `now + route.window()`.
/// 2. Keys: one route counter for `(route, method, client)` and one global
///    counter for `client`.
/// 3. The `normal` procedure starts or increments both counters atomically. A
///    counter that is absent or past its deadline restarts at 1 with the
///    candidate deadline; otherwise it is incremented. Every attempt is
///    counted, rejected ones included.
/// 4. Each scope reports `limit - count`, or [`Remaining::Exceeded`] once the
///    count is above the limit.
///
/// With [`GlobalWindowMode::Shared`] the global deadline is held here instead
/// and the first request after it elapses runs the `reset` procedure: both of
/// that client's counters restart at 1 and the request is admitted without a
/// route check.
pub struct Dispatcher {
    store: Arc<dyn CounterStore>,
    global_limit: Limit,
    global_window: WindowSizeSeconds,
    window_mode: GlobalWindowMode,
    precedence: Precedence,
    key_generator: CounterKeyGenerator,
    handles: ProcedureHandles,
    global_deadline: AtomicI64,
    rollover: Mutex<()>,
}

impl Dispatcher {
    /// Create a dispatcher admitting `global_limit` requests per client per
    /// `global_window`.
    ///
    /// Fails with [`DispatcherError::Configuration`] before touching the store
    /// if `global_limit <= 0` or `global_window` is shorter than one second,
    /// and with [`DispatcherError::StoreUnavailable`] if the store cannot be
    /// reached or refuses a procedure.
    pub async fn new(
        global_window: Duration,
        global_limit: i64,
        store: Arc<dyn CounterStore>,
    ) -> Result<Self, DispatcherError> {
        let options = DispatcherOptions::new(global_window, global_limit)?;
        Self::with_options(options, store).await
    }

    /// Create a dispatcher from full options.
    pub async fn with_options(
        options: DispatcherOptions,
        store: Arc<dyn CounterStore>,
    ) -> Result<Self, DispatcherError> {
        store
            .ping()
            .await
            .map_err(DispatcherError::StoreUnavailable)?;

        let reset = store
            .register(Procedure::Reset)
            .await
            .map_err(DispatcherError::StoreUnavailable)?;
        let normal = store
            .register(Procedure::Normal)
            .await
            .map_err(DispatcherError::StoreUnavailable)?;

        let prefix = options.prefix.unwrap_or_default();

        debug!(
            global_limit = *options.global_limit,
            global_window_seconds = *options.global_window,
            window_mode = ?options.window_mode,
            prefix = &*prefix,
            "Dispatcher initialized"
        );

        Ok(Self {
            store,
            global_limit: options.global_limit,
            global_window: options.global_window,
            window_mode: options.window_mode,
            precedence: options.precedence,
            key_generator: CounterKeyGenerator::new(prefix),
            handles: ProcedureHandles { reset, normal },
            global_deadline: AtomicI64::new(UNSET_DEADLINE),
            rollover: Mutex::new(()),
        })
    }

    /// Check and count one request from `client` on `route` at `now` (unix seconds).
    pub async fn check(
        &self,
        client: &str,
        route: &RouteLimit,
        now: i64,
    ) -> Result<Decision, DispatcherError> {
        let keys = self.key_generator.keys(client, route)?;
        let route_deadline = window::deadline(now, route.window());

        let decision = match self.window_mode {
            GlobalWindowMode::PerClient => {
                let global_deadline = window::deadline(now, self.global_window);
                self.run_normal(&keys, route, route_deadline, global_deadline, now)
                    .await?
            }
            GlobalWindowMode::Shared => {
                match self.try_rollover(&keys, route, route_deadline, now).await? {
                    Some(decision) => decision,
                    None => {
                        let global_deadline = self.global_deadline.load(Ordering::Acquire);
                        self.run_normal(&keys, route, route_deadline, global_deadline, now)
                            .await?
                    }
                }
            }
        };

        trace!(
            client,
            method = route.method(),
            path = route.path(),
            global_remaining = ?decision.global.remaining,
            route_remaining = ?decision.route.remaining,
            "Checked rate limit"
        );

        if let Some(rejection) = decision.rejection() {
            debug!(
                client,
                method = route.method(),
                path = route.path(),
                kind = ?rejection.kind,
                reset_at = rejection.reset_at,
                "Rate limit exceeded"
            );
        }

        Ok(decision)
    }

    /// [`Dispatcher::check`] at the current wall-clock time.
    pub async fn check_now(
        &self,
        client: &str,
        route: &RouteLimit,
    ) -> Result<Decision, DispatcherError> {
        self.check(client, route, window::unix_now()).await
    }

    /// Restart both counters of `client` on `route` at 1 and admit the request.
    ///
    /// In [`GlobalWindowMode::Shared`] the global counter takes the shared
    /// deadline, which is advanced first if it has elapsed.
    pub async fn reset(
        &self,
        client: &str,
        route: &RouteLimit,
        now: i64,
    ) -> Result<Decision, DispatcherError> {
        let keys = self.key_generator.keys(client, route)?;
        let route_deadline = window::deadline(now, route.window());

        match self.window_mode {
            GlobalWindowMode::PerClient => {
                let global_deadline = window::deadline(now, self.global_window);
                self.run_reset(&keys, route, route_deadline, global_deadline)
                    .await
            }
            GlobalWindowMode::Shared => {
                let _guard = self.rollover.lock().await;
                let current = self.global_deadline.load(Ordering::Acquire);
                let global_deadline = if self.is_shared_window_elapsed(current, now) {
                    window::deadline(now, self.global_window)
                } else {
                    current
                };

                let decision = self
                    .run_reset(&keys, route, route_deadline, global_deadline)
                    .await?;
                self.global_deadline
                    .store(global_deadline, Ordering::Release);

                Ok(decision)
            }
        }
    }

    /// Requests a client may issue per global window.
    pub fn global_limit(&self) -> Limit {
        self.global_limit
    }

    /// Length of the global window.
    pub fn global_window(&self) -> WindowSizeSeconds {
        self.global_window
    }

    /// Shared global deadline in unix seconds, `None` until the first rollover.
    ///
    /// Always `None` with [`GlobalWindowMode::PerClient`], where each client's
    /// deadline lives in the store.
    pub fn global_deadline(&self) -> Option<i64> {
        match self.global_deadline.load(Ordering::Acquire) {
            UNSET_DEADLINE => None,
            deadline => Some(deadline),
        }
    }

    /// [`Dispatcher::global_deadline`] formatted as `YYYY-MM-DD HH:MM:SS` local time.
    pub fn global_deadline_string(&self) -> Option<String> {
        self.global_deadline().map(window::format_reset_time)
    }

    /// Handle the store assigned to `procedure` at construction.
    pub fn procedure_handle(&self, procedure: Procedure) -> &ProcedureHandle {
        match procedure {
            Procedure::Reset => &self.handles.reset,
            Procedure::Normal => &self.handles.normal,
        }
    }

    /// Configured global window mode.
    pub fn window_mode(&self) -> GlobalWindowMode {
        self.window_mode
    }

    /// Configured rejection precedence.
    pub fn precedence(&self) -> Precedence {
        self.precedence
    }

    /// Prefix of every counter key.
    pub fn prefix(&self) -> &KeyPrefix {
        self.key_generator.prefix()
    }

    fn is_shared_window_elapsed(&self, deadline: i64, now: i64) -> bool {
        deadline == UNSET_DEADLINE || window::is_expired(now, deadline)
    }

    /// Roll the shared global window over if it has elapsed.
    ///
    /// Only one request per elapsed window performs the reset: the rest wait on
    /// the lock, see the new deadline and fall through to the normal path. The
    /// new deadline is published only after the reset succeeded, so no request
    /// counts against counters that are about to be overwritten.
    async fn try_rollover(
        &self,
        keys: &CounterKeys,
        route: &RouteLimit,
        route_deadline: i64,
        now: i64,
    ) -> Result<Option<Decision>, DispatcherError> {
        if !self.is_shared_window_elapsed(self.global_deadline.load(Ordering::Acquire), now) {
            return Ok(None);
        }

        let _guard = self.rollover.lock().await;
        if !self.is_shared_window_elapsed(self.global_deadline.load(Ordering::Acquire), now) {
            return Ok(None);
        }

        let global_deadline = window::deadline(now, self.global_window);
        let decision = self
            .run_reset(keys, route, route_deadline, global_deadline)
            .await?;
        self.global_deadline
            .store(global_deadline, Ordering::Release);

        debug!(global_deadline, "Shared global window rolled over");

        Ok(Some(decision))
    }

    async fn run_reset(
        &self,
        keys: &CounterKeys,
        route: &RouteLimit,
        route_deadline: i64,
        global_deadline: i64,
    ) -> Result<Decision, DispatcherError> {
        let reply = self
            .store
            .execute(
                &self.handles.reset,
                &keys.as_slice(),
                &[route_deadline, global_deadline],
            )
            .await
            .and_then(ResetReply::try_from)
            .map_err(|err| Self::operation_failed(Procedure::Reset, err))?;

        Ok(Decision {
            global: ScopeStatus {
                limit: *self.global_limit,
                remaining: Remaining::Available(*self.global_limit - 1),
                reset_at: reply.global_deadline,
            },
            route: ScopeStatus {
                limit: *route.limit(),
                remaining: Remaining::Available(*route.limit() - 1),
                reset_at: reply.route_deadline,
            },
            precedence: self.precedence,
        })
    }

    async fn run_normal(
        &self,
        keys: &CounterKeys,
        route: &RouteLimit,
        route_deadline: i64,
        global_deadline: i64,
        now: i64,
    ) -> Result<Decision, DispatcherError> {
        let args = [
            route.limit().as_arg(),
            self.global_limit.as_arg(),
            route_deadline,
            global_deadline,
            now,
        ];

        let reply = self
            .store
            .execute(&self.handles.normal, &keys.as_slice(), &args)
            .await
            .and_then(NormalReply::try_from)
            .map_err(|err| Self::operation_failed(Procedure::Normal, err))?;

        Ok(Decision {
            global: ScopeStatus {
                limit: *self.global_limit,
                remaining: Remaining::from(reply.global_remaining),
                reset_at: reply.global_deadline,
            },
            route: ScopeStatus {
                limit: *route.limit(),
                remaining: Remaining::from(reply.route_remaining),
                reset_at: reply.route_deadline,
            },
            precedence: self.precedence,
        })
    }

    fn operation_failed(procedure: Procedure, err: StoreError) -> DispatcherError {
        warn!(procedure = %procedure, error = %err, "Counter store call failed");
        DispatcherError::StoreOperation(err)
    }
}
