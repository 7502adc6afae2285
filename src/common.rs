use std::{ops::Deref, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};

use crate::DispatcherError;

/// Maximum number of requests admitted in one window.
///
/// Must be greater than 0 and at most [`Limit::max`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Limit(u64);

impl Limit {
    /// Largest accepted limit: 2^53, the largest integer a Lua number holds exactly.
    pub fn max() -> Self {
        Self(1 << 53)
    }

    /// Value passed to store procedures.
    pub(crate) fn as_arg(&self) -> i64 {
        // Constructed from a positive i64, so this never truncates.
        self.0 as i64
    }
}

impl Deref for Limit {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<i64> for Limit {
    type Error = DispatcherError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value <= 0 {
            Err(DispatcherError::Configuration(
                "Limit must be greater than 0".to_string(),
            ))
        } else if value as u64 > *Self::max() {
            Err(DispatcherError::Configuration(
                "Limit must not exceed 2^53".to_string(),
            ))
        } else {
            Ok(Self(value as u64))
        }
    }
}

/// Fixed window length in whole seconds.
///
/// Must be at least 1 and at most [`WindowSizeSeconds::max`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WindowSizeSeconds(u64);

impl WindowSizeSeconds {
    /// Largest accepted window: 2^52 seconds, so a deadline stays an exact Lua number.
    pub fn max() -> Self {
        Self(1 << 52)
    }

    pub(crate) fn as_secs_i64(&self) -> i64 {
        i64::try_from(self.0).unwrap_or(i64::MAX)
    }
}

impl Deref for WindowSizeSeconds {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<u64> for WindowSizeSeconds {
    type Error = DispatcherError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value < 1 {
            Err(DispatcherError::Configuration(
                "Window size must be at least 1".to_string(),
            ))
        } else if value > *Self::max() {
            Err(DispatcherError::Configuration(
                "Window size must not exceed 2^52 seconds".to_string(),
            ))
        } else {
            Ok(Self(value))
        }
    }
}

impl TryFrom<Duration> for WindowSizeSeconds {
    type Error = DispatcherError;

    /// Sub-second remainders are truncated.
    fn try_from(value: Duration) -> Result<Self, Self::Error> {
        Self::try_from(value.as_secs())
    }
}

impl From<WindowSizeSeconds> for Duration {
    fn from(value: WindowSizeSeconds) -> Self {
        Duration::from_secs(value.0)
    }
}

/// A validated prefix for every counter key written to the store.
///
/// This is a string with the following constraints:
/// - Must not be empty
/// - Must not be longer than 255 bytes
/// - Must not contain colons
#[derive(Debug, Clone, PartialEq, PartialOrd, Hash, Eq)]
pub struct KeyPrefix(Arc<str>);

impl KeyPrefix {
    /// The prefix used when none is configured.
    pub fn default_prefix() -> Self {
        Self(Arc::from("limiter"))
    }
}

impl Default for KeyPrefix {
    fn default() -> Self {
        Self::default_prefix()
    }
}

impl Deref for KeyPrefix {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<String> for KeyPrefix {
    type Error = DispatcherError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            Err(DispatcherError::InvalidKey(
                "Key prefix must not be empty".to_string(),
            ))
        } else if value.len() > 255 {
            Err(DispatcherError::InvalidKey(
                "Key prefix must not be longer than 255 characters".to_string(),
            ))
        } else if value.contains(':') {
            Err(DispatcherError::InvalidKey(
                "Key prefix must not contain colons".to_string(),
            ))
        } else {
            Ok(Self(Arc::from(value)))
        }
    }
}

impl TryFrom<&str> for KeyPrefix {
    type Error = DispatcherError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_from(value.to_string())
    }
}

/// Where the global window boundary of a client is kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlobalWindowMode {
    /// Every client has its own global deadline, stored next to its global counter.
    ///
    /// Rollover is decided inside the store procedure; the dispatcher holds no
    /// window state.
    #[default]
    PerClient,
    /// One global deadline is kept by the dispatcher and shared by every client it
    /// serves. The first request after it elapses force-resets that client's
    /// counters and is admitted without a route check.
    Shared,
}

/// Which exhausted scope is reported when both are exhausted at once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precedence {
    /// Report the global scope first.
    #[default]
    GlobalFirst,
    /// Report the route scope first.
    RouteFirst,
}

/// Per-route admission policy supplied by the request entry point.
///
/// The route identity is the pair `(method, path)`; `path` is normally the
/// route template (`/users/:id`) rather than the concrete request path so that
/// all requests hitting one handler share a counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteLimit {
    method: Arc<str>,
    path: Arc<str>,
    limit: Limit,
    window: WindowSizeSeconds,
}

impl RouteLimit {
    /// Create a route policy admitting `limit` requests per `window`.
    pub fn new(
        method: impl AsRef<str>,
        path: impl AsRef<str>,
        limit: i64,
        window: std::time::Duration,
    ) -> Result<Self, DispatcherError> {
        let method = method.as_ref().trim().to_ascii_uppercase();
        if method.is_empty() {
            return Err(DispatcherError::InvalidKey(
                "Route method must not be empty".to_string(),
            ));
        }

        Ok(Self {
            method: Arc::from(method),
            path: Arc::from(path.as_ref()),
            limit: Limit::try_from(limit)?,
            window: WindowSizeSeconds::try_from(window)?,
        })
    }

    /// Upper-cased HTTP method.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Route path or template.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Requests admitted per route window.
    pub fn limit(&self) -> Limit {
        self.limit
    }

    /// Route window length.
    pub fn window(&self) -> WindowSizeSeconds {
        self.window
    }
}
