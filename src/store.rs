//! Contract between the dispatcher and the shared counter store.
//!
//! A store must be able to register a short procedure once, hand back a
//! reusable handle, and later execute it by handle against an ordered list of
//! keys and arguments. One execution must be indivisible with respect to every
//! other execution touching the same keys.

use std::{fmt, sync::Arc};

use async_trait::async_trait;

use crate::StoreError;

/// The atomic procedures the dispatcher registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Procedure {
    /// Unconditionally restart both counters at 1.
    ///
    /// KEYS `[route, global]`, ARGV `[route_deadline, global_deadline]`.
    /// Replies `[route_deadline, global_deadline]`.
    Reset,
    /// Start-or-increment both counters and report what is left.
    ///
    /// KEYS `[route, global]`, ARGV `[route_limit, global_limit,
    /// route_deadline, global_deadline, now]`. Replies `[route_remaining,
    /// global_remaining, route_deadline, global_deadline]`, where a remaining
    /// value of `-1` means the scope is exhausted.
    Normal,
}

impl Procedure {
    /// Logical name of the procedure.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Reset => "reset",
            Self::Normal => "normal",
        }
    }
}

impl fmt::Display for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Store-assigned reference to a registered procedure.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProcedureHandle {
    procedure: Procedure,
    id: Arc<str>,
}

impl ProcedureHandle {
    /// Create a handle. Only store implementations should need this.
    pub fn new(procedure: Procedure, id: impl Into<Arc<str>>) -> Self {
        Self {
            procedure,
            id: id.into(),
        }
    }

    /// The procedure this handle was registered for.
    pub fn procedure(&self) -> Procedure {
        self.procedure
    }

    /// Identifier assigned by the store (the script SHA1 for Redis).
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// A shared key-value store able to run registered procedures atomically.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Check that the store is reachable.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Register `procedure` and return the handle used to execute it.
    async fn register(&self, procedure: Procedure) -> Result<ProcedureHandle, StoreError>;

    /// Execute a registered procedure against `keys` with `args`.
    async fn execute(
        &self,
        handle: &ProcedureHandle,
        keys: &[&str],
        args: &[i64],
    ) -> Result<Vec<i64>, StoreError>;
}

/// Decoded reply of [`Procedure::Normal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NormalReply {
    pub route_remaining: Option<u64>,
    pub global_remaining: Option<u64>,
    pub route_deadline: i64,
    pub global_deadline: i64,
}

impl TryFrom<Vec<i64>> for NormalReply {
    type Error = StoreError;

    fn try_from(reply: Vec<i64>) -> Result<Self, Self::Error> {
        let [route_remaining, global_remaining, route_deadline, global_deadline] =
            <[i64; 4]>::try_from(reply).map_err(|reply| {
                StoreError::UnexpectedReply(format!(
                    "normal: expected 4 values, got {}",
                    reply.len()
                ))
            })?;

        Ok(Self {
            route_remaining: decode_remaining(route_remaining)?,
            global_remaining: decode_remaining(global_remaining)?,
            route_deadline,
            global_deadline,
        })
    }
}

/// Decoded reply of [`Procedure::Reset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ResetReply {
    pub route_deadline: i64,
    pub global_deadline: i64,
}

impl TryFrom<Vec<i64>> for ResetReply {
    type Error = StoreError;

    fn try_from(reply: Vec<i64>) -> Result<Self, Self::Error> {
        let [route_deadline, global_deadline] = <[i64; 2]>::try_from(reply).map_err(|reply| {
            StoreError::UnexpectedReply(format!("reset: expected 2 values, got {}", reply.len()))
        })?;

        Ok(Self {
            route_deadline,
            global_deadline,
        })
    }
}

/// `-1` is the exhaustion marker on the wire; it never leaves this module.
fn decode_remaining(value: i64) -> Result<Option<u64>, StoreError> {
    match value {
        -1 => Ok(None),
        v if v >= 0 => Ok(Some(v as u64)),
        v => Err(StoreError::UnexpectedReply(format!(
            "remaining count out of range: {v}"
        ))),
    }
}
