//! Redis-backed [`CounterStore`](crate::CounterStore).
//!
//! Both procedures are Lua scripts loaded with `SCRIPT LOAD` at registration
//! and run with `EVALSHA`; Redis executes each script atomically, which gives
//! every process sharing the instance the same race-free view of the counters.
//!
//! # Requirements
//!
//! - **Redis:** >= 4.0 (multi-field `HSET`)
//! - **Runtime:** Tokio or Smol (via `redis-tokio` or `redis-smol` features)
//! - **Cluster:** both keys of a check share a hash tag, so scripts never cross slots.

mod common;
pub use common::*;

mod redis_counter_store;
pub use redis_counter_store::*;

mod scripts;
