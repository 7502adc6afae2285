//! In-process [`CounterStore`](crate::CounterStore).
//!
//! The local store keeps counters in memory and runs native equivalents of the
//! Redis procedures under a single lock, so every procedure is atomic with
//! respect to every other one.
//!
//! # When to Use
//!
//! ✅ **Use the local store when:**
//! - Single-process application
//! - Tests and benchmarks that must not depend on a Redis instance
//!
//! ❌ **Don't use the local store when:**
//! - Multiple application instances need shared limits
//! - Counters must survive process restarts

mod local_counter_store;
pub use local_counter_store::*;
