#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod common;
pub use common::*;

mod error;
pub use error::*;

pub mod window;

mod keys;
pub use keys::CounterKeys;

mod store;
pub use store::{CounterStore, Procedure, ProcedureHandle};

mod decision;
pub use decision::*;

mod dispatcher;
pub use dispatcher::*;

pub mod config;

pub mod local;

#[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
#[cfg_attr(docsrs, doc(cfg(any(feature = "redis-tokio", feature = "redis-smol"))))]
pub mod redis;

#[cfg(test)]
mod tests;
