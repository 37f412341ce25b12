#![doc = include_str!("../README.md")]

pub mod benchmark;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod expiration;
pub mod interactive;
pub mod logging;
pub mod model;
pub mod pool;
pub mod registry;
pub mod run;
pub mod server;
pub mod stress;

#[cfg(test)]
pub(crate) mod testing;

/// the current app version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
