//! Tether runtime - reference scripting runtime for the tether SDK
//!
//! A small single-threaded runtime implementing [`tether_sdk::ScriptStack`]:
//! an evaluation stack with call frames, tables with metatables, globals,
//! native functions, and a mark-sweep collector that drives foreign value
//! finalizers. Native code written against the SDK runs unchanged on it.
//!
//! # Example
//!
//! ```ignore
//! use tether_runtime::{RuntimeConfig, State};
//! use tether_sdk::{check_uint64, push_uint64, ScriptStack};
//!
//! let config = RuntimeConfig::from_env();
//! let mut l = State::with_config(config.build_registry(), config);
//! push_uint64(&mut l, u64::MAX);
//! assert_eq!(check_uint64(&l, -1)?, u64::MAX);
//! ```

#![warn(missing_docs)]

mod collector;
pub mod config;
mod heap;
pub mod logging;
mod state;

pub use collector::GcStats;
pub use config::RuntimeConfig;
pub use logging::LogConfig;
pub use state::State;
