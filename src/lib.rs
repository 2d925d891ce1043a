//! Continuous profiling collector: scrapes pprof/trace endpoints across a
//! fleet of targets, parses sampled profile data, stores payloads and
//! metadata in a TTL-bound store, and serves a thin query API over it.

pub mod api;
pub mod collector;
pub mod config;
pub mod error;
pub mod profile;
pub mod store;

pub use collector::Manager;
pub use config::CollectorConfig;
pub use error::{CollectorError, Result};
