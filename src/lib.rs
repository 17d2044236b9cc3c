//! Whale Watch
//!
//! Ingests large prediction-market trades from a GraphQL subgraph, classifies
//! them by notional size and maintains a bounded, deduplicated store of recent
//! whale activity.

pub mod config;
pub mod models;
pub mod pipeline;
pub mod scrapers;
pub mod signals;

pub use config::{ConfigError, WatchConfig};
pub use pipeline::{Pipeline, RunMode, RunReport};
