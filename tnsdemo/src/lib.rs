#![warn(missing_docs)]
//! A transactive node run against a simulated clock.
//!
//! The node buys from a bulk supplier on a monthly tariff, serves a fixed and a
//! flexible load, and negotiates with one neighbor that never answers (so every
//! signal it sends eventually goes stale). Every audit event is written to stdout as
//! a JSON line; logs go to stderr.

pub mod impls;

mod schedule;
pub use schedule::Simulation;

mod cli;
pub use cli::Cli;

mod config;
pub use config::{AppConfig, AssetConfig, NeighborConfig, SupplierConfig};
