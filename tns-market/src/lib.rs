#![warn(missing_docs)]
//! The market engine of a transactive network node.
//!
//! A node schedules power by running series of small markets. Each [`Market`] clears
//! a handful of future intervals, negotiating with neighboring nodes along the way,
//! and the [`MarketRegistry`] keeps every series supplied with successors. The
//! [`Node`] ties the registry to the node's participants, its transport and its
//! audit trail.

/**
 * A single market and its lifecycle.
 */
pub mod market;
pub use market::{IntervalRecord, Market, MarketContext, NoPrices, PriceLookup};

/**
 * The registry of open markets, which spawns, ticks and expires them.
 */
pub mod registry;
pub use registry::MarketRegistry;

pub mod negotiation;

/**
 * Implementations of the participant capability.
 */
pub mod participants;
pub use participants::{BulkSupplier, LocalAsset, NeighborModel, SupplierError};

/**
 * Monthly tariffs of a bulk supplier.
 */
pub mod rates;
pub use rates::{MonthlyRate, RateTable, RateTableError, is_heavy_load_hour};

mod demand;
pub use demand::DemandThreshold;

mod node;
pub use node::Node;
