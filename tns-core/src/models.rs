mod balance;
pub use balance::Balance;

mod config;
pub use config::{ClearingConfig, ClearingMethodKind, ConfigError, MarketConfig};

mod curve;
pub use curve::*;

mod interval;
pub use interval::{TimeInterval, interval_name};

mod market;
pub use market::{MarketKey, MarketState};

mod price_model;
pub use price_model::{HourlyPrice, PriceModel};

mod record;
pub use record::{Direction, TransactiveRecord};

mod vertex;
pub use vertex::{Vertex, order_vertices};

/// A hashmap with deterministic (insertion) ordering
pub type Map<K, V> = indexmap::IndexMap<K, V, rustc_hash::FxBuildHasher>;
