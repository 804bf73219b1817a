//! Participant models: local assets, negotiating neighbors and bulk suppliers.

mod asset;
pub use asset::LocalAsset;

mod neighbor;
pub use neighbor::NeighborModel;

mod supplier;
pub use supplier::{BulkSupplier, SupplierError};

use tns_core::models::TimeInterval;

// Participants keep per-interval state keyed by market and interval name, since the
// intervals of different markets may share a start time.
type Slot = (String, String);

fn slot(interval: &TimeInterval) -> Slot {
    (interval.market.clone(), interval.name.clone())
}
