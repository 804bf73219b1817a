use time::OffsetDateTime;

/// The role a transactive record plays from the point of view of the node holding it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum Direction {
    /// Built locally, not necessarily sent yet
    Prepared,
    /// Sent to the counterpart
    Sent,
    /// Received from the counterpart
    Received,
}

/// One point of a transactive signal exchanged between neighboring nodes.
///
/// Record 0 describes the reference point (the currently scheduled exchange at the
/// current marginal price); records 1.. describe vertices of the sender's offer,
/// in ascending price order.
///
/// On the wire, `power` is the power the sender would export to the receiver.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TransactiveRecord {
    /// The name of the time interval the record applies to
    pub time_interval: String,
    /// The counterpart of the exchange
    pub neighbor: String,
    /// Prepared, sent or received
    pub direction: Direction,
    /// The name of the market the record was produced by
    pub market: String,
    /// The record index; 0 is the reference point
    pub record: usize,
    /// Marginal price
    pub marginal_price: f64,
    /// Power (sender's export toward the receiver)
    pub power: f64,
    /// Production cost at this point
    pub cost: f64,
    /// When the record was produced or received
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
}

impl TransactiveRecord {
    /// The same record with a different direction and timestamp
    pub fn restamp(mut self, direction: Direction, timestamp: OffsetDateTime) -> Self {
        self.direction = direction;
        self.timestamp = timestamp;
        self
    }

    /// The record as seen from the other end of the exchange (power and cost negated)
    pub fn mirrored(mut self) -> Self {
        self.power = -self.power;
        self.cost = -self.cost;
        self
    }

    /// True if both records describe the same point within a relative tolerance.
    ///
    /// Records are compared by index, price and power.
    pub fn agrees_with(&self, other: &Self, threshold: f64) -> bool {
        self.record == other.record
            && within(self.marginal_price, other.marginal_price, threshold)
            && within(self.power, other.power, threshold)
    }
}

// Relative comparison with a small absolute floor, so that values near zero compare sanely
fn within(a: f64, b: f64, threshold: f64) -> bool {
    const FLOOR: f64 = 1e-9;
    let diff = (a - b).abs();
    diff <= FLOOR || diff <= threshold * a.abs().max(b.abs())
}
