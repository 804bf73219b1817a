use crate::models::{MarketKey, MarketState, TransactiveRecord};

/// The points in a market's life worth keeping a record of
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(tag = "event", rename_all = "snake_case")
)]
pub enum AuditEvent {
    /// A market was created
    MarketSpawned {
        /// The new market
        market: MarketKey,
        /// The market it succeeds, if any
        prior: Option<MarketKey>,
    },
    /// A market moved to a new lifecycle state
    StateChanged {
        /// The market
        market: MarketKey,
        /// The state it left
        from: MarketState,
        /// The state it entered
        to: MarketState,
    },
    /// A price was cleared for an interval
    PriceCleared {
        /// The market
        market: MarketKey,
        /// The interval name
        interval: String,
        /// The cleared marginal price
        price: f64,
        /// The residual net power at that price
        net_power: f64,
    },
    /// Records were sent to a counterpart
    RecordsSent {
        /// The counterpart
        neighbor: String,
        /// The records
        records: Vec<TransactiveRecord>,
    },
    /// Records were received from a counterpart
    RecordsReceived {
        /// The counterpart
        neighbor: String,
        /// The records
        records: Vec<TransactiveRecord>,
    },
}

/// Somewhere to publish audit events.
///
/// The market engine only requires that publishing does not fail from its point of
/// view; durability is up to the implementation.
pub trait AuditSink {
    /// Publish one event
    fn publish(&self, event: AuditEvent);
}

/// A sink that discards every event
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl AuditSink for NullSink {
    fn publish(&self, _event: AuditEvent) {}
}

// Closures make convenient sinks, particularly in tests
impl<F: Fn(AuditEvent)> AuditSink for F {
    fn publish(&self, event: AuditEvent) {
        self(event)
    }
}
