use std::fmt;
use time::OffsetDateTime;

use super::interval_name;

/// Identifies a market: its series and the time it clears.
///
/// Markets refer to one another (a prior market in the same series, a market being
/// refined in another series) through these keys rather than through references,
/// since markets are created and dropped on a rolling basis.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MarketKey {
    /// The series the market belongs to
    pub series: String,
    /// The clearing time of the market
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub clearing_time: OffsetDateTime,
}

impl MarketKey {
    /// Construct a key
    pub fn new(series: impl Into<String>, clearing_time: OffsetDateTime) -> Self {
        Self {
            series: series.into(),
            clearing_time,
        }
    }

    /// The human-readable market name, e.g. `day-ahead@2026-10-19T12:00:00Z`
    pub fn market_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for MarketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.series, interval_name(self.clearing_time))
    }
}

/// The lifecycle states of a market, in the order a market passes through them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MarketState {
    /// Created, but not yet doing any work
    Inactive,
    /// Intervals exist and have seeded prices
    Active,
    /// Participants exchange transactive signals and prices are cleared
    Negotiation,
    /// Negotiation has closed; the final clearing takes place
    MarketLead,
    /// Cleared, waiting for delivery to begin
    DeliveryLead,
    /// Power is being delivered
    Delivery,
    /// Delivery is over, awaiting settlement
    Reconcile,
    /// Terminal: the market is dropped
    Expired,
}

impl MarketState {
    /// The state that follows this one, if any
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Inactive => Some(Self::Active),
            Self::Active => Some(Self::Negotiation),
            Self::Negotiation => Some(Self::MarketLead),
            Self::MarketLead => Some(Self::DeliveryLead),
            Self::DeliveryLead => Some(Self::Delivery),
            Self::Delivery => Some(Self::Reconcile),
            Self::Reconcile => Some(Self::Expired),
            Self::Expired => None,
        }
    }

    /// True once the market can no longer change its cleared prices
    pub fn is_delivering(self) -> bool {
        self >= Self::Delivery
    }
}

impl fmt::Display for MarketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_state_sequence() {
        let mut state = MarketState::Inactive;
        let mut seen = vec![state];
        while let Some(next) = state.next() {
            assert!(next > state);
            state = next;
            seen.push(state);
        }
        assert_eq!(seen.len(), 8);
        assert_eq!(state, MarketState::Expired);
    }

    #[test]
    fn test_market_name() {
        let key = MarketKey::new("day-ahead", datetime!(2026-10-19 12:00 UTC));
        assert_eq!(key.market_name(), "day-ahead@2026-10-19T12:00:00Z");
    }
}
