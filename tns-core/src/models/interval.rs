use std::time::Duration;
use time::{OffsetDateTime, UtcOffset};

/// A discrete future delivery period owned by one market.
///
/// Intervals are immutable once created. Several markets may hold intervals with the
/// same start time; those are distinct intervals that merely overlap.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimeInterval {
    /// The name of the owning market
    pub market: String,
    /// The interval name, derived from its start time
    pub name: String,
    /// When delivery begins
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub start: OffsetDateTime,
    /// How long delivery lasts
    #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
    pub duration: Duration,
}

impl TimeInterval {
    /// Create the interval beginning at `start` for the named market
    pub fn new(market: impl Into<String>, start: OffsetDateTime, duration: Duration) -> Self {
        Self {
            market: market.into(),
            name: interval_name(start),
            start,
            duration,
        }
    }

    /// The (exclusive) end of the interval
    pub fn end(&self) -> OffsetDateTime {
        self.start + self.duration
    }

    /// True if the two intervals share any instant
    pub fn overlaps(&self, other: &TimeInterval) -> bool {
        self.start < other.end() && other.start < self.end()
    }

    /// True if `time` falls inside the interval
    pub fn contains(&self, time: OffsetDateTime) -> bool {
        self.start <= time && time < self.end()
    }
}

/// The canonical name of an interval starting at `start`, e.g. `2026-10-19T13:00:00Z`.
///
/// Peers key their transactive records by this name, so it is always rendered in UTC.
pub fn interval_name(start: OffsetDateTime) -> String {
    let utc = start.to_offset(UtcOffset::UTC);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        utc.year(),
        u8::from(utc.month()),
        utc.day(),
        utc.hour(),
        utc.minute(),
        utc.second()
    )
}
