use crate::models::{Curve, TimeInterval, TransactiveRecord};
use time::OffsetDateTime;

/// The bounds on a participant's net power (generation positive).
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PowerLimits {
    /// The most negative (largest consumption) power
    pub min: f64,
    /// The most positive (largest generation) power
    pub max: f64,
}

impl PowerLimits {
    /// Construct limits
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Limits that never bind
    pub fn unbounded() -> Self {
        Self::new(f64::NEG_INFINITY, f64::INFINITY)
    }

    /// True if `power` lies strictly between the limits
    pub fn strictly_contains(&self, power: f64) -> bool {
        self.min < power && power < self.max
    }

    /// The power clamped into the limits
    pub fn clamp(&self, power: f64) -> f64 {
        power.max(self.min).min(self.max)
    }
}

impl Default for PowerLimits {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// Anything that takes part in a market: a neighboring node or a local asset.
///
/// A market reads each participant's offer curve for an interval, clears a price over
/// all of them, and then tells every participant the cleared price. Participants that
/// negotiate (`is_transactive`) additionally exchange signals with their counterpart.
///
/// Only the four query methods are required; the remaining hooks have no-op defaults
/// suitable for passive participants.
pub trait Participant {
    /// A unique name, also used to address transactive signals
    fn name(&self) -> &str;

    /// The participant's offer for the interval
    fn active_vertices(&self, interval: &TimeInterval) -> Curve;

    /// The power the participant is scheduled to deliver in the interval
    fn scheduled_power(&self, interval: &TimeInterval) -> f64;

    /// The participant's power limits
    fn power_limits(&self) -> PowerLimits;

    /// Whether the participant negotiates through transactive signals
    fn is_transactive(&self) -> bool {
        false
    }

    /// Record the price cleared for the interval, updating the scheduled power.
    fn schedule(&mut self, _interval: &TimeInterval, _price: f64) {}

    /// Build the outbound signal for the interval from the node's offer to this
    /// participant, returning the records that need to be sent.
    ///
    /// `offer` is the aggregate curve of every other participant, i.e. what the node
    /// can export to this participant at each price. An empty result means the
    /// counterpart already holds an equivalent signal.
    fn prepare_signal(
        &mut self,
        _interval: &TimeInterval,
        _offer: &Curve,
        _price: f64,
        _now: OffsetDateTime,
    ) -> Vec<TransactiveRecord> {
        Vec::new()
    }

    /// Accept records received from the counterpart
    fn receive_signal(&mut self, _records: &[TransactiveRecord], _now: OffsetDateTime) {}

    /// Whether negotiation for the interval has converged
    fn check_for_convergence(&mut self, _interval: &TimeInterval, _now: OffsetDateTime) -> bool {
        true
    }

    /// Drop any state held for an interval whose market has expired
    fn release(&mut self, _interval: &TimeInterval) {}
}
