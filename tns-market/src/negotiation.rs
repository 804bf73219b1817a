//! The transactive signal protocol spoken between neighboring nodes.
//!
//! On the wire, a record's power is what the *sender* is prepared to export to the
//! receiver at the record's price. Record 0 is the sender's reference point: the
//! currently cleared price and scheduled exchange. Records 1.. are breakpoints of the
//! sender's offer, restricted to those strictly inside the exchange's power limits.
//!
//! A receiver stores signals mirrored into its own frame (power and cost negated), so
//! that what it sent and what it received describe the same exchange and can be
//! compared record by record.

use std::time::Duration;

use time::OffsetDateTime;
use tns_core::models::{Curve, Direction, TimeInterval, TransactiveRecord, Vertex};
use tns_core::ports::PowerLimits;
use tns_solver::curve::cost_at_power;
use tracing::{Level, event};

/// The default relative tolerance for two signals to agree
pub const DEFAULT_CONVERGENCE_THRESHOLD: f64 = 0.01;

/// The default time after which an unanswered signal is presumed accepted
pub const DEFAULT_STALENESS: Duration = Duration::from_secs(300);

/// The signals exchanged with one counterpart for one interval
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Signals {
    /// The most recently prepared signal, whether sent or not
    pub prepared: Vec<TransactiveRecord>,
    /// The last signal actually sent
    pub sent: Vec<TransactiveRecord>,
    /// The last signal received, mirrored into the local frame
    pub received: Vec<TransactiveRecord>,
}

impl Signals {
    /// When the last signal was sent
    pub fn sent_at(&self) -> Option<OffsetDateTime> {
        self.sent.first().map(|r| r.timestamp)
    }

    /// When the last signal was received
    pub fn received_at(&self) -> Option<OffsetDateTime> {
        self.received.first().map(|r| r.timestamp)
    }

    /// Record a freshly prepared signal, returning what needs sending (if anything).
    ///
    /// A signal is only sent when nothing has been sent yet or when it no longer
    /// agrees with the last signal sent.
    pub fn offer(
        &mut self,
        prepared: Vec<TransactiveRecord>,
        threshold: f64,
        now: OffsetDateTime,
    ) -> Vec<TransactiveRecord> {
        let unchanged = !self.sent.is_empty()
            && self.sent.len() == prepared.len()
            && signals_agree(&prepared, &self.sent, threshold);
        self.prepared = prepared;
        if unchanged || self.prepared.is_empty() {
            return Vec::new();
        }

        self.sent = self
            .prepared
            .iter()
            .cloned()
            .map(|r| r.restamp(Direction::Sent, now))
            .collect();
        self.sent.clone()
    }

    /// Replace the received signal with records fresh off the wire
    pub fn accept(
        &mut self,
        records: impl IntoIterator<Item = TransactiveRecord>,
        now: OffsetDateTime,
    ) {
        self.received = records
            .into_iter()
            .map(|r| r.mirrored().restamp(Direction::Received, now))
            .collect();
        self.received.sort_by_key(|r| r.record);
    }

    /// Whether negotiation over these signals has converged.
    ///
    /// True when nothing has been sent, when the reply to the last signal agrees
    /// with it, or when the last signal has gone unanswered for `staleness`.
    pub fn is_converged(&self, now: OffsetDateTime, threshold: f64, staleness: Duration) -> bool {
        let Some(sent_at) = self.sent_at() else {
            return true;
        };
        match self.received_at() {
            Some(received_at) if received_at >= sent_at => {
                let ours = if self.prepared.is_empty() {
                    &self.sent
                } else {
                    &self.prepared
                };
                signals_agree(ours, &self.received, threshold)
            }
            _ => now >= sent_at + staleness,
        }
    }
}

/// Whether two signals agree at every record index they share.
///
/// Signals sharing no index at all do not agree.
pub fn signals_agree(a: &[TransactiveRecord], b: &[TransactiveRecord], threshold: f64) -> bool {
    let mut shared = 0;
    for x in a {
        if let Some(y) = b.iter().find(|y| y.record == x.record) {
            if !x.agrees_with(y, threshold) {
                return false;
            }
            shared += 1;
        }
    }
    shared > 0
}

/// Build the signal to send a counterpart for an interval.
///
/// `offer` is the node's aggregate offer excluding the counterpart, in which positive
/// power is available for export. `scheduled_power` is the counterpart's scheduled
/// power in the node's market, positive when the node imports. `limits` bound the
/// counterpart's power in the same frame.
pub fn prepare_signal(
    interval: &TimeInterval,
    counterpart: &str,
    offer: &Curve,
    limits: &PowerLimits,
    scheduled_power: f64,
    price: f64,
    now: OffsetDateTime,
) -> Vec<TransactiveRecord> {
    let record = |index: usize, marginal_price: f64, power: f64, cost: f64| TransactiveRecord {
        time_interval: interval.name.clone(),
        neighbor: counterpart.to_owned(),
        direction: Direction::Prepared,
        market: interval.market.clone(),
        record: index,
        marginal_price,
        power,
        cost,
        timestamp: now,
    };

    let export = -scheduled_power;
    let mut records = vec![record(0, price, export, cost_at_power(offer, export))];
    let flexible = offer
        .elastic_vertices()
        .iter()
        .filter(|v| limits.strictly_contains(-v.power));
    for (index, v) in flexible.enumerate() {
        records.push(record(index + 1, v.marginal_price, v.power, v.cost));
    }
    records
}

/// The counterpart's offer as a curve in the node's market, from a received signal.
///
/// The breakpoints (records 1..) form the curve; with none, the counterpart is
/// inelastic at its reference point.
pub fn curve_from_signal(received: &[TransactiveRecord]) -> Curve {
    let vertices: Vec<Vertex> = received
        .iter()
        .filter(|r| r.record > 0)
        .map(|r| Vertex::new(r.marginal_price, -r.power, -r.cost))
        .collect();
    let reference = received.iter().find(|r| r.record == 0);
    let fallback = || match reference {
        Some(r) => Curve::inelastic(-r.power, -r.cost),
        None => Curve::inelastic(0.0, 0.0),
    };

    if vertices.is_empty() {
        return fallback();
    }
    Curve::new(vertices).unwrap_or_else(|err| {
        event!(
            Level::WARN,
            err = err.to_string(),
            "received an unusable offer, using the reference point"
        );
        fallback()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn interval() -> TimeInterval {
        TimeInterval::new(
            "day-ahead@2026-10-19T12:00:00Z",
            datetime!(2026-10-19 13:00 UTC),
            Duration::from_secs(3600),
        )
    }

    fn offer() -> Curve {
        Curve::new(vec![
            Vertex::new(0.02, -5.0, 0.0),
            Vertex::new(0.04, 5.0, 0.2),
            Vertex::new(0.06, 15.0, 0.7),
        ])
        .unwrap()
    }

    /// What the counterpart would send back if it saw the exchange the same way
    fn echo(sent: &[TransactiveRecord], scale: f64) -> Vec<TransactiveRecord> {
        sent.iter()
            .cloned()
            .map(|mut r| {
                r.power = -r.power * scale;
                r.cost = -r.cost;
                r
            })
            .collect()
    }

    #[test]
    fn reference_point_and_flexible_vertices() {
        let limits = PowerLimits::new(-10.0, 10.0);
        let records = prepare_signal(
            &interval(),
            "feeder",
            &offer(),
            &limits,
            -3.0,
            0.035,
            datetime!(2026-10-19 11:00 UTC),
        );
        // The 15 kW export lies outside the limits
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].record, 0);
        assert_eq!(records[0].power, 3.0);
        assert_eq!(records[0].marginal_price, 0.035);
        assert_eq!(
            records.iter().map(|r| r.power).collect::<Vec<_>>(),
            vec![3.0, -5.0, 5.0]
        );
        assert!(records.iter().all(|r| r.neighbor == "feeder"));
        assert!(records.iter().all(|r| r.time_interval == "2026-10-19T13:00:00Z"));
    }

    #[test]
    fn identical_reply_converges() {
        let t0 = datetime!(2026-10-19 11:00 UTC);
        let prepared = prepare_signal(
            &interval(),
            "feeder",
            &offer(),
            &PowerLimits::unbounded(),
            -3.0,
            0.035,
            t0,
        );
        let mut signals = Signals::default();
        let sent = signals.offer(prepared, DEFAULT_CONVERGENCE_THRESHOLD, t0);
        assert_eq!(sent.len(), 4);
        assert!(!signals.is_converged(t0, DEFAULT_CONVERGENCE_THRESHOLD, DEFAULT_STALENESS));

        let t1 = datetime!(2026-10-19 11:01 UTC);
        signals.accept(echo(&sent, 1.0), t1);
        assert!(signals.is_converged(t1, DEFAULT_CONVERGENCE_THRESHOLD, DEFAULT_STALENESS));
    }

    #[test]
    fn two_percent_change_does_not_converge() {
        let t0 = datetime!(2026-10-19 11:00 UTC);
        let prepared = prepare_signal(
            &interval(),
            "feeder",
            &offer(),
            &PowerLimits::unbounded(),
            -3.0,
            0.035,
            t0,
        );
        let mut signals = Signals::default();
        let sent = signals.offer(prepared, DEFAULT_CONVERGENCE_THRESHOLD, t0);

        let t1 = datetime!(2026-10-19 11:01 UTC);
        signals.accept(echo(&sent, 1.02), t1);
        assert!(!signals.is_converged(t1, DEFAULT_CONVERGENCE_THRESHOLD, DEFAULT_STALENESS));
    }

    #[test]
    fn unanswered_signal_goes_stale() {
        let t0 = datetime!(2026-10-19 11:00 UTC);
        let mut signals = Signals::default();
        let prepared = prepare_signal(
            &interval(),
            "feeder",
            &offer(),
            &PowerLimits::unbounded(),
            0.0,
            0.035,
            t0,
        );
        signals.offer(prepared, DEFAULT_CONVERGENCE_THRESHOLD, t0);

        let converged = |now| signals.is_converged(now, 0.01, DEFAULT_STALENESS);
        assert!(!converged(datetime!(2026-10-19 11:04 UTC)));
        assert!(converged(datetime!(2026-10-19 11:05 UTC)));
    }

    #[test]
    fn unchanged_signal_is_not_resent() {
        let t0 = datetime!(2026-10-19 11:00 UTC);
        let prepare = |scheduled: f64| {
            prepare_signal(
                &interval(),
                "feeder",
                &offer(),
                &PowerLimits::unbounded(),
                scheduled,
                0.035,
                t0,
            )
        };
        let mut signals = Signals::default();
        assert!(!signals.offer(prepare(-3.0), 0.01, t0).is_empty());
        assert!(signals.offer(prepare(-3.0), 0.01, t0).is_empty());
        assert!(signals.offer(prepare(-3.001), 0.01, t0).is_empty());
        assert!(!signals.offer(prepare(-4.0), 0.01, t0).is_empty());
        assert_eq!(signals.sent[0].power, 4.0);
    }

    #[test]
    fn received_curve_is_unmirrored() {
        let t0 = datetime!(2026-10-19 11:00 UTC);
        let peer = prepare_signal(
            &interval(),
            "us",
            &offer(),
            &PowerLimits::unbounded(),
            -3.0,
            0.035,
            t0,
        );
        let mut signals = Signals::default();
        signals.accept(peer, t0);

        // The peer's export is our import, i.e. generation in our market
        let curve = curve_from_signal(&signals.received);
        let powers: Vec<f64> = curve.elastic_vertices().iter().map(|v| v.power).collect();
        assert_eq!(powers, vec![-5.0, 5.0, 15.0]);
    }

    #[test]
    fn reference_only_is_inelastic() {
        let t0 = datetime!(2026-10-19 11:00 UTC);
        let peer = prepare_signal(
            &interval(),
            "us",
            &Curve::inelastic(2.0, 0.0),
            &PowerLimits::unbounded(),
            -2.0,
            0.035,
            t0,
        );
        let mut signals = Signals::default();
        signals.accept(peer, t0);
        assert_eq!(curve_from_signal(&signals.received), Curve::inelastic(2.0, 0.0));
    }
}
