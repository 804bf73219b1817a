use std::time::Duration;

use time::OffsetDateTime;
use tns_core::models::{Curve, Map, TimeInterval, TransactiveRecord};
use tns_core::ports::{Participant, PowerLimits};
use tns_solver::curve::production;
use tracing::{Level, event};

use super::{Slot, slot};
use crate::negotiation::{self, DEFAULT_CONVERGENCE_THRESHOLD, DEFAULT_STALENESS, Signals};

/// A neighboring node, seen as a participant in this node's markets.
///
/// A transactive neighbor negotiates: its offer in each interval is whatever it last
/// signalled, falling back to `default_vertices` until it has signalled anything. A
/// non-transactive neighbor always offers `default_vertices`.
#[derive(Clone, Debug)]
pub struct NeighborModel {
    name: String,
    transactive: bool,
    limits: PowerLimits,
    default_vertices: Curve,
    convergence_threshold: f64,
    staleness: Duration,
    signals: Map<Slot, Signals>,
    scheduled: Map<Slot, f64>,
}

impl NeighborModel {
    /// A passive neighbor offering `default_vertices` until it says otherwise
    pub fn new(name: impl Into<String>, default_vertices: Curve) -> Self {
        Self {
            name: name.into(),
            transactive: false,
            limits: PowerLimits::unbounded(),
            default_vertices,
            convergence_threshold: DEFAULT_CONVERGENCE_THRESHOLD,
            staleness: DEFAULT_STALENESS,
            signals: Map::default(),
            scheduled: Map::default(),
        }
    }

    /// Make the neighbor negotiate through transactive signals
    pub fn transactive(mut self) -> Self {
        self.transactive = true;
        self
    }

    /// Bound the power exchanged with the neighbor (positive when importing from it)
    pub fn with_limits(mut self, limits: PowerLimits) -> Self {
        self.limits = limits;
        self
    }

    /// The relative tolerance within which signals agree
    pub fn with_convergence_threshold(mut self, threshold: f64) -> Self {
        self.convergence_threshold = threshold;
        self
    }

    /// How long a sent signal may go unanswered before it is presumed accepted
    pub fn with_staleness(mut self, staleness: Duration) -> Self {
        self.staleness = staleness;
        self
    }

    /// The signals exchanged for an interval
    pub fn signals(&self, interval: &TimeInterval) -> Option<&Signals> {
        self.signals.get(&slot(interval))
    }
}

impl Participant for NeighborModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn active_vertices(&self, interval: &TimeInterval) -> Curve {
        match self.signals.get(&slot(interval)) {
            Some(signals) if self.transactive && !signals.received.is_empty() => {
                negotiation::curve_from_signal(&signals.received)
            }
            _ => self.default_vertices.clone(),
        }
    }

    fn scheduled_power(&self, interval: &TimeInterval) -> f64 {
        self.scheduled
            .get(&slot(interval))
            .copied()
            .unwrap_or_default()
    }

    fn power_limits(&self) -> PowerLimits {
        self.limits
    }

    fn is_transactive(&self) -> bool {
        self.transactive
    }

    fn schedule(&mut self, interval: &TimeInterval, price: f64) {
        let power = self
            .limits
            .clamp(production(&self.active_vertices(interval), price));
        self.scheduled.insert(slot(interval), power);
    }

    fn prepare_signal(
        &mut self,
        interval: &TimeInterval,
        offer: &Curve,
        price: f64,
        now: OffsetDateTime,
    ) -> Vec<TransactiveRecord> {
        if !self.transactive {
            return Vec::new();
        }
        let prepared = negotiation::prepare_signal(
            interval,
            &self.name,
            offer,
            &self.limits,
            self.scheduled_power(interval),
            price,
            now,
        );
        self.signals
            .entry(slot(interval))
            .or_default()
            .offer(prepared, self.convergence_threshold, now)
    }

    fn receive_signal(&mut self, records: &[TransactiveRecord], now: OffsetDateTime) {
        let mut grouped: Map<Slot, Vec<TransactiveRecord>> = Map::default();
        for record in records {
            grouped
                .entry((record.market.clone(), record.time_interval.clone()))
                .or_default()
                .push(record.clone());
        }
        for (key, records) in grouped {
            event!(
                Level::DEBUG,
                neighbor = %self.name,
                market = %key.0,
                interval = %key.1,
                count = records.len(),
                "signal received"
            );
            self.signals.entry(key).or_default().accept(records, now);
        }
    }

    fn check_for_convergence(&mut self, interval: &TimeInterval, now: OffsetDateTime) -> bool {
        if !self.transactive {
            return true;
        }
        self.signals.get(&slot(interval)).is_none_or(|signals| {
            signals.is_converged(now, self.convergence_threshold, self.staleness)
        })
    }

    fn release(&mut self, interval: &TimeInterval) {
        let key = slot(interval);
        self.signals.shift_remove(&key);
        self.scheduled.shift_remove(&key);
    }
}
