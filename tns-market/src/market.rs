use time::OffsetDateTime;
use tns_core::models::{
    Balance, ConfigError, Curve, Map, MarketConfig, MarketKey, MarketState, PriceModel,
    TimeInterval,
};
use tns_core::ports::{AuditEvent, AuditSink, Participant, Transport};
use tns_solver::{Clearing, ClearingMethod, clearing_method, curve};
use tracing::{Level, event};

mod lifecycle;

/// Answers price queries against other markets.
///
/// Markets refer to their prior and refined markets by key only, so seeding a price
/// from them goes through a lookup (normally the registry holding every market).
pub trait PriceLookup {
    /// The price of the first priced interval of `market` overlapping `interval`
    fn overlapping_price(&self, market: &MarketKey, interval: &TimeInterval) -> Option<f64>;
}

/// A lookup that knows no other market
#[derive(Clone, Copy, Debug, Default)]
pub struct NoPrices;

impl PriceLookup for NoPrices {
    fn overlapping_price(&self, _market: &MarketKey, _interval: &TimeInterval) -> Option<f64> {
        None
    }
}

/// Everything outside the market that a tick touches
pub struct MarketContext<'a> {
    /// Every participant of the node
    pub participants: &'a mut [Box<dyn Participant>],
    /// Prices of the other markets
    pub prices: &'a dyn PriceLookup,
    /// Where outbound signals go
    pub transport: &'a mut dyn Transport,
    /// Where audit events go
    pub audit: &'a dyn AuditSink,
}

/// The state of one interval of a market
#[derive(Clone, Debug, PartialEq)]
pub struct IntervalRecord {
    /// The interval itself
    pub interval: TimeInterval,
    /// The seeded or cleared price; `None` while nothing is known
    pub marginal_price: Option<f64>,
    /// The aggregate curve of the last successful clearing
    pub system: Option<Curve>,
    /// The balance at the last successful clearing
    pub balance: Option<Balance>,
    /// Whether the last clearing attempt succeeded
    pub cleared: bool,
    /// Whether the interval is cleared and every negotiation on it has converged
    pub converged: bool,
}

impl IntervalRecord {
    fn new(interval: TimeInterval) -> Self {
        Self {
            interval,
            marginal_price: None,
            system: None,
            balance: None,
            cleared: false,
            converged: false,
        }
    }
}

/// One market: a set of future intervals cleared together at one clearing time.
///
/// A market is driven entirely by [`Market::tick`]. Each tick performs the work of
/// the current lifecycle state and advances at most one state, once that work is
/// complete and the next state's start time has arrived.
pub struct Market {
    key: MarketKey,
    name: String,
    config: MarketConfig,
    method: Box<dyn ClearingMethod>,
    state: MarketState,
    is_newest: bool,
    converged: bool,
    reconciled: bool,
    prior_market_in_series: Option<MarketKey>,
    market_to_be_refined: Option<MarketKey>,
    intervals: Map<OffsetDateTime, IntervalRecord>,
    price_model: Option<PriceModel>,
}

impl Market {
    /// Create an inactive market of `config`'s series clearing at `clearing_time`
    pub fn new(config: MarketConfig, clearing_time: OffsetDateTime) -> Result<Self, ConfigError> {
        config.validate()?;
        let key = MarketKey::new(config.series.clone(), clearing_time);
        Ok(Self {
            name: key.market_name(),
            key,
            method: clearing_method(&config.clearing),
            price_model: config.price_model.clone(),
            config,
            state: MarketState::Inactive,
            is_newest: false,
            converged: false,
            reconciled: false,
            prior_market_in_series: None,
            market_to_be_refined: None,
            intervals: Map::default(),
        })
    }

    /// Chain the market to the market it succeeds in its series
    pub fn with_prior(mut self, prior: Option<MarketKey>) -> Self {
        self.prior_market_in_series = prior;
        self
    }

    /// Chain the market to the market of another series it refines
    pub fn with_refined(mut self, refined: Option<MarketKey>) -> Self {
        self.market_to_be_refined = refined;
        self
    }

    /// Replace the price model (markets inherit the latest one of their series)
    pub fn with_price_model(mut self, model: Option<PriceModel>) -> Self {
        self.price_model = model;
        self
    }

    /// The market's series and clearing time
    pub fn key(&self) -> &MarketKey {
        &self.key
    }

    /// The market name, which its intervals carry
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The configuration the market was built from
    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    /// The current lifecycle state
    pub fn state(&self) -> MarketState {
        self.state
    }

    /// When the market clears
    pub fn clearing_time(&self) -> OffsetDateTime {
        self.key.clearing_time
    }

    /// The clearing time of the market's successor
    pub fn next_clearing_time(&self) -> OffsetDateTime {
        self.key.clearing_time + self.config.clearing_interval
    }

    /// Whether this is the newest market of its series, the one that spawns the next
    pub fn is_newest(&self) -> bool {
        self.is_newest
    }

    pub(crate) fn set_newest(&mut self, newest: bool) {
        self.is_newest = newest;
    }

    /// Whether every interval is cleared and every negotiation has converged
    pub fn is_converged(&self) -> bool {
        self.converged
    }

    /// Whether the market has been settled after delivery
    pub fn is_reconciled(&self) -> bool {
        self.reconciled
    }

    /// Mark the market settled, allowing it to expire
    pub fn reconcile(&mut self) {
        self.reconciled = true;
    }

    /// The market this one succeeds in its series
    pub fn prior_market_in_series(&self) -> Option<&MarketKey> {
        self.prior_market_in_series.as_ref()
    }

    /// The market of another series this one corrects
    pub fn market_to_be_refined(&self) -> Option<&MarketKey> {
        self.market_to_be_refined.as_ref()
    }

    /// The market's copy of its series' price model
    pub fn price_model(&self) -> Option<&PriceModel> {
        self.price_model.as_ref()
    }

    /// The intervals, in order of start time
    pub fn intervals(&self) -> impl Iterator<Item = &IntervalRecord> {
        self.intervals.values()
    }

    /// The interval starting at `start`
    pub fn interval(&self, start: OffsetDateTime) -> Option<&IntervalRecord> {
        self.intervals.get(&start)
    }

    /// The price of the first priced interval overlapping `interval`
    pub fn overlapping_price(&self, interval: &TimeInterval) -> Option<f64> {
        self.intervals
            .values()
            .filter(|record| record.interval.overlaps(interval))
            .find_map(|record| record.marginal_price)
    }

    /// The price of each interval, in delivery order
    pub fn marginal_prices(&self) -> Vec<Option<f64>> {
        self.intervals.values().map(|r| r.marginal_price).collect()
    }

    /// The net power at each interval's last clearing
    pub fn net_powers(&self) -> Vec<Option<f64>> {
        self.balances(|b| b.net_power)
    }

    /// Generation at each interval's last clearing
    pub fn total_generation(&self) -> Vec<Option<f64>> {
        self.balances(|b| b.generation)
    }

    /// Demand at each interval's last clearing
    pub fn total_demand(&self) -> Vec<Option<f64>> {
        self.balances(|b| b.demand)
    }

    /// Production cost at each interval's last clearing
    pub fn production_costs(&self) -> Vec<Option<f64>> {
        self.balances(|b| b.production_cost)
    }

    /// Dual cost at each interval's last clearing
    pub fn dual_costs(&self) -> Vec<Option<f64>> {
        self.balances(|b| b.dual_cost)
    }

    /// Production cost summed over the cleared intervals
    pub fn total_production_cost(&self) -> f64 {
        self.production_costs().into_iter().flatten().sum()
    }

    /// Dual cost summed over the cleared intervals
    pub fn total_dual_cost(&self) -> f64 {
        self.dual_costs().into_iter().flatten().sum()
    }

    fn balances(&self, f: impl Fn(&Balance) -> f64) -> Vec<Option<f64>> {
        self.intervals
            .values()
            .map(|r| r.balance.as_ref().map(&f))
            .collect()
    }

    /// Ensure one interval exists for every delivery slot of the market.
    ///
    /// Idempotent: existing intervals are kept as they are.
    pub fn check_intervals(&mut self) {
        let duration = self.config.interval_duration;
        let mut start = self.key.clearing_time + self.config.delivery_lead_time;
        for _ in 0..self.config.intervals_to_clear {
            self.intervals.entry(start).or_insert_with(|| {
                IntervalRecord::new(TimeInterval::new(&self.name, start, duration))
            });
            start += duration;
        }
    }

    /// Seed a price for every interval that has none.
    ///
    /// Sources are tried in order: the prior market of the series, the market being
    /// refined, the price model's forecast for the hour, and the default price. An
    /// interval none of them can price stays unpriced.
    pub fn check_marginal_prices(&mut self, prices: &dyn PriceLookup) {
        for record in self.intervals.values_mut() {
            if record.marginal_price.is_some() {
                continue;
            }
            let interval = &record.interval;
            let lookup = |key: &Option<MarketKey>| {
                key.as_ref()
                    .and_then(|k| prices.overlapping_price(k, interval))
            };

            let price = lookup(&self.prior_market_in_series)
                .or_else(|| lookup(&self.market_to_be_refined))
                .or_else(|| {
                    self.price_model
                        .as_ref()
                        .map(|model| model.forecast(interval.start.hour()))
                })
                .or(self.config.default_price);
            record.marginal_price = price;
        }
    }

    /// The aggregate offer of the participants for an interval, optionally leaving
    /// one of them out
    pub fn sum_vertices(
        participants: &[Box<dyn Participant>],
        interval: &TimeInterval,
        exclude: Option<&str>,
    ) -> Curve {
        let curves: Vec<Curve> = participants
            .iter()
            .filter(|p| Some(p.name()) != exclude)
            .map(|p| p.active_vertices(interval))
            .collect();
        curve::sum_vertices(&curves)
    }

    /// Clear every interval, returning true if all of them cleared.
    ///
    /// A failed interval keeps its previous price and is marked unconverged; it is
    /// retried on the next tick.
    pub fn clear_intervals(&mut self, ctx: &mut MarketContext<'_>) -> bool {
        let mut all = true;
        for record in self.intervals.values_mut() {
            let curves: Vec<Curve> = ctx
                .participants
                .iter()
                .map(|p| p.active_vertices(&record.interval))
                .collect();

            match self.method.clear(&curves, record.marginal_price) {
                Ok(Clearing { balance, system }) => {
                    let price = balance.price;
                    let changed = record.marginal_price != Some(price);
                    record.marginal_price = Some(price);
                    record.system = Some(system);
                    record.balance = Some(balance);
                    record.cleared = true;
                    record.converged = true;

                    for participant in ctx.participants.iter_mut() {
                        participant.schedule(&record.interval, price);
                    }
                    if changed {
                        ctx.audit.publish(AuditEvent::PriceCleared {
                            market: self.key.clone(),
                            interval: record.interval.name.clone(),
                            price,
                            net_power: balance.net_power,
                        });
                    }
                }
                Err(err) => {
                    event!(
                        Level::WARN,
                        market = %self.key,
                        interval = %record.interval.name,
                        err = err.to_string(),
                        "interval not cleared"
                    );
                    record.cleared = false;
                    record.converged = false;
                    all = false;
                }
            }
        }
        all
    }

    /// Exchange transactive signals with every negotiating participant, returning
    /// true once the market has converged
    pub fn negotiate(&mut self, now: OffsetDateTime, ctx: &mut MarketContext<'_>) -> bool {
        let mut outgoing: Map<String, Vec<_>> = Map::default();
        for record in self.intervals.values() {
            let Some(price) = record.marginal_price else {
                continue;
            };
            for i in 0..ctx.participants.len() {
                if !ctx.participants[i].is_transactive() {
                    continue;
                }
                let name = ctx.participants[i].name().to_owned();
                let offer = Self::sum_vertices(ctx.participants, &record.interval, Some(&name));
                let records =
                    ctx.participants[i].prepare_signal(&record.interval, &offer, price, now);
                if !records.is_empty() {
                    outgoing.entry(name).or_default().extend(records);
                }
            }
        }

        for (neighbor, records) in outgoing {
            event!(
                Level::DEBUG,
                market = %self.key,
                neighbor = %neighbor,
                count = records.len(),
                "sending records"
            );
            ctx.transport.send(&neighbor, &records);
            ctx.audit.publish(AuditEvent::RecordsSent { neighbor, records });
        }

        let mut converged = true;
        for record in self.intervals.values_mut() {
            let mut agreed = record.cleared;
            for participant in ctx.participants.iter_mut() {
                if participant.is_transactive() {
                    agreed &= participant.check_for_convergence(&record.interval, now);
                }
            }
            record.converged = agreed;
            converged &= agreed;
        }
        self.converged = converged;
        converged
    }

    /// Blend the cleared prices into the price model
    fn update_price_model(&mut self) {
        let memory = self.config.price_model_memory;
        for record in self.intervals.values().filter(|r| r.cleared) {
            let Some(price) = record.marginal_price else {
                continue;
            };
            self.price_model
                .get_or_insert_with(|| PriceModel::uniform(price))
                .update(record.interval.start.hour(), price, memory);
        }
    }

    fn release(&mut self, ctx: &mut MarketContext<'_>) {
        for record in self.intervals.values() {
            for participant in ctx.participants.iter_mut() {
                participant.release(&record.interval);
            }
        }
    }
}

impl std::fmt::Debug for Market {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Market")
            .field("key", &self.key)
            .field("state", &self.state)
            .field("is_newest", &self.is_newest)
            .field("converged", &self.converged)
            .field("reconciled", &self.reconciled)
            .field("intervals", &self.intervals.len())
            .finish()
    }
}
