use time::OffsetDateTime;
use tns_core::models::{
    ConfigError, Map, MarketConfig, MarketKey, MarketState, PriceModel, TimeInterval,
    interval_name,
};
use tns_core::ports::{AuditEvent, AuditSink, Participant, Transport};
use tracing::{Level, event, span};

use crate::market::{Market, MarketContext, PriceLookup};

// What the registry remembers about a series between markets
#[derive(Debug)]
struct Series {
    config: MarketConfig,
    next_clearing: OffsetDateTime,
    newest: Option<MarketKey>,
    price_model: Option<PriceModel>,
}

/// Every open market of a node, by key.
///
/// The registry owns the markets so that markets can refer to each other by key.
/// It spawns each series' markets in turn, ticks them, and drops them once expired.
#[derive(Debug, Default)]
pub struct MarketRegistry {
    series: Map<String, Series>,
    markets: Map<MarketKey, Market>,
}

impl MarketRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a market series.
    ///
    /// The first market clears at the configured first clearing time, or as soon as a
    /// market could be activated in time when none is configured. Markets are only
    /// created on the next [`tick`](Self::tick).
    pub fn open(&mut self, config: MarketConfig, now: OffsetDateTime) -> Result<(), ConfigError> {
        config.validate()?;
        if self.series.contains_key(&config.series) {
            return Err(ConfigError::DuplicateSeries(config.series));
        }

        let next_clearing = config
            .first_clearing_time
            .unwrap_or_else(|| now + config.activation_offset());
        event!(
            Level::INFO,
            series = %config.series,
            first_clearing = %interval_name(next_clearing),
            "opened market series"
        );
        self.series.insert(
            config.series.clone(),
            Series {
                price_model: config.price_model.clone(),
                config,
                next_clearing,
                newest: None,
            },
        );
        Ok(())
    }

    /// The number of open markets
    pub fn len(&self) -> usize {
        self.markets.len()
    }

    /// True if no market is open
    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }

    /// The open markets, oldest first within each series
    pub fn markets(&self) -> impl Iterator<Item = &Market> {
        self.markets.values()
    }

    /// The open market with the given key
    pub fn market(&self, key: &MarketKey) -> Option<&Market> {
        self.markets.get(key)
    }

    /// The newest market of a series
    pub fn newest(&self, series: &str) -> Option<&Market> {
        let key = self.series.get(series)?.newest.as_ref()?;
        self.markets.get(key)
    }

    /// The series' current price model
    pub fn price_model(&self, series: &str) -> Option<&PriceModel> {
        self.series.get(series)?.price_model.as_ref()
    }

    /// Settle a market awaiting reconciliation, returning false if it is unknown
    pub fn reconcile(&mut self, key: &MarketKey) -> bool {
        match self.markets.get_mut(key) {
            Some(market) => {
                market.reconcile();
                true
            }
            None => false,
        }
    }

    /// Spawn due markets, then advance every market by one tick
    pub fn tick(
        &mut self,
        now: OffsetDateTime,
        participants: &mut [Box<dyn Participant>],
        transport: &mut dyn Transport,
        audit: &dyn AuditSink,
    ) {
        self.spawn(now, audit);

        let keys: Vec<MarketKey> = self.markets.keys().cloned().collect();
        for key in keys {
            // The market is taken out while it ticks so the rest can answer lookups
            let Some((index, key, mut market)) = self.markets.shift_remove_full(&key) else {
                continue;
            };
            let entered = {
                let mut ctx = MarketContext {
                    participants: &mut *participants,
                    prices: &*self,
                    transport: &mut *transport,
                    audit,
                };
                market.tick(now, &mut ctx)
            };

            if entered == Some(MarketState::Delivery) {
                if let Some(series) = self.series.get_mut(&key.series) {
                    series.price_model = market.price_model().cloned();
                }
            }
            if market.state() == MarketState::Expired {
                event!(Level::INFO, market = %key, "market expired");
                if let Some(series) = self.series.get_mut(&key.series) {
                    if series.newest.as_ref() == Some(&key) {
                        series.newest = None;
                    }
                }
                continue;
            }
            self.markets.shift_insert(index, key, market);
        }
    }

    fn spawn(&mut self, now: OffsetDateTime, audit: &dyn AuditSink) {
        let names: Vec<String> = self.series.keys().cloned().collect();
        for name in names {
            while let Some(market) = self.spawn_next(&name, now) {
                let key = market.key().clone();
                let prior = market.prior_market_in_series().cloned();
                self.markets.insert(key.clone(), market);

                event!(Level::INFO, market = %key, "spawned market");
                audit.publish(AuditEvent::MarketSpawned { market: key, prior });
            }
        }
    }

    // Build the series' next market if it is due, advancing the series past it and
    // handing it the newest flag. A market following skipped ones has no prior.
    fn spawn_next(&mut self, name: &str, now: OffsetDateTime) -> Option<Market> {
        let span = span!(Level::DEBUG, "spawn", series = name);
        let _guard = span.enter();

        let mut skipped = false;
        loop {
            let series = self.series.get(name)?;
            let clearing = series.next_clearing;
            let config = &series.config;
            if now < clearing - config.activation_offset() {
                return None;
            }

            let interval = config.clearing_interval;
            // A market whose delivery is already over would expire unused
            if clearing + config.delivery_end_offset() <= now {
                event!(Level::DEBUG, clearing = %clearing, "skipping elapsed market");
                self.series.get_mut(name)?.next_clearing = clearing + interval;
                skipped = true;
                continue;
            }

            let refined = config
                .refines
                .as_deref()
                .and_then(|refined| self.newest_before(refined, clearing));
            let prior = if skipped { None } else { series.newest.clone() };
            let mut market = match Market::new(config.clone(), clearing) {
                Ok(market) => market
                    .with_prior(prior)
                    .with_refined(refined)
                    .with_price_model(series.price_model.clone()),
                Err(err) => {
                    event!(Level::ERROR, err = err.to_string(), "cannot spawn market");
                    return None;
                }
            };

            market.set_newest(true);
            let series = self.series.get_mut(name)?;
            series.next_clearing = clearing + interval;
            let previous = series.newest.replace(market.key().clone());
            if let Some(previous) = previous.and_then(|key| self.markets.get_mut(&key)) {
                previous.set_newest(false);
            }
            return Some(market);
        }
    }

    // The newest market of a series clearing no later than `time`
    fn newest_before(&self, series: &str, time: OffsetDateTime) -> Option<MarketKey> {
        self.markets
            .keys()
            .filter(|key| key.series == series && key.clearing_time <= time)
            .max_by_key(|key| key.clearing_time)
            .cloned()
    }
}

impl PriceLookup for MarketRegistry {
    fn overlapping_price(&self, market: &MarketKey, interval: &TimeInterval) -> Option<f64> {
        self.markets.get(market)?.overlapping_price(interval)
    }
}
