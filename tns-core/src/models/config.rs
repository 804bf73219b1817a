use std::time::Duration;
use time::OffsetDateTime;

use super::PriceModel;

/// Configures one market series: its timing, clearing method and price defaults.
///
/// Every market of a series shares the configuration; only the clearing time changes
/// from one market to its successor.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MarketConfig {
    /// The series name, e.g. `day-ahead`
    pub series: String,

    /// Another series whose overlapping prices this series corrects
    #[cfg_attr(feature = "serde", serde(default))]
    pub refines: Option<String>,

    /// The clearing time of the first market (if omitted, aligned to the opening time)
    #[cfg_attr(
        feature = "serde",
        serde(default, with = "time::serde::rfc3339::option")
    )]
    pub first_clearing_time: Option<OffsetDateTime>,

    /// How long before negotiation a market becomes active
    #[cfg_attr(feature = "serde", serde(default, with = "humantime_serde"))]
    pub activation_lead_time: Duration,

    /// How long negotiation runs before the market lead
    #[cfg_attr(feature = "serde", serde(default, with = "humantime_serde"))]
    pub negotiation_lead_time: Duration,

    /// How long before clearing negotiation closes
    #[cfg_attr(feature = "serde", serde(default, with = "humantime_serde"))]
    pub market_lead_time: Duration,

    /// How long after clearing delivery of the first interval begins
    #[cfg_attr(feature = "serde", serde(default, with = "humantime_serde"))]
    pub delivery_lead_time: Duration,

    /// The duration of each delivery interval
    #[cfg_attr(
        feature = "serde",
        serde(default = "default_hour", with = "humantime_serde")
    )]
    pub interval_duration: Duration,

    /// The number of consecutive intervals each market clears
    #[cfg_attr(feature = "serde", serde(default = "default_intervals"))]
    pub intervals_to_clear: usize,

    /// The time between the clearing of successive markets in the series
    #[cfg_attr(
        feature = "serde",
        serde(default = "default_hour", with = "humantime_serde")
    )]
    pub clearing_interval: Duration,

    /// The static price used when no better estimate exists
    #[cfg_attr(feature = "serde", serde(default))]
    pub default_price: Option<f64>,

    /// How prices are cleared
    #[cfg_attr(feature = "serde", serde(default))]
    pub clearing: ClearingConfig,

    /// Whether markets settle as soon as they enter reconciliation
    #[cfg_attr(feature = "serde", serde(default = "default_true"))]
    pub auto_reconcile: bool,

    /// An initial hourly price model
    #[cfg_attr(feature = "serde", serde(default))]
    pub price_model: Option<PriceModel>,

    /// The number of observations the price model effectively remembers
    #[cfg_attr(feature = "serde", serde(default = "default_memory"))]
    pub price_model_memory: f64,
}

#[cfg_attr(not(feature = "serde"), allow(dead_code))]
fn default_hour() -> Duration {
    Duration::from_secs(3600)
}

#[cfg_attr(not(feature = "serde"), allow(dead_code))]
fn default_intervals() -> usize {
    24
}

#[cfg_attr(not(feature = "serde"), allow(dead_code))]
fn default_true() -> bool {
    true
}

fn default_memory() -> f64 {
    14.0
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            series: "day-ahead".to_owned(),
            refines: None,
            first_clearing_time: None,
            activation_lead_time: Duration::ZERO,
            negotiation_lead_time: Duration::ZERO,
            market_lead_time: Duration::ZERO,
            delivery_lead_time: Duration::ZERO,
            interval_duration: default_hour(),
            intervals_to_clear: default_intervals(),
            clearing_interval: default_hour(),
            default_price: None,
            clearing: ClearingConfig::default(),
            auto_reconcile: true,
            price_model: None,
            price_model_memory: default_memory(),
        }
    }
}

impl MarketConfig {
    /// Check the configuration for values no market can be built from
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.series.trim().is_empty() {
            return Err(ConfigError::EmptySeries);
        }
        if self.refines.as_deref() == Some(self.series.as_str()) {
            return Err(ConfigError::SelfRefinement(self.series.clone()));
        }
        if self.interval_duration.is_zero() {
            return Err(ConfigError::ZeroDuration("interval_duration"));
        }
        if self.clearing_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("clearing_interval"));
        }
        if self.intervals_to_clear == 0 {
            return Err(ConfigError::NoIntervals);
        }
        if self.delivery_span().is_none() {
            return Err(ConfigError::HorizonTooLong(self.intervals_to_clear));
        }
        if let Some(price) = self.default_price {
            if !price.is_finite() {
                return Err(ConfigError::InvalidPrice(price));
            }
        }
        if !self.price_model_memory.is_finite() || self.price_model_memory < 1.0 {
            return Err(ConfigError::InvalidMemory(self.price_model_memory));
        }
        self.clearing.validate()
    }

    /// The lead between activation and clearing
    pub fn activation_offset(&self) -> Duration {
        self.activation_lead_time + self.negotiation_offset()
    }

    /// The lead between the start of negotiation and clearing
    pub fn negotiation_offset(&self) -> Duration {
        self.negotiation_lead_time + self.market_lead_time
    }

    /// The span from clearing until the end of delivery of the last interval.
    ///
    /// Saturates for configurations that [`validate`](Self::validate) rejects.
    pub fn delivery_end_offset(&self) -> Duration {
        self.delivery_span().unwrap_or(Duration::MAX)
    }

    fn delivery_span(&self) -> Option<Duration> {
        let intervals = u32::try_from(self.intervals_to_clear).ok()?;
        self.interval_duration
            .checked_mul(intervals)
            .and_then(|span| span.checked_add(self.delivery_lead_time))
            // Timestamps must be able to move by the whole span
            .filter(|span| time::Duration::try_from(*span).is_ok())
    }
}

/// The available price-clearing algorithms
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum ClearingMethodKind {
    /// Interpolate the balance point of the aggregate curve
    #[default]
    Interpolation,
    /// Iterate the price along the subgradient of the dual problem
    Subgradient,
}

/// Parameters of the clearing algorithm
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ClearingConfig {
    /// Which algorithm to use
    pub method: ClearingMethodKind,
    /// Subgradient search stops once the duality gap is within this threshold
    pub duality_gap_threshold: f64,
    /// Scale of the subgradient step; step k is `step_scale / (10 + k)`
    pub step_scale: f64,
    /// Upper bound on subgradient iterations
    pub max_iterations: usize,
}

impl Default for ClearingConfig {
    fn default() -> Self {
        Self {
            method: ClearingMethodKind::default(),
            duality_gap_threshold: 0.01,
            step_scale: 0.1,
            max_iterations: 100,
        }
    }
}

impl ClearingConfig {
    /// Check the clearing parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.duality_gap_threshold.is_finite() && self.duality_gap_threshold > 0.0) {
            return Err(ConfigError::InvalidThreshold(self.duality_gap_threshold));
        }
        if !(self.step_scale.is_finite() && self.step_scale > 0.0) {
            return Err(ConfigError::InvalidStep(self.step_scale));
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::NoIterations);
        }
        Ok(())
    }
}

/// Errors for configurations that cannot produce a working market
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// The series has no name
    #[error("market series name is empty")]
    EmptySeries,
    /// The series names itself as the series it refines
    #[error("series {0} cannot refine itself")]
    SelfRefinement(String),
    /// A duration that must be positive is zero
    #[error("{0} must be positive")]
    ZeroDuration(&'static str),
    /// A market must clear at least one interval
    #[error("intervals_to_clear must be at least 1")]
    NoIntervals,
    /// The default price is not a finite number
    #[error("default price {0} is not finite")]
    InvalidPrice(f64),
    /// The price model memory is not a number of at least one
    #[error("price model memory {0} must be a finite number of at least 1")]
    InvalidMemory(f64),
    /// The price model does not hold 48 values
    #[error("price model needs 48 values, got {0}")]
    PriceModelLength(usize),
    /// The price model holds a non-finite value or a negative spread
    #[error("price model values must be finite with non-negative spreads")]
    PriceModelValue,
    /// The duality gap threshold is not positive
    #[error("duality gap threshold {0} must be positive")]
    InvalidThreshold(f64),
    /// The subgradient step scale is not positive
    #[error("subgradient step scale {0} must be positive")]
    InvalidStep(f64),
    /// Subgradient search is allowed no iterations
    #[error("max_iterations must be at least 1")]
    NoIterations,
    /// The delivery horizon cannot be represented
    #[error("{0} intervals reach beyond any representable time")]
    HorizonTooLong(usize),
    /// A market series is already open
    #[error("series {0} is already open")]
    DuplicateSeries(String),
}
