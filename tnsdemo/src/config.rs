//! Application configuration management.
//!
//! Configuration is layered from default values, an optional TOML file and
//! environment variables, in increasing order of precedence.

use std::time::Duration;

use config::{Config, ConfigBuilder, Environment, File, builder::DefaultState};
use serde::{Deserialize, Serialize};
use tns_core::models::{MarketConfig, Vertex};
use tns_market::{MonthlyRate, RateTable};

use crate::{Cli, schedule::Simulation};

/// The main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// The node's name, used as the counterpart name in outgoing signals
    #[serde(default = "default_name")]
    pub name: String,

    /// The market series the node runs
    #[serde(default)]
    pub markets: Vec<MarketConfig>,

    /// The bulk supplier feeding the node
    #[serde(default)]
    pub supplier: SupplierConfig,

    /// Local loads and generators
    #[serde(default)]
    pub assets: Vec<AssetConfig>,

    /// Neighboring nodes
    #[serde(default)]
    pub neighbors: Vec<NeighborConfig>,

    /// The simulated clock
    #[serde(default)]
    pub simulation: Simulation,
}

fn default_name() -> String {
    "substation".to_owned()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            markets: vec![MarketConfig {
                series: "hour-ahead".to_owned(),
                activation_lead_time: Duration::from_secs(300),
                negotiation_lead_time: Duration::from_secs(900),
                market_lead_time: Duration::from_secs(300),
                delivery_lead_time: Duration::from_secs(600),
                intervals_to_clear: 4,
                default_price: Some(0.04),
                ..Default::default()
            }],
            supplier: SupplierConfig::default(),
            assets: vec![
                AssetConfig::FixedLoad {
                    name: "feeder-load".to_owned(),
                    load: 400.0,
                },
                AssetConfig::Flexible {
                    name: "water-heaters".to_owned(),
                    vertices: vec![
                        Vertex::new(0.03, -120.0, 0.0),
                        Vertex::new(0.06, -20.0, 0.0),
                    ],
                },
            ],
            neighbors: vec![NeighborConfig::default()],
            simulation: Simulation::default(),
        }
    }
}

/// The tariff and capacity of the bulk supplier
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SupplierConfig {
    /// The supplier's name
    pub name: String,
    /// The twelve monthly rates, January first
    pub rates: RateTable,
    /// Losses as a fraction of the power delivered at full capacity
    pub loss_factor: f64,
    /// The supplier's capacity
    pub maximum_power: f64,
    /// The demand threshold at start-up
    pub demand_threshold: f64,
    /// The fraction of last month's threshold that carries into a new month
    pub discount_coefficient: f64,
}

impl Default for SupplierConfig {
    fn default() -> Self {
        Self {
            name: "bulk-supplier".to_owned(),
            rates: RateTable::flat(MonthlyRate {
                hlh_energy: 0.045,
                llh_energy: 0.032,
                demand_rate: 0.01,
            }),
            loss_factor: 0.02,
            maximum_power: 2000.0,
            demand_threshold: 450.0,
            discount_coefficient: 0.8,
        }
    }
}

/// A local asset
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssetConfig {
    /// A load drawing the same power at any price
    FixedLoad {
        /// The asset's name
        name: String,
        /// The power drawn
        load: f64,
    },
    /// An asset offering a price-sensitive curve
    Flexible {
        /// The asset's name
        name: String,
        /// The breakpoints of its curve (generation positive)
        vertices: Vec<Vertex>,
    },
}

/// A neighboring node
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NeighborConfig {
    /// The neighbor's name, which outgoing signals are addressed to
    pub name: String,
    /// Whether the neighbor negotiates
    pub transactive: bool,
    /// The power assumed to be imported from the neighbor until it says otherwise
    pub default_power: f64,
    /// The least power that may be imported (negative for export)
    pub minimum_power: Option<f64>,
    /// The most power that may be imported
    pub maximum_power: Option<f64>,
    /// Relative tolerance for signals to agree
    pub convergence_threshold: f64,
    /// How long an unanswered signal is waited on
    #[serde(with = "humantime_serde")]
    pub staleness: Duration,
}

impl Default for NeighborConfig {
    fn default() -> Self {
        Self {
            name: "campus".to_owned(),
            transactive: true,
            default_power: 0.0,
            minimum_power: Some(-200.0),
            maximum_power: Some(200.0),
            convergence_threshold: tns_market::negotiation::DEFAULT_CONVERGENCE_THRESHOLD,
            staleness: tns_market::negotiation::DEFAULT_STALENESS,
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Environment variables (highest priority)
    /// 2. Config file given by the CLI
    /// 3. Default values (lowest priority)
    ///
    /// Environment variables are mapped using the pattern
    /// `TNS_<SECTION>__<KEY>` to `<section>.<key>`, e.g.
    ///
    /// ```bash
    /// export TNS_SUPPLIER__MAXIMUM_POWER=2500
    /// export TNS_SIMULATION__TICKS=96
    /// ```
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let mut config = Self::defaults()?;

        if let Some(path) = &cli.config {
            if path.exists() {
                config = config.add_source(File::from(path.as_path()))
            } else {
                return Err(anyhow::anyhow!(
                    "Config file {} does not exist",
                    path.display()
                ));
            }
        }

        Self::finish(config)
    }

    fn defaults() -> anyhow::Result<ConfigBuilder<DefaultState>> {
        Ok(Config::builder().add_source(Config::try_from(&Self::default())?))
    }

    // Environment variables override everything else
    fn finish(config: ConfigBuilder<DefaultState>) -> anyhow::Result<Self> {
        let config = config.add_source(
            Environment::with_prefix("TNS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );
        config.build()?.try_deserialize().map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    #[test]
    fn defaults_survive_layering() {
        let config = AppConfig::finish(AppConfig::defaults().unwrap()).unwrap();
        assert_eq!(config.name, "substation");
        assert_eq!(config.markets.len(), 1);
        assert_eq!(config.markets[0].series, "hour-ahead");
        assert_eq!(
            config.markets[0].negotiation_lead_time,
            Duration::from_secs(900)
        );
        assert_eq!(config.assets.len(), 2);
        assert_eq!(config.neighbors[0].staleness, Duration::from_secs(300));
        assert!(config.markets.iter().all(|m| m.validate().is_ok()));
    }

    #[test]
    fn file_overrides_defaults() {
        let toml = r#"
            name = "north"

            [supplier]
            maximum_power = 1500.0

            [simulation]
            ticks = 12
            step = "15m"
        "#;
        let builder = AppConfig::defaults()
            .unwrap()
            .add_source(File::from_str(toml, FileFormat::Toml));
        let config = AppConfig::finish(builder).unwrap();

        assert_eq!(config.name, "north");
        assert_eq!(config.supplier.maximum_power, 1500.0);
        assert_eq!(config.supplier.loss_factor, 0.02);
        assert_eq!(config.simulation.ticks, 12);
        assert_eq!(config.simulation.step, Duration::from_secs(900));
    }
}
