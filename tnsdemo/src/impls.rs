//! The demonstration node: its participants and its audit trail.

use std::cell::RefCell;
use std::io::Write;

use tns_core::models::{Curve, MarketState};
use tns_core::ports::{AuditEvent, AuditSink, Outbox, PowerLimits};
use tns_market::{BulkSupplier, DemandThreshold, LocalAsset, NeighborModel, Node};
use tracing::{Level, event};

use crate::config::{AppConfig, AssetConfig, NeighborConfig, SupplierConfig};

/// An audit sink writing one JSON object per line.
///
/// Write failures are logged and otherwise ignored, as an audit trail must never
/// stop the markets.
#[derive(Debug)]
pub struct JsonLines<W: Write> {
    writer: RefCell<W>,
}

impl<W: Write> JsonLines<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: RefCell::new(writer),
        }
    }

    /// Recover the underlying writer
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write> AuditSink for JsonLines<W> {
    fn publish(&self, event: AuditEvent) {
        let mut writer = self.writer.borrow_mut();
        let written = serde_json::to_writer(&mut *writer, &event)
            .map_err(std::io::Error::from)
            .and_then(|()| writer.write_all(b"\n"));
        if let Err(err) = written {
            event!(Level::WARN, err = err.to_string(), "failed to write audit event");
        }
    }
}

/// The node a demonstration runs, with outgoing signals collected in an outbox
pub type DemoNode<W> = Node<Outbox, JsonLines<W>>;

/// Build the node described by the configuration.
///
/// Market series are opened at `now`; series that cannot be opened are logged and skipped.
pub fn build_node<W: Write>(
    config: &AppConfig,
    audit: JsonLines<W>,
    now: time::OffsetDateTime,
) -> anyhow::Result<DemoNode<W>> {
    let mut node = Node::new(config.name.clone(), Outbox::default(), audit);

    node.add_participant(Box::new(supplier(&config.supplier)?));
    for asset in &config.assets {
        node.add_participant(Box::new(local_asset(asset)?));
    }
    for neighbor_config in &config.neighbors {
        node.add_participant(Box::new(neighbor(neighbor_config)));
    }

    let opened = node.open_markets(config.markets.iter().cloned(), now);
    if opened == 0 {
        return Err(anyhow::anyhow!("no usable market series configured"));
    }
    Ok(node)
}

fn supplier(config: &SupplierConfig) -> anyhow::Result<BulkSupplier> {
    let threshold = DemandThreshold::new(config.demand_threshold, config.discount_coefficient);
    Ok(BulkSupplier::new(
        config.name.clone(),
        config.rates.clone(),
        config.loss_factor,
        config.maximum_power,
        threshold,
    )?)
}

fn local_asset(config: &AssetConfig) -> anyhow::Result<LocalAsset> {
    Ok(match config {
        AssetConfig::FixedLoad { name, load } => LocalAsset::fixed_load(name.clone(), *load),
        AssetConfig::Flexible { name, vertices } => {
            LocalAsset::flexible(name.clone(), vertices.clone())?
        }
    })
}

fn neighbor(config: &NeighborConfig) -> NeighborModel {
    let limits = PowerLimits::new(
        config.minimum_power.unwrap_or(f64::NEG_INFINITY),
        config.maximum_power.unwrap_or(f64::INFINITY),
    );
    let model = NeighborModel::new(
        config.name.clone(),
        Curve::inelastic(config.default_power, 0.0),
    )
    .with_limits(limits)
    .with_convergence_threshold(config.convergence_threshold)
    .with_staleness(config.staleness);

    if config.transactive {
        model.transactive()
    } else {
        model
    }
}

/// Log the state of every open market
pub fn report<W: Write>(node: &DemoNode<W>) {
    for market in node.registry().markets() {
        let prices: Vec<String> = market
            .marginal_prices()
            .into_iter()
            .map(|price| price.map_or_else(|| "-".to_owned(), |p| format!("{p:.4}")))
            .collect();
        event!(
            Level::INFO,
            market = %market.key(),
            state = %market.state(),
            delivering = market.state().is_delivering(),
            converged = market.is_converged(),
            prices = prices.join(" "),
            production_cost = market.total_production_cost(),
            dual_cost = market.total_dual_cost(),
            "market summary"
        );
    }
}
