use std::cell::RefCell;
use std::time::Duration;

use approx::assert_abs_diff_eq;
use rstest::*;
use time::OffsetDateTime;
use time::macros::datetime;
use tns_core::models::{
    ClearingConfig, ClearingMethodKind, Curve, MarketConfig, MarketKey, MarketState,
    TimeInterval, Vertex,
};
use tns_core::ports::{AuditEvent, AuditSink, NullSink, Outbox, PowerLimits};
use tns_market::negotiation::prepare_signal;
use tns_market::{LocalAsset, Market, NeighborModel, Node};

const T0: OffsetDateTime = datetime!(2026-10-19 12:00 UTC);
const HOUR: Duration = Duration::from_secs(3600);

#[fixture]
fn config() -> MarketConfig {
    MarketConfig {
        series: "day-ahead".into(),
        first_clearing_time: Some(T0),
        intervals_to_clear: 1,
        ..Default::default()
    }
}

fn supplier() -> LocalAsset {
    LocalAsset::flexible(
        "supplier",
        vec![Vertex::new(0.02, 0.0, 0.0), Vertex::new(0.05, 10.0, 0.0)],
    )
    .unwrap()
}

fn tick_n<A: AuditSink>(node: &mut Node<Outbox, A>, now: OffsetDateTime, n: usize) {
    for _ in 0..n {
        node.tick(now);
    }
}

fn price(market: &Market) -> f64 {
    market
        .intervals()
        .next()
        .and_then(|record| record.marginal_price)
        .unwrap()
}

fn first_interval(market: &Market) -> TimeInterval {
    market.intervals().next().unwrap().interval.clone()
}

#[rstest]
#[case::interpolation(ClearingMethodKind::Interpolation)]
#[case::subgradient(ClearingMethodKind::Subgradient)]
fn market_clears_and_hands_over(config: MarketConfig, #[case] method: ClearingMethodKind) {
    let config = MarketConfig {
        clearing: ClearingConfig {
            method,
            ..Default::default()
        },
        ..config
    };
    let events = RefCell::new(Vec::new());
    let sink = |event: AuditEvent| events.borrow_mut().push(event);
    let mut node = Node::new("substation", Outbox::default(), sink)
        .with_participant(supplier())
        .with_participant(LocalAsset::fixed_load("load", 4.0));
    assert_eq!(node.open_markets([config], T0), 1);

    tick_n(&mut node, T0, 5);
    let first = node.registry().newest("day-ahead").unwrap();
    let first_key = first.key().clone();
    assert_eq!(first.state(), MarketState::Delivery);
    assert!(first.is_converged());
    assert_abs_diff_eq!(price(first), 0.032, epsilon = 1e-3);
    let load = node.participant("load").unwrap();
    assert_eq!(load.scheduled_power(&first_interval(first)), -4.0);
    assert!(node.registry().price_model("day-ahead").is_some());

    // The successor is spawned on time, and inherits both the chain and the price model
    let t1 = T0 + HOUR;
    node.tick(t1);
    let registry = node.registry();
    assert_eq!(registry.len(), 2);
    let second = registry.newest("day-ahead").unwrap();
    assert_eq!(second.clearing_time(), t1);
    assert_eq!(second.prior_market_in_series(), Some(&first_key));
    assert_eq!(second.state(), MarketState::Active);
    assert_abs_diff_eq!(price(second), 0.032, epsilon = 1e-3);

    let first = registry.market(&first_key).unwrap();
    assert!(!first.is_newest());
    assert!(second.is_newest());
    assert_eq!(first.state(), MarketState::Reconcile);

    // Reconciliation is automatic, after which the market is gone
    node.tick(t1);
    assert_eq!(node.registry().len(), 1);
    assert!(node.registry().market(&first_key).is_none());

    let events = events.borrow();
    let spawned = events
        .iter()
        .filter(|e| matches!(e, AuditEvent::MarketSpawned { .. }))
        .count();
    assert_eq!(spawned, 2);
    assert!(events.iter().any(|e| matches!(
        e,
        AuditEvent::StateChanged { market, to: MarketState::Expired, .. } if *market == first_key
    )));
    assert!(
        events
            .iter()
            .any(|e| matches!(e, AuditEvent::PriceCleared { market, .. } if *market == first_key))
    );
}

#[rstest]
fn manual_reconciliation(config: MarketConfig) {
    let config = MarketConfig {
        auto_reconcile: false,
        ..config
    };
    let mut node = Node::new("substation", Outbox::default(), NullSink)
        .with_participant(supplier())
        .with_participant(LocalAsset::fixed_load("load", 4.0));
    node.open_markets([config], T0);
    tick_n(&mut node, T0, 5);

    let key = MarketKey::new("day-ahead", T0);
    let after = T0 + HOUR;
    tick_n(&mut node, after, 3);
    assert_eq!(
        node.registry().market(&key).map(Market::state),
        Some(MarketState::Reconcile)
    );

    assert!(node.reconcile(&key));
    node.tick(after);
    assert!(node.registry().market(&key).is_none());
    assert!(!node.reconcile(&key));
}

#[rstest]
fn elapsed_markets_are_skipped(config: MarketConfig) {
    let mut node = Node::new("substation", Outbox::default(), NullSink);
    node.open_markets([config], T0);

    // Only the market still delivering is worth creating
    node.tick(T0 + HOUR * 3 + Duration::from_secs(1800));
    assert_eq!(node.registry().len(), 1);
    let newest = node.registry().newest("day-ahead").unwrap();
    assert_eq!(newest.clearing_time(), T0 + HOUR * 3);
    assert_eq!(newest.prior_market_in_series(), None);
}

#[rstest]
fn catching_up_breaks_the_chain(config: MarketConfig) {
    let mut node = Node::new("substation", Outbox::default(), NullSink)
        .with_participant(supplier())
        .with_participant(LocalAsset::fixed_load("load", 4.0));
    node.open_markets([config], T0);
    tick_n(&mut node, T0, 5);
    let first_key = MarketKey::new("day-ahead", T0);

    // The markets clearing at T0+1h and T0+2h are over before they could be spawned
    node.tick(T0 + HOUR * 3 + Duration::from_secs(1800));
    let registry = node.registry();
    assert_eq!(registry.len(), 2);
    let newest = registry.newest("day-ahead").unwrap();
    assert_eq!(newest.clearing_time(), T0 + HOUR * 3);
    assert_eq!(newest.prior_market_in_series(), None);
    assert!(newest.is_newest());
    assert!(!registry.market(&first_key).unwrap().is_newest());
}

#[rstest]
fn unusable_series_are_skipped(config: MarketConfig) {
    let broken = MarketConfig {
        series: "real-time".into(),
        intervals_to_clear: 0,
        ..config.clone()
    };
    let refining = MarketConfig {
        series: "hour-ahead".into(),
        refines: Some("day-ahead".into()),
        ..config.clone()
    };
    let mut node = Node::new("substation", Outbox::default(), NullSink);
    assert_eq!(
        node.open_markets([config.clone(), broken, config, refining], T0),
        2
    );

    node.tick(T0);
    assert_eq!(node.registry().len(), 2);
    let refining = node.registry().newest("hour-ahead").unwrap();
    assert_eq!(
        refining.market_to_be_refined(),
        Some(&MarketKey::new("day-ahead", T0))
    );
}

#[test]
fn inbound_records_reach_their_neighbor() {
    let interval = TimeInterval::new("day-ahead@2026-10-19T12:00:00Z", T0, HOUR);
    let offer = Curve::new(vec![
        Vertex::new(0.03, 0.0, 0.0),
        Vertex::new(0.05, 20.0, 0.0),
    ])
    .unwrap();
    let records = prepare_signal(
        &interval,
        "substation",
        &offer,
        &PowerLimits::unbounded(),
        0.0,
        0.04,
        T0,
    );

    let events = RefCell::new(Vec::new());
    let sink = |event: AuditEvent| events.borrow_mut().push(event);
    let mut node = Node::new("substation", Outbox::default(), sink).with_participant(
        NeighborModel::new("feeder", Curve::inelastic(0.0, 0.0)).transactive(),
    );

    node.receive("stranger", records.clone(), T0);
    assert!(events.borrow().is_empty());

    node.receive("feeder", records, T0);
    assert_eq!(events.borrow().len(), 1);
    let feeder = node.participant("feeder").unwrap();
    assert_eq!(feeder.active_vertices(&interval).power_range(), (0.0, 20.0));
}

// Deliver everything `from` has queued to `to`
fn deliver<A, B>(from: &mut Node<Outbox, A>, to: &mut Node<Outbox, B>, now: OffsetDateTime)
where
    A: AuditSink,
    B: AuditSink,
{
    let sender = from.name().to_owned();
    for (recipient, records) in from.transport_mut().drain() {
        assert_eq!(recipient, to.name());
        to.receive(&sender, records, now);
    }
}

#[rstest]
fn neighbors_negotiate_a_common_price(config: MarketConfig) {
    let config = MarketConfig {
        negotiation_lead_time: Duration::from_secs(600),
        ..config
    };
    let neighbor =
        |name: &str| NeighborModel::new(name, Curve::inelastic(0.0, 0.0)).transactive();

    // A supplies itself and has power to spare; B only has a load
    let mut a = Node::new("a", Outbox::default(), NullSink)
        .with_participant(supplier())
        .with_participant(LocalAsset::fixed_load("load", 2.0))
        .with_participant(neighbor("b"));
    let mut b = Node::new("b", Outbox::default(), NullSink)
        .with_participant(LocalAsset::fixed_load("load", 4.0))
        .with_participant(neighbor("a"));
    a.open_markets([config.clone()], T0);
    b.open_markets([config], T0);

    let t = |minutes: i64| T0 - time::Duration::minutes(minutes);
    tick_n(&mut a, t(10), 3);
    tick_n(&mut b, t(10), 3);
    deliver(&mut a, &mut b, t(10));

    b.tick(t(9));
    deliver(&mut b, &mut a, t(9));
    a.tick(t(9));
    deliver(&mut a, &mut b, t(9));
    b.tick(t(8));
    a.tick(t(8));

    let key = MarketKey::new("day-ahead", T0);
    for node in [&a, &b] {
        let market = node.registry().market(&key).unwrap();
        assert_eq!(market.state(), MarketState::Negotiation);
        assert!(market.is_converged());
        assert_abs_diff_eq!(price(market), 0.038, epsilon = 1e-9);
    }

    let interval = first_interval(a.registry().market(&key).unwrap());
    assert_abs_diff_eq!(
        a.participant("b").unwrap().scheduled_power(&interval),
        -4.0,
        epsilon = 1e-9
    );
    assert_abs_diff_eq!(
        b.participant("a").unwrap().scheduled_power(&interval),
        4.0,
        epsilon = 1e-9
    );

    // Negotiation is over, so the markets move on at the clearing time
    a.tick(T0);
    b.tick(T0);
    for node in [&a, &b] {
        assert_eq!(
            node.registry().market(&key).map(Market::state),
            Some(MarketState::MarketLead)
        );
    }
}
