use time::{Month, OffsetDateTime};
use tns_core::models::{Curve, Map, TimeInterval, Vertex};
use tns_core::ports::{Participant, PowerLimits};
use tns_solver::curve::{
    self, TransformError, include_demand_charges, include_marginal_losses, production,
};
use tracing::{Level, event};

use super::{Slot, slot};
use crate::demand::DemandThreshold;
use crate::rates::RateTable;

/// A supplier that does not negotiate but publishes a tariff.
///
/// Its offer in each interval is derived from the rate table: a flat energy price
/// across its capacity, raised by marginal losses toward full capacity and by the
/// demand rate above the month's demand threshold.
#[derive(Clone, Debug)]
pub struct BulkSupplier {
    name: String,
    rates: RateTable,
    loss_factor: f64,
    minimum_power: f64,
    maximum_power: f64,
    threshold: DemandThreshold,
    metered: Option<f64>,
    scheduled: Map<Slot, (OffsetDateTime, f64)>,
}

impl BulkSupplier {
    /// Create a supplier delivering up to `maximum_power`.
    ///
    /// Fails if the loss model cannot cover the whole capacity.
    pub fn new(
        name: impl Into<String>,
        rates: RateTable,
        loss_factor: f64,
        maximum_power: f64,
        threshold: DemandThreshold,
    ) -> Result<Self, SupplierError> {
        if !(threshold.discount_coefficient().is_finite()
            && (0.0..=1.0).contains(&threshold.discount_coefficient()))
        {
            return Err(SupplierError::InvalidCoefficient(
                threshold.discount_coefficient(),
            ));
        }

        let supplier = Self {
            name: name.into(),
            rates,
            loss_factor,
            minimum_power: 0.0,
            maximum_power,
            threshold,
            metered: None,
            scheduled: Map::default(),
        };
        // Any price will do; this only checks the loss model over the capacity
        let base = supplier.base_vertices(1.0);
        curve::try_include_marginal_losses(&base, loss_factor, maximum_power)?;
        Ok(supplier)
    }

    /// The supplier's tariff
    pub fn rates(&self) -> &RateTable {
        &self.rates
    }

    /// The current demand threshold
    pub fn demand_threshold(&self) -> f64 {
        self.threshold.threshold()
    }

    /// Record the average demand metered over the latest period
    pub fn record_metered_demand(&mut self, average: f64) {
        self.metered = Some(average);
    }

    fn base_vertices(&self, price: f64) -> Vec<Vertex> {
        let span = self.maximum_power - self.minimum_power;
        vec![
            Vertex::new(price, self.minimum_power, 0.0),
            Vertex::new(price, self.maximum_power, price * span),
        ]
    }

    // The highest power scheduled in any interval of the month containing `time`
    fn monthly_peak(&self, time: OffsetDateTime) -> Option<f64> {
        let month = month_of(time);
        self.scheduled
            .values()
            .filter(|(start, _)| month_of(*start) == month)
            .map(|(_, power)| *power)
            .reduce(f64::max)
    }
}

fn month_of(time: OffsetDateTime) -> (i32, Month) {
    (time.year(), time.month())
}

impl Participant for BulkSupplier {
    fn name(&self) -> &str {
        &self.name
    }

    fn active_vertices(&self, interval: &TimeInterval) -> Curve {
        let start = interval.start;
        let vertices = self.base_vertices(self.rates.energy_price(start));
        let vertices = include_marginal_losses(&vertices, self.loss_factor, self.maximum_power);
        let vertices = include_demand_charges(
            &vertices,
            self.threshold.threshold(),
            self.rates.demand_rate(start),
        );

        Curve::new(vertices).unwrap_or_else(|err| {
            event!(
                Level::ERROR,
                supplier = %self.name,
                err = err.to_string(),
                "supplier offer is invalid, offering nothing"
            );
            Curve::inelastic(0.0, 0.0)
        })
    }

    fn scheduled_power(&self, interval: &TimeInterval) -> f64 {
        self.scheduled
            .get(&slot(interval))
            .map(|(_, power)| *power)
            .unwrap_or_default()
    }

    fn power_limits(&self) -> PowerLimits {
        PowerLimits::new(self.minimum_power, self.maximum_power)
    }

    fn schedule(&mut self, interval: &TimeInterval, price: f64) {
        let power = self
            .power_limits()
            .clamp(production(&self.active_vertices(interval), price));
        self.scheduled
            .insert(slot(interval), (interval.start, power));

        let peak = self.monthly_peak(interval.start);
        let metered = self.metered.take();
        self.threshold.update(interval.start, metered, peak);
    }

    fn release(&mut self, interval: &TimeInterval) {
        self.scheduled.shift_remove(&slot(interval));
    }
}

/// Errors building a bulk supplier
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum SupplierError {
    /// The loss model does not cover the supplier's capacity
    #[error(transparent)]
    Losses(#[from] TransformError),
    /// The demand threshold discount is not a fraction
    #[error("discount coefficient {0} must lie in [0, 1]")]
    InvalidCoefficient(f64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rates::MonthlyRate;
    use approx::assert_abs_diff_eq;
    use std::time::Duration;
    use time::macros::datetime;

    fn rates() -> RateTable {
        RateTable::flat(MonthlyRate {
            hlh_energy: 0.05,
            llh_energy: 0.03,
            demand_rate: 0.1,
        })
    }

    fn interval(start: OffsetDateTime) -> TimeInterval {
        TimeInterval::new(
            "day-ahead@2026-10-19T12:00:00Z",
            start,
            Duration::from_secs(3600),
        )
    }

    #[test]
    fn offer_without_losses_or_charges() {
        let supplier = BulkSupplier::new(
            "bpa",
            RateTable::flat(MonthlyRate {
                hlh_energy: 0.05,
                llh_energy: 0.03,
                demand_rate: 0.0,
            }),
            0.0,
            1000.0,
            DemandThreshold::new(0.0, 0.8),
        )
        .unwrap();

        // Monday noon is a heavy-load hour, Sunday noon is not
        let heavy = supplier.active_vertices(&interval(datetime!(2026-10-19 12:00 UTC)));
        let light = supplier.active_vertices(&interval(datetime!(2026-10-25 12:00 UTC)));
        assert_eq!(heavy.elastic_vertices()[0].marginal_price, 0.05);
        assert_eq!(light.elastic_vertices()[0].marginal_price, 0.03);
        assert_eq!(heavy.power_range(), (0.0, 1000.0));
    }

    #[test]
    fn demand_charge_steps_at_threshold() {
        let supplier = BulkSupplier::new(
            "bpa",
            rates(),
            0.0,
            1000.0,
            DemandThreshold::new(400.0, 0.8),
        )
        .unwrap();
        let curve = supplier.active_vertices(&interval(datetime!(2026-10-19 12:00 UTC)));
        let vertices = curve.elastic_vertices();
        assert_eq!(vertices.len(), 4);
        assert_eq!(vertices[1].power, 400.0);
        assert_eq!(vertices[2].power, 400.0);
        assert_abs_diff_eq!(
            vertices[2].marginal_price - vertices[1].marginal_price,
            0.1,
            epsilon = 1e-12
        );
    }

    #[test]
    fn losses_raise_price_toward_capacity() {
        let supplier = BulkSupplier::new(
            "bpa",
            rates(),
            0.02,
            1000.0,
            DemandThreshold::new(0.0, 0.8),
        )
        .unwrap();
        let curve = supplier.active_vertices(&interval(datetime!(2026-10-19 12:00 UTC)));
        let last = curve.elastic_vertices().last().copied().unwrap();
        assert!(last.marginal_price > 0.15);
        assert!(last.power < 1000.0);
    }

    #[test]
    fn scheduling_ratchets_threshold() {
        let mut supplier = BulkSupplier::new(
            "bpa",
            RateTable::flat(MonthlyRate {
                hlh_energy: 0.05,
                llh_energy: 0.05,
                demand_rate: 0.0,
            }),
            0.0,
            1000.0,
            DemandThreshold::new(0.0, 0.8),
        )
        .unwrap();
        let first = interval(datetime!(2026-10-19 12:00 UTC));
        // Above the flat price the supplier runs at capacity
        supplier.schedule(&first, 0.06);
        assert_eq!(supplier.scheduled_power(&first), 1000.0);
        assert_eq!(supplier.demand_threshold(), 1000.0);

        // The next month starts from a discounted threshold
        let next_month = interval(datetime!(2026-11-02 12:00 UTC));
        supplier.schedule(&next_month, 0.06);
        assert_eq!(supplier.demand_threshold(), 800.0);
    }

    #[test]
    fn month_boundary_discounts_once() {
        let mut supplier = BulkSupplier::new(
            "bpa",
            rates(),
            0.0,
            1000.0,
            DemandThreshold::new(1000.0, 0.8),
        )
        .unwrap();
        // One market's intervals on both sides of the month end
        let october = interval(datetime!(2026-10-31 23:00 UTC));
        let november = interval(datetime!(2026-11-01 00:00 UTC));

        // Below the energy price nothing is drawn, so only the discount moves the threshold
        for _clearing in 0..3 {
            supplier.schedule(&october, 0.01);
            supplier.schedule(&november, 0.01);
            assert_eq!(supplier.demand_threshold(), 800.0);
        }
        assert_eq!(supplier.scheduled_power(&november), 0.0);
    }

    #[rstest::rstest]
    #[case::loss_factor_too_large(0.6, 1000.0)]
    #[case::no_capacity(0.01, 0.0)]
    #[case::nan_loss_factor(f64::NAN, 1000.0)]
    fn rejects_unusable_loss_models(#[case] loss_factor: f64, #[case] maximum_power: f64) {
        let result = BulkSupplier::new(
            "bpa",
            rates(),
            loss_factor,
            maximum_power,
            DemandThreshold::new(0.0, 0.8),
        );
        assert!(matches!(result, Err(SupplierError::Losses(_))));
    }
}
