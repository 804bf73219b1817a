use tns_core::models::{Curve, CurveError, Map, TimeInterval, Vertex};
use tns_core::ports::{Participant, PowerLimits};
use tns_solver::curve::production;

use super::{Slot, slot};

/// A local asset offering the same curve in every interval.
///
/// A fixed load is an inelastic asset; a flexible load or generator offers an elastic
/// curve and is scheduled wherever the cleared price falls on it.
#[derive(Clone, Debug)]
pub struct LocalAsset {
    name: String,
    curve: Curve,
    limits: PowerLimits,
    scheduled: Map<Slot, f64>,
}

impl LocalAsset {
    /// An asset offering `curve` in every interval
    pub fn new(name: impl Into<String>, curve: Curve) -> Self {
        let (min, max) = curve.power_range();
        Self {
            name: name.into(),
            curve,
            limits: PowerLimits::new(min, max),
            scheduled: Map::default(),
        }
    }

    /// A load consuming `load` regardless of price
    pub fn fixed_load(name: impl Into<String>, load: f64) -> Self {
        Self::new(name, Curve::inelastic(-load, 0.0))
    }

    /// An asset offering the curve through `vertices`
    pub fn flexible(name: impl Into<String>, vertices: Vec<Vertex>) -> Result<Self, CurveError> {
        Ok(Self::new(name, Curve::new(vertices)?))
    }

    /// The offered curve
    pub fn curve(&self) -> &Curve {
        &self.curve
    }
}

impl Participant for LocalAsset {
    fn name(&self) -> &str {
        &self.name
    }

    fn active_vertices(&self, _interval: &TimeInterval) -> Curve {
        self.curve.clone()
    }

    fn scheduled_power(&self, interval: &TimeInterval) -> f64 {
        self.scheduled
            .get(&slot(interval))
            .copied()
            .unwrap_or_else(|| match self.curve {
                Curve::Inelastic { power, .. } => power,
                Curve::Elastic(_) => 0.0,
            })
    }

    fn power_limits(&self) -> PowerLimits {
        self.limits
    }

    fn schedule(&mut self, interval: &TimeInterval, price: f64) {
        let power = self.limits.clamp(production(&self.curve, price));
        self.scheduled.insert(slot(interval), power);
    }

    fn release(&mut self, interval: &TimeInterval) {
        self.scheduled.shift_remove(&slot(interval));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use time::macros::datetime;

    #[test]
    fn schedules_on_curve() {
        let interval = TimeInterval::new(
            "day-ahead@2026-10-19T12:00:00Z",
            datetime!(2026-10-19 13:00 UTC),
            Duration::from_secs(3600),
        );
        let mut asset = LocalAsset::flexible(
            "heat pump",
            vec![Vertex::new(0.02, -8.0, 0.0), Vertex::new(0.06, -2.0, 0.0)],
        )
        .unwrap();
        assert_eq!(asset.power_limits(), PowerLimits::new(-8.0, -2.0));
        assert_eq!(asset.scheduled_power(&interval), 0.0);

        asset.schedule(&interval, 0.04);
        assert_eq!(asset.scheduled_power(&interval), -5.0);

        asset.release(&interval);
        assert_eq!(asset.scheduled_power(&interval), 0.0);
    }

    #[test]
    fn fixed_load_is_inelastic() {
        let interval = TimeInterval::new(
            "day-ahead@2026-10-19T12:00:00Z",
            datetime!(2026-10-19 13:00 UTC),
            Duration::from_secs(3600),
        );
        let load = LocalAsset::fixed_load("lights", 3.0);
        assert!(load.active_vertices(&interval).is_inelastic());
        assert_eq!(load.scheduled_power(&interval), -3.0);
        assert!(!load.is_transactive());
    }
}
