use crate::{Clearing, ClearingError, ClearingMethod, curve};
use tns_core::models::Curve;
use tracing::{Level, event};

/// Clears an interval by linear interpolation of the aggregate system curve.
///
/// The system curve is scanned for the last vertex that consumes (power below zero)
/// and the first that does not. The price is interpolated between the two to the
/// point of zero net power. This is exact for piecewise-linear curves and needs no
/// starting price, so it is the default method.
#[derive(Clone, Copy, Debug, Default)]
pub struct Interpolation;

impl ClearingMethod for Interpolation {
    fn clear(
        &self,
        curves: &[Curve],
        _initial_price: Option<f64>,
    ) -> Result<Clearing, ClearingError> {
        let system = curve::sum_vertices(curves);
        let vertices: &[_] = match &system {
            Curve::Elastic(elastic) => elastic.vertices(),
            // A fully inelastic system has no price sensitivity to balance on
            Curve::Inelastic { power, .. } => {
                return Err(ClearingError::NoBalance {
                    min: *power,
                    max: *power,
                });
            }
        };

        let lower = vertices.iter().rev().find(|v| v.power < 0.0);
        let upper = vertices.iter().find(|v| v.power >= 0.0);

        let (Some(lower), Some(upper)) = (lower, upper) else {
            let (min, max) = system.power_range();
            return Err(ClearingError::NoBalance { min, max });
        };

        let span = upper.power - lower.power;
        let price = lower.marginal_price
            - (upper.marginal_price - lower.marginal_price) * lower.power / span;
        if span == 0.0 || !price.is_finite() {
            return Err(ClearingError::PriceNotUnique {
                lower: lower.marginal_price,
                upper: upper.marginal_price,
            });
        }

        let balance = curve::balance_at(curves, price);
        event!(
            Level::DEBUG,
            price,
            net_power = balance.net_power,
            "interpolated clearing price"
        );
        Ok(Clearing { balance, system })
    }
}
