use crate::{Clearing, ClearingError, ClearingMethod, curve};
use tns_core::models::{ClearingConfig, Curve};
use tracing::{Level, event};

/// Clears an interval by subgradient search on the price.
///
/// Starting from the interval's current price (or the middle of the system curve's
/// price range), each iteration evaluates the balance and moves the price against the
/// net power, normalized by the total power in play, with a step shrinking as
/// `step_scale / (10 + k)`. The search ends when the duality gap falls within
/// `threshold`.
#[derive(Clone, Copy, Debug)]
pub struct Subgradient {
    /// Convergence threshold on the absolute duality gap
    pub threshold: f64,
    /// Scale of the price step
    pub step_scale: f64,
    /// Iterations to attempt before giving up
    pub max_iterations: usize,
}

impl Default for Subgradient {
    fn default() -> Self {
        Self::from(&ClearingConfig::default())
    }
}

impl From<&ClearingConfig> for Subgradient {
    fn from(config: &ClearingConfig) -> Self {
        Self {
            threshold: config.duality_gap_threshold,
            step_scale: config.step_scale,
            max_iterations: config.max_iterations,
        }
    }
}

impl ClearingMethod for Subgradient {
    fn clear(
        &self,
        curves: &[Curve],
        initial_price: Option<f64>,
    ) -> Result<Clearing, ClearingError> {
        let system = curve::sum_vertices(curves);

        let mut price = match (initial_price, &system) {
            (Some(price), _) if price.is_finite() => price,
            (_, Curve::Elastic(elastic)) => {
                let (low, high) = elastic.price_range();
                0.5 * (low + high)
            }
            (_, Curve::Inelastic { .. }) => 0.0,
        };

        let mut balance = curve::balance_at(curves, price);
        for k in 0..self.max_iterations {
            balance = curve::balance_at(curves, price);
            if balance.duality_gap().abs() <= self.threshold {
                event!(
                    Level::DEBUG,
                    price,
                    iterations = k,
                    "subgradient search converged"
                );
                return Ok(Clearing { balance, system });
            }

            // `demand` is non-positive, so this is the total power in play
            let total = balance.generation - balance.demand;
            if total <= 0.0 {
                let (min, max) = system.power_range();
                return Err(ClearingError::NoBalance { min, max });
            }

            price -= self.step_scale / (10.0 + k as f64) * balance.net_power / total;
        }

        Err(ClearingError::DidNotConverge {
            price,
            duality_gap: balance.duality_gap(),
            iterations: self.max_iterations,
        })
    }
}
