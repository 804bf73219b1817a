/**
 * The vertex-curve algebra: interpolation, aggregation and tariff transforms.
 */
pub mod curve;

/**
 * These are implementations of the clearing methods.
 */
mod impls;
pub use impls::*;

use tns_core::models::{Balance, ClearingConfig, ClearingMethodKind, Curve};

/// The result of clearing one interval
#[derive(Clone, Debug, PartialEq)]
pub struct Clearing {
    /// The balance at the cleared price (the price itself is `balance.price`)
    pub balance: Balance,
    /// The aggregate system curve the price was cleared against
    pub system: Curve,
}

/// The ClearingMethod trait defines the interface for price-clearing algorithms.
///
/// A ClearingMethod takes the offer curves of every participant in an interval and
/// finds the marginal price at which generation meets demand.
///
/// Implementations differ in how they search for that price; the market engine is
/// indifferent to which one it is given.
pub trait ClearingMethod {
    /// Clear one interval
    ///
    /// # Parameters
    /// * `curves` - The offer curve of every participant
    /// * `initial_price` - The interval's current price, used as a starting point
    ///
    /// # Returns
    /// * `Clearing` - The cleared price, the balance there, and the system curve
    fn clear(&self, curves: &[Curve], initial_price: Option<f64>)
    -> Result<Clearing, ClearingError>;
}

/// Build the clearing method a configuration asks for
pub fn clearing_method(config: &ClearingConfig) -> Box<dyn ClearingMethod> {
    match config.method {
        ClearingMethodKind::Interpolation => Box::new(interpolation::Interpolation),
        ClearingMethodKind::Subgradient => Box::new(subgradient::Subgradient::from(config)),
    }
}

/// Reasons an interval cannot be cleared. All of them leave the prior price in place.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ClearingError {
    /// No price balances the interval: the aggregate curve never crosses zero power
    #[error("no feasible balance point (net power spans {min} to {max})")]
    NoBalance {
        /// Lowest aggregate net power
        min: f64,
        /// Highest aggregate net power
        max: f64,
    },
    /// The bracketing vertices have the same power, so no unique price exists
    #[error("price not unique between {lower} and {upper}")]
    PriceNotUnique {
        /// Lower price of the bracket
        lower: f64,
        /// Upper price of the bracket
        upper: f64,
    },
    /// Subgradient search ran out of iterations
    #[error("no convergence after {iterations} iterations (price {price}, gap {duality_gap})")]
    DidNotConverge {
        /// The last price tried
        price: f64,
        /// The duality gap at that price
        duality_gap: f64,
        /// The iterations spent
        iterations: usize,
    },
}
