//! Pure functions over vertex lists and curves.
//!
//! Everything here is free of market state, so it can be used equally by the market
//! engine, by participants preparing their offers, and in tests.

mod aggregate;
mod demand_charges;
mod losses;
mod production;

pub use aggregate::sum_vertices;
pub use demand_charges::{
    include_demand_charges, remove_demand_charges, try_include_demand_charges,
    try_remove_demand_charges,
};
pub use losses::{
    include_marginal_losses, remove_marginal_losses, try_include_marginal_losses,
    try_remove_marginal_losses,
};
pub use production::{balance_at, cost_at_power, production, production_from_vertices};
pub use tns_core::models::order_vertices;

/// Errors in the inputs of a curve transform.
///
/// Transforms that hit one of these return their input unchanged and log a warning.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum TransformError {
    /// The maximum power is not a positive number
    #[error("maximum power {0} must be positive")]
    InvalidMaximumPower(f64),
    /// The loss factor is not a number in [0, 1)
    #[error("loss factor {0} must lie in [0, 1)")]
    InvalidLossFactor(f64),
    /// A vertex lies beyond the power at which marginal losses reach 100%
    #[error("power {0} is beyond the range the loss model covers")]
    BeyondCapacity(f64),
    /// The demand threshold is not finite
    #[error("demand threshold {0} is not finite")]
    InvalidThreshold(f64),
    /// The demand rate is not finite
    #[error("demand rate {0} is not finite")]
    InvalidRate(f64),
    /// No demand-charge step exists at the threshold
    #[error("no demand-charge step found at power {0}")]
    MissingThreshold(f64),
    /// There were no vertices to transform
    #[error("no vertices to transform")]
    Empty,
}
