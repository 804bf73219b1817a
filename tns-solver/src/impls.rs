/// Clearing by interpolating the zero crossing of the aggregate curve
pub mod interpolation;

/// Clearing by subgradient search on the dual problem
pub mod subgradient;
