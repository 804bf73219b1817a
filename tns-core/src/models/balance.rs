/// The aggregate power balance of a market interval at one price.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Balance {
    /// The price the balance was evaluated at
    pub price: f64,
    /// Generation minus consumption; zero when the interval is balanced
    pub net_power: f64,
    /// Total generation (sum of positive participant powers)
    pub generation: f64,
    /// Total consumption (sum of negative participant powers, so non-positive)
    pub demand: f64,
    /// Total production cost of every participant
    pub production_cost: f64,
    /// Total dual cost, i.e. production cost less the value of net power at `price`
    pub dual_cost: f64,
}

impl Balance {
    /// The normalized gap between production and dual cost.
    ///
    /// When the production cost vanishes the gap is reported unnormalized.
    pub fn duality_gap(&self) -> f64 {
        let gap = self.production_cost - self.dual_cost;
        if self.production_cost.abs() > f64::EPSILON {
            gap / self.production_cost
        } else {
            gap
        }
    }
}
