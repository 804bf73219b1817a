use std::cmp::Ordering;

/// A breakpoint of a piecewise-linear net-power-vs-price curve.
///
/// Power follows the generation-positive convention: a vertex with positive power
/// describes a participant injecting power into the node at the given marginal price,
/// negative power describes consumption.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Vertex {
    /// The marginal price (value per unit energy) at this breakpoint
    pub marginal_price: f64,
    /// The net power at this breakpoint (generation positive)
    pub power: f64,
    /// The production cost accumulated up to this breakpoint
    #[cfg_attr(feature = "serde", serde(default))]
    pub cost: f64,
}

impl Vertex {
    /// Create a new vertex
    pub fn new(marginal_price: f64, power: f64, cost: f64) -> Self {
        Self {
            marginal_price,
            power,
            cost,
        }
    }

    /// True if any coordinate is NaN
    pub fn is_nan(&self) -> bool {
        self.marginal_price.is_nan() || self.power.is_nan() || self.cost.is_nan()
    }

    // Price first, then power. `total_cmp` keeps the ordering total even for odd inputs.
    pub(crate) fn order(&self, other: &Self) -> Ordering {
        self.marginal_price
            .total_cmp(&other.marginal_price)
            .then(self.power.total_cmp(&other.power))
    }
}

/// Order a set of vertices by ascending price, then ascending power.
///
/// The sort is stable, so vertices that compare equal keep their relative order,
/// and applying it twice yields the same sequence.
pub fn order_vertices(mut vertices: Vec<Vertex>) -> Vec<Vertex> {
    vertices.sort_by(Vertex::order);
    vertices
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(price: f64, power: f64) -> Vertex {
        Vertex::new(price, power, 0.0)
    }

    #[test]
    fn orders_by_price_then_power() {
        let ordered = order_vertices(vec![v(0.05, 10.0), v(0.02, 5.0), v(0.02, -1.0)]);
        assert_eq!(ordered, vec![v(0.02, -1.0), v(0.02, 5.0), v(0.05, 10.0)]);
    }

    #[test]
    fn ordering_is_idempotent() {
        let once = order_vertices(vec![
            v(0.3, 1.0),
            v(0.1, 4.0),
            v(0.2, -2.0),
            v(0.1, 4.0),
            v(f64::INFINITY, 0.0),
        ]);
        let twice = order_vertices(once.clone());
        assert_eq!(once, twice);
        assert!(
            once.windows(2)
                .all(|w| w[0].marginal_price <= w[1].marginal_price)
        );
    }

    #[test]
    fn ordering_is_stable_for_equal_keys() {
        let a = Vertex::new(0.1, 1.0, 3.0);
        let b = Vertex::new(0.1, 1.0, 7.0);
        assert_eq!(order_vertices(vec![a, b]), vec![a, b]);
        assert_eq!(order_vertices(vec![b, a]), vec![b, a]);
    }
}
