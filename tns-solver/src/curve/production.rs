use tns_core::models::{Balance, Curve, Vertex};

/// The net power a curve offers at `price`.
///
/// Outside the curve's price range the nearest boundary power applies; inside it the
/// power is interpolated linearly between the bracketing vertices. At a price shared
/// by several vertices (a vertical step) the first of them wins. Inelastic curves
/// return their power at every price.
pub fn production(curve: &Curve, price: f64) -> f64 {
    match curve {
        Curve::Elastic(curve) => production_from_vertices(curve.vertices(), price),
        Curve::Inelastic { power, .. } => *power,
    }
}

/// [`production`] over raw vertices, which must already be in price order.
///
/// Returns 0 for an empty slice.
pub fn production_from_vertices(vertices: &[Vertex], price: f64) -> f64 {
    let (Some(first), Some(last)) = (vertices.first(), vertices.last()) else {
        return 0.0;
    };

    if price < first.marginal_price {
        return first.power;
    }
    if price > last.marginal_price {
        return last.power;
    }

    for pair in vertices.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if a.marginal_price <= price && price <= b.marginal_price {
            if price == a.marginal_price {
                return a.power;
            }
            if price == b.marginal_price {
                return b.power;
            }
            let slope = (b.power - a.power) / (b.marginal_price - a.marginal_price);
            return a.power + slope * (price - a.marginal_price);
        }
    }

    // Only reachable for a single vertex or a NaN price
    if vertices.len() == 1 {
        first.power
    } else {
        last.power
    }
}

/// The production cost of running a curve's participant at `power`.
///
/// The cost is anchored at the vertices' own costs and integrates the marginal price
/// between them, which is quadratic in power along a sloped segment. Beyond the ends
/// of the curve the boundary price is extrapolated.
pub fn cost_at_power(curve: &Curve, power: f64) -> f64 {
    let vertices = match curve {
        Curve::Elastic(curve) => curve.vertices(),
        Curve::Inelastic { cost, .. } => return *cost,
    };

    let first = &vertices[0];
    let last = &vertices[vertices.len() - 1];

    if power <= first.power {
        return first.cost + first.marginal_price * (power - first.power);
    }
    if power >= last.power {
        return last.cost + last.marginal_price * (power - last.power);
    }

    for pair in vertices.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if a.power <= power && power <= b.power && a.power < b.power {
            let slope = (b.marginal_price - a.marginal_price) / (b.power - a.power);
            let dx = power - a.power;
            return a.cost + a.marginal_price * dx + 0.5 * slope * dx * dx;
        }
    }

    last.cost
}

/// Evaluate the power balance of a set of curves at a price
pub fn balance_at<'a>(curves: impl IntoIterator<Item = &'a Curve>, price: f64) -> Balance {
    let mut balance = Balance {
        price,
        ..Default::default()
    };

    for curve in curves {
        let power = production(curve, price);
        if power > 0.0 {
            balance.generation += power;
        } else {
            balance.demand += power;
        }
        balance.production_cost += cost_at_power(curve, power);
    }

    balance.net_power = balance.generation + balance.demand;
    balance.dual_cost = balance.production_cost - price * balance.net_power;
    balance
}
