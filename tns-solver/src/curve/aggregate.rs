use super::{cost_at_power, production};
use tns_core::models::{Curve, ElasticCurve, Vertex};

// Relative offset separating the two sides of a vertical step
const EPSILON: f64 = 1e-6;

/// Aggregate the curves of several participants into the system curve.
///
/// Every vertex price of every elastic curve becomes a candidate price of the system
/// curve, and the system's power and cost at each candidate are the sums over all
/// participants. Inelastic participants shift the whole curve by their fixed power;
/// if every participant is inelastic, so is the result.
///
/// The returned curve never holds two vertices at the same price: a price shared by
/// two candidates (a vertical step) is kept twice at most, with the second copy
/// nudged up by a small epsilon so it lands on the far side of the step.
pub fn sum_vertices<'a>(curves: impl IntoIterator<Item = &'a Curve>) -> Curve {
    let curves = curves.into_iter().collect::<Vec<_>>();

    // An inelastic participant contributes a single infinite price point
    let mut prices = curves
        .iter()
        .flat_map(|curve| match curve {
            Curve::Elastic(curve) => curve
                .vertices()
                .iter()
                .map(|v| v.marginal_price)
                .collect::<Vec<_>>(),
            Curve::Inelastic { .. } => vec![f64::INFINITY],
        })
        .collect::<Vec<_>>();

    if prices.iter().all(|price| price.is_infinite()) {
        let (power, cost) = curves.iter().fold((0.0, 0.0), |(power, cost), curve| {
            let p = production(curve, 0.0);
            (power + p, cost + cost_at_power(curve, p))
        });
        return Curve::inelastic(power, cost);
    }

    prices.sort_by(f64::total_cmp);

    // No price may appear more than twice, and infinite points go away now that some
    // participant is known to respond to price
    let mut collapsed: Vec<f64> = Vec::with_capacity(prices.len());
    for price in prices {
        if price.is_infinite() {
            continue;
        }
        let n = collapsed.len();
        if n >= 2 && collapsed[n - 1] == price && collapsed[n - 2] == price {
            continue;
        }
        collapsed.push(price);
    }

    let mut vertices = Vec::with_capacity(collapsed.len());
    for (i, &candidate) in collapsed.iter().enumerate() {
        let price = if i > 0 && collapsed[i - 1] == candidate {
            let next = collapsed.get(i + 1).copied().unwrap_or(f64::INFINITY);
            let bumped = candidate + EPSILON * candidate.abs().max(1.0);
            if bumped < next {
                bumped
            } else {
                0.5 * (candidate + next)
            }
        } else {
            candidate
        };

        let (power, cost) = curves.iter().fold((0.0, 0.0), |(power, cost), curve| {
            let p = production(curve, price);
            (power + p, cost + cost_at_power(curve, p))
        });
        vertices.push(Vertex::new(price, power, cost));
    }

    // SAFETY: prices are finite and strictly increasing, and each participant's power is
    // non-decreasing in price, so the sums are ordered and monotone. At least two
    // vertices exist because any elastic participant contributes two prices.
    Curve::Elastic(unsafe { ElasticCurve::new_unchecked(vertices) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn curve(points: &[(f64, f64)]) -> Curve {
        Curve::new(
            points
                .iter()
                .map(|&(price, power)| Vertex::new(price, power, 0.0))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn elastic_plus_inelastic() {
        let a = curve(&[(0.02, 0.0), (0.05, 10.0)]);
        let b = Curve::inelastic(-4.0, 0.0);
        let system = sum_vertices([&a, &b]);

        let powers = system
            .elastic_vertices()
            .iter()
            .map(|v| v.power)
            .collect::<Vec<_>>();
        assert_eq!(powers, vec![-4.0, 6.0]);
        assert_eq!(system.elastic_vertices()[0].marginal_price, 0.02);
        assert_eq!(system.elastic_vertices()[1].marginal_price, 0.05);
    }

    #[test]
    fn all_inelastic_is_inelastic() {
        let system = sum_vertices([
            &Curve::inelastic(-4.0, 1.0),
            &Curve::inelastic(6.0, 2.0),
        ]);
        assert_eq!(system, Curve::inelastic(2.0, 3.0));
        assert_eq!(system.len(), 1);
    }

    #[test]
    fn no_participants() {
        assert_eq!(sum_vertices([]), Curve::inelastic(0.0, 0.0));
    }

    #[test]
    fn shared_prices_are_separated() {
        let a = curve(&[(0.03, -5.0), (0.05, 0.0)]);
        let b = curve(&[(0.03, 0.0), (0.05, 5.0)]);
        let c = curve(&[(0.03, 1.0), (0.04, 2.0)]);
        let system = sum_vertices([&a, &b, &c]);

        let vertices = system.elastic_vertices();
        assert!(
            vertices
                .windows(2)
                .all(|w| w[0].marginal_price < w[1].marginal_price)
        );
        // 0.03 appears three times but is kept only twice
        assert_eq!(
            vertices
                .iter()
                .filter(|v| (v.marginal_price - 0.03).abs() < 1e-4)
                .count(),
            2
        );
    }

    #[test]
    fn vertical_step_spans_both_sides() {
        // A perfectly elastic supplier at 0.04 between 0 and 10 kW, plus a fixed load
        let supply = curve(&[(0.04, 0.0), (0.04, 10.0)]);
        let load = Curve::inelastic(-3.0, 0.0);
        let system = sum_vertices([&supply, &load]);

        let vertices = system.elastic_vertices();
        assert_eq!(vertices.len(), 2);
        assert_eq!(vertices[0].power, -3.0);
        assert_eq!(vertices[1].power, 7.0);
        assert_abs_diff_eq!(vertices[1].marginal_price, 0.04, epsilon = 1e-5);
        assert!(vertices[1].marginal_price > vertices[0].marginal_price);
    }

    #[test]
    fn costs_are_summed() {
        let a = Curve::new(vec![
            Vertex::new(0.02, 0.0, 0.0),
            Vertex::new(0.05, 10.0, 0.35),
        ])
        .unwrap();
        let b = Curve::inelastic(-4.0, 0.5);
        let system = sum_vertices([&a, &b]);
        let top = system.elastic_vertices()[1];
        assert_abs_diff_eq!(top.cost, 0.85, epsilon = 1e-12);
    }
}
