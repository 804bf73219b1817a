use super::{TransformError, order_vertices};
use tns_core::models::Vertex;
use tracing::{Level, event};

// Tolerance used to recognize the step on removal
const TOLERANCE: f64 = 1e-9;

fn validate(vertices: &[Vertex], threshold: f64, rate: f64) -> Result<(), TransformError> {
    if vertices.is_empty() {
        return Err(TransformError::Empty);
    }
    if !threshold.is_finite() {
        return Err(TransformError::InvalidThreshold(threshold));
    }
    if !rate.is_finite() {
        return Err(TransformError::InvalidRate(rate));
    }
    Ok(())
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= TOLERANCE * a.abs().max(b.abs()).max(1.0)
}

// The (price, cost) of the curve at `power`, extending flat beyond the ends
fn at_power(vertices: &[Vertex], power: f64) -> (f64, f64) {
    let first = &vertices[0];
    let last = &vertices[vertices.len() - 1];
    if power <= first.power {
        return (
            first.marginal_price,
            first.cost + first.marginal_price * (power - first.power),
        );
    }
    if power >= last.power {
        return (
            last.marginal_price,
            last.cost + last.marginal_price * (power - last.power),
        );
    }
    for pair in vertices.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if a.power < power && power < b.power {
            let slope = (b.marginal_price - a.marginal_price) / (b.power - a.power);
            let dx = power - a.power;
            return (
                a.marginal_price + slope * dx,
                a.cost + a.marginal_price * dx + 0.5 * slope * dx * dx,
            );
        }
    }
    (last.marginal_price, last.cost)
}

/// Add a demand charge to the portion of a curve above a power threshold.
///
/// Every vertex above `threshold` has `rate` added to its price (and the charge on the
/// excess added to its cost). A step is inserted at the threshold: a pre-charge
/// breakpoint (unless a vertex already sits there) and a post-charge breakpoint
/// `rate` higher. A threshold beyond either end of the curve extends the curve to
/// reach it at the boundary price.
pub fn try_include_demand_charges(
    vertices: &[Vertex],
    threshold: f64,
    rate: f64,
) -> Result<Vec<Vertex>, TransformError> {
    validate(vertices, threshold, rate)?;
    let ordered = order_vertices(vertices.to_vec());
    if rate == 0.0 {
        return Ok(ordered);
    }

    let existing = ordered.iter().rposition(|v| v.power == threshold);

    let mut charged = Vec::with_capacity(ordered.len() + 2);
    for v in ordered.iter() {
        if v.power > threshold {
            charged.push(Vertex::new(
                v.marginal_price + rate,
                v.power,
                v.cost + rate * (v.power - threshold),
            ));
        } else {
            charged.push(*v);
        }
    }

    let (price, cost) = match existing {
        Some(index) => (ordered[index].marginal_price, ordered[index].cost),
        None => {
            let (price, cost) = at_power(&ordered, threshold);
            charged.push(Vertex::new(price, threshold, cost));
            (price, cost)
        }
    };
    charged.push(Vertex::new(price + rate, threshold, cost));

    Ok(order_vertices(charged))
}

/// Remove a demand charge added by [`try_include_demand_charges`] with the same
/// threshold and rate.
///
/// Every original vertex is restored. The pre-charge breakpoint at the threshold is
/// kept, as it cannot be told apart from an original vertex there; when include
/// inserted it, it lies on the original curve or extends one of its ends.
pub fn try_remove_demand_charges(
    vertices: &[Vertex],
    threshold: f64,
    rate: f64,
) -> Result<Vec<Vertex>, TransformError> {
    validate(vertices, threshold, rate)?;
    let mut ordered = order_vertices(vertices.to_vec());
    if rate == 0.0 {
        return Ok(ordered);
    }

    // The step: two consecutive breakpoints at the threshold, `rate` apart in price
    let post = (1..ordered.len())
        .find(|&i| {
            let (pre, post) = (&ordered[i - 1], &ordered[i]);
            pre.power == threshold
                && post.power == threshold
                && close(post.marginal_price - pre.marginal_price, rate)
        })
        .ok_or(TransformError::MissingThreshold(threshold))?;
    ordered.remove(post);

    for v in ordered.iter_mut() {
        if v.power > threshold {
            v.marginal_price -= rate;
            v.cost -= rate * (v.power - threshold);
        }
    }

    Ok(order_vertices(ordered))
}

/// [`try_include_demand_charges`], returning the vertices unchanged (with a warning)
/// on invalid input
pub fn include_demand_charges(vertices: &[Vertex], threshold: f64, rate: f64) -> Vec<Vertex> {
    try_include_demand_charges(vertices, threshold, rate).unwrap_or_else(|err| {
        event!(Level::WARN, err = err.to_string(), "demand charges not applied");
        vertices.to_vec()
    })
}

/// [`try_remove_demand_charges`], returning the vertices unchanged (with a warning)
/// on invalid input
pub fn remove_demand_charges(vertices: &[Vertex], threshold: f64, rate: f64) -> Vec<Vertex> {
    try_remove_demand_charges(vertices, threshold, rate).unwrap_or_else(|err| {
        event!(Level::WARN, err = err.to_string(), "demand charges not removed");
        vertices.to_vec()
    })
}
