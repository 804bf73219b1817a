use super::TransformError;
use tns_core::models::Vertex;
use tracing::{Level, event};

// Losses on a line grow with the square of the power it carries:
//
//   loss(p) = loss_factor * (|p| / maximum_power) * p
//
// so a supplier producing p delivers d = p - loss(p). Each delivered unit costs
// 1 / (dd/dp) = 1 / (1 - 2 * loss_factor * |p| / maximum_power) produced units,
// which scales the marginal price seen at the delivery end.

fn validate(loss_factor: f64, maximum_power: f64) -> Result<(), TransformError> {
    if !(maximum_power.is_finite() && maximum_power > 0.0) {
        return Err(TransformError::InvalidMaximumPower(maximum_power));
    }
    if !(loss_factor.is_finite() && (0.0..1.0).contains(&loss_factor)) {
        return Err(TransformError::InvalidLossFactor(loss_factor));
    }
    Ok(())
}

/// Translate vertices at the production end into vertices at the delivery end.
///
/// Power is reduced by the quadratic losses and price is raised by the marginal loss.
/// Costs are unchanged: the same production cost now buys less delivered power.
pub fn try_include_marginal_losses(
    vertices: &[Vertex],
    loss_factor: f64,
    maximum_power: f64,
) -> Result<Vec<Vertex>, TransformError> {
    validate(loss_factor, maximum_power)?;

    vertices
        .iter()
        .map(|v| {
            let ratio = loss_factor * v.power.abs() / maximum_power;
            let factor = 1.0 - 2.0 * ratio;
            if factor <= 0.0 {
                return Err(TransformError::BeyondCapacity(v.power));
            }
            Ok(Vertex::new(
                v.marginal_price / factor,
                v.power - ratio * v.power,
                v.cost,
            ))
        })
        .collect()
}

/// Translate delivery-end vertices back to the production end.
///
/// This inverts [`try_include_marginal_losses`] by solving the loss quadratic for the
/// produced power on its increasing branch.
pub fn try_remove_marginal_losses(
    vertices: &[Vertex],
    loss_factor: f64,
    maximum_power: f64,
) -> Result<Vec<Vertex>, TransformError> {
    validate(loss_factor, maximum_power)?;

    vertices
        .iter()
        .map(|v| {
            let discriminant = 1.0 - 4.0 * loss_factor * v.power.abs() / maximum_power;
            if discriminant < 0.0 {
                return Err(TransformError::BeyondCapacity(v.power));
            }
            // Rationalized root of the quadratic; exact as loss_factor -> 0
            let produced = 2.0 * v.power / (1.0 + discriminant.sqrt());
            let factor = 1.0 - 2.0 * loss_factor * produced.abs() / maximum_power;
            Ok(Vertex::new(v.marginal_price * factor, produced, v.cost))
        })
        .collect()
}

/// [`try_include_marginal_losses`], returning the vertices unchanged (with a warning)
/// when the loss parameters are invalid
pub fn include_marginal_losses(
    vertices: &[Vertex],
    loss_factor: f64,
    maximum_power: f64,
) -> Vec<Vertex> {
    try_include_marginal_losses(vertices, loss_factor, maximum_power).unwrap_or_else(|err| {
        event!(Level::WARN, err = err.to_string(), "marginal losses not applied");
        vertices.to_vec()
    })
}

/// [`try_remove_marginal_losses`], returning the vertices unchanged (with a warning)
/// when the loss parameters are invalid
pub fn remove_marginal_losses(
    vertices: &[Vertex],
    loss_factor: f64,
    maximum_power: f64,
) -> Vec<Vertex> {
    try_remove_marginal_losses(vertices, loss_factor, maximum_power).unwrap_or_else(|err| {
        event!(Level::WARN, err = err.to_string(), "marginal losses not removed");
        vertices.to_vec()
    })
}
