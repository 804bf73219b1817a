//! Offer curves exchanged between participants and the market.
//!
//! A participant either responds to price ([`Curve::Elastic`]), in which case its
//! net power is a piecewise-linear function of price defined by two or more vertices,
//! or it does not ([`Curve::Inelastic`]), in which case it offers one fixed power
//! whatever the price.

use super::{Vertex, order_vertices};

/// A participant's net-power-vs-price offer for one time interval.
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "CurveDto", into = "CurveDto")
)]
#[derive(Clone, Debug, PartialEq)]
pub enum Curve {
    /// A price-responsive curve with at least two vertices
    Elastic(ElasticCurve),
    /// A fixed power, independent of price
    Inelastic {
        /// The net power (generation positive)
        power: f64,
        /// The production cost of that power
        cost: f64,
    },
}

impl Curve {
    /// Builds a curve from raw vertices.
    ///
    /// A single vertex describes an inelastic participant regardless of its price,
    /// while two or more vertices must form a valid [`ElasticCurve`].
    pub fn new(vertices: Vec<Vertex>) -> Result<Self, CurveError> {
        match vertices.as_slice() {
            [] => Err(CurveError::Empty),
            [vertex] => {
                if vertex.power.is_nan() || vertex.cost.is_nan() {
                    Err(CurveError::NaN)
                } else if vertex.power.is_infinite() || vertex.cost.is_infinite() {
                    Err(CurveError::Infinity)
                } else {
                    Ok(Self::inelastic(vertex.power, vertex.cost))
                }
            }
            _ => Ok(Self::Elastic(ElasticCurve::new(vertices)?)),
        }
    }

    /// A price-insensitive curve at the given power
    pub fn inelastic(power: f64, cost: f64) -> Self {
        Self::Inelastic { power, cost }
    }

    /// True when the curve does not respond to price
    pub fn is_inelastic(&self) -> bool {
        matches!(self, Self::Inelastic { .. })
    }

    /// The number of vertices needed to describe the curve
    pub fn len(&self) -> usize {
        match self {
            Self::Elastic(curve) => curve.vertices().len(),
            Self::Inelastic { .. } => 1,
        }
    }

    /// Curves are never empty; provided for symmetry with `len`
    pub fn is_empty(&self) -> bool {
        false
    }

    /// The vertices of a price-responsive curve, or an empty slice for an inelastic one
    pub fn elastic_vertices(&self) -> &[Vertex] {
        match self {
            Self::Elastic(curve) => curve.vertices(),
            Self::Inelastic { .. } => &[],
        }
    }

    /// The range of power the curve spans, as `(min, max)`
    pub fn power_range(&self) -> (f64, f64) {
        match self {
            Self::Elastic(curve) => curve.power_range(),
            Self::Inelastic { power, .. } => (*power, *power),
        }
    }
}

impl From<ElasticCurve> for Curve {
    fn from(value: ElasticCurve) -> Self {
        Self::Elastic(value)
    }
}

/// A validated, price-responsive curve.
///
/// The vertices are held in [`order_vertices`] order, all coordinates are finite,
/// and net power never decreases as price increases.
#[derive(Clone, Debug, PartialEq)]
pub struct ElasticCurve(Vec<Vertex>);

impl ElasticCurve {
    /// Creates a new curve from a vector of vertices, validating all constraints
    pub fn new(vertices: Vec<Vertex>) -> Result<Self, CurveError> {
        if vertices.len() < 2 {
            return Err(CurveError::TooFewVertices);
        }

        for vertex in vertices.iter() {
            if vertex.is_nan() {
                return Err(CurveError::NaN);
            }
            if vertex.marginal_price.is_infinite()
                || vertex.power.is_infinite()
                || vertex.cost.is_infinite()
            {
                return Err(CurveError::Infinity);
            }
        }

        let vertices = order_vertices(vertices);

        // Ordered by price, the power must be weakly increasing as well
        if vertices.windows(2).any(|pair| pair[1].power < pair[0].power) {
            return Err(CurveError::NonMonotone);
        }

        Ok(Self(vertices))
    }

    /// Creates a new curve without validating the vertices
    ///
    /// # Safety
    ///
    /// The caller must guarantee that the vertices satisfy every requirement checked by
    /// [`ElasticCurve::new`], including the ordering. Downstream interpolation assumes
    /// ordered, monotone vertices and will silently produce wrong answers otherwise.
    pub unsafe fn new_unchecked(vertices: Vec<Vertex>) -> Self {
        Self(vertices)
    }

    /// The ordered vertices
    pub fn vertices(&self) -> &[Vertex] {
        &self.0
    }

    /// Consumes the curve, returning its ordered vertices
    pub fn into_vertices(self) -> Vec<Vertex> {
        self.0
    }

    /// The lowest and highest marginal price
    pub fn price_range(&self) -> (f64, f64) {
        // A valid curve always holds at least two vertices
        let first = self.0[0].marginal_price;
        let last = self.0[self.0.len() - 1].marginal_price;
        (first, last)
    }

    /// The lowest and highest power
    pub fn power_range(&self) -> (f64, f64) {
        (self.0[0].power, self.0[self.0.len() - 1].power)
    }
}

/// Errors that can occur when constructing a curve
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum CurveError {
    /// Error when no vertices are provided
    #[error("No vertices provided")]
    Empty,
    /// Error when an elastic curve is built from a single vertex
    #[error("An elastic curve needs at least two vertices")]
    TooFewVertices,
    /// Error when any coordinate value is NaN
    #[error("NaN value encountered")]
    NaN,
    /// Error when a vertex of an elastic curve has an infinite coordinate
    #[error("Prices, powers and costs cannot be infinite")]
    Infinity,
    /// Error when net power falls as price rises
    #[error("Power must not decrease as price increases")]
    NonMonotone,
}

/// DTO to ensure that we always validate when we deserialize from an untrusted source.
///
/// Elastic curves travel as a list of vertices, inelastic ones as a `{power, cost}` map.
#[cfg_attr(feature = "serde", derive(serde::Serialize), serde(untagged))]
#[derive(Debug)]
pub enum CurveDto {
    /// A list of vertices
    Vertices(Vec<Vertex>),
    /// A fixed power
    Fixed {
        /// The net power
        power: f64,
        /// The production cost of that power
        #[cfg_attr(feature = "serde", serde(default))]
        cost: f64,
    },
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for CurveDto {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(serde::Deserialize)]
        struct Fixed {
            power: f64,
            #[serde(default)]
            cost: f64,
        }

        serde_untagged::UntaggedEnumVisitor::new()
            .seq(|seq| seq.deserialize().map(CurveDto::Vertices))
            .map(|map| {
                map.deserialize()
                    .map(|Fixed { power, cost }| CurveDto::Fixed { power, cost })
            })
            .deserialize(deserializer)
    }
}

impl TryFrom<CurveDto> for Curve {
    type Error = CurveError;

    fn try_from(value: CurveDto) -> Result<Self, Self::Error> {
        match value {
            CurveDto::Vertices(vertices) => Curve::new(vertices),
            CurveDto::Fixed { power, cost } => Curve::new(vec![Vertex::new(0.0, power, cost)]),
        }
    }
}

impl From<Curve> for CurveDto {
    fn from(value: Curve) -> Self {
        match value {
            Curve::Elastic(curve) => CurveDto::Vertices(curve.into_vertices()),
            Curve::Inelastic { power, cost } => CurveDto::Fixed { power, cost },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(price: f64, power: f64) -> Vertex {
        Vertex::new(price, power, 0.0)
    }

    #[test]
    fn test_empty_curve() {
        assert_eq!(Curve::new(vec![]).unwrap_err(), CurveError::Empty);
    }

    #[test]
    fn test_single_vertex_is_inelastic() {
        let curve = Curve::new(vec![Vertex::new(f64::INFINITY, -4.0, 1.5)]).unwrap();
        assert_eq!(curve, Curve::inelastic(-4.0, 1.5));
        assert!(curve.is_inelastic());
        assert_eq!(curve.len(), 1);

        // A finite price on a lone vertex carries no information either
        let curve = Curve::new(vec![v(0.05, 2.0)]).unwrap();
        assert!(curve.is_inelastic());
    }

    #[test]
    fn test_elastic_is_ordered() {
        let curve = Curve::new(vec![v(0.05, 10.0), v(0.02, 0.0)]).unwrap();
        assert_eq!(curve.elastic_vertices(), &[v(0.02, 0.0), v(0.05, 10.0)]);
        assert_eq!(curve.power_range(), (0.0, 10.0));
    }

    #[test]
    fn test_infinite_price_needs_single_vertex() {
        assert_eq!(
            Curve::new(vec![v(f64::INFINITY, 1.0), v(0.1, 2.0)]).unwrap_err(),
            CurveError::Infinity
        );
    }

    #[test]
    fn test_nan_values() {
        assert_eq!(
            Curve::new(vec![v(f64::NAN, 1.0), v(0.1, 2.0)]).unwrap_err(),
            CurveError::NaN
        );
        assert_eq!(
            Curve::new(vec![v(0.1, f64::NAN)]).unwrap_err(),
            CurveError::NaN
        );
    }

    #[test]
    fn test_non_monotone() {
        assert_eq!(
            Curve::new(vec![v(0.01, 5.0), v(0.02, 1.0)]).unwrap_err(),
            CurveError::NonMonotone
        );
    }

    #[test]
    fn test_vertical_segment_is_valid() {
        // Perfectly elastic supply: every power between 0 and 10 at one price
        let curve = Curve::new(vec![v(0.04, 10.0), v(0.04, 0.0)]).unwrap();
        assert_eq!(curve.elastic_vertices(), &[v(0.04, 0.0), v(0.04, 10.0)]);
    }

    #[test]
    fn test_deserialize_vertices() {
        let raw = r#"[
            { "marginal_price": 0.02, "power": 0.0, "cost": 0.0 },
            { "marginal_price": 0.05, "power": 10.0 }
        ]"#;
        let curve = serde_json::from_str::<Curve>(raw).unwrap();
        assert_eq!(curve.len(), 2);
    }

    #[test]
    fn test_deserialize_fixed() {
        let raw = r#"{ "power": -4.0 }"#;
        let curve = serde_json::from_str::<Curve>(raw).unwrap();
        assert_eq!(curve, Curve::inelastic(-4.0, 0.0));
    }

    #[test]
    fn test_deserialize_rejects_invalid() {
        let raw = r#"[
            { "marginal_price": 0.02, "power": 5.0 },
            { "marginal_price": 0.05, "power": 1.0 }
        ]"#;
        assert!(serde_json::from_str::<Curve>(raw).is_err());
    }
}
