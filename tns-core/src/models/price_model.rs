use super::ConfigError;

/// The learned price statistics for one hour of the day.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HourlyPrice {
    /// Mean cleared price
    pub mean: f64,
    /// Standard deviation of the cleared price
    pub std_dev: f64,
}

/// A forecast of marginal price by hour of day.
///
/// The model is carried from market to market within a series and blended with every
/// delivered price. It serializes as 48 floats: the mean and standard deviation of
/// hour 0, then of hour 1, and so on.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "Vec<f64>", into = "Vec<f64>")
)]
pub struct PriceModel {
    hours: [HourlyPrice; 24],
}

impl PriceModel {
    /// The number of floats in the flat representation
    pub const LEN: usize = 48;

    /// A model predicting the same price at every hour, with no spread
    pub fn uniform(price: f64) -> Self {
        Self {
            hours: [HourlyPrice {
                mean: price,
                std_dev: 0.0,
            }; 24],
        }
    }

    /// Parse the flat `[mean0, std0, mean1, std1, ...]` representation
    pub fn from_values(values: &[f64]) -> Result<Self, ConfigError> {
        if values.len() != Self::LEN {
            return Err(ConfigError::PriceModelLength(values.len()));
        }
        if values.iter().any(|x| !x.is_finite()) {
            return Err(ConfigError::PriceModelValue);
        }

        let mut hours = [HourlyPrice::default(); 24];
        for (hour, pair) in hours.iter_mut().zip(values.chunks_exact(2)) {
            if pair[1] < 0.0 {
                return Err(ConfigError::PriceModelValue);
            }
            *hour = HourlyPrice {
                mean: pair[0],
                std_dev: pair[1],
            };
        }
        Ok(Self { hours })
    }

    /// The flat `[mean0, std0, mean1, std1, ...]` representation
    pub fn values(&self) -> Vec<f64> {
        self.hours
            .iter()
            .flat_map(|h| [h.mean, h.std_dev])
            .collect()
    }

    /// The statistics for an hour of the day (taken modulo 24)
    pub fn hourly(&self, hour: u8) -> HourlyPrice {
        self.hours[usize::from(hour) % 24]
    }

    /// The expected price at an hour of the day
    pub fn forecast(&self, hour: u8) -> f64 {
        self.hourly(hour).mean
    }

    /// Blend a delivered price into the statistics for its hour.
    ///
    /// `memory` is the effective number of observations the model remembers; each new
    /// price carries weight `1/memory`.
    pub fn update(&mut self, hour: u8, price: f64, memory: f64) {
        if !price.is_finite() {
            return;
        }
        let alpha = 1.0 / memory.max(1.0);
        let slot = &mut self.hours[usize::from(hour) % 24];
        let delta = price - slot.mean;
        let variance = (1.0 - alpha) * (slot.std_dev.powi(2) + alpha * delta.powi(2));
        slot.mean += alpha * delta;
        slot.std_dev = variance.sqrt();
    }
}

impl TryFrom<Vec<f64>> for PriceModel {
    type Error = ConfigError;

    fn try_from(value: Vec<f64>) -> Result<Self, Self::Error> {
        Self::from_values(&value)
    }
}

impl From<PriceModel> for Vec<f64> {
    fn from(value: PriceModel) -> Self {
        value.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_roundtrip_layout() {
        let mut values = vec![0.0; 48];
        values[2] = 0.07; // mean of hour 1
        values[3] = 0.01; // std of hour 1
        let model = PriceModel::from_values(&values).unwrap();
        assert_eq!(model.forecast(1), 0.07);
        assert_eq!(model.hourly(1).std_dev, 0.01);
        assert_eq!(model.values(), values);
    }

    #[test]
    fn test_rejects_bad_length() {
        assert_eq!(
            PriceModel::from_values(&[0.0; 47]).unwrap_err(),
            ConfigError::PriceModelLength(47)
        );
    }

    #[test]
    fn test_rejects_negative_spread() {
        let mut values = vec![0.05; 48];
        values[5] = -1.0;
        assert_eq!(
            PriceModel::from_values(&values).unwrap_err(),
            ConfigError::PriceModelValue
        );
    }

    #[test]
    fn test_update_blends() {
        let mut model = PriceModel::uniform(0.05);
        model.update(13, 0.15, 10.0);
        let hour = model.hourly(13);
        assert!((hour.mean - 0.06).abs() < 1e-12);
        assert!(hour.std_dev > 0.0);
        // Other hours are untouched
        assert_eq!(model.hourly(12), HourlyPrice { mean: 0.05, std_dev: 0.0 });
    }

    #[test]
    fn test_update_with_unit_memory_replaces() {
        let mut model = PriceModel::uniform(0.05);
        model.update(0, 0.2, 1.0);
        assert_eq!(model.forecast(0), 0.2);
        assert_eq!(model.hourly(0).std_dev, 0.0);
    }
}
