use time::{Month, OffsetDateTime, Weekday};

/// The tariff for one calendar month
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MonthlyRate {
    /// Energy price during heavy-load hours
    pub hlh_energy: f64,
    /// Energy price during light-load hours
    pub llh_energy: f64,
    /// Price per unit of peak demand above the threshold
    #[cfg_attr(feature = "serde", serde(default))]
    pub demand_rate: f64,
}

/// A bulk supplier's rate table: one [`MonthlyRate`] per calendar month.
///
/// Serializes as a list of twelve monthly rates, January first.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "Vec<MonthlyRate>", into = "Vec<MonthlyRate>")
)]
pub struct RateTable {
    months: [MonthlyRate; 12],
}

impl RateTable {
    /// Build a table from twelve monthly rates, January first
    pub fn new(months: Vec<MonthlyRate>) -> Result<Self, RateTableError> {
        let months: [MonthlyRate; 12] = months
            .try_into()
            .map_err(|months: Vec<MonthlyRate>| RateTableError::WrongLength(months.len()))?;

        for (index, rate) in months.iter().enumerate() {
            let month = index + 1;
            for value in [rate.hlh_energy, rate.llh_energy] {
                if !value.is_finite() {
                    return Err(RateTableError::InvalidEnergyPrice { month, value });
                }
            }
            if !(rate.demand_rate.is_finite() && rate.demand_rate >= 0.0) {
                return Err(RateTableError::InvalidDemandRate {
                    month,
                    value: rate.demand_rate,
                });
            }
        }
        Ok(Self { months })
    }

    /// The same rate in every month
    pub fn flat(rate: MonthlyRate) -> Self {
        Self { months: [rate; 12] }
    }

    /// The rate for a calendar month
    pub fn month(&self, month: Month) -> &MonthlyRate {
        &self.months[usize::from(u8::from(month)) - 1]
    }

    /// The energy price in effect at `time`
    pub fn energy_price(&self, time: OffsetDateTime) -> f64 {
        let rate = self.month(time.month());
        if is_heavy_load_hour(time) {
            rate.hlh_energy
        } else {
            rate.llh_energy
        }
    }

    /// The demand rate in effect at `time`
    pub fn demand_rate(&self, time: OffsetDateTime) -> f64 {
        self.month(time.month()).demand_rate
    }
}

impl TryFrom<Vec<MonthlyRate>> for RateTable {
    type Error = RateTableError;

    fn try_from(value: Vec<MonthlyRate>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RateTable> for Vec<MonthlyRate> {
    fn from(value: RateTable) -> Self {
        value.months.to_vec()
    }
}

/// Heavy-load hours run 06:00 to 22:00, Monday through Saturday
pub fn is_heavy_load_hour(time: OffsetDateTime) -> bool {
    time.weekday() != Weekday::Sunday && (6..22).contains(&time.hour())
}

/// Errors in a rate table
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum RateTableError {
    /// The table does not have one rate per month
    #[error("a rate table needs 12 monthly rates, got {0}")]
    WrongLength(usize),
    /// An energy price is not a finite number
    #[error("energy price {value} in month {month} is not finite")]
    InvalidEnergyPrice {
        /// The month, counting January as 1
        month: usize,
        /// The offending price
        value: f64,
    },
    /// A demand rate is negative or not finite
    #[error("demand rate {value} in month {month} must be a non-negative number")]
    InvalidDemandRate {
        /// The month, counting January as 1
        month: usize,
        /// The offending rate
        value: f64,
    },
}
