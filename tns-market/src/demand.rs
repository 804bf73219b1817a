use time::OffsetDateTime;
use tracing::{Level, event};

/// The monthly peak-demand threshold above which demand charges apply.
///
/// Within a calendar month the threshold only ratchets upward, to the highest demand
/// observed. When a new month begins it is discounted to `discount_coefficient` times
/// the previous month's threshold and the observations of that first update are
/// ignored. Updates dated in a month already left behind change nothing.
#[derive(Clone, Debug, PartialEq)]
pub struct DemandThreshold {
    threshold: f64,
    discount_coefficient: f64,
    month: Option<(i32, u8)>,
}

impl DemandThreshold {
    /// Start from `initial`, discounting by `discount_coefficient` at each new month
    pub fn new(initial: f64, discount_coefficient: f64) -> Self {
        Self {
            threshold: initial,
            discount_coefficient,
            month: None,
        }
    }

    /// The current threshold
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// The fraction of the threshold carried into a new month
    pub fn discount_coefficient(&self) -> f64 {
        self.discount_coefficient
    }

    /// Update the threshold at `now` from the metered average demand (if a reading is
    /// available) and the highest power scheduled so far this month.
    pub fn update(
        &mut self,
        now: OffsetDateTime,
        metered: Option<f64>,
        scheduled_peak: Option<f64>,
    ) -> f64 {
        let month = (now.year(), u8::from(now.month()));
        match self.month {
            Some(current) if month < current => {
                event!(Level::DEBUG, year = month.0, month = month.1, "stale demand month");
            }
            Some(current) if month > current => {
                let discounted = self.discount_coefficient * self.threshold;
                event!(
                    Level::DEBUG,
                    previous = self.threshold,
                    threshold = discounted,
                    "new demand month"
                );
                self.month = Some(month);
                self.threshold = discounted;
            }
            _ => {
                self.month = Some(month);
                for observed in [metered, scheduled_peak].into_iter().flatten() {
                    if observed.is_finite() && observed > self.threshold {
                        self.threshold = observed;
                    }
                }
            }
        }
        self.threshold
    }
}
