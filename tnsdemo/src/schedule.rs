//! The simulated clock driving the node.
//!
//! Markets only ever see the time they are ticked with, so a simulation can run a
//! day of markets in well under a second, or be paced to watch it unfold.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::{Level, event, span};

/// Configuration of the simulated clock.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Simulation {
    /// An RFC3339 timestamp to start the simulation from (if omitted, the top of the current hour)
    #[serde(with = "time::serde::rfc3339::option")]
    pub from: Option<OffsetDateTime>,
    /// Simulated time between ticks
    #[serde(with = "humantime_serde")]
    pub step: Duration,
    /// The number of ticks to run
    pub ticks: usize,
    /// Real time between ticks (if omitted, ticks run back to back)
    #[serde(with = "humantime_serde::option")]
    pub pace: Option<Duration>,
}

impl Default for Simulation {
    fn default() -> Self {
        Self {
            from: None,
            step: Duration::from_secs(300),
            ticks: 72,
            pace: None,
        }
    }
}

impl Simulation {
    /// The simulated time of the first tick
    pub fn start(&self) -> anyhow::Result<OffsetDateTime> {
        match self.from {
            Some(from) => Ok(from),
            None => {
                let now = OffsetDateTime::now_utc();
                Ok(now.replace_time(time::Time::from_hms(now.hour(), 0, 0)?))
            }
        }
    }

    /// The simulated time of tick `n`
    pub fn time_of(&self, start: OffsetDateTime, n: usize) -> OffsetDateTime {
        start + self.step * n as u32
    }

    /// Call `f` once per tick with the simulated time.
    ///
    /// Stops at the first error `f` returns.
    pub async fn run<E>(
        &self,
        start: OffsetDateTime,
        mut f: impl FnMut(OffsetDateTime) -> Result<(), E>,
    ) -> Result<(), E> {
        let mut pace = self.pace.map(tokio::time::interval);

        for n in 0..self.ticks {
            if let Some(interval) = pace.as_mut() {
                interval.tick().await;
            }

            let now = self.time_of(start, n);
            let span = span!(Level::INFO, "tick", n);
            let _guard = span.enter();
            event!(
                Level::DEBUG,
                now = now.format(&Rfc3339).unwrap_or_default(),
            );
            f(now)?;
        }
        Ok(())
    }
}
