use time::{Duration, OffsetDateTime};

use crate::state::{ElectricityPrice, Reading, Sample, Temperature};

/// Latest reading of each kind. Not synchronised: the owning controller
/// is only ever driven from one task.
#[derive(Debug, Default, Clone)]
pub struct ReadingCache {
    temperature: Option<Reading<Temperature>>,
    price: Option<Reading<ElectricityPrice>>,
}

fn fresh<T: Copy>(
    reading: Option<Reading<T>>,
    now: OffsetDateTime,
    stale_timeout: Duration,
) -> Option<Reading<T>> {
    let reading = reading?;
    if !reading.valid || now - reading.captured_at > stale_timeout {
        return None;
    }
    Some(reading)
}

impl ReadingCache {
    pub fn update(&mut self, sample: Sample) {
        match sample {
            Sample::Temperature(reading) => self.temperature = Some(reading),
            Sample::Price(reading) => self.price = Some(reading),
        }
    }

    /// The stored temperature, or `None` when it was never set, was
    /// captured invalid or has gone stale.
    pub fn temperature(
        &self,
        now: OffsetDateTime,
        stale_timeout: Duration,
    ) -> Option<Reading<Temperature>> {
        fresh(self.temperature, now, stale_timeout)
    }

    pub fn price(
        &self,
        now: OffsetDateTime,
        stale_timeout: Duration,
    ) -> Option<Reading<ElectricityPrice>> {
        fresh(self.price, now, stale_timeout)
    }
}
