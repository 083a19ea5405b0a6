use anyhow::{Context, Result};
use core::time::Duration;
use log::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::{ext::NumericalDuration, OffsetDateTime};
use tokio::sync::watch;

use control::{ElectricityPrice, Reading};

use crate::status::StatusEvent;

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
pub struct HourPrice {
    #[serde(with = "time::serde::rfc3339")]
    pub start: OffsetDateTime,
    pub price: f32,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct HourlyElectricityPrice {
    // Validity of this data
    #[serde(with = "time::serde::rfc3339")]
    pub valid_from: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub valid_until: OffsetDateTime,
    // One entry per hour, keyed by the start of the hour
    pub hourly_price: Vec<HourPrice>,
}

impl HourlyElectricityPrice {
    fn covers(&self, now: OffsetDateTime) -> bool {
        now >= self.valid_from && now < self.valid_until
    }

    fn price_at(&self, now: OffsetDateTime) -> Option<ElectricityPrice> {
        if !self.covers(now) {
            return None;
        }
        self.hourly_price
            .iter()
            .find(|hour| now >= hour.start && now < hour.start + 1.hours())
            .map(|hour| ElectricityPrice::new(hour.price))
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, Default, PartialEq)]
pub struct MultiDayElectricityPrice {
    today: Option<HourlyElectricityPrice>,
    tomorrow: Option<HourlyElectricityPrice>,
}

impl MultiDayElectricityPrice {
    pub fn parse(json: &str, now: OffsetDateTime) -> Result<MultiDayElectricityPrice> {
        let data: MultiDayElectricityPrice = serde_json::from_str(json)?;

        if let Some(tomorrow) = &data.tomorrow {
            if now >= tomorrow.valid_until {
                error!("Received stale electricity price data!");
                return Ok(MultiDayElectricityPrice::default());
            }
            if tomorrow.covers(now) {
                warn!("MultiDayElectricityPrice.tomorrow appears to be today's data");
                let new_data = MultiDayElectricityPrice {
                    today: Some(tomorrow.clone()),
                    tomorrow: None,
                };
                return Ok(new_data);
            }
        }

        Ok(data)
    }

    pub fn current_price(&self, now: OffsetDateTime) -> Option<ElectricityPrice> {
        [&self.today, &self.tomorrow]
            .into_iter()
            .flatten()
            .find_map(|prices| prices.price_at(now))
    }
}

/// Day-ahead price table kept on disk by an external fetcher.
#[derive(Debug)]
pub struct ElectricityPriceSource {
    path: PathBuf,
    prices: MultiDayElectricityPrice,
}

impl ElectricityPriceSource {
    pub fn new(path: PathBuf) -> Self {
        ElectricityPriceSource {
            path,
            prices: MultiDayElectricityPrice::default(),
        }
    }

    async fn load(&mut self, now: OffsetDateTime) -> Result<()> {
        info!("Updating electricity price data from {}", self.path.display());
        let json = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read price table {}", self.path.display()))?;
        self.prices = MultiDayElectricityPrice::parse(&json, now)?;
        Ok(())
    }

    pub fn current_price(&self, now: OffsetDateTime) -> Option<ElectricityPrice> {
        self.prices.current_price(now)
    }

    pub fn status(&self) -> Option<StatusEvent> {
        if self.prices.today.is_none() {
            return Some(StatusEvent::MissingData);
        }
        None
    }

    pub async fn maybe_update(&mut self, now: OffsetDateTime) -> Result<()> {
        let today = self.prices.today.clone();
        let tomorrow = self.prices.tomorrow.clone();

        match today {
            Some(today) => {
                if today.covers(now) && tomorrow.is_some() {
                    debug!("Electricity price data is current");
                    // no need to update; we have tomorrow's data and we're still in today
                    return Ok(());
                }

                match tomorrow {
                    Some(tomorrow) => {
                        if tomorrow.covers(now) {
                            info!("Promoting tomorrow's data to being in use");
                            self.prices.today = Some(tomorrow);
                            self.prices.tomorrow = None;
                        } else if now >= tomorrow.valid_until {
                            self.load(now).await?;
                        }
                    }
                    None => {
                        if now > today.valid_until - 3.hours() {
                            self.load(now).await?;
                        } else {
                            debug!("Current prices are valid and it's too early to fetch tomorrow");
                        }
                    }
                }
            }
            None => self.load(now).await?,
        }
        Ok(())
    }

    /// Reading for the current hour; invalid when the table has no entry.
    pub fn reading(&self, now: OffsetDateTime) -> Reading<ElectricityPrice> {
        match self.current_price(now) {
            Some(price) => Reading::valid(price, now),
            None => Reading::<ElectricityPrice>::unavailable(now),
        }
    }
}

/// Publishes the current price every `interval`. Rooms that use price
/// forward each publication into their own queue.
pub async fn run_price_poller(
    mut source: ElectricityPriceSource,
    interval: Duration,
    prices: watch::Sender<Option<Reading<ElectricityPrice>>>,
) {
    let mut timer = tokio::time::interval(interval);
    loop {
        timer.tick().await;
        let now = OffsetDateTime::now_utc();
        if let Err(err) = source.maybe_update(now).await {
            error!("Failed to update electricity prices: {:#}", err);
        }
        if let Some(status) = source.status() {
            warn!("Electricity price status: {:?}", status);
        }
        prices.send_replace(Some(source.reading(now)));
    }
}
