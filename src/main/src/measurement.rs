use anyhow::{ensure, Context, Result};
use core::time::Duration;
use log::*;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tokio::sync::mpsc;

use control::{Reading, Temperature};

use crate::room::RoomEvent;

pub fn parse_temperature(raw: &str) -> Result<Temperature> {
    let value: f32 = raw
        .trim()
        .parse()
        .with_context(|| format!("invalid temperature value {:?}", raw.trim()))?;
    ensure!(value.is_finite(), "temperature is not finite: {}", value);
    Ok(Temperature::new(value))
}

pub async fn read_temperature(path: &Path) -> Result<Temperature> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read temperature sensor {}", path.display()))?;
    parse_temperature(&raw)
}

/// Never fails: an unreadable sensor yields an invalid reading.
pub async fn take_temperature_reading(path: &Path) -> Reading<Temperature> {
    let now = OffsetDateTime::now_utc();
    match read_temperature(path).await {
        Ok(temperature) => Reading::valid(temperature, now),
        Err(err) => {
            warn!("{:#}", err);
            Reading::<Temperature>::unavailable(now)
        }
    }
}

/// Periodic measurement for one room. Every reading is posted to the
/// room's queue and drives an evaluation there.
pub async fn run_measurement_timer(
    room_id: String,
    sensor: PathBuf,
    interval: Duration,
    events: mpsc::Sender<RoomEvent>,
) {
    let mut timer = tokio::time::interval(interval);
    timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        timer.tick().await;
        let reading = take_temperature_reading(&sensor).await;
        trace!("[{}] Measured {:?}", room_id, reading);
        if events.send(RoomEvent::Measurement(reading)).await.is_err() {
            debug!("[{}] Room queue closed, stopping measurements", room_id);
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_temperature() {
        assert_eq!(parse_temperature("21.5\n").unwrap(), Temperature::new(21.5));
        assert_eq!(parse_temperature("  -3 ").unwrap(), Temperature::new(-3.0));
        assert!(parse_temperature("unavailable").is_err());
        assert!(parse_temperature("").is_err());
        assert!(parse_temperature("NaN").is_err());
    }

    #[tokio::test]
    async fn test_reading_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "19.25").unwrap();

        let reading = take_temperature_reading(file.path()).await;
        assert!(reading.valid);
        assert_eq!(reading.value, Temperature::new(19.25));
    }

    #[tokio::test]
    async fn test_missing_sensor_is_invalid_reading() {
        let dir = tempfile::tempdir().unwrap();
        let reading = take_temperature_reading(&dir.path().join("missing")).await;
        assert!(!reading.valid);
    }

    #[tokio::test]
    async fn test_timer_posts_measurements() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "20.0").unwrap();

        let (sender, mut receiver) = mpsc::channel(4);
        let timer = tokio::spawn(run_measurement_timer(
            "lounge".to_string(),
            file.path().to_path_buf(),
            Duration::from_millis(10),
            sender,
        ));

        for _ in 0..2 {
            match receiver.recv().await {
                Some(RoomEvent::Measurement(reading)) => {
                    assert_eq!(reading.value, Temperature::new(20.0))
                }
                other => panic!("unexpected event {:?}", other),
            }
        }

        drop(receiver);
        timer.await.unwrap();
    }
}
