use anyhow::{ensure, Context, Result};
use core::time::Duration;
use log::*;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use control::{
    Configuration, HvacMode, PowerState, PriceRule, Temperature, DEFAULT_BASE_SHIFT,
    DEFAULT_FAILURE_THRESHOLD, DEFAULT_HIGH_SETPOINT, DEFAULT_LOW_SETPOINT,
    DEFAULT_TARGET_TEMPERATURE, DEFAULT_TOLERANCE,
};

const DEFAULT_MAX_PRICE_SHIFT: f32 = 3.0;
const DEFAULT_PRICE_STEEPNESS: f32 = 1.5;

#[toml_cfg::toml_config]
pub struct TomlConfig {
    #[default(30)]
    measurement_interval: u64,
    #[default("rooms.json")]
    rooms_path: &'static str,
    #[default("")]
    price_table_path: &'static str,
    #[default(300)]
    price_poll_interval: u64,
    #[default("")]
    status_path: &'static str,
    #[default(60)]
    status_interval: u64,
}

pub struct Config {
    pub measurement_interval: Duration,
    pub rooms_path: PathBuf,
    pub price_table_path: Option<PathBuf>,
    pub price_poll_interval: Duration,
    pub status_path: Option<PathBuf>,
    pub status_interval: Duration,
}

impl Config {
    pub fn read() -> Self {
        Config::from(TOML_CONFIG)
    }
}

fn optional_path(value: &str) -> Option<PathBuf> {
    (!value.is_empty()).then(|| PathBuf::from(value))
}

impl From<TomlConfig> for Config {
    fn from(config: TomlConfig) -> Self {
        Config {
            measurement_interval: Duration::from_secs(config.measurement_interval),
            rooms_path: PathBuf::from(config.rooms_path),
            price_table_path: optional_path(config.price_table_path),
            price_poll_interval: Duration::from_secs(config.price_poll_interval),
            status_path: optional_path(config.status_path),
            status_interval: Duration::from_secs(config.status_interval),
        }
    }
}

fn default_target_temperature() -> f32 {
    DEFAULT_TARGET_TEMPERATURE
}

fn default_tolerance() -> f32 {
    DEFAULT_TOLERANCE
}

fn default_base_shift() -> f32 {
    DEFAULT_BASE_SHIFT
}

fn default_high_setpoint() -> f32 {
    DEFAULT_HIGH_SETPOINT
}

fn default_low_setpoint() -> f32 {
    DEFAULT_LOW_SETPOINT
}

fn default_stale_timeout() -> u64 {
    300
}

fn default_refresh_interval() -> u64 {
    900
}

fn default_failure_threshold() -> u32 {
    DEFAULT_FAILURE_THRESHOLD
}

/// One entry of the room file.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RoomConfig {
    pub id: String,

    // File holding the room temperature in degrees celcius
    pub temperature_sensor: PathBuf,

    // File the forced setpoint is written to
    pub actuator: PathBuf,

    #[serde(default)]
    pub use_price: bool,

    #[serde(default)]
    pub mode: HvacMode,

    #[serde(default = "default_target_temperature")]
    pub target_temperature: f32,
    #[serde(default = "default_tolerance")]
    pub tolerance: f32,
    #[serde(default = "default_base_shift")]
    pub base_shift: f32,
    #[serde(default = "default_high_setpoint")]
    pub high_setpoint: f32,
    #[serde(default = "default_low_setpoint")]
    pub low_setpoint: f32,

    // Seconds
    #[serde(default = "default_stale_timeout")]
    pub stale_timeout: u64,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,

    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    // Only consulted when use_price is set
    #[serde(default)]
    pub price_rule: Option<PriceRule>,
}

impl RoomConfig {
    pub fn configuration(&self) -> Configuration {
        let price_rule = self.use_price.then(|| {
            self.price_rule.unwrap_or(PriceRule::Curve {
                max_shift: DEFAULT_MAX_PRICE_SHIFT,
                steepness: DEFAULT_PRICE_STEEPNESS,
            })
        });

        Configuration {
            target_temperature: Temperature::new(self.target_temperature),
            tolerance: self.tolerance,
            base_shift: self.base_shift,
            high_setpoint: Temperature::new(self.high_setpoint),
            low_setpoint: Temperature::new(self.low_setpoint),
            price_rule,
            stale_timeout: time::Duration::seconds(self.stale_timeout as i64),
            refresh_interval: time::Duration::seconds(self.refresh_interval as i64),
            failure_threshold: self.failure_threshold,
            fallback: PowerState::Off,
        }
    }

    /// True when the collaborators around the controller are the same and
    /// only the controller settings differ.
    pub fn same_wiring(&self, other: &RoomConfig) -> bool {
        self.id == other.id
            && self.temperature_sensor == other.temperature_sensor
            && self.actuator == other.actuator
            && self.use_price == other.use_price
    }

    /// True when price readings expire before the poller republishes them,
    /// leaving the room without a price delta for part of every poll.
    pub fn misses_price_updates(&self, price_poll_interval: Duration) -> bool {
        self.use_price && Duration::from_secs(self.stale_timeout) < price_poll_interval
    }
}

pub fn warn_price_staleness(rooms: &[RoomConfig], price_poll_interval: Duration) {
    for room in rooms {
        if room.misses_price_updates(price_poll_interval) {
            warn!(
                "[{}] stale_timeout {}s is shorter than the price poll interval {}s, \
                 prices will lapse between polls",
                room.id,
                room.stale_timeout,
                price_poll_interval.as_secs()
            );
        }
    }
}

pub fn parse_rooms(json: &str) -> Result<Vec<RoomConfig>> {
    let rooms: Vec<RoomConfig> = serde_json::from_str(json)?;

    let mut seen = HashSet::new();
    for room in &rooms {
        ensure!(seen.insert(room.id.as_str()), "duplicate room id {:?}", room.id);
        room.configuration()
            .validate()
            .with_context(|| format!("invalid configuration for room {:?}", room.id))?;
    }
    Ok(rooms)
}

pub async fn read_rooms(path: &Path) -> Result<Vec<RoomConfig>> {
    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read room file {}", path.display()))?;
    parse_rooms(&json).with_context(|| format!("failed to parse room file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied() {
        let rooms = parse_rooms(
            r#"[{"id": "lounge", "temperature_sensor": "/run/lounge", "actuator": "/run/lounge-trv"}]"#,
        )
        .unwrap();
        let config = rooms[0].configuration();
        assert_eq!(config.target_temperature, Temperature::new(20.0));
        assert_eq!(config.tolerance, 0.5);
        assert_eq!(config.base_shift, 0.0);
        assert_eq!(config.high_setpoint, Temperature::new(35.0));
        assert_eq!(config.low_setpoint, Temperature::new(5.0));
        assert_eq!(config.stale_timeout, time::Duration::minutes(5));
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.price_rule, None);
        assert_eq!(rooms[0].mode, HvacMode::Heat);
    }

    #[test]
    fn test_price_defaults_to_curve() {
        let rooms = parse_rooms(
            r#"[{"id": "lounge", "temperature_sensor": "/run/lounge", "actuator": "/run/lounge-trv", "use_price": true}]"#,
        )
        .unwrap();
        assert_eq!(
            rooms[0].configuration().price_rule,
            Some(PriceRule::Curve {
                max_shift: 3.0,
                steepness: 1.5
            })
        );
    }

    #[test]
    fn test_price_rule_ignored_without_price() {
        let rooms = parse_rooms(
            r#"[{
                "id": "study",
                "temperature_sensor": "/run/study",
                "actuator": "/run/study-trv",
                "base_shift": -1.0,
                "price_rule": {"strategy": "threshold", "below": 0.1, "below_delta": 0.5, "above": 0.3, "above_delta": -0.5}
            }]"#,
        )
        .unwrap();
        let config = rooms[0].configuration();
        assert_eq!(config.price_rule, None);
        assert_eq!(config.base_shift, -1.0);
    }

    #[test]
    fn test_rejects_inverted_setpoints() {
        let result = parse_rooms(
            r#"[{"id": "lounge", "temperature_sensor": "a", "actuator": "b", "high_setpoint": 5.0, "low_setpoint": 30.0}]"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_example_room_file() {
        let rooms = parse_rooms(include_str!("../rooms.example.json")).unwrap();
        assert_eq!(rooms.len(), 3);
        assert!(rooms[0].configuration().price_rule.is_some());
        assert_eq!(rooms[1].configuration().base_shift, -1.0);
        assert_eq!(rooms[2].mode, HvacMode::Off);
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let result = parse_rooms(
            r#"[
                {"id": "lounge", "temperature_sensor": "a", "actuator": "b"},
                {"id": "lounge", "temperature_sensor": "c", "actuator": "d"}
            ]"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_unknown_fields() {
        let result = parse_rooms(
            r#"[{"id": "lounge", "temperature_sensor": "a", "actuator": "b", "tolerence": 1.0}]"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_price_staleness_against_poll_interval() {
        let rooms = parse_rooms(
            r#"[
                {"id": "lounge", "temperature_sensor": "a", "actuator": "b", "use_price": true},
                {"id": "study", "temperature_sensor": "c", "actuator": "d", "use_price": true,
                 "stale_timeout": 60},
                {"id": "hall", "temperature_sensor": "e", "actuator": "f", "stale_timeout": 60}
            ]"#,
        )
        .unwrap();
        let poll = Duration::from_secs(300);
        assert!(!rooms[0].misses_price_updates(poll));
        assert!(rooms[1].misses_price_updates(poll));
        assert!(!rooms[2].misses_price_updates(poll));
        assert!(!rooms[1].misses_price_updates(Duration::from_secs(60)));
    }

    #[test]
    fn test_wiring_comparison() {
        let rooms = parse_rooms(
            r#"[
                {"id": "lounge", "temperature_sensor": "a", "actuator": "b"},
                {"id": "lounge2", "temperature_sensor": "a", "actuator": "b"}
            ]"#,
        )
        .unwrap();
        let mut edited = rooms[0].clone();
        edited.target_temperature = 22.0;
        assert!(rooms[0].same_wiring(&edited));
        edited.use_price = true;
        assert!(!rooms[0].same_wiring(&edited));
        assert!(!rooms[0].same_wiring(&rooms[1]));
    }
}
