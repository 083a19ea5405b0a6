use anyhow::{ensure, Result};
use time::Duration;

use crate::price::PriceRule;
use crate::state::{PowerState, Temperature};

pub const DEFAULT_TARGET_TEMPERATURE: f32 = 20.0;
pub const DEFAULT_TOLERANCE: f32 = 0.5;
pub const DEFAULT_BASE_SHIFT: f32 = 0.0;
// Forces the real thermostat to heat
pub const DEFAULT_HIGH_SETPOINT: f32 = 35.0;
// Forces the real thermostat to stay off
pub const DEFAULT_LOW_SETPOINT: f32 = 5.0;
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// One room's settings. Immutable per activation; an edit replaces the
/// whole snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct Configuration {
    pub target_temperature: Temperature,

    // Half width of the deadband around the target, must be positive
    pub tolerance: f32,

    // Signed bias added to both thresholds, e.g. night setback
    pub base_shift: f32,

    // Setpoint written to the actuator to force heating on
    pub high_setpoint: Temperature,

    // Setpoint written to the actuator to force heating off
    pub low_setpoint: Temperature,

    pub price_rule: Option<PriceRule>,

    // Readings older than this are treated as unavailable
    pub stale_timeout: Duration,

    // Re-send an unchanged setpoint after this long
    pub refresh_interval: Duration,

    // Consecutive actuator failures before the controller is fault-held
    pub failure_threshold: u32,

    // Command forced when the configuration itself is broken
    pub fallback: PowerState,
}

impl Configuration {
    pub fn validate(&self) -> Result<()> {
        let tolerance = self.tolerance;
        ensure!(
            tolerance.is_finite() && tolerance > 0.0,
            "tolerance must be positive, got {}",
            tolerance
        );
        ensure!(
            self.base_shift.is_finite(),
            "base shift must be finite, got {}",
            self.base_shift
        );
        ensure!(
            [
                self.target_temperature,
                self.high_setpoint,
                self.low_setpoint
            ]
            .iter()
            .all(|&temperature| f32::from(temperature).is_finite()),
            "temperatures must be finite"
        );
        ensure!(
            self.high_setpoint > self.low_setpoint,
            "high setpoint {:?} must exceed low setpoint {:?}",
            self.high_setpoint,
            self.low_setpoint
        );
        ensure!(
            self.failure_threshold > 0,
            "failure threshold must be at least 1"
        );
        if let Some(rule) = &self.price_rule {
            rule.validate()?;
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            target_temperature: Temperature::new(DEFAULT_TARGET_TEMPERATURE),
            tolerance: DEFAULT_TOLERANCE,
            base_shift: DEFAULT_BASE_SHIFT,
            high_setpoint: Temperature::new(DEFAULT_HIGH_SETPOINT),
            low_setpoint: Temperature::new(DEFAULT_LOW_SETPOINT),
            price_rule: None,
            stale_timeout: Duration::minutes(5),
            refresh_interval: Duration::minutes(15),
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            fallback: PowerState::Off,
        }
    }
}
