//! Bang-bang control law with a deadband around the shifted target.
//!
//! Heating turns on below `target - tolerance + shift` and off above
//! `target + tolerance + shift`. Inside the band the previous command is
//! kept, so the command only flips at the outer edges.

use crate::config::Configuration;
use crate::state::{Fault, PowerState, Reason, Reading, Temperature};

#[derive(Debug, PartialEq, Clone, Copy)]
pub struct Thresholds {
    pub on: f32,
    pub off: f32,
}

impl Thresholds {
    pub fn new(config: &Configuration, effective_shift: f32) -> Self {
        let target = f32::from(config.target_temperature);
        Thresholds {
            on: target - config.tolerance + effective_shift,
            off: target + config.tolerance + effective_shift,
        }
    }

    fn is_empty(&self) -> bool {
        // Also catches NaN
        !(self.on < self.off)
    }
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub struct Decision {
    pub command: PowerState,
    pub reason: Reason,
    pub fault: Option<Fault>,
}

impl Decision {
    pub(crate) fn hold(previous: PowerState, reason: Reason, fault: Fault) -> Self {
        Decision {
            command: previous,
            reason,
            fault: Some(fault),
        }
    }
}

pub fn evaluate(
    temperature: Option<Reading<Temperature>>,
    config: &Configuration,
    previous: PowerState,
    effective_shift: f32,
) -> Decision {
    let Some(reading) = temperature.filter(|r| r.valid) else {
        // Hold the last known-good command rather than guess
        return Decision::hold(
            previous,
            Reason::SensorUnavailable,
            Fault::SensorUnavailable,
        );
    };

    let thresholds = Thresholds::new(config, effective_shift);
    if thresholds.is_empty() {
        return Decision::hold(
            previous,
            Reason::InvalidConfiguration,
            Fault::ConfigurationInvalid,
        );
    }

    let current = f32::from(reading.value);
    let (command, reason) = if current < thresholds.on {
        (PowerState::On, Reason::BelowOnThreshold)
    } else if current > thresholds.off {
        (PowerState::Off, Reason::AboveOffThreshold)
    } else {
        (previous, Reason::InsideDeadband)
    };

    Decision {
        command,
        reason,
        fault: None,
    }
}
