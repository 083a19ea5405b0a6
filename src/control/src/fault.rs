use log::*;

use crate::config::Configuration;
use crate::hysteresis::Decision;
use crate::state::{Fault, PowerState};

/// Tracks actuator failures across ticks and decides whether the engine's
/// command is honoured.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FaultPolicy {
    consecutive_failures: u32,
    held: bool,
}

impl FaultPolicy {
    /// Final command for this tick.
    pub fn apply(&self, decision: &Decision, config: &Configuration) -> PowerState {
        match decision.fault {
            // An empty or inverted band must never be computed with
            Some(Fault::ConfigurationInvalid) => config.fallback,
            _ => decision.command,
        }
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn record_success(&mut self) {
        if self.held {
            info!("Actuator write succeeded, leaving fault-held state");
        }
        self.consecutive_failures = 0;
        self.held = false;
    }

    pub fn record_failure(&mut self, threshold: u32) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if !self.held && self.consecutive_failures >= threshold {
            error!(
                "{} consecutive actuator failures, suspending decisions",
                self.consecutive_failures
            );
            self.held = true;
        }
    }

    /// A temperature reading came back after being unavailable.
    pub fn reading_recovered(&mut self) {
        if self.held {
            info!("Temperature reading recovered, leaving fault-held state");
            self.held = false;
            self.consecutive_failures = 0;
        }
    }
}
