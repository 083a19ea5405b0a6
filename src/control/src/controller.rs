use anyhow::Result;
use log::*;
use time::OffsetDateTime;

use crate::cache::ReadingCache;
use crate::config::Configuration;
use crate::dispatch;
use crate::fault::FaultPolicy;
use crate::hysteresis::{self, Decision};
use crate::price;
use crate::state::{
    ControllerState, ElectricityPrice, Fault, HvacMode, PowerState, Reason, Sample, Status,
    Temperature,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    Failed,
}

/// One room's decision core. Owns its state, readings and configuration
/// exclusively and must only be driven from a single task.
#[derive(Debug, Clone)]
pub struct Controller {
    config: Configuration,
    cache: ReadingCache,
    state: ControllerState,
    policy: FaultPolicy,
    mode: HvacMode,
    reason: Option<Reason>,
    price_delta: f32,
    temperature: Option<Temperature>,
    price: Option<ElectricityPrice>,
}

impl Controller {
    pub fn new(config: Configuration, now: OffsetDateTime) -> Self {
        Controller {
            config,
            cache: ReadingCache::default(),
            state: ControllerState::new(now),
            policy: FaultPolicy::default(),
            mode: HvacMode::default(),
            reason: None,
            price_delta: 0.0,
            temperature: None,
            price: None,
        }
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    /// Replaces the configuration wholesale. An invalid snapshot is
    /// rejected and the active one kept.
    pub fn configure(&mut self, config: Configuration) -> Result<()> {
        config.validate()?;
        info!(
            "Applying configuration: target {:?}, tolerance {}, base shift {}",
            config.target_temperature, config.tolerance, config.base_shift
        );
        self.config = config;
        Ok(())
    }

    pub fn set_mode(&mut self, mode: HvacMode) {
        if mode != self.mode {
            info!("Mode changed to {:?}", mode);
        }
        self.mode = mode;
    }

    pub fn update(&mut self, sample: Sample) {
        self.cache.update(sample);
    }

    /// Runs one evaluation cycle and returns the setpoint to write, if any.
    ///
    /// The caller performs the write and reports back through
    /// [`Controller::record_write`].
    pub fn tick(&mut self, now: OffsetDateTime) -> Option<Temperature> {
        let stale_timeout = self.config.stale_timeout;
        let temperature = self.cache.temperature(now, stale_timeout);
        let price = self.cache.price(now, stale_timeout).map(|r| r.value);

        if temperature.is_some() && self.temperature.is_none() {
            self.policy.reading_recovered();
        }
        self.temperature = temperature.map(|r| r.value);
        self.price = price;
        self.price_delta = price::adjust(price, self.config.price_rule.as_ref());
        self.state.effective_shift = self.config.base_shift + self.price_delta;
        self.state.last_decision_at = now;

        if self.mode == HvacMode::Off {
            self.change_command(PowerState::Off);
            self.reason = Some(Reason::Disabled);
            if self.policy.is_held() {
                self.state.fault = Some(Fault::ActuatorWriteFailed);
                let setpoint = self.config.low_setpoint;
                return dispatch::resend(setpoint, &self.config, &self.state, now);
            }
            self.state.fault = self.actuator_fault();
            return dispatch::dispatch(PowerState::Off, &self.config, &self.state, now);
        }

        // Command frozen, only the last setpoint is retried
        if self.policy.is_held() {
            self.state.fault = Some(Fault::ActuatorWriteFailed);
            let setpoint = self
                .state
                .last_dispatched_setpoint
                .unwrap_or_else(|| dispatch::setpoint_for(self.state.command, &self.config));
            return dispatch::resend(setpoint, &self.config, &self.state, now);
        }

        let decision = if self.config.is_valid() {
            hysteresis::evaluate(
                temperature,
                &self.config,
                self.state.command,
                self.state.effective_shift,
            )
        } else {
            Decision::hold(
                self.state.command,
                Reason::InvalidConfiguration,
                Fault::ConfigurationInvalid,
            )
        };

        if decision.fault == Some(Fault::SensorUnavailable)
            && self.state.fault != Some(Fault::SensorUnavailable)
        {
            warn!("Temperature sensor unavailable - maintaining current state");
        }

        let command = self.policy.apply(&decision, &self.config);
        self.change_command(command);
        self.reason = Some(decision.reason);
        self.state.fault = decision.fault.or(self.actuator_fault());

        dispatch::dispatch(command, &self.config, &self.state, now)
    }

    pub fn record_write(
        &mut self,
        setpoint: Temperature,
        outcome: WriteOutcome,
        now: OffsetDateTime,
    ) {
        match outcome {
            WriteOutcome::Written => {
                debug!("Actuator accepted setpoint {:?}", setpoint);
                dispatch::record_dispatch(&mut self.state, setpoint, now);
                self.policy.record_success();
                if self.state.fault == Some(Fault::ActuatorWriteFailed) {
                    self.state.fault = None;
                }
            }
            WriteOutcome::Failed => {
                warn!("Actuator rejected setpoint {:?}, retrying next tick", setpoint);
                dispatch::record_failure(&mut self.state, now);
                self.policy.record_failure(self.config.failure_threshold);
                self.state.fault = Some(Fault::ActuatorWriteFailed);
            }
        }
    }

    pub fn status(&self) -> Status {
        Status {
            command: self.state.command,
            mode: self.mode,
            reason: self.reason,
            target_temperature: self.config.target_temperature,
            current_temperature: self.temperature,
            current_price: self.price.map(f32::from),
            effective_shift: self.state.effective_shift,
            price_delta: self.price_delta,
            fault: self.state.fault,
            fault_held: self.policy.is_held(),
            last_dispatched_setpoint: self.state.last_dispatched_setpoint,
            last_decision_at: self.state.last_decision_at,
            last_dispatched_at: self.state.last_dispatched_at,
        }
    }

    fn actuator_fault(&self) -> Option<Fault> {
        (self.policy.consecutive_failures() > 0).then_some(Fault::ActuatorWriteFailed)
    }

    fn change_command(&mut self, command: PowerState) {
        if command != self.state.command {
            info!(
                "Heating state changed: {:?} (current: {:?}, target: {:?}, shift: {:.2})",
                command,
                self.temperature,
                self.config.target_temperature,
                self.state.effective_shift
            );
        }
        self.state.command = command;
    }
}
