use time::OffsetDateTime;

use crate::config::Configuration;
use crate::state::{ControllerState, PowerState, Temperature};

pub fn setpoint_for(command: PowerState, config: &Configuration) -> Temperature {
    match command {
        PowerState::On => config.high_setpoint,
        PowerState::Off => config.low_setpoint,
    }
}

fn refresh_due(config: &Configuration, state: &ControllerState, now: OffsetDateTime) -> bool {
    match state.last_dispatched_at {
        Some(at) => now - at >= config.refresh_interval,
        None => true,
    }
}

/// Decides whether `command` needs to be written to the actuator.
///
/// Returns the setpoint when it differs from the last one written, when a
/// previous write failed, or when the refresh interval has elapsed. The
/// write itself happens outside; the outcome is reported back through
/// [`record_dispatch`] or [`record_failure`].
pub fn dispatch(
    command: PowerState,
    config: &Configuration,
    state: &ControllerState,
    now: OffsetDateTime,
) -> Option<Temperature> {
    let setpoint = setpoint_for(command, config);
    let changed = state.last_dispatched_setpoint != Some(setpoint);

    if changed || state.retry_pending || refresh_due(config, state, now) {
        Some(setpoint)
    } else {
        None
    }
}

/// Sends `setpoint` at most once per refresh interval, regardless of
/// what was written before.
pub fn resend(
    setpoint: Temperature,
    config: &Configuration,
    state: &ControllerState,
    now: OffsetDateTime,
) -> Option<Temperature> {
    refresh_due(config, state, now).then_some(setpoint)
}

pub fn record_dispatch(state: &mut ControllerState, setpoint: Temperature, now: OffsetDateTime) {
    state.last_dispatched_setpoint = Some(setpoint);
    state.last_dispatched_at = Some(now);
    state.retry_pending = false;
}

// The last dispatched setpoint is left as is, the actuator never confirmed the new one
pub fn record_failure(state: &mut ControllerState, now: OffsetDateTime) {
    state.last_dispatched_at = Some(now);
    state.retry_pending = true;
}
