#![cfg_attr(not(test), no_std)]

//! Decision core of a supervisory heating controller.
//!
//! Converts a room temperature, a target with a hysteresis tolerance, a
//! signed shift and an optional electricity price into an ON/OFF command,
//! and decides when that command has to be written to the real thermostat
//! as one of two fixed setpoints.

mod cache;
mod config;
mod controller;
mod dispatch;
mod fault;
mod hysteresis;
mod price;
mod state;

pub use cache::ReadingCache;
pub use config::{
    Configuration, DEFAULT_BASE_SHIFT, DEFAULT_FAILURE_THRESHOLD, DEFAULT_HIGH_SETPOINT,
    DEFAULT_LOW_SETPOINT, DEFAULT_TARGET_TEMPERATURE, DEFAULT_TOLERANCE,
};
pub use controller::{Controller, WriteOutcome};
pub use dispatch::{dispatch, setpoint_for};
pub use fault::FaultPolicy;
pub use hysteresis::{evaluate, Decision, Thresholds};
pub use price::{adjust, curve_shift, PriceRule};
pub use state::{
    ControllerState, ElectricityPrice, Fault, HvacMode, PowerState, Reading, Reason, Sample,
    Status, Temperature,
};
