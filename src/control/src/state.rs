use fixed::types::I16F16;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

// Temperature in degrees celcius
#[derive(Debug, PartialEq, PartialOrd, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Temperature(f32);

impl Temperature {
    pub fn new(value: f32) -> Self {
        Self(value)
    }
}

impl From<Temperature> for f32 {
    fn from(value: Temperature) -> f32 {
        value.0
    }
}

// Electricity price, either in cents per kWh or as a percentage deviation
// from the average, depending on the price rule in use.
// Can be negative .. that happens, sometimes
#[derive(Debug, PartialEq, PartialOrd, Clone, Copy)]
pub struct ElectricityPrice(I16F16);

impl ElectricityPrice {
    pub fn new(value: f32) -> Self {
        if value.is_nan() {
            return Self(I16F16::ZERO);
        }
        Self(I16F16::saturating_from_num(value))
    }
}

impl From<ElectricityPrice> for f32 {
    fn from(value: ElectricityPrice) -> f32 {
        value.0.to_num::<f32>()
    }
}

/// The binary heating command.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    On,
    Off,
}

/// User selected operating mode. In `Off` the controller stops regulating.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HvacMode {
    #[default]
    Heat,
    Off,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Fault {
    SensorUnavailable,
    ConfigurationInvalid,
    ActuatorWriteFailed,
}

/// Why the engine arrived at a command.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    BelowOnThreshold,
    AboveOffThreshold,
    InsideDeadband,
    SensorUnavailable,
    InvalidConfiguration,
    Disabled,
}

/// A value captured by a collaborator. Immutable once captured.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct Reading<T> {
    pub value: T,
    pub captured_at: OffsetDateTime,
    pub valid: bool,
}

impl<T> Reading<T> {
    pub fn valid(value: T, captured_at: OffsetDateTime) -> Self {
        Reading {
            value,
            captured_at,
            valid: true,
        }
    }
}

impl Reading<Temperature> {
    pub fn unavailable(captured_at: OffsetDateTime) -> Self {
        Reading {
            value: Temperature::new(f32::NAN),
            captured_at,
            valid: false,
        }
    }
}

impl Reading<ElectricityPrice> {
    pub fn unavailable(captured_at: OffsetDateTime) -> Self {
        Reading {
            value: ElectricityPrice::new(0.0),
            captured_at,
            valid: false,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Sample {
    Temperature(Reading<Temperature>),
    Price(Reading<ElectricityPrice>),
}

/// The only mutable entity of a controller. History between ticks is
/// carried here and nowhere else.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct ControllerState {
    pub command: PowerState,
    pub effective_shift: f32,
    pub last_dispatched_setpoint: Option<Temperature>,
    pub last_dispatched_at: Option<OffsetDateTime>,
    pub last_decision_at: OffsetDateTime,
    pub fault: Option<Fault>,
    // Set after a failed write so the next tick re-sends the setpoint
    pub retry_pending: bool,
}

impl ControllerState {
    pub fn new(now: OffsetDateTime) -> Self {
        ControllerState {
            command: PowerState::Off,
            effective_shift: 0.0,
            last_dispatched_setpoint: None,
            last_dispatched_at: None,
            last_decision_at: now,
            fault: None,
            retry_pending: false,
        }
    }
}

/// Exported state for display and observability.
#[derive(Debug, PartialEq, Clone, Copy, Serialize)]
pub struct Status {
    pub command: PowerState,
    pub mode: HvacMode,
    pub reason: Option<Reason>,
    pub target_temperature: Temperature,
    pub current_temperature: Option<Temperature>,
    pub current_price: Option<f32>,
    pub effective_shift: f32,
    pub price_delta: f32,
    pub fault: Option<Fault>,
    pub fault_held: bool,
    pub last_dispatched_setpoint: Option<Temperature>,
    #[serde(with = "time::serde::timestamp")]
    pub last_decision_at: OffsetDateTime,
    #[serde(with = "time::serde::timestamp::option")]
    pub last_dispatched_at: Option<OffsetDateTime>,
}
