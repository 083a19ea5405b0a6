use anyhow::{ensure, Result};
use micromath::F32Ext;
use serde::{Deserialize, Serialize};

use crate::state::ElectricityPrice;

/// How a price reading turns into a shift delta.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum PriceRule {
    /// Fixed deltas when the price leaves the `below..=above` window.
    Threshold {
        below: f32,
        below_delta: f32,
        above: f32,
        above_delta: f32,
    },
    /// Price is read as a percentage deviation from the average price
    /// and mapped through a saturating curve capped at `max_shift`.
    Curve { max_shift: f32, steepness: f32 },
    None,
}

impl PriceRule {
    pub fn validate(&self) -> Result<()> {
        match *self {
            PriceRule::Threshold {
                below,
                below_delta,
                above,
                above_delta,
            } => {
                ensure!(
                    [below, below_delta, above, above_delta]
                        .iter()
                        .all(|value| value.is_finite()),
                    "price thresholds and deltas must be finite"
                );
                ensure!(
                    below <= above,
                    "price threshold below ({}) must not exceed above ({})",
                    below,
                    above
                );
            }
            PriceRule::Curve {
                max_shift,
                steepness,
            } => {
                ensure!(
                    max_shift.is_finite() && max_shift > 0.0,
                    "max price shift must be positive, got {}",
                    max_shift
                );
                ensure!(
                    steepness.is_finite() && steepness > 0.0,
                    "price steepness must be positive, got {}",
                    steepness
                );
            }
            PriceRule::None => {}
        }
        Ok(())
    }
}

// tanh(x) = (e^2x - 1) / (e^2x + 1)
fn tanh(x: f32) -> f32 {
    // Saturated well before e^2x overflows
    if x > 10.0 {
        return 1.0;
    }
    if x < -10.0 {
        return -1.0;
    }
    // micromath in every build, std would shadow it under test
    let e2x = F32Ext::exp(2.0 * x);
    (e2x - 1.0) / (e2x + 1.0)
}

pub fn curve_shift(price_diff_percent: f32, max_shift: f32, steepness: f32) -> f32 {
    let p = price_diff_percent / 100.0;
    -max_shift * tanh(steepness * p)
}

/// Shift delta to add to the base shift. A missing or invalid price
/// always yields zero, price awareness never blocks heating.
pub fn adjust(price: Option<ElectricityPrice>, rule: Option<&PriceRule>) -> f32 {
    let (Some(price), Some(rule)) = (price, rule) else {
        return 0.0;
    };

    match *rule {
        PriceRule::Threshold {
            below,
            below_delta,
            above,
            above_delta,
        } => {
            // Bounds go through the same fixed point rounding as the price
            if price < ElectricityPrice::new(below) {
                below_delta
            } else if price > ElectricityPrice::new(above) {
                above_delta
            } else {
                0.0
            }
        }
        PriceRule::Curve {
            max_shift,
            steepness,
        } => curve_shift(f32::from(price), max_shift, steepness),
        PriceRule::None => 0.0,
    }
}
