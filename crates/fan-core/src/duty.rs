use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

#[derive(Debug, Clone, Copy)]
pub struct Unbounded;

#[derive(Debug, Clone, Copy)]
pub struct Bounded;

/// Configured rotation bounds, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationLimits {
    pub min_percent: u8,
    pub max_percent: u8,
}

impl Default for RotationLimits {
    fn default() -> Self {
        Self {
            min_percent: 20,
            max_percent: 100,
        }
    }
}

/// Duty cycle in whole percent. Only a `DutyCycle<Bounded>` is ever written
/// to the PWM output.
#[derive(Debug, Clone, Copy)]
pub struct DutyCycle<State = Unbounded> {
    percent: i64,
    _state: PhantomData<State>,
}

impl DutyCycle<Unbounded> {
    /// Truncates a curve output towards zero.
    pub fn from_curve(rotation_percent: f64) -> Self {
        Self {
            percent: rotation_percent.trunc() as i64,
            _state: PhantomData,
        }
    }

    pub fn bound(self, limits: &RotationLimits) -> DutyCycle<Bounded> {
        let percent = self
            .percent
            .clamp(i64::from(limits.min_percent), i64::from(limits.max_percent));
        DutyCycle {
            percent,
            _state: PhantomData,
        }
    }
}

impl DutyCycle<Bounded> {
    /// The configured maximum, used by the panic and crash paths.
    pub fn max(limits: &RotationLimits) -> Self {
        Self {
            percent: i64::from(limits.max_percent),
            _state: PhantomData,
        }
    }

    pub fn percent(&self) -> u8 {
        // Bounds are u8 so the clamped value always fits.
        u8::try_from(self.percent).unwrap_or(u8::MAX)
    }
}
