use crate::curve::CurveParams;
use crate::duty::RotationLimits;
use crate::error::EngineError;
use crate::fault::FaultThresholds;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub curve: CurveParams,
    /// Minutes below `min_temp` before the fan is powered off.
    pub shutdown_grace_minutes: u64,
    pub tick_interval: Duration,
    pub thresholds: FaultThresholds,
    /// A stall is signalled when the repeated-pulse count exceeds this.
    pub stall_repeat_threshold: usize,
    pub tacho_pulses_per_rev: u32,
    /// Length of one tachometer sampling window, for RPM conversion.
    pub tacho_sample_window: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            curve: CurveParams::default(),
            shutdown_grace_minutes: 5,
            tick_interval: Duration::from_secs(5),
            thresholds: FaultThresholds::default(),
            stall_repeat_threshold: 0,
            tacho_pulses_per_rev: 2,
            tacho_sample_window: Duration::from_secs(1),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        let c = &self.curve;
        let temps = [c.min_temp, c.control_point_temp, c.max_temp];
        let rotations = [
            c.min_rotation_percent,
            c.control_point_rotation_percent,
            c.max_rotation_percent,
        ];
        if temps.iter().chain(rotations.iter()).any(|v| !v.is_finite()) {
            return Err(EngineError::InvalidConfig(
                "curve parameters must be finite".to_string(),
            ));
        }
        if !(c.min_temp < c.control_point_temp && c.control_point_temp < c.max_temp) {
            return Err(EngineError::InvalidConfig(format!(
                "expected MinTemp < ControlPointTemp < MaxTemp, got {} / {} / {}",
                c.min_temp, c.control_point_temp, c.max_temp
            )));
        }
        if rotations.iter().any(|r| !(0.0..=100.0).contains(r)) {
            return Err(EngineError::InvalidConfig(
                "rotation percentages must be within 0..=100".to_string(),
            ));
        }
        if c.min_rotation_percent > c.max_rotation_percent {
            return Err(EngineError::InvalidConfig(format!(
                "MinRotationPercent {} exceeds MaxRotationPercent {}",
                c.min_rotation_percent, c.max_rotation_percent
            )));
        }
        if self.tick_interval.is_zero() {
            return Err(EngineError::InvalidConfig(
                "tick interval must be non-zero".to_string(),
            ));
        }
        if self.tacho_pulses_per_rev == 0 {
            return Err(EngineError::InvalidConfig(
                "TachoPulsesPerRev must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn rotation_limits(&self) -> RotationLimits {
        RotationLimits {
            min_percent: self.curve.min_rotation_percent as u8,
            max_percent: self.curve.max_rotation_percent as u8,
        }
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_minutes.saturating_mul(60))
    }
}
