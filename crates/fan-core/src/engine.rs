//! Per-tick decision logic for the fan assembly.
//!
//! Each tick reads the probe, runs the three fault trackers, solves the
//! curve, applies shutdown hysteresis and finally writes the duty cycle.
//! Sustained faults escalate to panic (maximum cooling plus alarm); an
//! escalated fault that later clears triggers a reset.
//!
//! Actuator errors propagate out of [`ControlEngine::tick`]; the caller is
//! expected to run [`ControlEngine::fail_safe`] and stop.

use crate::config::EngineConfig;
use crate::curve::CurveSolver;
use crate::duty::{DutyCycle, RotationLimits};
use crate::error::{DriverError, EngineError};
use crate::fault::{FaultKind, FaultTracker};
use crate::hal::{BuzzLength, Peripherals};
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownState {
    /// Start of the current below-minimum grace period.
    pub grace_started_at: Option<Duration>,
    pub stopped: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub panics: u64,
    pub resets: u64,
}

/// What one tick measured and applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub temperature_c: Option<f64>,
    pub duty_percent: Option<u8>,
    pub tach_avg_pulses: u32,
    pub tach_repeated: usize,
    pub tach_rpm: u32,
    pub fan_on: bool,
    pub panic_active: bool,
}

pub struct ControlEngine {
    config: EngineConfig,
    limits: RotationLimits,
    solver: CurveSolver,
    peripherals: Peripherals,
    faults: FaultTracker,
    shutdown: ShutdownState,
    current_duty: Option<u8>,
    stats: EngineStats,
}

impl ControlEngine {
    pub fn new(config: EngineConfig, peripherals: Peripherals) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            limits: config.rotation_limits(),
            solver: CurveSolver::new(config.curve),
            config,
            peripherals,
            faults: FaultTracker::new(),
            shutdown: ShutdownState::default(),
            current_duty: None,
            stats: EngineStats::default(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn faults(&self) -> &FaultTracker {
        &self.faults
    }

    pub fn shutdown_state(&self) -> ShutdownState {
        self.shutdown
    }

    /// Last duty cycle written to the PWM output, if still valid.
    pub fn current_duty(&self) -> Option<u8> {
        self.current_duty
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// Start background sampling and sound the start chime.
    pub fn start_peripherals(&mut self) -> Result<(), EngineError> {
        self.peripherals.tachometer.start()?;
        self.peripherals.buzzer.buzz_once(BuzzLength::Normal)?;
        info!(
            min_temp = self.config.curve.min_temp,
            max_temp = self.config.curve.max_temp,
            min_rotation = self.limits.min_percent,
            max_rotation = self.limits.max_percent,
            grace_minutes = self.config.shutdown_grace_minutes,
            "Engine peripherals started"
        );
        Ok(())
    }

    /// Halt background tasks and release buzzer and tachometer hardware.
    pub fn shutdown_peripherals(&mut self) {
        self.peripherals.buzzer.shutdown();
        self.peripherals.tachometer.shutdown();
    }

    pub fn tick(&mut self, now: Duration) -> Result<TickReport, EngineError> {
        let temperature = self.peripherals.probe.read();

        self.track(FaultKind::TemperatureReading, temperature.is_none(), now)?;

        let point = temperature.and_then(|t| self.solver.solve(t));
        // Below the operating floor the fan is expected to stop, not spin.
        let rotation_failed = point.is_none()
            && temperature.is_some_and(|t| t >= self.config.curve.min_temp);
        self.track(FaultKind::RotationCalculation, rotation_failed, now)?;

        let tach_avg_pulses = self.peripherals.tachometer.avg_pulses();
        let tach_repeated = self.peripherals.tachometer.repeated_pulses();
        let stalled =
            !self.shutdown.stopped && tach_repeated > self.config.stall_repeat_threshold;
        self.track(FaultKind::TachometerStall, stalled, now)?;

        let duty = point.map(|p| DutyCycle::from_curve(p.rotation_percent).bound(&self.limits));

        self.evaluate_shutdown(temperature, now)?;

        let panic_active = self.faults.any_reported();
        if let Some(duty) = duty {
            let percent = duty.percent();
            if !self.shutdown.stopped && !panic_active && self.current_duty != Some(percent) {
                self.peripherals.pwm.set_duty_cycle(percent)?;
                info!(
                    from = ?self.current_duty,
                    to = percent,
                    "Duty cycle applied"
                );
                self.current_duty = Some(percent);
            }
        }

        let report = TickReport {
            temperature_c: temperature,
            duty_percent: self.current_duty,
            tach_avg_pulses,
            tach_repeated,
            tach_rpm: self.pulses_to_rpm(tach_avg_pulses),
            fan_on: !self.shutdown.stopped,
            panic_active,
        };
        info!(
            temperature_c = report.temperature_c,
            duty_percent = report.duty_percent,
            tach_avg_pulses = report.tach_avg_pulses,
            tach_repeated = report.tach_repeated,
            tach_rpm = report.tach_rpm,
            fan = if report.fan_on { "ON" } else { "OFF" },
            panic = report.panic_active,
            "Iteration measured"
        );
        Ok(report)
    }

    /// Crash path: force maximum cooling. Best effort, every step is
    /// attempted even if an earlier one fails.
    pub fn fail_safe(&mut self) {
        error!("Entering fail-safe: relay ON, duty cycle MAX");
        if let Err(e) = self.peripherals.relay.on() {
            error!(error = %e, "Fail-safe could not switch relay on");
        }
        let max = DutyCycle::max(&self.limits);
        match self.peripherals.pwm.set_duty_cycle(max.percent()) {
            Ok(()) => self.current_duty = Some(max.percent()),
            Err(e) => error!(error = %e, "Fail-safe could not set maximum duty cycle"),
        }
    }

    fn track(&mut self, kind: FaultKind, failing: bool, now: Duration) -> Result<(), EngineError> {
        if !failing {
            if let Some(fault) = self.faults.clear(kind) {
                if !fault.is_reported() {
                    info!(fault = %kind, age_secs = fault.age_secs(now), "Fault cleared");
                } else if self.faults.any_reported() {
                    warn!(
                        fault = %kind,
                        "Escalated fault cleared but another fault is still escalated, staying in panic"
                    );
                } else {
                    info!(fault = %kind, "Escalated fault cleared");
                    self.reset()?;
                }
            }
            return Ok(());
        }

        let policy = self.config.thresholds.policy(kind);
        if !self.faults.exists(kind) {
            if policy.notify_after_secs.is_some() {
                info!(fault = %kind, "Possible fault detected, monitoring");
            } else {
                warn!(fault = %kind, "Fault detected");
            }
        }

        let already_panicking = self.faults.any_reported();
        let fault = self.faults.report(kind, now);
        let age_secs = fault.age_secs(now);

        if let Some(notify_after) = policy.notify_after_secs {
            if age_secs > notify_after && !fault.is_notified() {
                fault.set_notified();
                warn!(fault = %kind, age_secs, "Fault persisting");
            }
        }

        if age_secs > policy.panic_after_secs && !fault.is_reported() {
            fault.set_reported();
            error!(
                fault = %kind,
                age_secs,
                threshold_secs = policy.panic_after_secs,
                "Fault sustained, entering PANIC mode"
            );
            self.enter_panic(already_panicking)?;
        }
        Ok(())
    }

    fn enter_panic(&mut self, already_panicking: bool) -> Result<(), DriverError> {
        if already_panicking {
            info!("Panic effects already applied");
            return Ok(());
        }
        self.stats.panics += 1;
        let max = DutyCycle::max(&self.limits);
        info!(
            duty_percent = max.percent(),
            "Panic: relay ON, duty cycle MAX, buzzer intermittent"
        );
        self.shutdown = ShutdownState::default();
        self.peripherals.relay.on()?;
        self.peripherals.pwm.set_duty_cycle(max.percent())?;
        self.current_duty = Some(max.percent());
        self.peripherals.buzzer.buzz_intermittent()
    }

    fn reset(&mut self) -> Result<(), DriverError> {
        self.stats.resets += 1;
        info!("Reset requested, engine values restored to default");
        self.shutdown = ShutdownState::default();
        self.current_duty = None;
        self.peripherals.relay.on()?;
        self.peripherals.buzzer.stop();
        self.peripherals.buzzer.buzz_once(BuzzLength::Short)
    }

    fn evaluate_shutdown(&mut self, temperature: Option<f64>, now: Duration) -> Result<(), DriverError> {
        match temperature {
            Some(t) if t < self.config.curve.min_temp => {
                let started = match self.shutdown.grace_started_at {
                    Some(started) => started,
                    None => {
                        info!(
                            temperature_c = t,
                            grace_minutes = self.config.shutdown_grace_minutes,
                            "Fan shutdown conditions met, starting grace period"
                        );
                        self.shutdown.grace_started_at = Some(now);
                        now
                    }
                };
                // Panic keeps the fans running until a reset.
                if !self.shutdown.stopped
                    && !self.faults.any_reported()
                    && now.saturating_sub(started) >= self.config.shutdown_grace()
                {
                    self.peripherals.relay.off()?;
                    self.shutdown.stopped = true;
                    info!("Fan shutdown grace period reached, stopping fans");
                }
            }
            _ => {
                let pending = self.shutdown.grace_started_at.take().is_some();
                if self.shutdown.stopped {
                    self.peripherals.relay.on()?;
                    self.shutdown.stopped = false;
                    info!(temperature_c = temperature, "Fan minimum temperature reached, restarting fans");
                } else if pending {
                    info!(temperature_c = temperature, "Temperature recovered, pending shutdown cancelled");
                }
            }
        }
        Ok(())
    }

    fn pulses_to_rpm(&self, avg_pulses: u32) -> u32 {
        let window_s = self.config.tacho_sample_window.as_secs_f64();
        if window_s <= 0.0 {
            return 0;
        }
        let revs = f64::from(avg_pulses) / f64::from(self.config.tacho_pulses_per_rev.max(1));
        (revs * 60.0 / window_s) as u32
    }
}
