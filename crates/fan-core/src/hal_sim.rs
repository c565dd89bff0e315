use crate::error::DriverError;
use crate::hal::{BuzzLength, Buzzer, Peripherals, PwmOutput, Relay, Tachometer, TemperatureProbe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Every actuator command the engine issued, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorCall {
    SetDutyCycle(u8),
    RelayOn,
    RelayOff,
    BuzzOnce(BuzzLength),
    BuzzIntermittent,
    BuzzerStop,
    BuzzerShutdown,
    TachometerStart,
    TachometerStop,
    TachometerShutdown,
}

#[derive(Debug)]
struct SimState {
    temperature_c: f64,
    ambient_temp: f64,
    thermal_mass: f64,
    heat_load_w: f64,
    passive_cooling: f64,
    fan_cooling: f64,
    max_rpm: f64,
    pulses_per_rev: u32,

    duty_percent: u8,
    relay_on: bool,
    alarm_active: bool,
    tacho_running: bool,
    last_step: Option<Instant>,

    scripted_temperature: Option<Option<f64>>,
    scripted_tacho: Option<(u32, usize)>,
    fail_actuators: bool,
    failures_pending: usize,
    calls: Vec<ActuatorCall>,
}

impl SimState {
    fn airflow(&self) -> f64 {
        if self.relay_on {
            f64::from(self.duty_percent) / 100.0
        } else {
            0.0
        }
    }

    fn step(&mut self, dt_s: f64) {
        let conductance = self.passive_cooling + self.fan_cooling * self.airflow();
        let heat_out = conductance * (self.temperature_c - self.ambient_temp);
        self.temperature_c += (self.heat_load_w - heat_out) * dt_s / self.thermal_mass;
    }

    fn advance_to_now(&mut self) {
        let now = Instant::now();
        if let Some(last) = self.last_step {
            self.step(now.duration_since(last).as_secs_f64());
        }
        self.last_step = Some(now);
    }

    fn actuate(&mut self, call: ActuatorCall) -> Result<(), DriverError> {
        if self.fail_actuators || self.failures_pending > 0 {
            self.failures_pending = self.failures_pending.saturating_sub(1);
            return Err(DriverError::Unavailable(format!(
                "simulated actuator failure on {call:?}"
            )));
        }
        self.calls.push(call);
        Ok(())
    }
}

/// Simulated fan, heat source, probe, relay, buzzer and tachometer.
///
/// The thermal model is first order: a constant heat load against passive
/// cooling plus cooling proportional to fan airflow. Tests can override the
/// probe and tachometer readings and inject actuator failures.
#[derive(Debug, Clone)]
pub struct SimulatedFan {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedFan {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                temperature_c: 45.0,
                ambient_temp: 25.0,
                thermal_mass: 200.0,
                heat_load_w: 40.0,
                passive_cooling: 0.5,
                fan_cooling: 2.5,
                max_rpm: 2000.0,
                pulses_per_rev: 2,
                duty_percent: 0,
                relay_on: true,
                alarm_active: false,
                tacho_running: false,
                last_step: None,
                scripted_temperature: None,
                scripted_tacho: None,
                fail_actuators: false,
                failures_pending: 0,
                calls: Vec::new(),
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn peripherals(&self) -> Peripherals {
        Peripherals {
            probe: Box::new(SimProbe(self.clone())),
            pwm: Box::new(SimPwm(self.clone())),
            relay: Box::new(SimRelay(self.clone())),
            buzzer: Box::new(SimBuzzer(self.clone())),
            tachometer: Box::new(SimTachometer(self.clone())),
        }
    }

    /// Advance the thermal model by `dt_s` seconds.
    pub fn step(&self, dt_s: f64) {
        self.state().step(dt_s);
    }

    /// Pin the probe output; `Some(None)` simulates a failed read.
    pub fn script_temperature(&self, reading: Option<f64>) {
        self.state().scripted_temperature = Some(reading);
    }

    pub fn script_tachometer(&self, avg_pulses: u32, repeated: usize) {
        self.state().scripted_tacho = Some((avg_pulses, repeated));
    }

    pub fn fail_actuators(&self, fail: bool) {
        self.state().fail_actuators = fail;
    }

    /// Fail only the next `n` actuator commands.
    pub fn fail_next_actuations(&self, n: usize) {
        self.state().failures_pending = n;
    }

    pub fn calls(&self) -> Vec<ActuatorCall> {
        self.state().calls.clone()
    }

    pub fn count(&self, call: ActuatorCall) -> usize {
        self.state().calls.iter().filter(|c| **c == call).count()
    }

    pub fn temperature(&self) -> f64 {
        self.state().temperature_c
    }

    pub fn duty_percent(&self) -> u8 {
        self.state().duty_percent
    }

    pub fn relay_on(&self) -> bool {
        self.state().relay_on
    }

    pub fn alarm_active(&self) -> bool {
        self.state().alarm_active
    }
}

impl Default for SimulatedFan {
    fn default() -> Self {
        Self::new()
    }
}

struct SimProbe(SimulatedFan);

impl TemperatureProbe for SimProbe {
    fn read(&mut self) -> Option<f64> {
        let mut state = self.0.state();
        if let Some(scripted) = state.scripted_temperature {
            return scripted;
        }
        state.advance_to_now();
        Some(state.temperature_c)
    }
}

struct SimPwm(SimulatedFan);

impl PwmOutput for SimPwm {
    fn set_duty_cycle(&mut self, percent: u8) -> Result<(), DriverError> {
        let mut state = self.0.state();
        state.actuate(ActuatorCall::SetDutyCycle(percent))?;
        state.advance_to_now();
        state.duty_percent = percent.min(100);
        Ok(())
    }
}

struct SimRelay(SimulatedFan);

impl Relay for SimRelay {
    fn on(&mut self) -> Result<(), DriverError> {
        let mut state = self.0.state();
        state.actuate(ActuatorCall::RelayOn)?;
        state.advance_to_now();
        state.relay_on = true;
        Ok(())
    }

    fn off(&mut self) -> Result<(), DriverError> {
        let mut state = self.0.state();
        state.actuate(ActuatorCall::RelayOff)?;
        state.advance_to_now();
        state.relay_on = false;
        Ok(())
    }
}

struct SimBuzzer(SimulatedFan);

impl Buzzer for SimBuzzer {
    fn buzz_once(&mut self, length: BuzzLength) -> Result<(), DriverError> {
        self.0.state().actuate(ActuatorCall::BuzzOnce(length))
    }

    fn buzz_intermittent(&mut self) -> Result<(), DriverError> {
        let mut state = self.0.state();
        if state.alarm_active {
            return Ok(());
        }
        state.actuate(ActuatorCall::BuzzIntermittent)?;
        state.alarm_active = true;
        Ok(())
    }

    fn stop(&mut self) {
        let mut state = self.0.state();
        state.alarm_active = false;
        state.calls.push(ActuatorCall::BuzzerStop);
    }

    fn shutdown(&mut self) {
        let mut state = self.0.state();
        state.alarm_active = false;
        state.calls.push(ActuatorCall::BuzzerShutdown);
    }
}

struct SimTachometer(SimulatedFan);

impl Tachometer for SimTachometer {
    fn start(&mut self) -> Result<(), DriverError> {
        let mut state = self.0.state();
        state.actuate(ActuatorCall::TachometerStart)?;
        state.tacho_running = true;
        Ok(())
    }

    fn stop(&mut self) {
        let mut state = self.0.state();
        state.tacho_running = false;
        state.calls.push(ActuatorCall::TachometerStop);
    }

    fn shutdown(&mut self) {
        let mut state = self.0.state();
        state.tacho_running = false;
        state.calls.push(ActuatorCall::TachometerShutdown);
    }

    fn avg_pulses(&self) -> u32 {
        let state = self.0.state();
        if let Some((avg, _)) = state.scripted_tacho {
            return avg;
        }
        if !state.tacho_running {
            return 0;
        }
        let rpm = state.max_rpm * state.airflow();
        (rpm / 60.0 * f64::from(state.pulses_per_rev)) as u32
    }

    fn repeated_pulses(&self) -> usize {
        self.0.state().scripted_tacho.map_or(0, |(_, repeated)| repeated)
    }
}
