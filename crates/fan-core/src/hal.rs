use crate::error::DriverError;

/// Buzz duration for a single tone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuzzLength {
    Normal,
    Short,
}

/// Temperature sensor. Any failure is absorbed into `None`.
pub trait TemperatureProbe: Send {
    fn read(&mut self) -> Option<f64>;
}

pub trait PwmOutput: Send {
    /// Set the duty cycle in percent (0..=100). Idempotent.
    fn set_duty_cycle(&mut self, percent: u8) -> Result<(), DriverError>;
}

pub trait Relay: Send {
    fn on(&mut self) -> Result<(), DriverError>;
    fn off(&mut self) -> Result<(), DriverError>;
}

pub trait Buzzer: Send {
    /// Emit a single tone, blocking for its duration.
    fn buzz_once(&mut self, length: BuzzLength) -> Result<(), DriverError>;
    /// Start the repeating on/off alarm pattern. No-op if already active.
    fn buzz_intermittent(&mut self) -> Result<(), DriverError>;
    fn stop(&mut self);
    /// Stop and release the hardware.
    fn shutdown(&mut self);
}

pub trait Tachometer: Send {
    fn start(&mut self) -> Result<(), DriverError>;
    fn stop(&mut self);
    fn shutdown(&mut self);
    fn avg_pulses(&self) -> u32;
    /// Repeated-count stall signal; 0 until the sample window is full.
    fn repeated_pulses(&self) -> usize;
}

/// The fan assembly handed to the engine at construction.
pub struct Peripherals {
    pub probe: Box<dyn TemperatureProbe>,
    pub pwm: Box<dyn PwmOutput>,
    pub relay: Box<dyn Relay>,
    pub buzzer: Box<dyn Buzzer>,
    pub tachometer: Box<dyn Tachometer>,
}
