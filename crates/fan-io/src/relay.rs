use crate::gpio::{Level, OutputPin};
use fan_core::{DriverError, Relay};
use tracing::debug;

/// Relay wiring: which level closes the contact, and where it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayConfig {
    pub on_level: Level,
    pub initial_level: Level,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            on_level: Level::High,
            initial_level: Level::High,
        }
    }
}

/// Fan power relay on a single output line.
pub struct GpioRelay<P> {
    pin: P,
    on_level: Level,
}

impl<P: OutputPin> GpioRelay<P> {
    /// `pin` must already be driven to the configured initial level.
    pub fn new(pin: P, config: RelayConfig) -> Self {
        Self {
            pin,
            on_level: config.on_level,
        }
    }
}

impl<P: OutputPin> Relay for GpioRelay<P> {
    fn on(&mut self) -> Result<(), DriverError> {
        debug!("Relay on");
        self.pin.write(self.on_level)
    }

    fn off(&mut self) -> Result<(), DriverError> {
        debug!("Relay off");
        self.pin.write(self.on_level.inverse())
    }
}
