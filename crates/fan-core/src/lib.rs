pub mod config;
pub mod control_loop;
pub mod curve;
pub mod duty;
pub mod engine;
pub mod error;
pub mod fault;
pub mod hal;
#[cfg(any(test, feature = "simulation"))]
pub mod hal_sim;
pub mod pulse_window;
pub mod timebase;

pub use config::EngineConfig;
pub use control_loop::{ControlLoop, ExecutionStats, FanController};
pub use curve::{CurveParams, CurvePoint, CurveSolver};
pub use duty::{Bounded, DutyCycle, RotationLimits, Unbounded};
pub use engine::{ControlEngine, EngineStats, ShutdownState, TickReport};
pub use error::{DriverError, EngineError};
pub use fault::{Escalation, EscalationPolicy, Fault, FaultKind, FaultThresholds, FaultTracker};
pub use hal::{BuzzLength, Buzzer, Peripherals, PwmOutput, Relay, Tachometer, TemperatureProbe};
#[cfg(any(test, feature = "simulation"))]
pub use hal_sim::{ActuatorCall, SimulatedFan};
pub use pulse_window::PulseWindow;
pub use timebase::TimeBase;
