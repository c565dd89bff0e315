//! Linux drivers for the fan assembly: sysfs GPIO, hardware PWM and the
//! 1-Wire temperature probe.

pub mod buzzer;
pub mod gpio;
pub mod pwm;
pub mod relay;
pub mod tachometer;
#[cfg(test)]
mod testing;
pub mod w1_probe;

pub use buzzer::{BuzzerTiming, PatternBuzzer};
pub use gpio::{InputPin, Level, OutputPin, SysfsGpio, SysfsInputPin, SysfsOutputPin};
pub use pwm::{PwmConfig, SysfsPwm};
pub use relay::{GpioRelay, RelayConfig};
pub use tachometer::{GpioPulseCounter, PulseSource, SampledTachometer, SamplerTiming};
pub use w1_probe::{ProbeConfig, W1TemperatureProbe};

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Sleep for `total` while `flag` stays set. Returns whether it still is.
pub(crate) fn sleep_while(flag: &AtomicBool, total: Duration) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if !flag.load(Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}
