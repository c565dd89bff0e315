//! Sysfs GPIO (`/sys/class/gpio`) pins.
//!
//! A pin is exported through `<root>/export`, which makes the kernel create
//! `<root>/gpio<N>/`. Writing `high`/`low` to `direction` configures an
//! output and its initial level in one step, so the line never glitches.

use fan_core::DriverError;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const DEFAULT_GPIO_ROOT: &str = "/sys/class/gpio";

/// How long to wait for udev to create the pin directory after export.
const EXPORT_TIMEOUT: Duration = Duration::from_secs(1);
const EXPORT_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl Level {
    /// `1` is high, anything else low.
    pub fn from_state(state: u8) -> Self {
        if state == 1 {
            Level::High
        } else {
            Level::Low
        }
    }

    pub fn inverse(self) -> Self {
        match self {
            Level::Low => Level::High,
            Level::High => Level::Low,
        }
    }

    fn as_value(self) -> &'static str {
        match self {
            Level::Low => "0",
            Level::High => "1",
        }
    }
}

pub trait OutputPin: Send {
    fn write(&mut self, level: Level) -> Result<(), DriverError>;

    /// Hand the line back to the kernel.
    fn release(&mut self) {}
}

pub trait InputPin: Send {
    fn read(&mut self) -> Result<Level, DriverError>;

    fn release(&mut self) {}
}

/// An exported but not yet configured pin.
#[derive(Debug)]
pub struct SysfsGpio {
    root: PathBuf,
    pin: u32,
    dir: PathBuf,
}

impl SysfsGpio {
    pub fn export(root: impl AsRef<Path>, pin: u32) -> Result<Self, DriverError> {
        let root = root.as_ref().to_path_buf();
        let dir = root.join(format!("gpio{pin}"));

        if !dir.is_dir() {
            let export = root.join("export");
            fs::write(&export, pin.to_string())
                .map_err(|e| DriverError::io(format!("exporting gpio{pin}"), e))?;

            let deadline = Instant::now() + EXPORT_TIMEOUT;
            while !dir.is_dir() {
                if Instant::now() >= deadline {
                    return Err(DriverError::Unavailable(format!(
                        "{} did not appear after export",
                        dir.display()
                    )));
                }
                thread::sleep(EXPORT_POLL);
            }
            debug!(pin, "Exported GPIO");
        }

        Ok(Self { root, pin, dir })
    }

    pub fn pin(&self) -> u32 {
        self.pin
    }

    pub fn into_output(self, initial: Level) -> Result<SysfsOutputPin, DriverError> {
        let direction = match initial {
            Level::Low => "low",
            Level::High => "high",
        };
        self.write_attr("direction", direction)?;
        Ok(SysfsOutputPin {
            value: self.dir.join("value"),
            gpio: self,
        })
    }

    pub fn into_input(self) -> Result<SysfsInputPin, DriverError> {
        self.write_attr("direction", "in")?;
        let path = self.dir.join("value");
        let value = File::open(&path)
            .map_err(|e| DriverError::io(format!("opening {}", path.display()), e))?;
        Ok(SysfsInputPin { value, gpio: self })
    }

    fn write_attr(&self, attr: &str, contents: &str) -> Result<(), DriverError> {
        let path = self.dir.join(attr);
        fs::write(&path, contents)
            .map_err(|e| DriverError::io(format!("writing {}", path.display()), e))
    }

    fn unexport(&self) {
        if let Err(e) = fs::write(self.root.join("unexport"), self.pin.to_string()) {
            warn!(pin = self.pin, error = %e, "Failed to unexport GPIO");
        }
    }
}

#[derive(Debug)]
pub struct SysfsOutputPin {
    gpio: SysfsGpio,
    value: PathBuf,
}

impl OutputPin for SysfsOutputPin {
    fn write(&mut self, level: Level) -> Result<(), DriverError> {
        fs::write(&self.value, level.as_value()).map_err(|e| {
            DriverError::io(format!("writing gpio{} value", self.gpio.pin), e)
        })
    }

    fn release(&mut self) {
        if let Err(e) = self.write(Level::Low) {
            warn!(pin = self.gpio.pin, error = %e, "Failed to drive GPIO low on release");
        }
        // Back to a high-impedance input, then unexport.
        if let Err(e) = self.gpio.write_attr("direction", "in") {
            warn!(pin = self.gpio.pin, error = %e, "Failed to reset GPIO direction");
        }
        self.gpio.unexport();
    }
}

/// Input pin that keeps its `value` file open for fast polling.
#[derive(Debug)]
pub struct SysfsInputPin {
    gpio: SysfsGpio,
    value: File,
}

impl InputPin for SysfsInputPin {
    fn read(&mut self) -> Result<Level, DriverError> {
        let pin = self.gpio.pin;
        let mut buf = [0u8; 2];
        self.value
            .seek(SeekFrom::Start(0))
            .and_then(|_| self.value.read(&mut buf))
            .map_err(|e| DriverError::io(format!("reading gpio{pin} value"), e))
            .and_then(|n| match buf[..n].first() {
                Some(b'1') => Ok(Level::High),
                Some(b'0') => Ok(Level::Low),
                _ => Err(DriverError::Malformed(format!(
                    "unexpected gpio{pin} value {:?}",
                    String::from_utf8_lossy(&buf[..n])
                ))),
            })
    }

    fn release(&mut self) {
        self.gpio.unexport();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fake_root(pins: &[u32]) -> TempDir {
        let root = tempfile::tempdir().unwrap();
        for pin in pins {
            let dir = root.path().join(format!("gpio{pin}"));
            fs::create_dir(&dir).unwrap();
            fs::write(dir.join("direction"), "in").unwrap();
            fs::write(dir.join("value"), "0").unwrap();
        }
        root
    }

    fn read_attr(root: &TempDir, pin: u32, attr: &str) -> String {
        fs::read_to_string(root.path().join(format!("gpio{pin}/{attr}"))).unwrap()
    }

    #[test]
    fn output_sets_initial_level_through_direction() {
        let root = fake_root(&[17]);
        let mut pin = SysfsGpio::export(root.path(), 17)
            .unwrap()
            .into_output(Level::High)
            .unwrap();
        assert_eq!(read_attr(&root, 17, "direction"), "high");

        pin.write(Level::Low).unwrap();
        assert_eq!(read_attr(&root, 17, "value"), "0");
        pin.write(Level::High).unwrap();
        assert_eq!(read_attr(&root, 17, "value"), "1");
    }

    #[test]
    fn release_drives_low_and_unexports() {
        let root = fake_root(&[22]);
        let mut pin = SysfsGpio::export(root.path(), 22)
            .unwrap()
            .into_output(Level::High)
            .unwrap();
        pin.release();
        assert_eq!(read_attr(&root, 22, "value"), "0");
        assert_eq!(read_attr(&root, 22, "direction"), "in");
        assert_eq!(fs::read_to_string(root.path().join("unexport")).unwrap(), "22");
    }

    #[test]
    fn input_reads_current_value() {
        let root = fake_root(&[18]);
        let mut pin = SysfsGpio::export(root.path(), 18)
            .unwrap()
            .into_input()
            .unwrap();
        assert_eq!(pin.read().unwrap(), Level::Low);
        fs::write(root.path().join("gpio18/value"), "1\n").unwrap();
        assert_eq!(pin.read().unwrap(), Level::High);
    }

    #[test]
    fn garbage_value_is_malformed() {
        let root = fake_root(&[18]);
        fs::write(root.path().join("gpio18/value"), "x").unwrap();
        let mut pin = SysfsGpio::export(root.path(), 18)
            .unwrap()
            .into_input()
            .unwrap();
        assert!(matches!(pin.read(), Err(DriverError::Malformed(_))));
    }

    #[test]
    fn export_times_out_when_kernel_never_creates_pin() {
        let root = fake_root(&[]);
        let err = SysfsGpio::export(root.path(), 5).unwrap_err();
        assert!(matches!(err, DriverError::Unavailable(_)));
        assert_eq!(fs::read_to_string(root.path().join("export")).unwrap(), "5");
    }

    #[test]
    fn level_from_state() {
        assert_eq!(Level::from_state(1), Level::High);
        assert_eq!(Level::from_state(0), Level::Low);
        assert_eq!(Level::High.inverse(), Level::Low);
    }
}
