//! Hardware PWM through `/sys/class/pwm/pwmchip<N>/pwm<M>`.

use fan_core::{DriverError, PwmOutput};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub const DEFAULT_PWM_ROOT: &str = "/sys/class/pwm";

const EXPORT_TIMEOUT: Duration = Duration::from_secs(1);
const EXPORT_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PwmConfig {
    pub root: PathBuf,
    pub chip: u32,
    pub channel: u32,
    pub frequency_hz: u32,
}

impl Default for PwmConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_PWM_ROOT),
            chip: 0,
            channel: 0,
            // 4-pin fan control frequency.
            frequency_hz: 25_000,
        }
    }
}

pub struct SysfsPwm {
    channel_dir: PathBuf,
    period_ns: u64,
}

impl SysfsPwm {
    /// Export the channel, program the period and enable output at 0 %.
    pub fn open(config: &PwmConfig) -> Result<Self, DriverError> {
        if config.frequency_hz == 0 {
            return Err(DriverError::Unavailable(
                "PWM frequency must be non-zero".to_string(),
            ));
        }
        let chip_dir = config.root.join(format!("pwmchip{}", config.chip));
        let channel_dir = chip_dir.join(format!("pwm{}", config.channel));

        if !channel_dir.is_dir() {
            write_attr(&chip_dir.join("export"), &config.channel.to_string())?;
            let deadline = Instant::now() + EXPORT_TIMEOUT;
            while !channel_dir.is_dir() {
                if Instant::now() >= deadline {
                    return Err(DriverError::Unavailable(format!(
                        "{} did not appear after export",
                        channel_dir.display()
                    )));
                }
                thread::sleep(EXPORT_POLL);
            }
        }

        let period_ns = 1_000_000_000 / u64::from(config.frequency_hz);
        // Duty must never exceed the period, so zero it before reprogramming.
        write_attr(&channel_dir.join("duty_cycle"), "0")?;
        write_attr(&channel_dir.join("period"), &period_ns.to_string())?;
        write_attr(&channel_dir.join("enable"), "1")?;

        info!(
            chip = config.chip,
            channel = config.channel,
            frequency_hz = config.frequency_hz,
            "PWM enabled"
        );
        Ok(Self {
            channel_dir,
            period_ns,
        })
    }

    pub fn period_ns(&self) -> u64 {
        self.period_ns
    }
}

impl PwmOutput for SysfsPwm {
    fn set_duty_cycle(&mut self, percent: u8) -> Result<(), DriverError> {
        let duty_ns = self.period_ns * u64::from(percent.min(100)) / 100;
        debug!(percent, duty_ns, "Setting PWM duty cycle");
        write_attr(&self.channel_dir.join("duty_cycle"), &duty_ns.to_string())
    }
}

fn write_attr(path: &Path, contents: &str) -> Result<(), DriverError> {
    fs::write(path, contents).map_err(|e| DriverError::io(format!("writing {}", path.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_chip() -> (tempfile::TempDir, PwmConfig) {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("pwmchip0/pwm1")).unwrap();
        let config = PwmConfig {
            root: root.path().to_path_buf(),
            chip: 0,
            channel: 1,
            frequency_hz: 25_000,
        };
        (root, config)
    }

    fn attr(root: &tempfile::TempDir, name: &str) -> String {
        fs::read_to_string(root.path().join("pwmchip0/pwm1").join(name)).unwrap()
    }

    #[test]
    fn open_programs_period_and_enables() {
        let (root, config) = fake_chip();
        let pwm = SysfsPwm::open(&config).unwrap();
        assert_eq!(pwm.period_ns(), 40_000);
        assert_eq!(attr(&root, "period"), "40000");
        assert_eq!(attr(&root, "duty_cycle"), "0");
        assert_eq!(attr(&root, "enable"), "1");
    }

    #[test]
    fn duty_is_a_fraction_of_the_period() {
        let (root, config) = fake_chip();
        let mut pwm = SysfsPwm::open(&config).unwrap();
        pwm.set_duty_cycle(65).unwrap();
        assert_eq!(attr(&root, "duty_cycle"), "26000");
        pwm.set_duty_cycle(250).unwrap();
        assert_eq!(attr(&root, "duty_cycle"), "40000");
    }

    #[test]
    fn missing_chip_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        let config = PwmConfig {
            root: root.path().to_path_buf(),
            ..PwmConfig::default()
        };
        assert!(matches!(SysfsPwm::open(&config), Err(DriverError::Io { .. })));
    }
}
