//! DS18B20-style 1-Wire temperature probe read through the `w1_therm`
//! sysfs interface.
//!
//! The device file holds two lines:
//!
//! ```text
//! 72 01 4b 46 7f ff 0e 10 57 : crc=57 YES
//! 72 01 4b 46 7f ff 0e 10 57 t=23125
//! ```
//!
//! The first ends in `YES` once the conversion is valid; the second carries
//! the temperature in milli-degrees Celsius after `t=`.

use fan_core::{DriverError, TemperatureProbe};
use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_DEVICE_ROOT: &str = "/sys/bus/w1/devices";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    pub device_root: PathBuf,
    /// Device directory name prefix; `28-` is the DS18B20 family code.
    pub device_prefix: String,
    pub device_file: String,
    pub retry_interval: Duration,
    /// Reads attempted per sample before giving up on a not-ready device.
    pub max_attempts: u32,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            device_root: PathBuf::from(DEFAULT_DEVICE_ROOT),
            device_prefix: "28-".to_string(),
            device_file: "w1_slave".to_string(),
            retry_interval: Duration::from_millis(200),
            max_attempts: 10,
        }
    }
}

#[derive(Debug, PartialEq)]
enum Sample {
    Ready(f64),
    NotReady,
}

pub struct W1TemperatureProbe {
    path: PathBuf,
    retry_interval: Duration,
    max_attempts: u32,
}

impl W1TemperatureProbe {
    /// Locate the first matching device. A missing device is fatal.
    pub fn open(config: &ProbeConfig) -> Result<Self, DriverError> {
        let entries = fs::read_dir(&config.device_root).map_err(|e| {
            DriverError::io(format!("listing {}", config.device_root.display()), e)
        })?;

        let mut candidates: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .filter(|entry| {
                entry
                    .file_name()
                    .to_string_lossy()
                    .starts_with(&config.device_prefix)
            })
            .map(|entry| entry.path().join(&config.device_file))
            .collect();
        candidates.sort();

        let path = candidates.into_iter().next().ok_or_else(|| {
            DriverError::Unavailable(format!(
                "no 1-Wire device matching {}* under {}",
                config.device_prefix,
                config.device_root.display()
            ))
        })?;

        info!(device = %path.display(), "Temperature probe found");
        Ok(Self {
            path,
            retry_interval: config.retry_interval,
            max_attempts: config.max_attempts.max(1),
        })
    }

    fn sample(&self) -> Result<Sample, DriverError> {
        let raw = fs::read_to_string(&self.path)
            .map_err(|e| DriverError::io(format!("reading {}", self.path.display()), e))?;
        parse_reading(&raw)
    }
}

impl TemperatureProbe for W1TemperatureProbe {
    fn read(&mut self) -> Option<f64> {
        for attempt in 1..=self.max_attempts {
            match self.sample() {
                Ok(Sample::Ready(celsius)) => return Some(celsius),
                Ok(Sample::NotReady) => {
                    debug!(attempt, "Probe conversion not ready, retrying");
                    if attempt < self.max_attempts {
                        thread::sleep(self.retry_interval);
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Temperature read failed");
                    return None;
                }
            }
        }
        warn!(attempts = self.max_attempts, "Probe never reported a valid conversion");
        None
    }
}

fn parse_reading(raw: &str) -> Result<Sample, DriverError> {
    let mut lines = raw.lines();
    let status = lines
        .next()
        .ok_or_else(|| DriverError::Malformed("empty probe output".to_string()))?;
    if !status.trim_end().ends_with("YES") {
        return Ok(Sample::NotReady);
    }

    let data = lines
        .next()
        .ok_or_else(|| DriverError::Malformed("missing data line".to_string()))?;
    let (_, millis) = data
        .split_once("t=")
        .ok_or_else(|| DriverError::Malformed(format!("no t= in {data:?}")))?;
    let millis: i64 = millis
        .trim()
        .parse()
        .map_err(|_| DriverError::Malformed(format!("bad temperature {millis:?}")))?;
    Ok(Sample::Ready(millis as f64 / 1000.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const READY: &str = "72 01 4b 46 7f ff 0e 10 57 : crc=57 YES\n\
                         72 01 4b 46 7f ff 0e 10 57 t=23125\n";
    const NOT_READY: &str = "72 01 4b 46 7f ff 0e 10 57 : crc=57 NO\n\
                             72 01 4b 46 7f ff 0e 10 57 t=23125\n";

    fn fake_bus(devices: &[(&str, &str)]) -> (TempDir, ProbeConfig) {
        let root = tempfile::tempdir().unwrap();
        for (name, contents) in devices {
            let dir = root.path().join(name);
            fs::create_dir(&dir).unwrap();
            fs::write(dir.join("w1_slave"), contents).unwrap();
        }
        let config = ProbeConfig {
            device_root: root.path().to_path_buf(),
            retry_interval: Duration::from_millis(1),
            max_attempts: 3,
            ..ProbeConfig::default()
        };
        (root, config)
    }

    #[test]
    fn parses_ready_reading() {
        assert_eq!(parse_reading(READY).unwrap(), Sample::Ready(23.125));
        let negative = "aa : crc=aa YES\naa t=-1250\n";
        assert_eq!(parse_reading(negative).unwrap(), Sample::Ready(-1.25));
    }

    #[test]
    fn crc_failure_is_not_ready() {
        assert_eq!(parse_reading(NOT_READY).unwrap(), Sample::NotReady);
    }

    #[test]
    fn malformed_outputs() {
        assert!(parse_reading("").is_err());
        assert!(parse_reading("crc=00 YES\n").is_err());
        assert!(parse_reading("crc=00 YES\nno temperature\n").is_err());
        assert!(parse_reading("crc=00 YES\nt=hot\n").is_err());
    }

    #[test]
    fn reads_first_matching_device() {
        let (_root, config) = fake_bus(&[
            ("w1_bus_master1", "ignored"),
            ("28-000005e2fdc3", READY),
        ]);
        let mut probe = W1TemperatureProbe::open(&config).unwrap();
        assert_eq!(probe.read(), Some(23.125));
    }

    #[test]
    fn missing_device_is_fatal() {
        let (_root, config) = fake_bus(&[("w1_bus_master1", "")]);
        assert!(matches!(
            W1TemperatureProbe::open(&config),
            Err(DriverError::Unavailable(_))
        ));
    }

    #[test]
    fn gives_up_after_bounded_retries() {
        let (_root, config) = fake_bus(&[("28-01", NOT_READY)]);
        let mut probe = W1TemperatureProbe::open(&config).unwrap();
        assert_eq!(probe.read(), None);
    }

    #[test]
    fn vanished_device_reads_absent() {
        let (root, config) = fake_bus(&[("28-01", READY)]);
        let mut probe = W1TemperatureProbe::open(&config).unwrap();
        fs::remove_file(root.path().join("28-01/w1_slave")).unwrap();
        assert_eq!(probe.read(), None);
    }
}
