//! Settings file: one flat JSON object with PascalCase keys.
//!
//! ```json
//! { "MinTemp": 30, "MaxTemp": 70, "ControlPointTemp": 50, "RelayGPIOPin": 17 }
//! ```
//!
//! Missing keys fall back to defaults; unknown keys are rejected so a typo
//! never silently reverts a setting.

use fan_core::{CurveParams, EngineConfig};
use fan_io::{BuzzerTiming, Level, ProbeConfig, PwmConfig, RelayConfig, SamplerTiming};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot parse settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid settings: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields, default)]
pub struct FanSettings {
    pub min_temp: f64,
    pub max_temp: f64,
    pub control_point_temp: f64,
    pub min_rotation_percent: f64,
    pub max_rotation_percent: f64,
    pub control_point_rotation_percent: f64,
    /// Minutes below `MinTemp` before the relay opens.
    pub shutdown_grace_time: u64,
    pub tacho_pulses_per_rev: u32,
    #[serde(rename = "TachoGPIOPin")]
    pub tacho_gpio_pin: u32,
    #[serde(rename = "RelayGPIOPin")]
    pub relay_gpio_pin: u32,
    pub relay_initial_state: u8,
    pub relay_on_state: u8,
    #[serde(rename = "BuzzerGPIOPin")]
    pub buzzer_gpio_pin: u32,
    /// Seconds.
    #[serde(rename = "BuzzerPINHighTime")]
    pub buzzer_pin_high_time: f64,
    #[serde(rename = "BuzzerPINHighShortTime")]
    pub buzzer_pin_high_short_time: f64,
    #[serde(rename = "BuzzerIntermittentPINLowTime")]
    pub buzzer_intermittent_pin_low_time: f64,
    pub pwm_chip: u32,
    pub pwm_channel: u32,
    pub pwm_frequency: u32,
    pub temp_device_path: PathBuf,
    /// Device directory pattern, e.g. `28*`.
    pub temp_device_folder: String,
    pub temp_device_file: String,
    pub gpio_root: PathBuf,
    pub pwm_root: PathBuf,
}

impl Default for FanSettings {
    fn default() -> Self {
        let curve = CurveParams::default();
        let buzzer = BuzzerTiming::default();
        let pwm = PwmConfig::default();
        let probe = ProbeConfig::default();
        Self {
            min_temp: curve.min_temp,
            max_temp: curve.max_temp,
            control_point_temp: curve.control_point_temp,
            min_rotation_percent: curve.min_rotation_percent,
            max_rotation_percent: curve.max_rotation_percent,
            control_point_rotation_percent: curve.control_point_rotation_percent,
            shutdown_grace_time: EngineConfig::default().shutdown_grace_minutes,
            tacho_pulses_per_rev: 2,
            tacho_gpio_pin: 22,
            relay_gpio_pin: 17,
            relay_initial_state: 1,
            relay_on_state: 1,
            buzzer_gpio_pin: 27,
            buzzer_pin_high_time: buzzer.high.as_secs_f64(),
            buzzer_pin_high_short_time: buzzer.short_high.as_secs_f64(),
            buzzer_intermittent_pin_low_time: buzzer.intermittent_low.as_secs_f64(),
            pwm_chip: pwm.chip,
            pwm_channel: pwm.channel,
            pwm_frequency: pwm.frequency_hz,
            temp_device_path: probe.device_root,
            temp_device_folder: format!("{}*", probe.device_prefix),
            temp_device_file: probe.device_file,
            gpio_root: PathBuf::from(fan_io::gpio::DEFAULT_GPIO_ROOT),
            pwm_root: pwm.root,
        }
    }
}

impl FanSettings {
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let raw = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Self = serde_json::from_str(&raw).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        self.engine_config()
            .validate()
            .map_err(|e| SettingsError::Invalid(e.to_string()))?;
        for (key, state) in [
            ("RelayInitialState", self.relay_initial_state),
            ("RelayOnState", self.relay_on_state),
        ] {
            if state > 1 {
                return Err(SettingsError::Invalid(format!(
                    "{key} must be 0 or 1, got {state}"
                )));
            }
        }
        if self.pwm_frequency == 0 {
            return Err(SettingsError::Invalid(
                "PwmFrequency must be non-zero".to_string(),
            ));
        }
        self.buzzer_timing()?;
        Ok(())
    }

    pub fn curve(&self) -> CurveParams {
        CurveParams {
            min_temp: self.min_temp,
            max_temp: self.max_temp,
            control_point_temp: self.control_point_temp,
            min_rotation_percent: self.min_rotation_percent,
            max_rotation_percent: self.max_rotation_percent,
            control_point_rotation_percent: self.control_point_rotation_percent,
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            curve: self.curve(),
            shutdown_grace_minutes: self.shutdown_grace_time,
            tacho_pulses_per_rev: self.tacho_pulses_per_rev,
            tacho_sample_window: self.sampler_timing().window,
            ..EngineConfig::default()
        }
    }

    pub fn probe_config(&self) -> ProbeConfig {
        ProbeConfig {
            device_root: self.temp_device_path.clone(),
            device_prefix: self.temp_device_folder.trim_end_matches('*').to_string(),
            device_file: self.temp_device_file.clone(),
            ..ProbeConfig::default()
        }
    }

    pub fn pwm_config(&self) -> PwmConfig {
        PwmConfig {
            root: self.pwm_root.clone(),
            chip: self.pwm_chip,
            channel: self.pwm_channel,
            frequency_hz: self.pwm_frequency,
        }
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            on_level: Level::from_state(self.relay_on_state),
            initial_level: Level::from_state(self.relay_initial_state),
        }
    }

    pub fn buzzer_timing(&self) -> Result<BuzzerTiming, SettingsError> {
        Ok(BuzzerTiming {
            high: seconds("BuzzerPINHighTime", self.buzzer_pin_high_time)?,
            short_high: seconds("BuzzerPINHighShortTime", self.buzzer_pin_high_short_time)?,
            intermittent_low: seconds(
                "BuzzerIntermittentPINLowTime",
                self.buzzer_intermittent_pin_low_time,
            )?,
        })
    }

    pub fn sampler_timing(&self) -> SamplerTiming {
        SamplerTiming::default()
    }
}

fn seconds(key: &str, value: f64) -> Result<Duration, SettingsError> {
    Duration::try_from_secs_f64(value).map_err(|_| {
        SettingsError::Invalid(format!(
            "{key} must be a non-negative number of seconds, got {value}"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_settings(json: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let file = write_settings(r#"{ "MinTemp": 25, "RelayGPIOPin": 5, "ShutdownGraceTime": 10 }"#);
        let settings = FanSettings::load(file.path()).unwrap();
        assert_eq!(settings.min_temp, 25.0);
        assert_eq!(settings.relay_gpio_pin, 5);
        assert_eq!(settings.max_temp, 70.0);

        let engine = settings.engine_config();
        assert_eq!(engine.shutdown_grace(), Duration::from_secs(600));
        assert_eq!(engine.curve.min_temp, 25.0);
    }

    #[test]
    fn unknown_key_is_rejected() {
        let file = write_settings(r#"{ "MinTemperature": 25 }"#);
        assert!(matches!(
            FanSettings::load(file.path()),
            Err(SettingsError::Parse { .. })
        ));
    }

    #[test]
    fn misordered_curve_is_invalid() {
        let file = write_settings(r#"{ "MinTemp": 80, "MaxTemp": 70 }"#);
        assert!(matches!(
            FanSettings::load(file.path()),
            Err(SettingsError::Invalid(_))
        ));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = FanSettings::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, SettingsError::Read { .. }));
    }

    #[test]
    fn relay_states_and_buzzer_times_are_checked() {
        let settings = FanSettings {
            relay_on_state: 2,
            ..FanSettings::default()
        };
        assert!(settings.validate().is_err());

        let settings = FanSettings {
            buzzer_pin_high_short_time: -0.5,
            ..FanSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn driver_configs_follow_settings() {
        let file = write_settings(
            r#"{
                "RelayOnState": 0,
                "RelayInitialState": 0,
                "BuzzerPINHighShortTime": 0.25,
                "PwmChip": 1,
                "PwmFrequency": 1000,
                "TempDevicePath": "/tmp/w1",
                "TempDeviceFolder": "10-*"
            }"#,
        );
        let settings = FanSettings::load(file.path()).unwrap();

        let relay = settings.relay_config();
        assert_eq!(relay.on_level, Level::Low);
        assert_eq!(relay.initial_level, Level::Low);

        let buzzer = settings.buzzer_timing().unwrap();
        assert_eq!(buzzer.short_high, Duration::from_millis(250));
        assert_eq!(buzzer.high, Duration::from_secs(1));

        let pwm = settings.pwm_config();
        assert_eq!((pwm.chip, pwm.frequency_hz), (1, 1000));

        let probe = settings.probe_config();
        assert_eq!(probe.device_root, PathBuf::from("/tmp/w1"));
        assert_eq!(probe.device_prefix, "10-");
        assert_eq!(probe.device_file, "w1_slave");
    }

    #[test]
    fn defaults_round_trip_through_json() {
        let json = serde_json::to_string(&FanSettings::default()).unwrap();
        assert!(json.contains("\"TachoGPIOPin\":22"));
        let parsed: FanSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, FanSettings::default());
        assert!(parsed.validate().is_ok());
    }
}
