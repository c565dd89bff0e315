//! Full fan assembly wired to a fake sysfs tree.

use fan_core::{ControlEngine, DriverError, EngineConfig, Peripherals};
use fan_io::{
    BuzzerTiming, GpioRelay, Level, PatternBuzzer, ProbeConfig, PulseSource, PwmConfig,
    RelayConfig, SampledTachometer, SamplerTiming, SysfsGpio, SysfsPwm, W1TemperatureProbe,
};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

const RELAY_PIN: u32 = 17;
const BUZZER_PIN: u32 = 27;

struct SteadyFan(u32);

impl PulseSource for SteadyFan {
    fn sample(&mut self, _window: Duration) -> Result<u32, DriverError> {
        self.0 += 1;
        Ok(self.0)
    }
}

fn write_probe(root: &Path, millis: i64) {
    fs::write(
        root.join("w1/28-000005e2fdc3/w1_slave"),
        format!("aa 01 : crc=aa YES\naa 01 t={millis}\n"),
    )
    .unwrap();
}

fn fake_sysfs() -> TempDir {
    let root = tempfile::tempdir().unwrap();
    let p = root.path();
    fs::create_dir_all(p.join("w1/28-000005e2fdc3")).unwrap();
    fs::create_dir_all(p.join("pwm/pwmchip0/pwm0")).unwrap();
    for pin in [RELAY_PIN, BUZZER_PIN] {
        fs::create_dir_all(p.join(format!("gpio/gpio{pin}"))).unwrap();
    }
    write_probe(p, 55_000);
    root
}

fn assemble(root: &Path) -> Peripherals {
    let probe = W1TemperatureProbe::open(&ProbeConfig {
        device_root: root.join("w1"),
        retry_interval: Duration::from_millis(1),
        ..ProbeConfig::default()
    })
    .unwrap();
    let pwm = SysfsPwm::open(&PwmConfig {
        root: root.join("pwm"),
        ..PwmConfig::default()
    })
    .unwrap();

    let relay_config = RelayConfig::default();
    let relay_pin = SysfsGpio::export(root.join("gpio"), RELAY_PIN)
        .unwrap()
        .into_output(relay_config.initial_level)
        .unwrap();
    let buzzer_pin = SysfsGpio::export(root.join("gpio"), BUZZER_PIN)
        .unwrap()
        .into_output(Level::Low)
        .unwrap();

    Peripherals {
        probe: Box::new(probe),
        pwm: Box::new(pwm),
        relay: Box::new(GpioRelay::new(relay_pin, relay_config)),
        buzzer: Box::new(PatternBuzzer::new(
            buzzer_pin,
            BuzzerTiming {
                high: Duration::from_millis(1),
                short_high: Duration::from_millis(1),
                intermittent_low: Duration::from_millis(1),
            },
        )),
        tachometer: Box::new(SampledTachometer::new(
            SteadyFan(0),
            SamplerTiming {
                window: Duration::ZERO,
                period: Duration::from_millis(1),
            },
        )),
    }
}

fn read(root: &Path, rel: &str) -> String {
    fs::read_to_string(root.join(rel)).unwrap()
}

#[test]
fn tick_drives_pwm_from_probe_reading() {
    let sysfs = fake_sysfs();
    let root = sysfs.path();
    let mut engine = ControlEngine::new(EngineConfig::default(), assemble(root)).unwrap();
    engine.start_peripherals().unwrap();

    let report = engine.tick(Duration::ZERO).unwrap();
    assert_eq!(report.duty_percent, Some(65));
    // 65 % of the 40 us period at 25 kHz.
    assert_eq!(read(root, "pwm/pwmchip0/pwm0/duty_cycle"), "26000");

    write_probe(root, 70_000);
    engine.tick(Duration::from_secs(5)).unwrap();
    assert_eq!(read(root, "pwm/pwmchip0/pwm0/duty_cycle"), "40000");

    engine.shutdown_peripherals();
    assert_eq!(read(root, "gpio/unexport"), BUZZER_PIN.to_string());
}

#[test]
fn long_cold_spell_opens_the_relay() {
    let sysfs = fake_sysfs();
    let root = sysfs.path();
    write_probe(root, 20_000);
    let mut engine = ControlEngine::new(EngineConfig::default(), assemble(root)).unwrap();

    engine.tick(Duration::ZERO).unwrap();
    assert_eq!(read(root, "gpio/gpio17/direction"), "high");

    engine.tick(Duration::from_secs(301)).unwrap();
    assert_eq!(read(root, "gpio/gpio17/value"), "0");
    assert!(engine.shutdown_state().stopped);
}

#[test]
fn fail_safe_reaches_the_hardware() {
    let sysfs = fake_sysfs();
    let root = sysfs.path();
    let mut engine = ControlEngine::new(EngineConfig::default(), assemble(root)).unwrap();

    engine.fail_safe();
    assert_eq!(read(root, "gpio/gpio17/value"), "1");
    assert_eq!(read(root, "pwm/pwmchip0/pwm0/duty_cycle"), "40000");
}
