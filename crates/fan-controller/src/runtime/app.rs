use crate::runtime::config::RuntimeConfig;
use crate::runtime::logging::init_tracing;
use crate::runtime::settings::{FanSettings, SettingsError};
use fan_core::{
    ControlEngine, DriverError, EngineError, ExecutionStats, FanController, Peripherals,
    SimulatedFan, TimeBase,
};
use fan_io::{
    GpioPulseCounter, GpioRelay, Level, PatternBuzzer, SampledTachometer, SysfsGpio, SysfsPwm,
    W1TemperatureProbe,
};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info, warn};

/// How often the main thread checks for a signal, deadline or crash.
const SUPERVISE_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("hardware setup failed: {0}")]
    Driver(#[from] DriverError),
}

pub fn run_from_args() -> ExitCode {
    let config = RuntimeConfig::from_env();
    if config.show_help {
        RuntimeConfig::print_help();
        return ExitCode::SUCCESS;
    }
    run(config)
}

pub fn run(config: RuntimeConfig) -> ExitCode {
    let _log_guard = init_tracing(config.json_logs, config.debug, config.log_dir.as_deref());
    for arg in &config.ignored_args {
        warn!(arg = %arg, "Ignoring unknown argument");
    }

    match run_controller(&config) {
        Ok(stats) => {
            info!(
                ticks_executed = stats.ticks_executed,
                ticks_missed = stats.ticks_missed,
                max_tick_us = stats.max_tick_us,
                panics = stats.panics,
                resets = stats.resets,
                "Run complete"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Fan controller terminated");
            ExitCode::FAILURE
        }
    }
}

fn run_controller(config: &RuntimeConfig) -> Result<ExecutionStats, AppError> {
    let settings = match &config.config_path {
        Some(path) => {
            info!(path = %path.display(), "Loading settings");
            FanSettings::load(path)?
        }
        None => {
            info!("No settings file given, using defaults");
            FanSettings::default()
        }
    };

    let peripherals = if config.simulate {
        info!("Simulation mode, no hardware will be touched");
        SimulatedFan::new().peripherals()
    } else {
        build_peripherals(&settings)?
    };

    let engine = ControlEngine::new(settings.engine_config(), peripherals)?;
    let controller = FanController::start(engine, TimeBase::new())?;

    let interrupted = Arc::new(AtomicBool::new(false));
    spawn_signal_listener(Arc::clone(&interrupted))?;

    let deadline = config.run_seconds.map(|secs| {
        info!(seconds = secs, "Running for limited duration");
        Instant::now() + Duration::from_secs(secs)
    });
    info!("Fan controller running");

    while controller.is_running() && !interrupted.load(Ordering::SeqCst) {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        thread::sleep(SUPERVISE_POLL);
    }

    Ok(controller.stop()?)
}

fn build_peripherals(settings: &FanSettings) -> Result<Peripherals, AppError> {
    let probe = W1TemperatureProbe::open(&settings.probe_config())?;
    let pwm = SysfsPwm::open(&settings.pwm_config())?;

    let relay_config = settings.relay_config();
    let relay_pin = SysfsGpio::export(&settings.gpio_root, settings.relay_gpio_pin)?
        .into_output(relay_config.initial_level)?;
    let buzzer_pin =
        SysfsGpio::export(&settings.gpio_root, settings.buzzer_gpio_pin)?.into_output(Level::Low)?;
    let tacho_pin = SysfsGpio::export(&settings.gpio_root, settings.tacho_gpio_pin)?.into_input()?;

    info!(
        relay_pin = settings.relay_gpio_pin,
        buzzer_pin = settings.buzzer_gpio_pin,
        tacho_pin = settings.tacho_gpio_pin,
        "GPIO lines configured"
    );

    Ok(Peripherals {
        probe: Box::new(probe),
        pwm: Box::new(pwm),
        relay: Box::new(GpioRelay::new(relay_pin, relay_config)),
        buzzer: Box::new(PatternBuzzer::new(buzzer_pin, settings.buzzer_timing()?)),
        tachometer: Box::new(SampledTachometer::new(
            GpioPulseCounter::new(tacho_pin),
            settings.sampler_timing(),
        )),
    })
}

/// Waits for SIGINT/SIGTERM on a small single-threaded runtime and raises
/// `interrupted`. The thread is detached; it dies with the process.
fn spawn_signal_listener(interrupted: Arc<AtomicBool>) -> Result<(), AppError> {
    thread::Builder::new()
        .name("signals".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    warn!(error = %e, "Signal handling unavailable");
                    return;
                }
            };
            runtime.block_on(async {
                match shutdown_signal().await {
                    Ok(signal) => {
                        info!(signal, "Stop signal received");
                        interrupted.store(true, Ordering::SeqCst);
                    }
                    Err(e) => warn!(error = %e, "Failed to listen for stop signals"),
                }
            });
        })
        .map_err(EngineError::Spawn)?;
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|()| "SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|()| "ctrl-c")
}
