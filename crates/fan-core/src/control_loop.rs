use crate::engine::ControlEngine;
use crate::error::EngineError;
use crate::timebase::TimeBase;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Longest single sleep between stop-flag checks.
const STOP_POLL: Duration = Duration::from_millis(100);

#[derive(Clone, Default, Debug)]
pub struct ExecutionStats {
    pub ticks_executed: u64,
    pub ticks_missed: u64,
    pub max_tick_us: u64,
    pub panics: u64,
    pub resets: u64,
}

/// Drives [`ControlEngine::tick`] on a fixed cadence until stopped.
pub struct ControlLoop {
    engine: ControlEngine,
    timebase: TimeBase,
    stats: ExecutionStats,
}

impl ControlLoop {
    pub fn new(engine: ControlEngine, timebase: TimeBase) -> Self {
        Self {
            engine,
            timebase,
            stats: ExecutionStats::default(),
        }
    }

    /// Tick until `stop` is set. A failed or panicking tick runs the
    /// fail-safe and ends the loop with the error; it is never retried.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<(), EngineError> {
        let interval = self.engine.config().tick_interval;
        let mut next_tick = Instant::now();

        while !stop.load(Ordering::Relaxed) {
            let now = Instant::now();
            if now < next_tick {
                thread::sleep((next_tick - now).min(STOP_POLL));
                continue;
            }

            let overrun = now.duration_since(next_tick);
            if overrun >= interval {
                let missed = (overrun.as_nanos() / interval.as_nanos()) as u64;
                self.stats.ticks_missed += missed;
                warn!(missed, overrun_ms = overrun.as_millis() as u64, "Tick overrun");
                next_tick = now;
            }

            let tick_start = Instant::now();
            let timestamp = self.timebase.now();
            let engine = &mut self.engine;
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| engine.tick(timestamp)));
            let result = match outcome {
                Ok(result) => result.map(|_| ()),
                Err(_) => Err(EngineError::Panicked),
            };

            if let Err(e) = result {
                error!(error = %e, "CRASH, engine iteration failed, entering crash mode");
                self.engine.fail_safe();
                self.sync_engine_stats();
                return Err(e);
            }

            let tick_us = tick_start.elapsed().as_micros() as u64;
            self.stats.max_tick_us = self.stats.max_tick_us.max(tick_us);
            self.stats.ticks_executed += 1;
            self.sync_engine_stats();

            next_tick += interval;
        }
        Ok(())
    }

    fn sync_engine_stats(&mut self) {
        let engine_stats = self.engine.stats();
        self.stats.panics = engine_stats.panics;
        self.stats.resets = engine_stats.resets;
    }

    pub fn stats(&self) -> &ExecutionStats {
        &self.stats
    }

    pub fn engine(&self) -> &ControlEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut ControlEngine {
        &mut self.engine
    }
}

/// Host-facing handle over the control loop thread.
pub struct FanController {
    stop: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<ExecutionStats, EngineError>>>,
}

impl FanController {
    /// Start peripherals and spawn the tick loop.
    pub fn start(mut engine: ControlEngine, timebase: TimeBase) -> Result<Self, EngineError> {
        engine.start_peripherals()?;

        let stop = Arc::new(AtomicBool::new(false));
        let running = Arc::new(AtomicBool::new(true));
        let stop_loop = Arc::clone(&stop);
        let running_loop = Arc::clone(&running);

        info!(
            tick_interval_ms = engine.config().tick_interval.as_millis() as u64,
            "Starting control loop"
        );

        let spawned = thread::Builder::new()
            .name("fan-control".to_string())
            .spawn(move || {
                let mut control = ControlLoop::new(engine, timebase);
                let result = control.run(&stop_loop);
                control.engine_mut().shutdown_peripherals();
                running_loop.store(false, Ordering::SeqCst);

                let stats = control.stats().clone();
                info!(
                    ticks_executed = stats.ticks_executed,
                    ticks_missed = stats.ticks_missed,
                    panics = stats.panics,
                    resets = stats.resets,
                    "Control loop exited"
                );
                result.map(|()| stats)
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                running.store(false, Ordering::SeqCst);
                return Err(EngineError::Spawn(e));
            }
        };

        Ok(Self {
            stop,
            running,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ask the loop to exit after its current tick.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Signal the loop and wait for it to release the peripherals.
    pub fn stop(mut self) -> Result<ExecutionStats, EngineError> {
        info!("Stop signal received, terminating engine thread");
        self.request_stop();
        self.join()
    }

    fn join(&mut self) -> Result<ExecutionStats, EngineError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| EngineError::Panicked)?,
            None => Ok(ExecutionStats::default()),
        }
    }
}

impl Drop for FanController {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.request_stop();
            if let Err(e) = self.join() {
                error!(error = %e, "Control loop ended with an error");
            }
        }
    }
}
