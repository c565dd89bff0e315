//! Fan tachometer.
//!
//! Counting every edge continuously would keep a core busy, so pulses are
//! counted for a short window once per sampling period. Each count is pushed
//! into a [`PulseWindow`] the engine reads its average and stall signal from.

use crate::gpio::{InputPin, Level};
use crate::sleep_while;
use fan_core::{DriverError, PulseWindow, Tachometer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Something that can count fan pulses over a time window.
pub trait PulseSource: Send + 'static {
    fn sample(&mut self, window: Duration) -> Result<u32, DriverError>;

    fn release(&mut self) {}
}

/// Counts falling edges by polling an input line.
pub struct GpioPulseCounter<P> {
    pin: P,
    poll_interval: Duration,
}

impl<P: InputPin> GpioPulseCounter<P> {
    pub fn new(pin: P) -> Self {
        Self {
            pin,
            poll_interval: Duration::from_micros(500),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

impl<P: InputPin + 'static> PulseSource for GpioPulseCounter<P> {
    fn sample(&mut self, window: Duration) -> Result<u32, DriverError> {
        let deadline = Instant::now() + window;
        let mut previous = self.pin.read()?;
        let mut edges = 0u32;
        while Instant::now() < deadline {
            let level = self.pin.read()?;
            if previous == Level::High && level == Level::Low {
                edges += 1;
            }
            previous = level;
            if !self.poll_interval.is_zero() {
                thread::sleep(self.poll_interval);
            }
        }
        Ok(edges)
    }

    fn release(&mut self) {
        self.pin.release();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerTiming {
    /// Counting window per sample.
    pub window: Duration,
    /// Time from the start of one sample to the start of the next.
    pub period: Duration,
}

impl Default for SamplerTiming {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(1),
            period: Duration::from_secs(16),
        }
    }
}

pub struct SampledTachometer<S> {
    source: Option<S>,
    timing: SamplerTiming,
    window: Arc<Mutex<PulseWindow>>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<S>>,
}

fn lock(window: &Mutex<PulseWindow>) -> MutexGuard<'_, PulseWindow> {
    window.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<S: PulseSource> SampledTachometer<S> {
    pub fn new(source: S, timing: SamplerTiming) -> Self {
        Self::with_window(source, timing, PulseWindow::default())
    }

    pub fn with_window(source: S, timing: SamplerTiming, window: PulseWindow) -> Self {
        Self {
            source: Some(source),
            timing,
            window: Arc::new(Mutex::new(window)),
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    pub fn is_sampling(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn sampler_loop(
        mut source: S,
        timing: SamplerTiming,
        window: Arc<Mutex<PulseWindow>>,
        running: Arc<AtomicBool>,
    ) -> S {
        let idle = timing.period.saturating_sub(timing.window);
        while running.load(Ordering::SeqCst) {
            match source.sample(timing.window) {
                Ok(count) => {
                    debug!(count, "Tachometer sample");
                    lock(&window).push(count);
                }
                Err(e) => warn!(error = %e, "Tachometer sample failed"),
            }
            if !sleep_while(&running, idle) {
                break;
            }
        }
        source
    }
}

impl<S: PulseSource> Tachometer for SampledTachometer<S> {
    fn start(&mut self) -> Result<(), DriverError> {
        if self.worker.is_some() {
            return Ok(());
        }
        let source = self.source.take().ok_or_else(|| {
            DriverError::Unavailable("tachometer already shut down".to_string())
        })?;

        self.running.store(true, Ordering::SeqCst);
        let window = Arc::clone(&self.window);
        let running = Arc::clone(&self.running);
        let timing = self.timing;
        let handle = thread::Builder::new()
            .name("tachometer".to_string())
            .spawn(move || Self::sampler_loop(source, timing, window, running))
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                DriverError::io("spawning tachometer thread", e)
            })?;

        info!(
            window_ms = timing.window.as_millis() as u64,
            period_ms = timing.period.as_millis() as u64,
            "Tachometer sampling started"
        );
        self.worker = Some(handle);
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            match worker.join() {
                Ok(source) => self.source = Some(source),
                Err(_) => error!("Tachometer thread panicked"),
            }
        }
    }

    fn shutdown(&mut self) {
        self.stop();
        if let Some(mut source) = self.source.take() {
            source.release();
        }
    }

    fn avg_pulses(&self) -> u32 {
        lock(&self.window).average() as u32
    }

    fn repeated_pulses(&self) -> usize {
        lock(&self.window).repeated_count()
    }
}

impl<S> Drop for SampledTachometer<S> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
