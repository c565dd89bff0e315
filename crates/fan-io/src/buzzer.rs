//! Piezo buzzer on an output line.
//!
//! Single tones block the caller. The intermittent alarm runs on its own
//! thread and there is never more than one such thread alive.

use crate::gpio::{Level, OutputPin};
use crate::sleep_while;
use fan_core::{BuzzLength, Buzzer, DriverError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuzzerTiming {
    pub high: Duration,
    pub short_high: Duration,
    pub intermittent_low: Duration,
}

impl Default for BuzzerTiming {
    fn default() -> Self {
        Self {
            high: Duration::from_secs(1),
            short_high: Duration::from_millis(200),
            intermittent_low: Duration::from_secs(4),
        }
    }
}

pub struct PatternBuzzer<P> {
    pin: Arc<Mutex<P>>,
    timing: BuzzerTiming,
    active: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

fn lock<P>(pin: &Mutex<P>) -> MutexGuard<'_, P> {
    pin.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<P: OutputPin + 'static> PatternBuzzer<P> {
    pub fn new(pin: P, timing: BuzzerTiming) -> Self {
        Self {
            pin: Arc::new(Mutex::new(pin)),
            timing,
            active: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    pub fn is_alarming(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn join_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Buzzer thread panicked");
            }
        }
    }

    fn alarm_loop(pin: Arc<Mutex<P>>, active: Arc<AtomicBool>, timing: BuzzerTiming) {
        while active.load(Ordering::SeqCst) {
            if let Err(e) = lock(&pin).write(Level::High) {
                error!(error = %e, "Buzzer alarm write failed");
                break;
            }
            let keep_going = sleep_while(&active, timing.high);
            if let Err(e) = lock(&pin).write(Level::Low) {
                error!(error = %e, "Buzzer alarm write failed");
                break;
            }
            if !keep_going || !sleep_while(&active, timing.intermittent_low) {
                break;
            }
        }
        active.store(false, Ordering::SeqCst);
        debug!("Buzzer alarm thread exited");
    }
}

impl<P: OutputPin + 'static> Buzzer for PatternBuzzer<P> {
    fn buzz_once(&mut self, length: BuzzLength) -> Result<(), DriverError> {
        let high = match length {
            BuzzLength::Normal => self.timing.high,
            BuzzLength::Short => self.timing.short_high,
        };
        let mut pin = lock(&self.pin);
        pin.write(Level::High)?;
        thread::sleep(high);
        pin.write(Level::Low)
    }

    fn buzz_intermittent(&mut self) -> Result<(), DriverError> {
        if self.active.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        // A previous alarm may still be winding down.
        self.join_worker();

        let pin = Arc::clone(&self.pin);
        let active = Arc::clone(&self.active);
        let timing = self.timing;
        let spawned = thread::Builder::new()
            .name("buzzer-alarm".to_string())
            .spawn(move || Self::alarm_loop(pin, active, timing));

        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.active.store(false, Ordering::SeqCst);
                Err(DriverError::io("spawning buzzer thread", e))
            }
        }
    }

    fn stop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        self.join_worker();
        if let Err(e) = lock(&self.pin).write(Level::Low) {
            warn!(error = %e, "Failed to silence buzzer");
        }
    }

    fn shutdown(&mut self) {
        self.stop();
        lock(&self.pin).release();
    }
}

impl<P> Drop for PatternBuzzer<P> {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingPin;

    fn fast_timing() -> BuzzerTiming {
        BuzzerTiming {
            high: Duration::from_millis(20),
            short_high: Duration::from_millis(5),
            intermittent_low: Duration::from_millis(20),
        }
    }

    fn wait_for_highs(pin: &RecordingPin, n: usize) -> bool {
        for _ in 0..500 {
            if pin.levels().iter().filter(|l| **l == Level::High).count() >= n {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn single_tone_toggles_once() {
        let pin = RecordingPin::default();
        let mut buzzer = PatternBuzzer::new(pin.clone(), fast_timing());
        buzzer.buzz_once(BuzzLength::Short).unwrap();
        buzzer.buzz_once(BuzzLength::Normal).unwrap();
        assert_eq!(
            pin.levels(),
            vec![Level::High, Level::Low, Level::High, Level::Low]
        );
    }

    #[test]
    fn alarm_repeats_until_stopped() {
        let pin = RecordingPin::default();
        let mut buzzer = PatternBuzzer::new(pin.clone(), fast_timing());
        buzzer.buzz_intermittent().unwrap();
        assert!(buzzer.is_alarming());
        assert!(wait_for_highs(&pin, 2));

        buzzer.stop();
        assert!(!buzzer.is_alarming());
        let levels = pin.levels();
        assert_eq!(levels.last(), Some(&Level::Low));

        // Nothing more is written once stopped.
        thread::sleep(Duration::from_millis(60));
        assert_eq!(pin.levels().len(), levels.len());
    }

    #[test]
    fn repeated_alarm_requests_share_one_thread() {
        let pin = RecordingPin::default();
        let mut buzzer = PatternBuzzer::new(pin.clone(), fast_timing());
        buzzer.buzz_intermittent().unwrap();
        let first = buzzer.worker.as_ref().map(|w| w.thread().id());
        buzzer.buzz_intermittent().unwrap();
        assert_eq!(buzzer.worker.as_ref().map(|w| w.thread().id()), first);
        buzzer.stop();
    }

    #[test]
    fn alarm_can_restart_after_stop() {
        let pin = RecordingPin::default();
        let mut buzzer = PatternBuzzer::new(pin.clone(), fast_timing());
        buzzer.buzz_intermittent().unwrap();
        buzzer.stop();
        buzzer.buzz_intermittent().unwrap();
        assert!(buzzer.is_alarming());
        buzzer.shutdown();
        assert!(pin.released());
        assert_eq!(pin.levels().last(), Some(&Level::Low));
    }
}
