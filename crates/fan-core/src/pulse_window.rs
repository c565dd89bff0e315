use std::collections::{HashMap, VecDeque};

pub const DEFAULT_CAPACITY: usize = 15;

/// Fixed-capacity FIFO of tachometer pulse counts.
///
/// Not synchronized; the sampler and the tick loop share it behind a lock.
#[derive(Debug, Clone)]
pub struct PulseWindow {
    samples: VecDeque<u32>,
    capacity: usize,
}

impl PulseWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest once full.
    pub fn push(&mut self, count: u32) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(count);
    }

    pub fn average(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: u64 = self.samples.iter().map(|&c| u64::from(c)).sum();
        sum as f64 / self.samples.len() as f64
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of distinct values seen more than once. Reads 0 until the
    /// window is full so warm-up never looks like a stall.
    pub fn repeated_count(&self) -> usize {
        if !self.is_full() {
            return 0;
        }
        let mut occurrences: HashMap<u32, usize> = HashMap::new();
        for &count in &self.samples {
            *occurrences.entry(count).or_default() += 1;
        }
        occurrences.values().filter(|&&n| n > 1).count()
    }

    pub fn samples(&self) -> impl Iterator<Item = u32> + '_ {
        self.samples.iter().copied()
    }
}

impl Default for PulseWindow {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
