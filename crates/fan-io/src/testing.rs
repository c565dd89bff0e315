use crate::gpio::{InputPin, Level, OutputPin};
use fan_core::DriverError;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Output pin that remembers every level written to it.
#[derive(Clone, Default)]
pub struct RecordingPin {
    levels: Arc<Mutex<Vec<Level>>>,
    released: Arc<Mutex<bool>>,
}

impl RecordingPin {
    pub fn levels(&self) -> Vec<Level> {
        self.levels.lock().unwrap().clone()
    }

    pub fn released(&self) -> bool {
        *self.released.lock().unwrap()
    }
}

impl OutputPin for RecordingPin {
    fn write(&mut self, level: Level) -> Result<(), DriverError> {
        self.levels.lock().unwrap().push(level);
        Ok(())
    }

    fn release(&mut self) {
        *self.released.lock().unwrap() = true;
    }
}

/// Input pin replaying a fixed level sequence, then holding the last one.
pub struct ScriptedInput {
    levels: VecDeque<Level>,
    last: Level,
}

impl ScriptedInput {
    pub fn new(levels: impl IntoIterator<Item = Level>) -> Self {
        Self {
            levels: levels.into_iter().collect(),
            last: Level::High,
        }
    }
}

impl InputPin for ScriptedInput {
    fn read(&mut self) -> Result<Level, DriverError> {
        if let Some(level) = self.levels.pop_front() {
            self.last = level;
        }
        Ok(self.last)
    }
}
