use std::io;
use thiserror::Error;

/// Failure reported by a peripheral driver.
///
/// Temperature probes never return this (a failed read is an absent value);
/// actuators do, and inside a tick it is treated as an unmodeled failure.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
    #[error("device unavailable: {0}")]
    Unavailable(String),
    #[error("malformed device output: {0}")]
    Malformed(String),
}

impl DriverError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("driver failure: {0}")]
    Driver(#[from] DriverError),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("control loop panicked")]
    Panicked,
    #[error("failed to spawn control loop thread: {0}")]
    Spawn(#[source] io::Error),
}
