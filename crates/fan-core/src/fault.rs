//! Fault records with one-way escalation latches.
//!
//! A fault is created the first tick its condition is seen and destroyed the
//! tick the condition resolves. While live it only moves forward through
//! `Detected -> Notified -> Reported`; `Reported` means the fault escalated
//! to panic.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FaultKind {
    TemperatureReading,
    RotationCalculation,
    TachometerStall,
}

impl FaultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TemperatureReading => "temperature_reading",
            Self::RotationCalculation => "rotation_calculation",
            Self::TachometerStall => "tachometer_stall",
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Escalation {
    Detected,
    Notified,
    Reported,
}

#[derive(Debug, Clone)]
pub struct Fault {
    kind: FaultKind,
    created_at: Duration,
    stage: Escalation,
}

impl Fault {
    fn new(kind: FaultKind, now: Duration) -> Self {
        Self {
            kind,
            created_at: now,
            stage: Escalation::Detected,
        }
    }

    pub fn kind(&self) -> FaultKind {
        self.kind
    }

    pub fn created_at(&self) -> Duration {
        self.created_at
    }

    /// Whole seconds since first detection.
    pub fn age_secs(&self, now: Duration) -> u64 {
        now.saturating_sub(self.created_at).as_secs()
    }

    pub fn stage(&self) -> Escalation {
        self.stage
    }

    pub fn is_notified(&self) -> bool {
        self.stage >= Escalation::Notified
    }

    pub fn set_notified(&mut self) {
        self.stage = self.stage.max(Escalation::Notified);
    }

    pub fn is_reported(&self) -> bool {
        self.stage == Escalation::Reported
    }

    pub fn set_reported(&mut self) {
        self.stage = Escalation::Reported;
    }
}

/// Age thresholds for one fault kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationPolicy {
    /// Log-once warning threshold, in seconds.
    pub notify_after_secs: Option<u64>,
    /// Panic threshold, in seconds.
    pub panic_after_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultThresholds {
    pub temperature_reading: EscalationPolicy,
    pub rotation_calculation: EscalationPolicy,
    pub tachometer_stall: EscalationPolicy,
}

impl FaultThresholds {
    pub fn policy(&self, kind: FaultKind) -> EscalationPolicy {
        match kind {
            FaultKind::TemperatureReading => self.temperature_reading,
            FaultKind::RotationCalculation => self.rotation_calculation,
            FaultKind::TachometerStall => self.tachometer_stall,
        }
    }
}

impl Default for FaultThresholds {
    fn default() -> Self {
        Self {
            temperature_reading: EscalationPolicy {
                notify_after_secs: None,
                panic_after_secs: 60,
            },
            rotation_calculation: EscalationPolicy {
                notify_after_secs: None,
                panic_after_secs: 60,
            },
            tachometer_stall: EscalationPolicy {
                notify_after_secs: Some(120),
                panic_after_secs: 300,
            },
        }
    }
}

/// At most one live fault per kind.
#[derive(Debug, Default)]
pub struct FaultTracker {
    faults: BTreeMap<FaultKind, Fault>,
}

impl FaultTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a detection. Creates the fault on first call only; the
    /// creation time of a live fault is never moved.
    pub fn report(&mut self, kind: FaultKind, now: Duration) -> &mut Fault {
        self.faults
            .entry(kind)
            .or_insert_with(|| Fault::new(kind, now))
    }

    pub fn exists(&self, kind: FaultKind) -> bool {
        self.faults.contains_key(&kind)
    }

    pub fn get(&self, kind: FaultKind) -> Option<&Fault> {
        self.faults.get(&kind)
    }

    pub fn clear(&mut self, kind: FaultKind) -> Option<Fault> {
        self.faults.remove(&kind)
    }

    pub fn any_reported(&self) -> bool {
        self.faults.values().any(Fault::is_reported)
    }

    pub fn len(&self) -> usize {
        self.faults.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faults.is_empty()
    }
}
