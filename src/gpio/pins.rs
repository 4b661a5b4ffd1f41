//! Output pin bank abstraction
//!
//! `PinBank` is the only hardware surface the capability table touches.
//! `SimulatedPins` is the development backend: it tracks per-pin levels and
//! records every transition so tests can assert on actuation history.

use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

/// Binary output level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

/// Hardware-level failures
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PinError {
    #[error("pin {pin} outside valid range 0..{count}")]
    OutOfRange { pin: u8, count: u8 },
}

/// A bank of addressable output pins
pub trait PinBank: Send + Sync {
    /// Number of addressable pins; valid indices are `0..pin_count()`.
    fn pin_count(&self) -> u8;

    /// Drive `pin` to `level`.
    fn set_level(&self, pin: u8, level: Level) -> Result<(), PinError>;
}

/// In-memory pin bank that stands in for a real GPIO peripheral
pub struct SimulatedPins {
    levels: Mutex<Vec<Level>>,
    transitions: Mutex<Vec<(u8, Level)>>,
}

impl SimulatedPins {
    /// Create a bank of `count` output pins, all initially low.
    pub fn new(count: u8) -> Self {
        Self {
            levels: Mutex::new(vec![Level::Low; count as usize]),
            transitions: Mutex::new(Vec::new()),
        }
    }

    /// Current level of `pin`, if it exists.
    pub fn level(&self, pin: u8) -> Option<Level> {
        self.levels.lock().get(pin as usize).copied()
    }

    /// Every `set_level` call in order, for assertions.
    pub fn transitions(&self) -> Vec<(u8, Level)> {
        self.transitions.lock().clone()
    }
}

impl PinBank for SimulatedPins {
    fn pin_count(&self) -> u8 {
        self.levels.lock().len() as u8
    }

    fn set_level(&self, pin: u8, level: Level) -> Result<(), PinError> {
        let mut levels = self.levels.lock();
        let count = levels.len() as u8;
        let slot = levels
            .get_mut(pin as usize)
            .ok_or(PinError::OutOfRange { pin, count })?;
        *slot = level;
        drop(levels);

        self.transitions.lock().push((pin, level));
        debug!(pin, ?level, "pin level set");
        Ok(())
    }
}
