//! Capability table exposed to remote scripts
//!
//! The fixed set of native functions a script can call, kept
//! interpreter-agnostic: a registry of names bound to typed callbacks, tagged
//! by arity. Argument validation happens here; a failed call surfaces into
//! the script as an evaluation error and never reaches the hardware.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::gpio::{Level, PinBank, PinError};

/// Failures raised by capability calls, visible to the calling script
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("invalid argument for {name}: {reason}")]
    Argument { name: &'static str, reason: String },

    #[error(transparent)]
    Pin(#[from] PinError),
}

/// Native callback shapes the table can hold
pub enum NativeFn {
    Unary(Arc<dyn Fn(i64) -> Result<(), CapabilityError> + Send + Sync>),
    Binary(Arc<dyn Fn(i64, i64) -> Result<(), CapabilityError> + Send + Sync>),
    Ternary(Arc<dyn Fn(i64, i64, i64) -> Result<(), CapabilityError> + Send + Sync>),
}

/// A named native function with a fixed arity
pub struct CapabilityEntry {
    pub name: &'static str,
    pub func: NativeFn,
}

/// The set of native functions installed into the interpreter at startup.
/// Immutable once installed; nothing else bridges script-land to hardware.
#[derive(Default)]
pub struct CapabilityTable {
    entries: Vec<CapabilityEntry>,
}

/// Cooperative delay seam, so tests observe sleeps instead of waiting them out
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Parks the calling thread. The script runtime owns a dedicated thread, so
/// the rest of the firmware keeps running while a script sleeps.
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl CapabilityTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &'static str, func: NativeFn) {
        self.entries.push(CapabilityEntry { name, func });
    }

    pub fn entries(&self) -> &[CapabilityEntry] {
        &self.entries
    }

    /// Build the production table: `pin_set`, `blink`, `sleep`.
    pub fn standard(pins: Arc<dyn PinBank>, sleeper: Arc<dyn Sleeper>) -> Self {
        let mut table = Self::new();

        let pin_set = {
            let pins = pins.clone();
            move |pin: i64, level: i64| -> Result<(), CapabilityError> {
                let pin = checked_pin("pin_set", pin)?;
                let level = checked_level("pin_set", level)?;
                debug!(pin, ?level, "pin_set");
                pins.set_level(pin, level)?;
                Ok(())
            }
        };
        table.register("pin_set", NativeFn::Binary(Arc::new(pin_set)));

        let blink = {
            let pins = pins.clone();
            let sleeper = sleeper.clone();
            move |pin: i64, times: i64, period_ms: i64| -> Result<(), CapabilityError> {
                let pin = checked_pin("blink", pin)?;
                let times = checked_non_negative("blink", "times", times)?;
                let period = Duration::from_millis(checked_non_negative(
                    "blink",
                    "period_ms",
                    period_ms,
                )?);
                debug!(pin, times, period_ms, "blink");
                // Holds the script thread for the whole sequence; remote code
                // trades responsiveness for simplicity here.
                for _ in 0..times {
                    pins.set_level(pin, Level::Low)?;
                    sleeper.sleep(period);
                    pins.set_level(pin, Level::High)?;
                    sleeper.sleep(period);
                }
                Ok(())
            }
        };
        table.register("blink", NativeFn::Ternary(Arc::new(blink)));

        let sleep = {
            let sleeper = sleeper.clone();
            move |duration_ms: i64| -> Result<(), CapabilityError> {
                let duration = Duration::from_millis(checked_non_negative(
                    "sleep",
                    "duration_ms",
                    duration_ms,
                )?);
                debug!(duration_ms, "sleep");
                sleeper.sleep(duration);
                Ok(())
            }
        };
        table.register("sleep", NativeFn::Unary(Arc::new(sleep)));

        table
    }
}

fn checked_pin(name: &'static str, raw: i64) -> Result<u8, CapabilityError> {
    u8::try_from(raw).map_err(|_| CapabilityError::Argument {
        name,
        reason: format!("pin index {} out of range", raw),
    })
}

fn checked_level(name: &'static str, raw: i64) -> Result<Level, CapabilityError> {
    match raw {
        0 => Ok(Level::Low),
        1 => Ok(Level::High),
        other => Err(CapabilityError::Argument {
            name,
            reason: format!("level must be 0 or 1, got {}", other),
        }),
    }
}

fn checked_non_negative(
    name: &'static str,
    what: &str,
    raw: i64,
) -> Result<u64, CapabilityError> {
    u64::try_from(raw).map_err(|_| CapabilityError::Argument {
        name,
        reason: format!("{} must be non-negative, got {}", what, raw),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpio::SimulatedPins;
    use parking_lot::Mutex;

    /// Records requested sleep durations instead of waiting them out
    struct RecordingSleeper {
        slept: Mutex<Vec<Duration>>,
    }

    impl RecordingSleeper {
        fn new() -> Self {
            Self {
                slept: Mutex::new(Vec::new()),
            }
        }

        fn total(&self) -> Duration {
            self.slept.lock().iter().sum()
        }

        fn count(&self) -> usize {
            self.slept.lock().len()
        }
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.slept.lock().push(duration);
        }
    }

    fn standard_table(
        pin_count: u8,
    ) -> (CapabilityTable, Arc<SimulatedPins>, Arc<RecordingSleeper>) {
        let pins = Arc::new(SimulatedPins::new(pin_count));
        let sleeper = Arc::new(RecordingSleeper::new());
        let table = CapabilityTable::standard(pins.clone(), sleeper.clone());
        (table, pins, sleeper)
    }

    fn call_binary(table: &CapabilityTable, name: &str, a: i64, b: i64) -> Result<(), CapabilityError> {
        match &table
            .entries()
            .iter()
            .find(|e| e.name == name)
            .expect("capability not found")
            .func
        {
            NativeFn::Binary(f) => f(a, b),
            _ => panic!("{name} is not binary"),
        }
    }

    fn call_ternary(
        table: &CapabilityTable,
        name: &str,
        a: i64,
        b: i64,
        c: i64,
    ) -> Result<(), CapabilityError> {
        match &table
            .entries()
            .iter()
            .find(|e| e.name == name)
            .expect("capability not found")
            .func
        {
            NativeFn::Ternary(f) => f(a, b, c),
            _ => panic!("{name} is not ternary"),
        }
    }

    fn call_unary(table: &CapabilityTable, name: &str, a: i64) -> Result<(), CapabilityError> {
        match &table
            .entries()
            .iter()
            .find(|e| e.name == name)
            .expect("capability not found")
            .func
        {
            NativeFn::Unary(f) => f(a),
            _ => panic!("{name} is not unary"),
        }
    }

    #[test]
    fn test_standard_table_has_exactly_the_three_capabilities() {
        let (table, _, _) = standard_table(8);
        let names: Vec<_> = table.entries().iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["pin_set", "blink", "sleep"]);
    }

    #[test]
    fn test_pin_set_drives_the_pin() {
        let (table, pins, _) = standard_table(8);
        call_binary(&table, "pin_set", 2, 1).expect("pin_set failed");
        assert_eq!(pins.level(2), Some(Level::High));
    }

    #[test]
    fn test_pin_set_rejects_bad_level_without_side_effect() {
        let (table, pins, _) = standard_table(8);
        let err = call_binary(&table, "pin_set", 2, 7).unwrap_err();
        assert!(matches!(err, CapabilityError::Argument { name: "pin_set", .. }));
        assert!(pins.transitions().is_empty());
    }

    #[test]
    fn test_pin_set_rejects_out_of_range_pin_without_side_effect() {
        let (table, pins, _) = standard_table(8);

        let err = call_binary(&table, "pin_set", -1, 1).unwrap_err();
        assert!(matches!(err, CapabilityError::Argument { .. }));

        let err = call_binary(&table, "pin_set", 9, 1).unwrap_err();
        assert_eq!(err, CapabilityError::Pin(PinError::OutOfRange { pin: 9, count: 8 }));

        assert!(pins.transitions().is_empty());
    }

    #[test]
    fn test_blink_toggles_low_high_per_cycle() {
        let (table, pins, sleeper) = standard_table(8);
        call_ternary(&table, "blink", 2, 3, 100).expect("blink failed");

        assert_eq!(
            pins.transitions(),
            vec![
                (2, Level::Low),
                (2, Level::High),
                (2, Level::Low),
                (2, Level::High),
                (2, Level::Low),
                (2, Level::High),
            ]
        );
        assert_eq!(sleeper.count(), 6);
        assert_eq!(sleeper.total(), Duration::from_millis(600));
    }

    #[test]
    fn test_blink_with_zero_repetitions_is_a_no_op() {
        let (table, pins, sleeper) = standard_table(8);
        call_ternary(&table, "blink", 2, 0, 100).expect("blink failed");
        assert!(pins.transitions().is_empty());
        assert_eq!(sleeper.count(), 0);
    }

    #[test]
    fn test_blink_rejects_negative_count() {
        let (table, pins, _) = standard_table(8);
        let err = call_ternary(&table, "blink", 2, -1, 100).unwrap_err();
        assert!(matches!(err, CapabilityError::Argument { name: "blink", .. }));
        assert!(pins.transitions().is_empty());
    }

    #[test]
    fn test_sleep_requests_the_exact_duration() {
        let (table, _, sleeper) = standard_table(8);
        call_unary(&table, "sleep", 250).expect("sleep failed");
        assert_eq!(sleeper.total(), Duration::from_millis(250));
    }

    #[test]
    fn test_sleep_rejects_negative_duration() {
        let (table, _, sleeper) = standard_table(8);
        let err = call_unary(&table, "sleep", -5).unwrap_err();
        assert!(matches!(err, CapabilityError::Argument { name: "sleep", .. }));
        assert_eq!(sleeper.count(), 0);
    }
}
