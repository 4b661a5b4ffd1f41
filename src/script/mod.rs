//! Remote script execution: capability surface and interpreter task

pub mod capabilities;
pub mod runtime;

pub use capabilities::{
    CapabilityEntry, CapabilityError, CapabilityTable, NativeFn, Sleeper, ThreadSleeper,
};
pub use runtime::{ScriptError, ScriptInitError, ScriptRuntime};
