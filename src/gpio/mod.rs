//! GPIO output seam

pub mod pins;

pub use pins::{Level, PinBank, PinError, SimulatedPins};
