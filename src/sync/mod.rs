//! Startup and handoff primitives shared between tasks

pub mod gate;
pub mod mailbox;

pub use gate::{readiness_gate, GateError, ReadinessGate, ReadinessSignal};
pub use mailbox::{code_mailbox, CodeReader, CodeSnapshot, CodeWriter, MailboxError};
