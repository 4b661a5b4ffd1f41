//! One-shot startup readiness gate
//!
//! Orders task startup: the network task signals once the uplink is usable,
//! and the inbound task blocks until then. Both halves are consumed by use,
//! so a gate cannot fire twice or be waited on after consumption.

use thiserror::Error;
use tokio::sync::oneshot;

/// Errors surfaced to the waiting task
#[derive(Error, Debug, PartialEq, Eq)]
pub enum GateError {
    /// The producer went away without ever signaling readiness. The
    /// prerequisite can no longer arrive, so the dependent task must abort.
    #[error("readiness producer dropped without signaling")]
    ProducerDropped,
}

/// Create a fresh gate as a (producer, consumer) pair
pub fn readiness_gate() -> (ReadinessSignal, ReadinessGate) {
    let (tx, rx) = oneshot::channel();
    (ReadinessSignal { tx }, ReadinessGate { rx })
}

/// Producer half, held by the task that completes the prerequisite
pub struct ReadinessSignal {
    tx: oneshot::Sender<()>,
}

impl ReadinessSignal {
    /// Mark the prerequisite complete and wake the waiter (or the waiter
    /// that arrives later).
    pub fn signal(self) {
        // A failed send means the consumer is already gone; there is nothing
        // left to wake.
        let _ = self.tx.send(());
    }
}

/// Consumer half, held by the single dependent task
pub struct ReadinessGate {
    rx: oneshot::Receiver<()>,
}

impl ReadinessGate {
    /// Block until the producer signals, consuming the gate.
    ///
    /// There is no timeout: a prerequisite that never completes keeps the
    /// dependent parked, which is the intended behavior for a task that is
    /// useless without it.
    pub async fn await_and_consume(self) -> Result<(), GateError> {
        self.rx.await.map_err(|_| GateError::ProducerDropped)
    }
}
