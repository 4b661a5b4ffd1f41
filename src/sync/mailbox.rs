//! Single-slot code mailbox between the broker callback and the script task
//!
//! Single producer, single consumer. Accepted payloads overwrite the slot,
//! and wakes coalesce: any number of accepts before the reader runs produce
//! exactly one wake that observes only the newest payload. Nothing here ever
//! blocks the producer.

use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Notify;

/// Rejection reasons for inbound payloads
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MailboxError {
    /// Payload does not fit the slot. The stored payload and the wake state
    /// are left untouched.
    #[error("payload of {len} bytes exceeds mailbox capacity {capacity}")]
    TooLarge { len: usize, capacity: usize },

    /// Zero-length payloads are dropped at ingress; an empty script has no
    /// effect and does not merit a wake.
    #[error("empty payload")]
    Empty,
}

/// An owned copy of the payload current at wake time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeSnapshot(Vec<u8>);

impl CodeSnapshot {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

struct Shared {
    slot: Mutex<Vec<u8>>,
    wake: Notify,
    capacity: usize,
}

/// Create a mailbox, returning the producer and consumer halves.
///
/// Neither half is cloneable; the single-writer/single-reader discipline is
/// part of the type surface.
pub fn code_mailbox(capacity: usize) -> (CodeWriter, CodeReader) {
    let shared = Arc::new(Shared {
        slot: Mutex::new(Vec::with_capacity(capacity)),
        wake: Notify::new(),
        capacity,
    });
    (
        CodeWriter {
            shared: shared.clone(),
        },
        CodeReader { shared },
    )
}

/// Producer half, driven from the broker delivery context
pub struct CodeWriter {
    shared: Arc<Shared>,
}

impl CodeWriter {
    /// Store `payload` and raise the wake. Never blocks and never awaits;
    /// the slot lock is only ever held for a memcpy.
    ///
    /// Payloads must be non-empty and strictly smaller than the configured
    /// capacity; rejected payloads leave the slot and the wake unchanged.
    pub fn try_accept(&self, payload: &[u8]) -> Result<(), MailboxError> {
        if payload.is_empty() {
            return Err(MailboxError::Empty);
        }
        if payload.len() >= self.shared.capacity {
            return Err(MailboxError::TooLarge {
                len: payload.len(),
                capacity: self.shared.capacity,
            });
        }

        {
            let mut slot = self.shared.slot.lock();
            slot.clear();
            slot.extend_from_slice(payload);
        }
        // notify_one stores at most one permit, so repeated accepts before
        // the reader runs collapse into a single wake.
        self.shared.wake.notify_one();
        Ok(())
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}

/// Consumer half, owned by the script task
pub struct CodeReader {
    shared: Arc<Shared>,
}

impl CodeReader {
    /// Await the next wake, then snapshot whatever payload is current.
    ///
    /// If several payloads were accepted while the reader was busy, only the
    /// most recent one is observed; superseded payloads are gone.
    pub async fn wait_and_take(&mut self) -> CodeSnapshot {
        self.shared.wake.notified().await;
        let slot = self.shared.slot.lock();
        CodeSnapshot(slot.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn test_take_returns_accepted_payload() {
        let (writer, mut reader) = code_mailbox(64);
        writer.try_accept(b"pin_set(2, 1)").expect("accept failed");

        let snapshot = reader.wait_and_take().await;
        assert_eq!(snapshot.as_bytes(), b"pin_set(2, 1)");
    }

    #[tokio::test]
    async fn test_writes_coalesce_to_newest_payload() {
        let (writer, mut reader) = code_mailbox(64);
        writer.try_accept(b"sleep(1)").expect("accept failed");
        writer.try_accept(b"sleep(2)").expect("accept failed");
        writer.try_accept(b"sleep(3)").expect("accept failed");

        let snapshot = reader.wait_and_take().await;
        assert_eq!(snapshot.as_bytes(), b"sleep(3)");

        // The superseded payloads must not have queued a second wake
        assert!(timeout(WAIT, reader.wait_and_take()).await.is_err());
    }

    #[tokio::test]
    async fn test_oversized_payload_leaves_slot_and_wake_untouched() {
        let (writer, mut reader) = code_mailbox(8);

        let err = writer.try_accept(b"12345678").unwrap_err();
        assert_eq!(
            err,
            MailboxError::TooLarge {
                len: 8,
                capacity: 8
            }
        );

        // No wake was raised by the rejected payload
        assert!(timeout(WAIT, reader.wait_and_take()).await.is_err());

        // A later accepted payload is the only thing the reader ever sees
        writer.try_accept(b"ok").expect("accept failed");
        let snapshot = reader.wait_and_take().await;
        assert_eq!(snapshot.as_bytes(), b"ok");
    }

    #[tokio::test]
    async fn test_payload_one_under_capacity_is_accepted() {
        let (writer, mut reader) = code_mailbox(8);
        writer.try_accept(b"1234567").expect("accept failed");
        assert_eq!(reader.wait_and_take().await.as_bytes(), b"1234567");
    }

    #[tokio::test]
    async fn test_empty_payload_is_rejected_without_wake() {
        let (writer, mut reader) = code_mailbox(8);
        assert_eq!(writer.try_accept(b"").unwrap_err(), MailboxError::Empty);
        assert!(timeout(WAIT, reader.wait_and_take()).await.is_err());
    }

    #[tokio::test]
    async fn test_reader_parks_until_a_payload_arrives() {
        let (writer, mut reader) = code_mailbox(64);

        let reader_task = tokio::spawn(async move { reader.wait_and_take().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!reader_task.is_finished());

        writer.try_accept(b"sleep(5)").expect("accept failed");
        let snapshot = reader_task.await.expect("reader panicked");
        assert_eq!(snapshot.as_bytes(), b"sleep(5)");
    }
}
