//! Send status and the single pending-message slot.
//!
//! Both the send path and the write-readiness path touch these, so they
//! live together under one lock. The lock is never held across an await.

use std::sync::Arc;

use parking_lot::Mutex;

/// Socket status from the send path's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendStatus {
    /// No socket.
    #[default]
    NotConnected,
    /// Socket open, handshake running or write readiness outstanding.
    Connecting,
    /// Context established; writes go straight to the socket.
    Ready,
}

#[derive(Debug, Default)]
struct SlotInner {
    status: SendStatus,
    pending: Option<Vec<u8>>,
}

/// Shared status + pending message of one destination.
///
/// Holds at most one encoded message. A newer message replaces an
/// unflushed older one (last write wins).
#[derive(Debug, Clone, Default)]
pub struct SendSlot {
    inner: Arc<Mutex<SlotInner>>,
}

impl SendSlot {
    /// Create a slot in `NotConnected` with nothing pending.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current status.
    pub fn status(&self) -> SendStatus {
        self.inner.lock().status
    }

    /// True while the socket should be watched for write readiness.
    pub fn wants_write_notification(&self) -> bool {
        self.status() == SendStatus::Connecting
    }

    /// Check if a message is waiting for write readiness.
    pub fn has_pending(&self) -> bool {
        self.inner.lock().pending.is_some()
    }

    pub(crate) fn set_status(&self, status: SendStatus) {
        self.inner.lock().status = status;
    }

    /// Park `message` if the socket is still `Connecting`.
    ///
    /// Returns the message back when it should be sent right away.
    pub(crate) fn buffer_if_connecting(&self, message: Vec<u8>) -> Result<Option<Vec<u8>>, Vec<u8>> {
        let mut inner = self.inner.lock();
        if inner.status == SendStatus::Connecting {
            Ok(inner.pending.replace(message))
        } else {
            Err(message)
        }
    }

    /// Record write readiness: `Connecting -> Ready`.
    ///
    /// Returns false if the socket was not `Connecting`.
    pub fn mark_writable(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.status == SendStatus::Connecting {
            inner.status = SendStatus::Ready;
            true
        } else {
            false
        }
    }

    pub(crate) fn take_pending(&self) -> Option<Vec<u8>> {
        self.inner.lock().pending.take()
    }

    /// Back to `NotConnected`, returning any message that never went out.
    pub(crate) fn reset(&self) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock();
        inner.status = SendStatus::NotConnected;
        inner.pending.take()
    }
}
