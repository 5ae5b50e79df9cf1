//! Broadcast bus with per-run stream lifecycle.

use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use crate::message::WireMessage;

/// Default channel capacity for the wire.
pub const DEFAULT_WIRE_CAPACITY: usize = 1024;

/// Multicast message bus from the engine to its subscribers.
///
/// `send` is non-blocking and never fails from the producer's viewpoint:
/// with no stream installed or no receivers it is a no-op, and slow
/// subscribers drop the oldest buffered messages. `complete` seals the
/// current stream (receivers drain what is buffered, then observe the
/// end); `reset` installs a fresh stream for the next run.
///
/// Cloning is cheap and shares the underlying stream.
#[derive(Debug, Clone)]
pub struct Wire {
    inner: Arc<WireInner>,
}

#[derive(Debug)]
struct WireInner {
    sender: RwLock<Option<broadcast::Sender<Arc<WireMessage>>>>,
    capacity: usize,
}

impl Wire {
    /// Create a wire with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_WIRE_CAPACITY)
    }

    /// Create a wire with a specific per-subscriber buffer capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(WireInner {
                sender: RwLock::new(Some(sender)),
                capacity,
            }),
        }
    }

    /// Broadcast a message to all current subscribers.
    ///
    /// Returns the number of receivers the message reached (0 when the
    /// stream is sealed or nobody is listening).
    pub fn send(&self, message: WireMessage) -> usize {
        let message = Arc::new(message);
        let guard = self
            .inner
            .sender
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match guard.as_ref() {
            Some(sender) => match sender.send(Arc::clone(&message)) {
                Ok(count) => {
                    trace!(kind = message.kind(), receivers = count, "Wire message sent");
                    count
                },
                Err(_) => {
                    trace!(kind = message.kind(), "No receivers for wire message");
                    0
                },
            },
            None => {
                trace!(kind = message.kind(), "Wire sealed, message dropped");
                0
            },
        }
    }

    /// Subscribe to the current stream.
    ///
    /// A receiver obtained after `complete` but before `reset` observes an
    /// already-ended stream.
    #[must_use]
    pub fn subscribe(&self) -> WireReceiver {
        let guard = self
            .inner
            .sender
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let receiver = guard.as_ref().map_or_else(
            || {
                // Sealed: hand out a receiver whose channel is already closed.
                let (sender, receiver) = broadcast::channel(1);
                drop(sender);
                receiver
            },
            broadcast::Sender::subscribe,
        );
        WireReceiver { receiver }
    }

    /// Seal the current stream.
    ///
    /// Subscribers drain buffered messages and then see the end of the
    /// stream. Subsequent `send`s are dropped until `reset`.
    pub fn complete(&self) {
        let mut guard = self
            .inner
            .sender
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if guard.take().is_some() {
            debug!("Wire stream completed");
        }
    }

    /// Install a fresh stream for the next run.
    pub fn reset(&self) {
        let (sender, _) = broadcast::channel(self.inner.capacity);
        let mut guard = self
            .inner
            .sender
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = Some(sender);
        debug!("Wire stream reset");
    }

    /// Number of active subscribers on the current stream.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .sender
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .as_ref()
            .map_or(0, broadcast::Sender::receiver_count)
    }
}

impl Default for Wire {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of the wire.
#[derive(Debug)]
pub struct WireReceiver {
    receiver: broadcast::Receiver<Arc<WireMessage>>,
}

impl WireReceiver {
    /// Receive the next message.
    ///
    /// Returns `None` once the stream ends. Lagged messages are skipped
    /// with a warning.
    pub async fn recv(&mut self) -> Option<Arc<WireMessage>> {
        loop {
            match self.receiver.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Wire receiver lagged, messages dropped");
                },
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Receive without blocking; `None` when empty or ended.
    pub fn try_recv(&mut self) -> Option<Arc<WireMessage>> {
        loop {
            match self.receiver.try_recv() {
                Ok(message) => return Some(message),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Wire receiver lagged, messages dropped");
                },
                Err(
                    broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed,
                ) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_and_receive() {
        let wire = Wire::new();
        let mut receiver = wire.subscribe();

        let count = wire.send(WireMessage::StepBegin { step: 1, depth: 0 });
        assert_eq!(count, 1);

        let msg = receiver.recv().await.unwrap();
        assert_eq!(msg.kind(), "step_begin");
    }

    #[tokio::test]
    async fn test_send_without_subscribers_is_noop() {
        let wire = Wire::new();
        assert_eq!(wire.send(WireMessage::CompactionBegin), 0);
    }

    #[tokio::test]
    async fn test_complete_seals_stream() {
        let wire = Wire::new();
        let mut receiver = wire.subscribe();

        wire.send(WireMessage::StepBegin { step: 1, depth: 0 });
        wire.complete();
        wire.send(WireMessage::StepBegin { step: 2, depth: 0 });

        // Buffered message drains, then the stream ends.
        assert!(receiver.recv().await.is_some());
        assert!(receiver.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_reset_installs_fresh_stream() {
        let wire = Wire::new();
        wire.complete();
        wire.reset();

        let mut receiver = wire.subscribe();
        wire.send(WireMessage::StepBegin { step: 1, depth: 0 });
        assert!(receiver.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_subscribe_after_complete_sees_ended_stream() {
        let wire = Wire::new();
        wire.complete();
        let mut receiver = wire.subscribe();
        assert!(receiver.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_same_stream() {
        let wire = Wire::new();
        let mut first = wire.subscribe();
        let mut second = wire.subscribe();

        assert_eq!(wire.subscriber_count(), 2);
        let count = wire.send(WireMessage::CompactionBegin);
        assert_eq!(count, 2);

        assert_eq!(first.recv().await.unwrap().kind(), "compaction_begin");
        assert_eq!(second.recv().await.unwrap().kind(), "compaction_begin");
    }

    #[tokio::test]
    async fn test_emission_order_preserved() {
        let wire = Wire::new();
        let mut receiver = wire.subscribe();

        for step in 1..=5 {
            wire.send(WireMessage::StepBegin { step, depth: 0 });
        }
        for expected in 1..=5 {
            let msg = receiver.recv().await.unwrap();
            match msg.as_ref() {
                WireMessage::StepBegin { step, .. } => assert_eq!(*step, expected),
                other => panic!("unexpected message: {other:?}"),
            }
        }
    }
}
