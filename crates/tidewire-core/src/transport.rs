//! Outbound transport handles.
//!
//! The hub never writes to a socket directly. Each connection owns a bounded
//! queue; a dedicated writer task (in the server binding) drains it. Pushing
//! is a non-blocking enqueue, so a slow receiver can never stall a broadcast.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use tidewire_proto::Event;
use tokio::sync::mpsc;

use crate::error::TransportError;

/// Fire-and-forget push of an event to one connection.
pub trait Transport: Send + Sync + 'static {
    /// Enqueue an event without blocking.
    ///
    /// # Errors
    ///
    /// - `TransportError::Full` if the outbound queue is at capacity
    /// - `TransportError::Closed` if the receiving side is gone
    fn send(&self, event: Arc<Event>) -> Result<(), TransportError>;
}

/// Bounded in-memory queue feeding one connection's writer.
#[derive(Debug)]
pub struct QueueTransport {
    tx: mpsc::Sender<Arc<Event>>,
    dropped: AtomicU64,
}

impl QueueTransport {
    /// Create a transport and the receiver its writer drains.
    ///
    /// A `capacity` of zero is raised to one.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Arc<Event>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx, dropped: AtomicU64::new(0) }, rx)
    }

    /// Events refused since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Whether the receiving side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl Transport for QueueTransport {
    fn send(&self, event: Arc<Event>) -> Result<(), TransportError> {
        self.tx.try_send(event).map_err(|e| {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            match e {
                mpsc::error::TrySendError::Full(_) => TransportError::Full,
                mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use tidewire_proto::Pong;

    use super::*;

    fn pong() -> Arc<Event> {
        Arc::new(Event::Pong(Pong { timestamp: "2026-01-01T00:00:00.000Z".into() }))
    }

    #[test]
    fn send_enqueues() {
        let (transport, mut rx) = QueueTransport::channel(4);
        transport.send(pong()).unwrap();
        assert_eq!(rx.try_recv().unwrap().name(), "pong");
        assert_eq!(transport.dropped(), 0);
    }

    #[test]
    fn full_queue_refuses_and_counts() {
        let (transport, _rx) = QueueTransport::channel(1);
        transport.send(pong()).unwrap();
        assert_eq!(transport.send(pong()), Err(TransportError::Full));
        assert_eq!(transport.dropped(), 1);
    }

    #[test]
    fn closed_receiver_refuses() {
        let (transport, rx) = QueueTransport::channel(4);
        drop(rx);
        assert!(transport.is_closed());
        assert_eq!(transport.send(pong()), Err(TransportError::Closed));
    }

    #[test]
    fn zero_capacity_is_usable() {
        let (transport, mut rx) = QueueTransport::channel(0);
        transport.send(pong()).unwrap();
        assert!(rx.try_recv().is_ok());
    }
}
