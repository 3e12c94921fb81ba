//! Subscriber delivery channels
//!
//! A sink is the only thing the hub knows about a live connection: a
//! non-blocking way to hand it one event.

use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};

use super::events::StreamEvent;

/// Why a single delivery failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("subscriber connection is closed")]
    Closed,
    #[error("subscriber is not keeping up")]
    Lagging,
}

pub trait EventSink: Send + Sync {
    /// Hand one event to the subscriber without waiting
    fn deliver(&self, event: &StreamEvent) -> Result<(), SinkError>;
}

/// Sink backed by a bounded queue drained by the streaming response
#[derive(Debug)]
pub struct ChannelSink {
    sender: mpsc::Sender<StreamEvent>,
}

impl ChannelSink {
    pub fn new(sender: mpsc::Sender<StreamEvent>) -> Self {
        Self { sender }
    }

    /// Create a sink and the receiving half of its queue
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }
}

impl EventSink for ChannelSink {
    fn deliver(&self, event: &StreamEvent) -> Result<(), SinkError> {
        self.sender.try_send(event.clone()).map_err(|e| match e {
            TrySendError::Full(_) => SinkError::Lagging,
            TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_queue_reports_lagging() {
        let (sink, mut rx) = ChannelSink::channel(1);

        assert_eq!(sink.deliver(&StreamEvent::Heartbeat), Ok(()));
        assert_eq!(sink.deliver(&StreamEvent::Heartbeat), Err(SinkError::Lagging));

        assert!(rx.try_recv().is_ok());
        assert_eq!(sink.deliver(&StreamEvent::Heartbeat), Ok(()));
    }

    #[test]
    fn test_dropped_receiver_reports_closed() {
        let (sink, rx) = ChannelSink::channel(4);
        drop(rx);

        assert_eq!(sink.deliver(&StreamEvent::Heartbeat), Err(SinkError::Closed));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let (sink, _rx) = ChannelSink::channel(0);
        assert_eq!(sink.deliver(&StreamEvent::Heartbeat), Ok(()));
    }
}
