//! In-flight request correlation.
//!
//! # Responsibilities
//! - Hold one one-shot channel per proxied request, keyed by message id
//! - Deliver each downstream response to exactly one waiting handler
//!
//! # Design Decisions
//! - The entry is created before the request frame is enqueued, so a fast
//!   response can never miss its subscriber
//! - Delivery removes the entry first; a duplicate response for the same id
//!   finds nothing and is discarded upstream

use dashmap::DashMap;
use tokio::sync::oneshot;

use crate::codec::Frame;

/// Map of message id to the handler waiting on that exchange.
#[derive(Debug, Default)]
pub struct PendingRequests {
    inner: DashMap<String, oneshot::Sender<Frame>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the wait channel for a message id. The caller must `remove`
    /// the entry on every exit path.
    pub fn register(&self, message_id: &str) -> oneshot::Receiver<Frame> {
        let (tx, rx) = oneshot::channel();
        self.inner.insert(message_id.to_string(), tx);
        rx
    }

    /// Deliver a response frame to its waiting handler. Returns false when
    /// nobody is waiting (unknown id, timed-out handler, duplicate).
    pub fn complete(&self, message_id: &str, frame: Frame) -> bool {
        match self.inner.remove(message_id) {
            Some((_, tx)) => tx.send(frame).is_ok(),
            None => false,
        }
    }

    /// Drop a wait entry without delivering anything.
    pub fn remove(&self, message_id: &str) {
        self.inner.remove(message_id);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Payload, Response};

    fn response_frame(id: &str) -> Frame {
        Frame {
            message_id: id.to_string(),
            payload: Payload::Response(Response {
                id: id.to_string(),
                status_code: 200,
                ..Response::default()
            }),
        }
    }

    #[tokio::test]
    async fn test_register_complete_delivers_once() {
        let pending = PendingRequests::new();
        let rx = pending.register("m1");

        assert!(pending.complete("m1", response_frame("m1")));
        let frame = rx.await.unwrap();
        assert_eq!(frame.message_id, "m1");

        // Entry is gone; a second response has nowhere to go.
        assert!(!pending.complete("m1", response_frame("m1")));
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_complete_unknown_id_is_noop() {
        let pending = PendingRequests::new();
        assert!(!pending.complete("ghost", response_frame("ghost")));
    }

    #[tokio::test]
    async fn test_remove_drops_waiter() {
        let pending = PendingRequests::new();
        let rx = pending.register("m2");
        pending.remove("m2");

        assert!(pending.is_empty());
        assert!(rx.await.is_err());
    }
}
