//! Per-session outbound sink.
//!
//! A bounded many-producer/single-consumer queue of outbound envelopes.
//! Producers are the session's own reader, the Coordinator, and every room
//! the session belongs to; the single consumer is the session's writer pump.
//!
//! On top of the plain channel the sink carries an explicit close signal, so
//! a room can end one member's stream without owning the only sender handle.
//! A closed sink drains whatever is already queued and then reports
//! end-of-stream, matching closed-channel delivery semantics.

use crate::messages::Outbound;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendTimeoutError, TryRecvError};
use tokio_util::sync::CancellationToken;

/// Why a sink submission failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SinkSendError {
    #[error("sink closed")]
    Closed,
    #[error("sink full past the delivery budget")]
    Timeout,
}

/// Producer half of a session's outbound queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct OutboundSink {
    tx: mpsc::Sender<Outbound>,
    closed: CancellationToken,
}

/// Consumer half, owned by the session's writer pump.
pub struct SinkConsumer {
    rx: mpsc::Receiver<Outbound>,
    closed: CancellationToken,
}

impl OutboundSink {
    /// Create a bounded sink and its consumer half.
    pub fn channel(capacity: usize) -> (OutboundSink, SinkConsumer) {
        let (tx, rx) = mpsc::channel(capacity);
        let closed = CancellationToken::new();
        (
            OutboundSink {
                tx,
                closed: closed.clone(),
            },
            SinkConsumer { rx, closed },
        )
    }

    /// Queue an envelope, waiting for capacity.
    pub async fn send(&self, item: impl Into<Outbound>) -> Result<(), SinkSendError> {
        if self.closed.is_cancelled() {
            return Err(SinkSendError::Closed);
        }
        tokio::select! {
            _ = self.closed.cancelled() => Err(SinkSendError::Closed),
            sent = self.tx.send(item.into()) => sent.map_err(|_| SinkSendError::Closed),
        }
    }

    /// Queue an envelope within a bounded wait. Used by room fan-out, where
    /// a slow consumer must never stall the loop.
    pub async fn send_timeout(
        &self,
        item: impl Into<Outbound>,
        wait: Duration,
    ) -> Result<(), SinkSendError> {
        if self.closed.is_cancelled() {
            return Err(SinkSendError::Closed);
        }
        tokio::select! {
            _ = self.closed.cancelled() => Err(SinkSendError::Closed),
            sent = self.tx.send_timeout(item.into(), wait) => sent.map_err(|err| match err {
                SendTimeoutError::Timeout(_) => SinkSendError::Timeout,
                SendTimeoutError::Closed(_) => SinkSendError::Closed,
            }),
        }
    }

    /// Close the sink. Idempotent; the consumer observes end-of-stream after
    /// draining what is already queued.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.tx.is_closed()
    }
}

impl SinkConsumer {
    /// Receive the next envelope, or `None` once the sink is closed and
    /// drained (or every producer is gone).
    pub async fn recv(&mut self) -> Option<Outbound> {
        tokio::select! {
            biased;
            item = self.rx.recv() => item,
            _ = self.closed.cancelled() => self.rx.try_recv().ok(),
        }
    }

    /// Non-blocking receive, used to flush queued envelopes on teardown.
    pub fn try_recv(&mut self) -> Result<Outbound, TryRecvError> {
        self.rx.try_recv()
    }
}
