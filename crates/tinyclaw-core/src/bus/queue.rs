//! Async message bus — bounded queues decoupling channels from the agent.
//!
//! Two bounded FIFO queues, inbound and outbound. Publishing never blocks:
//! when a queue is full the message is dropped, a warning is logged, and a
//! drop counter ticks — producers must not rely on delivery (at-most-once).
//! Consuming blocks, or polls with a timeout.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

use super::types::{InboundMessage, OutboundMessage};
use crate::error::BusOverflow;

/// Default queue capacity when the config does not override it.
pub const DEFAULT_BUS_CAPACITY: usize = 100;

/// The message bus connecting channels ↔ agent loop.
///
/// - Channels publish to `inbound` (user messages arriving)
/// - Agent workers consume from `inbound`, process, publish to `outbound`
/// - The channel manager consumes from `outbound` and routes to channels
pub struct MessageBus {
    inbound_tx: mpsc::Sender<InboundMessage>,
    inbound_rx: tokio::sync::Mutex<mpsc::Receiver<InboundMessage>>,
    outbound_tx: mpsc::Sender<OutboundMessage>,
    outbound_rx: tokio::sync::Mutex<mpsc::Receiver<OutboundMessage>>,
    inbound_dropped: AtomicU64,
    outbound_dropped: AtomicU64,
}

impl MessageBus {
    /// Create a new message bus with the given queue capacity.
    pub fn new(capacity: usize) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity.max(1));
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity.max(1));

        MessageBus {
            inbound_tx,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            outbound_tx,
            outbound_rx: tokio::sync::Mutex::new(outbound_rx),
            inbound_dropped: AtomicU64::new(0),
            outbound_dropped: AtomicU64::new(0),
        }
    }

    /// Publish a message from a channel to the agent (inbound).
    ///
    /// Non-blocking; on a full queue the message is dropped.
    pub fn publish_inbound(&self, msg: InboundMessage) -> Result<(), BusOverflow> {
        match self.inbound_tx.try_send(msg) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(msg)) => {
                self.inbound_dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    channel = %msg.channel,
                    chat_id = %msg.chat_id,
                    "inbound queue full, dropping message"
                );
                Err(BusOverflow { queue: "inbound" })
            }
            Err(TrySendError::Closed(_)) => Err(BusOverflow { queue: "inbound" }),
        }
    }

    /// Publish a response from the agent to a channel (outbound).
    ///
    /// Non-blocking; on a full queue the message is dropped.
    pub fn publish_outbound(&self, msg: OutboundMessage) -> Result<(), BusOverflow> {
        match self.outbound_tx.try_send(msg) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(msg)) => {
                self.outbound_dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    channel = %msg.channel,
                    chat_id = %msg.chat_id,
                    "outbound queue full, dropping message"
                );
                Err(BusOverflow { queue: "outbound" })
            }
            Err(TrySendError::Closed(_)) => Err(BusOverflow { queue: "outbound" }),
        }
    }

    /// Consume the next inbound message (blocks until available).
    /// Returns None if all senders are dropped.
    pub async fn consume_inbound(&self) -> Option<InboundMessage> {
        let mut rx = self.inbound_rx.lock().await;
        rx.recv().await
    }

    /// Consume the next inbound message, waiting at most `timeout`.
    pub async fn consume_inbound_timeout(&self, timeout: Duration) -> Option<InboundMessage> {
        let mut rx = self.inbound_rx.lock().await;
        tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
    }

    /// Consume the next outbound message (blocks until available).
    pub async fn consume_outbound(&self) -> Option<OutboundMessage> {
        let mut rx = self.outbound_rx.lock().await;
        rx.recv().await
    }

    /// Consume the next outbound message, waiting at most `timeout`.
    pub async fn consume_outbound_timeout(&self, timeout: Duration) -> Option<OutboundMessage> {
        let mut rx = self.outbound_rx.lock().await;
        tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
    }

    /// Messages dropped from the inbound queue since startup.
    pub fn inbound_dropped(&self) -> u64 {
        self.inbound_dropped.load(Ordering::Relaxed)
    }

    /// Messages dropped from the outbound queue since startup.
    pub fn outbound_dropped(&self) -> u64 {
        self.outbound_dropped.load(Ordering::Relaxed)
    }
}
