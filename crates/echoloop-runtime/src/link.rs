//! Links — bounded, best-effort point-to-point queues between engines
//!
//! Sends never block: a full queue drops the message and bumps the drop
//! counter. A slow or absent receiver must never stall the sender; shedding
//! is the contract, not a bug to fix with a blocking queue.

use echoloop_core::{EngineId, LinkId, LinkMessage};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Sender half of one link direction, held by the engine worker on the far
/// side (and by the scheduler for `emit_message`).
#[derive(Clone)]
pub struct LinkEndpoint {
    pub link: LinkId,
    /// Engine the messages are delivered to.
    pub to: EngineId,
    tx: mpsc::Sender<LinkMessage>,
    sent: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
}

impl LinkEndpoint {
    /// Non-blocking enqueue. Returns whether the message was delivered; on a
    /// full (or closed) queue it is dropped and counted.
    pub fn send(&self, message: LinkMessage) -> bool {
        match self.tx.try_send(message) {
            Ok(()) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }
}

/// Arena entry for one undirected link: two bounded directions plus counters
/// and a coupling strength.
pub struct Link {
    pub id: LinkId,
    pub a: EngineId,
    pub b: EngineId,
    pub strength: f64,
    to_a: LinkEndpoint,
    to_b: LinkEndpoint,
}

impl Link {
    /// Build a link and hand back the two receive halves: messages addressed
    /// to `a`, and messages addressed to `b`.
    pub fn new(
        id: LinkId,
        a: EngineId,
        b: EngineId,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<LinkMessage>, mpsc::Receiver<LinkMessage>) {
        let (tx_a, rx_a) = mpsc::channel(capacity.max(1));
        let (tx_b, rx_b) = mpsc::channel(capacity.max(1));
        let link = Self {
            id,
            a,
            b,
            strength: 0.5,
            to_a: LinkEndpoint {
                link: id,
                to: a,
                tx: tx_a,
                sent: Arc::new(AtomicU64::new(0)),
                dropped: Arc::new(AtomicU64::new(0)),
            },
            to_b: LinkEndpoint {
                link: id,
                to: b,
                tx: tx_b,
                sent: Arc::new(AtomicU64::new(0)),
                dropped: Arc::new(AtomicU64::new(0)),
            },
        };
        (link, rx_a, rx_b)
    }

    /// Both send halves: (delivers to `a`, delivers to `b`).
    pub fn endpoints(&self) -> (&LinkEndpoint, &LinkEndpoint) {
        (&self.to_a, &self.to_b)
    }

    /// Endpoint delivering to the given engine, if it is one of the pair.
    pub fn endpoint_to(&self, engine: EngineId) -> Option<&LinkEndpoint> {
        if engine == self.a {
            Some(&self.to_a)
        } else if engine == self.b {
            Some(&self.to_b)
        } else {
            None
        }
    }

    /// Route a message by its `to` field. False when dropped or misrouted.
    pub fn send(&self, message: LinkMessage) -> bool {
        match self.endpoint_to(message.to) {
            Some(endpoint) => endpoint.send(message),
            None => false,
        }
    }

    pub fn messages_sent(&self) -> u64 {
        self.to_a.sent.load(Ordering::Relaxed) + self.to_b.sent.load(Ordering::Relaxed)
    }

    pub fn messages_dropped(&self) -> u64 {
        self.to_a.dropped.load(Ordering::Relaxed) + self.to_b.dropped.load(Ordering::Relaxed)
    }
}
