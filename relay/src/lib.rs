//! Broadcast relay: every message received from one live connection is
//! forwarded, unmodified, to every other live connection.
//!
//! The relay knows nothing about message content or transport. A transport
//! adapter calls [`Relay::connect`] when a peer arrives, feeds each inbound
//! message to [`Relay::broadcast`], drains the returned [`Connection`] to
//! write outbound messages, and calls [`Relay::disconnect`] when the peer
//! goes away.
//!
//! ## Delivery
//!
//! - The sender never receives its own message.
//! - Each connection has a bounded queue. A recipient whose queue is full or
//!   whose receiver is gone is skipped for that message; nothing is retried
//!   and nothing waits, so one slow peer cannot hold up the others.
//! - Messages from one sender reach each recipient in the order
//!   [`Relay::broadcast`] was called. No order holds across senders.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tracing::{debug, info};

/// Default per-connection queue length.
pub const DEFAULT_BUFFER: usize = 64;

/// Identifies one live connection. Never reused within a relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(u64);

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// The receiving side of a registered connection.
pub struct Connection<M> {
    id: ConnId,
    rx: mpsc::Receiver<M>,
}

impl<M> Connection<M> {
    pub fn id(&self) -> ConnId {
        self.id
    }

    /// Wait for the next message addressed to this connection.
    /// Returns `None` once the relay has dropped this connection.
    pub async fn recv(&mut self) -> Option<M> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Result<M, TryRecvError> {
        self.rx.try_recv()
    }
}

/// Per-message fan-out counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Recipients whose queue accepted the message.
    pub delivered: usize,
    /// Recipients skipped because their queue was full or closed.
    pub skipped: usize,
}

/// Registry of live connections with broadcast-to-others fan-out.
///
/// Owned by whoever runs the transport and shared by reference or `Arc`.
/// Safe for concurrent connect, broadcast and disconnect.
pub struct Relay<M> {
    conns: RwLock<HashMap<ConnId, mpsc::Sender<M>>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl<M: Clone + Send + 'static> Relay<M> {
    /// Create a relay whose connections queue up to `buffer` messages each.
    /// A zero buffer is raised to 1.
    pub fn new(buffer: usize) -> Self {
        Self {
            conns: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            buffer: buffer.max(1),
        }
    }

    /// Register a new connection.
    pub fn connect(&self) -> Connection<M> {
        let id = ConnId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let (tx, rx) = mpsc::channel(self.buffer);
        let live = {
            let mut conns = self.conns.write();
            conns.insert(id, tx);
            conns.len()
        };
        info!(%id, live, "relay connection opened");
        Connection { id, rx }
    }

    /// Forward `msg` to every live connection except `from`.
    pub fn broadcast(&self, from: ConnId, msg: M) -> Delivery {
        // Snapshot under the lock, send after releasing it.
        let recipients: Vec<(ConnId, mpsc::Sender<M>)> = {
            let conns = self.conns.read();
            conns
                .iter()
                .filter(|(id, _)| **id != from)
                .map(|(id, tx)| (*id, tx.clone()))
                .collect()
        };

        let mut delivery = Delivery::default();
        for (id, tx) in recipients {
            match tx.try_send(msg.clone()) {
                Ok(()) => delivery.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    debug!(%from, to = %id, "relay recipient queue full, skipped");
                    delivery.skipped += 1;
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(%from, to = %id, "relay recipient closed, skipped");
                    delivery.skipped += 1;
                }
            }
        }
        delivery
    }

    /// Remove a connection. Returns false if it was not registered.
    pub fn disconnect(&self, id: ConnId) -> bool {
        let (removed, live) = {
            let mut conns = self.conns.write();
            (conns.remove(&id).is_some(), conns.len())
        };
        if removed {
            info!(%id, live, "relay connection closed");
        }
        removed
    }

    pub fn contains(&self, id: ConnId) -> bool {
        self.conns.read().contains_key(&id)
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.conns.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<M: Clone + Send + 'static> Default for Relay<M> {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER)
    }
}
