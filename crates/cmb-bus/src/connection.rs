//! A handle to one live websocket connection.

use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::Message;
use tokio::sync::mpsc;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// A cheap, cloneable handle to a connection's outbound message queue.
///
/// The hub owns exactly one writer task per connection that drains this
/// queue and writes to the socket; every other task reaches the socket
/// only through this handle, never directly (spec §5: "no other task may
/// write directly to a socket").
#[derive(Debug, Clone)]
pub struct Connection {
    id: u64,
    tx: mpsc::UnboundedSender<Message>,
}

impl Connection {
    /// Allocate a fresh connection handle wrapping the given outbound
    /// queue. Called once per accepted websocket, from the hub.
    #[must_use]
    pub fn new(tx: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            tx,
        }
    }

    /// Stable identity for this connection, used by the registry to
    /// detect rebinding and by reverse lookups.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Enqueue a message for the writer task. Returns `false` if the
    /// connection's writer task has already exited (socket closed).
    pub fn send(&self, message: Message) -> bool {
        self.tx.send(message).is_ok()
    }

    /// Request the connection be closed with a normal-close frame.
    pub fn close(&self) {
        let _ = self.tx.send(Message::Close(None));
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Connection {}
