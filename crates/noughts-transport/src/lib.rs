//! Transport layer for noughts.
//!
//! Provides the [`Connection`] trait that the handshake engine and the
//! connection workers are written against, plus the WebSocket listener that
//! produces real connections.
//!
//! Accepting is split in two: [`WebSocketListener::accept`] hands back a
//! [`PendingUpgrade`] whose HTTP request line can be inspected before the
//! caller decides to [`accept`](PendingUpgrade::accept) or
//! [`reject`](PendingUpgrade::reject) it. Refused requests get a plain HTTP
//! status and are never upgraded.
//!
//! # Feature Flags
//!
//! - `websocket` (default) — WebSocket transport via `tokio-tungstenite`

mod error;
mod request;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use request::{Rejection, UpgradeRequest};
#[cfg(feature = "websocket")]
pub use websocket::{PendingUpgrade, WebSocketConnection, WebSocketListener};

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates the next process-unique `ConnectionId`.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// One inbound unit read from a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// An application message (text or binary payload).
    Data(Vec<u8>),
    /// A transport-level ping or pong. Carries no data but proves the
    /// peer is alive.
    Heartbeat,
}

/// A single upgraded connection that can send and receive messages.
///
/// Methods take `&mut self`: a connection is owned by exactly one worker
/// task, which multiplexes reads, queued writes, and keep-alive pings.
pub trait Connection: Send + 'static {
    /// Sends one message to the remote peer.
    fn send(
        &mut self,
        data: Vec<u8>,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receives the next frame from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    fn recv(
        &mut self,
    ) -> impl Future<Output = Result<Option<Frame>, TransportError>> + Send;

    /// Sends a transport-level keep-alive ping.
    fn ping(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Closes the connection.
    fn close(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}
