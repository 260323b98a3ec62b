//! The game-channel handshake.
//!
//! ```text
//! client                     server
//!   │ ── ping ───────────────▶ │   (per-step deadline)
//!   │ ◀─────────────── pong ── │
//!   │ ── ack ────────────────▶ │   (per-step deadline)
//!   │                          │   registration becomes visible
//!   │ ◀──────── ready(game) ── │   state loaded from the store
//! ```
//!
//! The client only sends `ack` once its listeners are in place, so
//! nothing reaches it before it can render. Any deviation is fatal to the
//! connection and leaves the registration pending, which broadcasts skip.

use std::time::Duration;

use noughts_match::Game;
use noughts_protocol::{ClientMessage, Codec, ServerMessage};
use noughts_session::Registration;
use noughts_store::SessionStore;
use noughts_transport::{Connection, Frame};
use tokio::time::Instant;

use crate::NoughtsError;

/// A handshake step that did not go as required.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    #[error("timed out waiting for {expected}")]
    Timeout { expected: &'static str },

    #[error("connection closed while waiting for {expected}")]
    Closed { expected: &'static str },

    #[error("expected {expected}, got {got}")]
    Unexpected { expected: &'static str, got: String },
}

/// Runs the handshake on a freshly upgraded game channel and returns the
/// game state sent in `ready`.
///
/// Broadcasts queued after the registration becomes visible sit in the
/// connection's outbound queue and are delivered after `ready`.
pub async fn handshake<C, K, S>(
    conn: &mut C,
    codec: &K,
    store: &S,
    registration: &Registration,
    step_timeout: Duration,
) -> Result<Game, NoughtsError>
where
    C: Connection,
    K: Codec,
    S: SessionStore,
{
    expect(conn, codec, ClientMessage::Ping, step_timeout).await?;
    conn.send(codec.encode(&ServerMessage::Pong)?).await?;

    expect(conn, codec, ClientMessage::Ack, step_timeout).await?;
    registration.mark_ready();

    let game = store.load_game(registration.game_id()).await?;
    conn.send(codec.encode(&ServerMessage::Ready(game.clone()))?)
        .await?;
    Ok(game)
}

/// Waits for `expected`. Transport heartbeats are skipped but do not
/// extend the deadline.
async fn expect<C: Connection, K: Codec>(
    conn: &mut C,
    codec: &K,
    expected: ClientMessage,
    step_timeout: Duration,
) -> Result<(), NoughtsError> {
    let deadline = Instant::now() + step_timeout;
    let want = expected.kind();
    loop {
        let frame = match tokio::time::timeout_at(deadline, conn.recv()).await {
            Ok(frame) => frame?,
            Err(_) => return Err(HandshakeError::Timeout { expected: want }.into()),
        };
        let data = match frame {
            Some(Frame::Data(data)) => data,
            Some(Frame::Heartbeat) => continue,
            None => return Err(HandshakeError::Closed { expected: want }.into()),
        };
        return match codec.decode::<ClientMessage>(&data) {
            Ok(msg) if msg == expected => Ok(()),
            Ok(msg) => Err(HandshakeError::Unexpected {
                expected: want,
                got: msg.kind().to_string(),
            }
            .into()),
            Err(_) => Err(HandshakeError::Unexpected {
                expected: want,
                got: "an undecodable message".to_string(),
            }
            .into()),
        };
    }
}
