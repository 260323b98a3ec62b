//! Unified error type for the noughts server.

use noughts_match::{ChallengeError, MoveError, RematchError};
use noughts_protocol::ProtocolError;
use noughts_session::SessionError;
use noughts_store::StoreError;
use noughts_transport::TransportError;

use crate::config::ConfigError;
use crate::handshake::HandshakeError;

/// Top-level error that wraps every layer's error.
///
/// The `#[from]` attribute on each variant generates the `From` impl, so
/// `?` converts sub-crate errors automatically. Rejections from the three
/// state machines (`Move`, `Challenge`, `Rematch`) mean nothing was
/// written; `Store` errors come from the durable layer.
#[derive(Debug, thiserror::Error)]
pub enum NoughtsError {
    /// A transport-level error (accept, upgrade, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Authentication or duplicate-connection failure.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The durable store refused or failed a read or write.
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Move(#[from] MoveError),

    #[error(transparent)]
    Challenge(#[from] ChallengeError),

    #[error(transparent)]
    Rematch(#[from] RematchError),

    /// The client broke the ping/pong/ack/ready sequence.
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl NoughtsError {
    /// Whether the request was refused by validation, as opposed to
    /// failing in the store or on the wire.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            NoughtsError::Move(_)
                | NoughtsError::Challenge(_)
                | NoughtsError::Rematch(_)
                | NoughtsError::Store(StoreError::Conflict(_))
        )
    }
}
