//! Error types for the session layer.

use noughts_match::{GameId, UserId};

/// Errors raised while admitting a connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The token was missing, unknown, or rejected by the
    /// [`IdentityGateway`](crate::IdentityGateway).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The user already holds a connection to this game. The new attempt
    /// is refused; the existing connection is left alone.
    #[error("user {user_id} is already connected to game {game_id}")]
    AlreadyConnected { game_id: GameId, user_id: UserId },
}
