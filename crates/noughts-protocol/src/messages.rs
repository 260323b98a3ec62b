//! The two message sets, one per direction.
//!
//! On the wire every message is `{"type": "...", "payload": ...}`. Here
//! each direction is a single enum whose variants carry exactly the payload
//! their type allows, so a `ready` without a game, or a `ping` with one,
//! does not decode.

use noughts_match::{Game, GameId, UserId};
use serde::{Deserialize, Serialize};

/// Messages a client sends on a game channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Opens the handshake, or checks liveness afterwards.
    Ping,
    /// Confirms the client is listening; answered with `ready`.
    Ack,
    /// Advisory notice that this connection replaces an earlier one.
    Reconnecting,
}

impl ClientMessage {
    /// The `type` tag, for logging.
    pub fn kind(self) -> &'static str {
        match self {
            ClientMessage::Ping => "ping",
            ClientMessage::Ack => "ack",
            ClientMessage::Reconnecting => "reconnecting",
        }
    }
}

/// Messages the server sends on game and lobby channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    Pong,
    /// Handshake complete; carries the authoritative game state.
    Ready(Game),
    /// A move was accepted and the series continues.
    MoveUpdate(Game),
    /// The series was decided. Sent once per game.
    GameEnded(Game),
    /// The other player's game channel went away. Advisory only.
    OpponentDisconnected { user_id: UserId },

    // Lobby channel.
    LobbyConnected,
    ChallengeReceived(Game),
    ChallengeAccepted(Game),
    ChallengeDeclined { game_id: GameId },
    UserOffline { user_id: UserId, user_name: String },
}

impl ServerMessage {
    /// The `type` tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Pong => "pong",
            ServerMessage::Ready(_) => "ready",
            ServerMessage::MoveUpdate(_) => "move_update",
            ServerMessage::GameEnded(_) => "game_ended",
            ServerMessage::OpponentDisconnected { .. } => "opponent_disconnected",
            ServerMessage::LobbyConnected => "lobby_connected",
            ServerMessage::ChallengeReceived(_) => "challenge_received",
            ServerMessage::ChallengeAccepted(_) => "challenge_accepted",
            ServerMessage::ChallengeDeclined { .. } => "challenge_declined",
            ServerMessage::UserOffline { .. } => "user_offline",
        }
    }
}
