//! Broadcast dispatcher: turns state changes into pushes.
//!
//! Every method here is best-effort. The durable write that caused the
//! event has already succeeded, so a missing or closed channel is logged
//! and forgotten. Nothing returns a `Result`.

use noughts_match::{Game, GameId, UserId};
use noughts_protocol::ServerMessage;
use noughts_session::{ConnectionRegistry, LobbyRegistry};

/// Fan-out over the game and lobby registries.
#[derive(Clone)]
pub struct Dispatcher {
    games: ConnectionRegistry,
    lobby: LobbyRegistry,
}

impl Dispatcher {
    pub fn new(games: ConnectionRegistry, lobby: LobbyRegistry) -> Self {
        Self { games, lobby }
    }

    pub fn games(&self) -> &ConnectionRegistry {
        &self.games
    }

    pub fn lobby(&self) -> &LobbyRegistry {
        &self.lobby
    }

    /// A move was accepted and the series continues.
    pub fn move_update(&self, game: &Game) {
        let delivered = self
            .games
            .broadcast(game.id, &ServerMessage::MoveUpdate(game.clone()));
        tracing::debug!(game_id = %game.id, delivered, "move_update broadcast");
    }

    /// The series was decided.
    pub fn game_ended(&self, game: &Game) {
        let delivered = self
            .games
            .broadcast(game.id, &ServerMessage::GameEnded(game.clone()));
        tracing::debug!(game_id = %game.id, delivered, "game_ended broadcast");
    }

    /// `user_id`'s game channel went away; tell whoever is left.
    pub fn opponent_disconnected(&self, game_id: GameId, user_id: UserId) {
        let delivered = self.games.broadcast_except(
            game_id,
            user_id,
            &ServerMessage::OpponentDisconnected { user_id },
        );
        tracing::debug!(%game_id, %user_id, delivered, "opponent_disconnected broadcast");
    }

    pub fn challenge_received(&self, game: &Game) {
        let Some(opponent) = game.player2_id else {
            tracing::warn!(game_id = %game.id, "challenge without a second player");
            return;
        };
        let delivered = self
            .lobby
            .notify(opponent, ServerMessage::ChallengeReceived(game.clone()));
        tracing::debug!(game_id = %game.id, user_id = %opponent, delivered, "challenge_received");
    }

    /// Both players learn the game is on.
    pub fn challenge_accepted(&self, game: &Game) {
        for user_id in game.participants() {
            let delivered = self
                .lobby
                .notify(user_id, ServerMessage::ChallengeAccepted(game.clone()));
            tracing::debug!(game_id = %game.id, %user_id, delivered, "challenge_accepted");
        }
    }

    pub fn challenge_declined(&self, challenger: UserId, game_id: GameId) {
        let delivered = self
            .lobby
            .notify(challenger, ServerMessage::ChallengeDeclined { game_id });
        tracing::debug!(%game_id, user_id = %challenger, delivered, "challenge_declined");
    }

    /// Tells every other lobby user that `user_id` left.
    pub fn user_offline(&self, user_id: UserId, user_name: &str) {
        let msg = ServerMessage::UserOffline {
            user_id,
            user_name: user_name.to_string(),
        };
        let delivered = self.lobby.notify_all_except(user_id, &msg);
        tracing::debug!(%user_id, delivered, "user_offline broadcast");
    }
}
