//! Challenges: a `waiting` game addressed from one player to another.

use chrono::{DateTime, TimeDelta, Utc};

use crate::{ChallengeError, Game, GameSettings, GameStatus, NewGame, UserId};

/// A request from `challenger` to play `opponent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub challenger_id: UserId,
    pub challenger_name: String,
    pub opponent_id: UserId,
    pub opponent_name: String,
    pub settings: GameSettings,
}

impl Challenge {
    /// Checks the request on its own merits and builds the `waiting` game.
    ///
    /// Whether either player is already committed to another game is a
    /// question for the store, see [`ensure_available`].
    pub fn into_new_game(
        self,
        session_timeout: u32,
        now: DateTime<Utc>,
    ) -> Result<NewGame, ChallengeError> {
        if self.challenger_id == self.opponent_id {
            return Err(ChallengeError::SelfChallenge);
        }
        Ok(NewGame {
            player1_id: self.challenger_id,
            player1_name: self.challenger_name,
            player2_id: self.opponent_id,
            player2_name: self.opponent_name,
            status: GameStatus::Waiting,
            settings: self.settings,
            session_timeout,
            created_at: now,
        })
    }
}

/// Fails if `live` (the user's waiting or active game, if any) exists.
pub fn ensure_available(user: UserId, live: Option<&Game>) -> Result<(), ChallengeError> {
    match live {
        Some(_) => Err(ChallengeError::PlayerBusy(user)),
        None => Ok(()),
    }
}

/// Only the challenged player may answer, and only once.
pub fn check_response(game: &Game, responder: UserId) -> Result<(), ChallengeError> {
    if game.player2_id != Some(responder) {
        return Err(ChallengeError::NotYourChallenge(game.id));
    }
    if game.status != GameStatus::Waiting {
        return Err(ChallengeError::AlreadyResponded(game.id));
    }
    Ok(())
}

/// Challenges created before this instant are stale. A window reaching
/// past the start of the calendar clamps to its minimum.
pub fn stale_cutoff(now: DateTime<Utc>, window: TimeDelta) -> DateTime<Utc> {
    now.checked_sub_signed(window)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// A `waiting` game created before `cutoff`.
pub fn is_stale(game: &Game, cutoff: DateTime<Utc>) -> bool {
    game.status == GameStatus::Waiting && game.created_at < cutoff
}
