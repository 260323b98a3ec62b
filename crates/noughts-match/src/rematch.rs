//! Rematch requests.
//!
//! ```text
//! pending ──accept──▶ accepted
//!    ├─────decline──▶ declined
//!    └──deadline────▶ expired
//! ```
//!
//! A request is an audit record: accepting it creates a separate game and
//! leaves the request in `accepted`.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::{Game, GameId, GameStatus, NewGame, RematchError, RematchId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RematchStatus {
    Pending,
    Accepted,
    Declined,
    Expired,
}

impl RematchStatus {
    /// Pending or accepted. At most one open request exists per game.
    pub fn is_open(self) -> bool {
        matches!(self, RematchStatus::Pending | RematchStatus::Accepted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RematchRequest {
    pub id: RematchId,
    pub game_id: GameId,
    pub requester_id: UserId,
    pub opponent_id: UserId,
    pub status: RematchStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl RematchRequest {
    /// A pending request whose deadline has passed.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == RematchStatus::Pending && self.expires_at <= now
    }

    /// Whether the request still blocks a new one for the same game.
    pub fn blocks_new_request(&self, now: DateTime<Utc>) -> bool {
        self.status.is_open() && !self.is_overdue(now)
    }
}

/// A rematch request before the store has assigned its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRematch {
    pub game_id: GameId,
    pub requester_id: UserId,
    pub opponent_id: UserId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl NewRematch {
    pub fn into_request(self, id: RematchId) -> RematchRequest {
        RematchRequest {
            id,
            game_id: self.game_id,
            requester_id: self.requester_id,
            opponent_id: self.opponent_id,
            status: RematchStatus::Pending,
            created_at: self.created_at,
            expires_at: self.expires_at,
        }
    }
}

/// Builds a request from `requester` on a completed `game`.
///
/// `existing` is the latest open request for the game, if the store has
/// one.
pub fn request_rematch(
    game: &Game,
    requester: UserId,
    existing: Option<&RematchRequest>,
    now: DateTime<Utc>,
    window: TimeDelta,
) -> Result<NewRematch, RematchError> {
    if game.status != GameStatus::Completed {
        return Err(RematchError::GameNotCompleted(game.status));
    }
    let opponent = game
        .opponent_of(requester)
        .ok_or(RematchError::NotAParticipant(requester))?;
    if existing.is_some_and(|r| r.blocks_new_request(now)) {
        return Err(RematchError::AlreadyOpen(game.id));
    }
    Ok(NewRematch {
        game_id: game.id,
        requester_id: requester,
        opponent_id: opponent,
        created_at: now,
        expires_at: now
            .checked_add_signed(window)
            .unwrap_or(DateTime::<Utc>::MAX_UTC),
    })
}

/// Only the named opponent may answer a pending, unexpired request.
pub fn check_response(
    request: &RematchRequest,
    responder: UserId,
    now: DateTime<Utc>,
) -> Result<(), RematchError> {
    if request.opponent_id != responder {
        return Err(RematchError::NotYourRematch);
    }
    if request.status != RematchStatus::Pending {
        return Err(RematchError::AlreadyResponded(request.status));
    }
    if request.is_overdue(now) {
        return Err(RematchError::Expired);
    }
    Ok(())
}

/// The game an accepted rematch starts: same seats, same settings, active.
pub fn rematch_game(prior: &Game, session_timeout: u32, now: DateTime<Utc>) -> Option<NewGame> {
    Some(NewGame {
        player1_id: prior.player1_id,
        player1_name: prior.player1_name.clone(),
        player2_id: prior.player2_id?,
        player2_name: prior.player2_name.clone(),
        status: GameStatus::Active,
        settings: prior.settings(),
        session_timeout,
        created_at: now,
    })
}
