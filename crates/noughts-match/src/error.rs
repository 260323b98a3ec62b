//! Rejection reasons for the three state machines.
//!
//! Every variant describes a request that was refused *before* anything
//! was mutated, so callers may report it and carry on.

use crate::{GameId, GameStatus, RematchStatus, UserId};

/// Why a move was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoveError {
    #[error("position {0} is outside the board")]
    InvalidPosition(usize),

    #[error("game is not active (status: {0:?})")]
    GameNotActive(GameStatus),

    #[error("user {0} is not a participant")]
    NotAParticipant(UserId),

    #[error("not your turn")]
    NotYourTurn,

    #[error("position {0} is already taken")]
    PositionTaken(usize),
}

/// Why a challenge could not be created or answered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChallengeError {
    #[error("first_to must be one of 1, 2, 3, 5, 10, 20 (got {0})")]
    InvalidFirstTo(u32),

    #[error("a player cannot challenge themselves")]
    SelfChallenge,

    #[error("user {0} is already in a game")]
    PlayerBusy(UserId),

    #[error("game {0} is not addressed to this user")]
    NotYourChallenge(GameId),

    #[error("challenge {0} was already responded to")]
    AlreadyResponded(GameId),
}

/// Why a rematch request could not be created or answered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RematchError {
    #[error("game is not completed (status: {0:?})")]
    GameNotCompleted(GameStatus),

    #[error("user {0} is not a participant")]
    NotAParticipant(UserId),

    #[error("a rematch for game {0} is already open")]
    AlreadyOpen(GameId),

    #[error("rematch is not addressed to this user")]
    NotYourRematch,

    #[error("rematch was already responded to (status: {0:?})")]
    AlreadyResponded(RematchStatus),

    #[error("rematch has expired")]
    Expired,
}
