//! Game records and the rules that move them forward.
//!
//! Everything in this crate is pure data and pure functions. Persistence,
//! connections and broadcasting live elsewhere; this crate only answers
//! "given this record and this request, what is the next record, or why
//! is the request refused?"
//!
//! - [`apply_move`]: the match state machine (turns, rounds, series).
//! - [`challenge`]: creating and answering a `waiting` game.
//! - [`rematch`]: the rematch request state machine.

pub mod challenge;
mod error;
mod game;
mod ids;
pub mod rematch;
mod rules;

pub use challenge::Challenge;
pub use error::{ChallengeError, MoveError, RematchError};
pub use game::{
    BOARD_CELLS, Board, Cell, FirstTo, Game, GameMode, GameSettings, GameStatus,
    NewGame, Seat,
};
pub use ids::{GameId, RematchId, UserId};
pub use rematch::{NewRematch, RematchRequest, RematchStatus};
pub use rules::{MoveOutcome, MoveRecord, RoundResult, apply_move};
