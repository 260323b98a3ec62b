//! The match state machine: one move in, one next game state out.
//!
//! [`apply_move`] is pure. It never touches the game it is given, so a
//! rejected move leaves the caller's copy exactly as it was, and an
//! accepted move is only real once the store commits the returned state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Cell, Game, GameId, GameStatus, MoveError, Seat, UserId, BOARD_CELLS};
use crate::game::Board;

/// A move as kept in the game's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    pub game_id: GameId,
    pub player_id: UserId,
    pub position: usize,
    pub symbol: Cell,
    pub created_at: DateTime<Utc>,
}

/// How the round stands after a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundResult {
    /// The round continues; the turn passed to the other seat.
    InProgress,
    /// The mover completed a line.
    Won(Seat),
    /// The board filled up with no line.
    Draw,
}

/// The result of an accepted move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    /// The game state to commit.
    pub game: Game,
    /// The history entry to append alongside it.
    pub record: MoveRecord,
    pub round: RoundResult,
    /// Set when this move decided the series.
    pub series_winner: Option<UserId>,
}

impl MoveOutcome {
    pub fn round_over(&self) -> bool {
        self.round != RoundResult::InProgress
    }

    pub fn is_draw(&self) -> bool {
        self.round == RoundResult::Draw
    }

    pub fn series_over(&self) -> bool {
        self.series_winner.is_some()
    }

    /// The other participant when the series is over.
    pub fn series_loser(&self) -> Option<UserId> {
        self.series_winner
            .and_then(|winner| self.game.opponent_of(winner))
    }
}

/// Applies `user`'s move at `position` to `game`.
///
/// Checks run in a fixed order: position range, game status, participation,
/// turn, then the target cell. On success the returned game has:
///
/// - the mover's symbol on the board and the turn passed on, if the round
///   continues;
/// - a fresh board, the next round number and that round's opening seat,
///   if the round was won or drawn without deciding the series;
/// - status `completed`, `winner_id` and `completed_at` set and the final
///   board left in place, if the mover's score reached `first_to`.
///
/// Draws never score, so a series only ends through a win.
pub fn apply_move(
    game: &Game,
    user: UserId,
    position: usize,
    now: DateTime<Utc>,
) -> Result<MoveOutcome, MoveError> {
    if position >= BOARD_CELLS {
        return Err(MoveError::InvalidPosition(position));
    }
    if game.status != GameStatus::Active {
        return Err(MoveError::GameNotActive(game.status));
    }
    let seat = game.seat_of(user).ok_or(MoveError::NotAParticipant(user))?;
    if seat != game.current_turn {
        return Err(MoveError::NotYourTurn);
    }
    if game.board.get(position) != Some(Cell::Empty) {
        return Err(MoveError::PositionTaken(position));
    }

    let symbol = seat.symbol();
    let mut next = game.clone();
    next.board.place(position, symbol);
    next.last_move_at = Some(now);

    let round = if next.board.winner().is_some() {
        RoundResult::Won(seat)
    } else if next.board.is_full() {
        RoundResult::Draw
    } else {
        RoundResult::InProgress
    };

    let mut series_winner = None;
    match round {
        RoundResult::InProgress => {
            next.current_turn = seat.other();
        }
        RoundResult::Won(_) | RoundResult::Draw => {
            if let RoundResult::Won(scorer) = round {
                *next.score_mut(scorer) += 1;
            }
            series_winner = [Seat::One, Seat::Two]
                .into_iter()
                .find(|s| next.score(*s) >= next.first_to.get())
                .and_then(|s| next.player(s));

            if let Some(winner) = series_winner {
                next.status = GameStatus::Completed;
                next.winner_id = Some(winner);
                next.completed_at = Some(now);
            } else {
                next.board = Board::new();
                next.current_round += 1;
                next.current_turn = Seat::starting(next.current_round);
            }
        }
    }

    Ok(MoveOutcome {
        record: MoveRecord {
            game_id: game.id,
            player_id: user,
            position,
            symbol,
            created_at: now,
        },
        game: next,
        round,
        series_winner,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::fixtures::*;

    fn play(game: &Game, moves: &[(UserId, usize)]) -> (Game, MoveOutcome) {
        let mut game = game.clone();
        let mut last = None;
        for &(user, pos) in moves {
            let outcome = apply_move(&game, user, pos, Utc::now())
                .unwrap_or_else(|e| panic!("{user} at {pos}: {e}"));
            game = outcome.game.clone();
            last = Some(outcome);
        }
        (game, last.expect("at least one move"))
    }

    const ROW_WIN: [(UserId, usize); 5] =
        [(ALICE, 0), (BOB, 4), (ALICE, 1), (BOB, 5), (ALICE, 2)];

    #[test]
    fn test_first_to_one_row_win_completes_series() {
        let (game, outcome) = play(&active_game(1), &ROW_WIN);

        assert_eq!(outcome.round, RoundResult::Won(Seat::One));
        assert!(outcome.series_over());
        assert_eq!(game.status, GameStatus::Completed);
        assert_eq!(game.winner_id, Some(ALICE));
        assert_eq!(game.player1_score, 1);
        assert_eq!(game.player2_score, 0);
        assert!(game.completed_at.is_some());
        // The final board stays in place.
        assert_eq!(game.board.get(0), Some(Cell::X));
        assert_eq!(game.board.get(1), Some(Cell::X));
        assert_eq!(game.board.get(2), Some(Cell::X));
        assert_eq!(outcome.series_loser(), Some(BOB));
    }

    #[test]
    fn test_first_to_two_round_win_starts_round_two_with_seat_two() {
        let (game, outcome) = play(&active_game(2), &ROW_WIN);

        assert!(outcome.round_over());
        assert!(!outcome.series_over());
        assert_eq!(game.status, GameStatus::Active);
        assert_eq!(game.player1_score, 1);
        assert_eq!(game.current_round, 2);
        assert_eq!(game.current_turn, Seat::Two);
        assert!(game.board.is_clear());
        assert_eq!(game.winner_id, None);
    }

    #[test]
    fn test_draw_restarts_round_without_scoring() {
        // X O X / X O O / O X X
        let moves = [
            (ALICE, 0),
            (BOB, 1),
            (ALICE, 2),
            (BOB, 4),
            (ALICE, 3),
            (BOB, 5),
            (ALICE, 7),
            (BOB, 6),
            (ALICE, 8),
        ];
        let (game, outcome) = play(&active_game(1), &moves);

        assert!(outcome.is_draw());
        assert!(!outcome.series_over());
        assert_eq!(game.player1_score, 0);
        assert_eq!(game.player2_score, 0);
        assert!(game.board.is_clear());
        assert_eq!(game.current_round, 2);
        assert_eq!(game.current_turn, Seat::starting(2));
        assert_eq!(game.status, GameStatus::Active);
    }

    #[test]
    fn test_turn_passes_and_symbols_alternate() {
        let game = active_game(1);
        let first = apply_move(&game, ALICE, 4, Utc::now()).unwrap();
        assert_eq!(first.round, RoundResult::InProgress);
        assert_eq!(first.game.current_turn, Seat::Two);
        assert_eq!(first.record.symbol, Cell::X);

        let second = apply_move(&first.game, BOB, 0, Utc::now()).unwrap();
        assert_eq!(second.game.current_turn, Seat::One);
        assert_eq!(second.record.symbol, Cell::O);
        assert_eq!(second.record.player_id, BOB);
        assert_eq!(second.game.board.get(0), Some(Cell::O));
    }

    #[test]
    fn test_seat_two_wins_series() {
        let moves = [(ALICE, 0), (BOB, 3), (ALICE, 1), (BOB, 4), (ALICE, 8), (BOB, 5)];
        let (game, outcome) = play(&active_game(1), &moves);
        assert_eq!(outcome.round, RoundResult::Won(Seat::Two));
        assert_eq!(game.winner_id, Some(BOB));
        assert_eq!(game.player2_score, 1);
    }

    #[test]
    fn test_rejected_moves_leave_game_untouched() {
        let (game, _) = play(&active_game(1), &[(ALICE, 0)]);
        let before = game.clone();

        assert_eq!(
            apply_move(&game, ALICE, 1, Utc::now()).unwrap_err(),
            MoveError::NotYourTurn
        );
        assert_eq!(
            apply_move(&game, BOB, 0, Utc::now()).unwrap_err(),
            MoveError::PositionTaken(0)
        );
        assert_eq!(
            apply_move(&game, BOB, 9, Utc::now()).unwrap_err(),
            MoveError::InvalidPosition(9)
        );
        assert_eq!(
            apply_move(&game, CAROL, 3, Utc::now()).unwrap_err(),
            MoveError::NotAParticipant(CAROL)
        );
        assert_eq!(game, before);
    }

    #[test]
    fn test_move_on_inactive_game_rejected() {
        let mut game = active_game(1);
        game.status = GameStatus::Waiting;
        assert_eq!(
            apply_move(&game, ALICE, 0, Utc::now()).unwrap_err(),
            MoveError::GameNotActive(GameStatus::Waiting)
        );

        let (done, _) = play(&active_game(1), &ROW_WIN);
        assert!(matches!(
            apply_move(&done, BOB, 8, Utc::now()),
            Err(MoveError::GameNotActive(GameStatus::Completed))
        ));
    }

    #[test]
    fn test_position_checked_before_status() {
        let mut game = active_game(1);
        game.status = GameStatus::Completed;
        assert_eq!(
            apply_move(&game, CAROL, 42, Utc::now()).unwrap_err(),
            MoveError::InvalidPosition(42)
        );
    }

    #[test]
    fn test_second_round_winner_reaches_first_to_two() {
        let game = active_game(2);
        let (game, _) = play(&game, &ROW_WIN);
        // Round two: Bob opens and wins the middle column.
        let round_two = [(BOB, 1), (ALICE, 0), (BOB, 4), (ALICE, 2), (BOB, 7)];
        let (game, outcome) = play(&game, &round_two);
        assert_eq!(outcome.round, RoundResult::Won(Seat::Two));
        assert!(!outcome.series_over());
        assert_eq!((game.player1_score, game.player2_score), (1, 1));
        assert_eq!(game.current_round, 3);
        assert_eq!(game.current_turn, Seat::One);

        let (game, outcome) = play(&game, &ROW_WIN);
        assert!(outcome.series_over());
        assert_eq!(game.winner_id, Some(ALICE));
        assert_eq!(game.current_round, 3);
    }
}
