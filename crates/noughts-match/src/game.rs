//! The `Game` aggregate and the value types it is built from.
//!
//! A game is one *series*: a sequence of rounds on a 3×3 board that ends
//! when either player's round wins reach [`FirstTo`]. The record is owned
//! by the session store; everything here is plain data plus the small
//! amount of logic needed to read it (whose seat, whose symbol, which
//! lines win).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ChallengeError, GameId, UserId};

// ---------------------------------------------------------------------------
// Board
// ---------------------------------------------------------------------------

/// One board cell. Serialized as `""`, `"X"` or `"O"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Cell {
    #[default]
    #[serde(rename = "")]
    Empty,
    X,
    O,
}

impl Cell {
    pub fn is_empty(self) -> bool {
        self == Cell::Empty
    }

    /// The symbol as it appears on the wire and in move history.
    pub fn as_str(self) -> &'static str {
        match self {
            Cell::Empty => "",
            Cell::X => "X",
            Cell::O => "O",
        }
    }
}

/// Number of cells on the board.
pub const BOARD_CELLS: usize = 9;

/// The eight three-in-a-row lines, as board positions.
const LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

/// A 3×3 board stored row-major as positions `0..9`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Board([Cell; BOARD_CELLS]);

impl Board {
    /// An empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a board from raw cells.
    pub fn from_cells(cells: [Cell; BOARD_CELLS]) -> Self {
        Self(cells)
    }

    pub fn cells(&self) -> &[Cell; BOARD_CELLS] {
        &self.0
    }

    /// The cell at `position`, or `None` if it is off the board.
    pub fn get(&self, position: usize) -> Option<Cell> {
        self.0.get(position).copied()
    }

    /// Writes `symbol` at `position`. Callers validate the position first.
    pub(crate) fn place(&mut self, position: usize, symbol: Cell) {
        self.0[position] = symbol;
    }

    /// The symbol that owns a complete line, if any.
    pub fn winner(&self) -> Option<Cell> {
        LINES.iter().find_map(|&[a, b, c]| {
            let first = self.0[a];
            (!first.is_empty() && first == self.0[b] && first == self.0[c])
                .then_some(first)
        })
    }

    /// True when no cell is empty.
    pub fn is_full(&self) -> bool {
        self.0.iter().all(|c| !c.is_empty())
    }

    /// True when every cell is empty.
    pub fn is_clear(&self) -> bool {
        self.0.iter().all(|c| c.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Seats
// ---------------------------------------------------------------------------

/// Which side of the game a player sits on. Seat one plays `X`.
///
/// Serialized as the number `1` or `2`, matching `current_turn` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Seat {
    One,
    Two,
}

impl Seat {
    pub fn symbol(self) -> Cell {
        match self {
            Seat::One => Cell::X,
            Seat::Two => Cell::O,
        }
    }

    pub fn other(self) -> Seat {
        match self {
            Seat::One => Seat::Two,
            Seat::Two => Seat::One,
        }
    }

    /// The seat that opens a round. Even rounds are opened by seat two so
    /// the first move alternates across a series.
    pub fn starting(round: u32) -> Seat {
        if round % 2 == 0 { Seat::Two } else { Seat::One }
    }
}

impl From<Seat> for u8 {
    fn from(seat: Seat) -> u8 {
        match seat {
            Seat::One => 1,
            Seat::Two => 2,
        }
    }
}

impl TryFrom<u8> for Seat {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Seat::One),
            2 => Ok(Seat::Two),
            other => Err(format!("seat must be 1 or 2, got {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Mode, status, series length
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    /// No per-move clock.
    #[default]
    Normal,
    /// Each move is limited to `move_time_limit` seconds.
    Timed,
}

/// Lifecycle of a game record.
///
/// ```text
/// waiting ──accept──▶ active ──series won──▶ completed
///    │                  └────cold start────▶ abandoned
///    └──decline──▶ declined
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    Waiting,
    Active,
    Completed,
    Abandoned,
    Declined,
}

impl GameStatus {
    /// Waiting or active: the player is committed to this game.
    pub fn is_live(self) -> bool {
        matches!(self, GameStatus::Waiting | GameStatus::Active)
    }
}

/// Round wins needed to take the series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u32", try_from = "u32")]
pub struct FirstTo(u32);

impl FirstTo {
    /// The series lengths a challenge may ask for.
    pub const ALLOWED: [u32; 6] = [1, 2, 3, 5, 10, 20];

    pub fn new(value: u32) -> Result<Self, ChallengeError> {
        if Self::ALLOWED.contains(&value) {
            Ok(Self(value))
        } else {
            Err(ChallengeError::InvalidFirstTo(value))
        }
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl Default for FirstTo {
    fn default() -> Self {
        Self(1)
    }
}

impl From<FirstTo> for u32 {
    fn from(value: FirstTo) -> u32 {
        value.0
    }
}

impl TryFrom<u32> for FirstTo {
    type Error = ChallengeError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        FirstTo::new(value)
    }
}

/// Options chosen by the challenger and carried into rematches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GameSettings {
    #[serde(default)]
    pub mode: GameMode,
    /// Seconds per move; `0` means unlimited.
    #[serde(default)]
    pub move_time_limit: u32,
    #[serde(default)]
    pub first_to: FirstTo,
}

// ---------------------------------------------------------------------------
// Game
// ---------------------------------------------------------------------------

/// A game record as stored and as sent to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub id: GameId,
    pub player1_id: UserId,
    pub player1_name: String,
    pub player2_id: Option<UserId>,
    #[serde(default)]
    pub player2_name: String,
    pub mode: GameMode,
    pub status: GameStatus,
    pub current_turn: Seat,
    pub winner_id: Option<UserId>,
    pub board: Board,
    pub move_time_limit: u32,
    /// Minutes.
    pub session_timeout: u32,
    pub first_to: FirstTo,
    pub player1_score: u32,
    pub player2_score: u32,
    pub current_round: u32,
    pub created_at: DateTime<Utc>,
    pub last_move_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Game {
    /// The seat `user` occupies, if they play in this game.
    pub fn seat_of(&self, user: UserId) -> Option<Seat> {
        if user == self.player1_id {
            Some(Seat::One)
        } else if Some(user) == self.player2_id {
            Some(Seat::Two)
        } else {
            None
        }
    }

    pub fn is_participant(&self, user: UserId) -> bool {
        self.seat_of(user).is_some()
    }

    /// The player in `seat`. Seat two is empty only before a challenge.
    pub fn player(&self, seat: Seat) -> Option<UserId> {
        match seat {
            Seat::One => Some(self.player1_id),
            Seat::Two => self.player2_id,
        }
    }

    pub fn player_name(&self, seat: Seat) -> &str {
        match seat {
            Seat::One => &self.player1_name,
            Seat::Two => &self.player2_name,
        }
    }

    /// The other participant, seen from `user`.
    pub fn opponent_of(&self, user: UserId) -> Option<UserId> {
        self.seat_of(user).and_then(|seat| self.player(seat.other()))
    }

    pub fn score(&self, seat: Seat) -> u32 {
        match seat {
            Seat::One => self.player1_score,
            Seat::Two => self.player2_score,
        }
    }

    pub(crate) fn score_mut(&mut self, seat: Seat) -> &mut u32 {
        match seat {
            Seat::One => &mut self.player1_score,
            Seat::Two => &mut self.player2_score,
        }
    }

    /// Both participants, seat one first.
    pub fn participants(&self) -> impl Iterator<Item = UserId> + '_ {
        std::iter::once(self.player1_id).chain(self.player2_id)
    }

    pub fn settings(&self) -> GameSettings {
        GameSettings {
            mode: self.mode,
            move_time_limit: self.move_time_limit,
            first_to: self.first_to,
        }
    }
}

/// A game that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGame {
    pub player1_id: UserId,
    pub player1_name: String,
    pub player2_id: UserId,
    pub player2_name: String,
    pub status: GameStatus,
    pub settings: GameSettings,
    pub session_timeout: u32,
    pub created_at: DateTime<Utc>,
}

impl NewGame {
    /// Materializes the record: round one, seat one to move, empty board.
    pub fn into_game(self, id: GameId) -> Game {
        Game {
            id,
            player1_id: self.player1_id,
            player1_name: self.player1_name,
            player2_id: Some(self.player2_id),
            player2_name: self.player2_name,
            mode: self.settings.mode,
            status: self.status,
            current_turn: Seat::One,
            winner_id: None,
            board: Board::new(),
            move_time_limit: self.settings.move_time_limit,
            session_timeout: self.session_timeout,
            first_to: self.settings.first_to,
            player1_score: 0,
            player2_score: 0,
            current_round: 1,
            created_at: self.created_at,
            last_move_at: None,
            completed_at: None,
        }
    }
}
