//! The durable side of noughts.
//!
//! Game and rematch records live behind the [`SessionStore`] trait. Every
//! state change goes through a *conditional* write: the caller states what
//! it believes the record looks like and the store refuses with
//! [`StoreError::Conflict`] if it does not. That is what serializes moves
//! per game without any lock spanning the in-memory registries and the
//! store.
//!
//! [`MemoryStore`] keeps everything in process memory. It backs the demo
//! server and the tests; a relational implementation plugs in through the
//! same trait.

mod error;
mod memory;

pub use error::StoreError;
pub use memory::MemoryStore;

use std::future::Future;

use chrono::{DateTime, Utc};
use noughts_match::{
    Game, GameId, GameStatus, MoveRecord, NewGame, NewRematch, RematchId,
    RematchRequest, RematchStatus, UserId,
};
use serde::{Deserialize, Serialize};

/// Aggregate results for one player, updated once per finished series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub user_id: UserId,
    pub games_played: u32,
    pub games_won: u32,
    pub games_lost: u32,
    pub games_draw: u32,
}

impl PlayerStats {
    /// A player with no finished series.
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            games_played: 0,
            games_won: 0,
            games_lost: 0,
            games_draw: 0,
        }
    }
}

/// A user seen recently, as listed in the lobby roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineUser {
    pub user_id: UserId,
    pub user_name: String,
    pub last_seen_at: DateTime<Utc>,
    pub in_game: bool,
}

/// Durable record of games, moves, presence, statistics and rematches.
///
/// All methods are async and return `Send` futures so stores can be used
/// from spawned tasks.
pub trait SessionStore: Send + Sync + 'static {
    // -- games -------------------------------------------------------------

    /// Assigns an id and stores the game.
    ///
    /// A `waiting` or `active` game is refused with `Conflict` if either
    /// player already has one.
    fn insert_game(
        &self,
        game: NewGame,
    ) -> impl Future<Output = Result<Game, StoreError>> + Send;

    fn load_game(
        &self,
        id: GameId,
    ) -> impl Future<Output = Result<Game, StoreError>> + Send;

    /// The newest `waiting` or `active` game `user` plays in.
    fn live_game_for(
        &self,
        user: UserId,
    ) -> impl Future<Output = Result<Option<Game>, StoreError>> + Send;

    /// `waiting` games addressed to `user`, newest first.
    fn waiting_challenges_for(
        &self,
        user: UserId,
    ) -> impl Future<Output = Result<Vec<Game>, StoreError>> + Send;

    /// Moves a game from `from` to `to`, stamping `last_move_at`.
    /// `Conflict` if the game is no longer in `from`.
    fn transition_game(
        &self,
        id: GameId,
        from: GameStatus,
        to: GameStatus,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<Game, StoreError>> + Send;

    /// Replaces `expected` with `next` and appends `record`, as one step.
    /// `Conflict` if the stored game is no longer equal to `expected`.
    fn commit_move(
        &self,
        expected: &Game,
        next: Game,
        record: MoveRecord,
    ) -> impl Future<Output = Result<Game, StoreError>> + Send;

    /// Move history of a game, oldest first.
    fn moves_for(
        &self,
        id: GameId,
    ) -> impl Future<Output = Result<Vec<MoveRecord>, StoreError>> + Send;

    /// Marks every `active` game `abandoned`. Returns how many changed.
    fn abandon_active_games(
        &self,
    ) -> impl Future<Output = Result<usize, StoreError>> + Send;

    /// Deletes `waiting` games created before `cutoff`, or all of them when
    /// `cutoff` is `None`. Returns how many were removed.
    fn purge_waiting_games(
        &self,
        cutoff: Option<DateTime<Utc>>,
    ) -> impl Future<Output = Result<usize, StoreError>> + Send;

    // -- presence and statistics -------------------------------------------

    /// Records that `user` was seen at `at` with the given in-game flag.
    ///
    /// An empty `name` only refreshes an existing entry and keeps its
    /// name; it never creates one.
    fn touch_presence(
        &self,
        user: UserId,
        name: &str,
        in_game: bool,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Entries seen after `cutoff`, except `user`'s own, ordered by name.
    fn online_users(
        &self,
        except: UserId,
        cutoff: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<OnlineUser>, StoreError>> + Send;

    /// Forgets entries last seen before `cutoff`. Returns how many.
    fn purge_presence(
        &self,
        cutoff: DateTime<Utc>,
    ) -> impl Future<Output = Result<usize, StoreError>> + Send;

    /// Forgets the user's presence entry (logout).
    fn clear_presence(
        &self,
        user: UserId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Forgets every presence entry. Returns how many were removed.
    fn clear_all_presence(
        &self,
    ) -> impl Future<Output = Result<usize, StoreError>> + Send;

    fn in_game(
        &self,
        user: UserId,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Counts one finished series for both players.
    fn record_series_result(
        &self,
        winner: UserId,
        loser: UserId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn stats(
        &self,
        user: UserId,
    ) -> impl Future<Output = Result<PlayerStats, StoreError>> + Send;

    // -- rematches ---------------------------------------------------------

    /// Stores a new `pending` request. `Conflict` if the game already has
    /// an open request that has not passed its deadline.
    fn insert_rematch(
        &self,
        request: NewRematch,
    ) -> impl Future<Output = Result<RematchRequest, StoreError>> + Send;

    fn load_rematch(
        &self,
        id: RematchId,
    ) -> impl Future<Output = Result<RematchRequest, StoreError>> + Send;

    /// The newest `pending` or `accepted` request for a game.
    fn open_rematch_for(
        &self,
        game_id: GameId,
    ) -> impl Future<Output = Result<Option<RematchRequest>, StoreError>> + Send;

    /// `Conflict` if the request is no longer in `from`.
    fn transition_rematch(
        &self,
        id: RematchId,
        from: RematchStatus,
        to: RematchStatus,
    ) -> impl Future<Output = Result<RematchRequest, StoreError>> + Send;

    /// Marks `pending` requests whose deadline is at or before `cutoff`
    /// as `expired`, or every pending request when `cutoff` is `None`.
    fn expire_rematches(
        &self,
        cutoff: Option<DateTime<Utc>>,
    ) -> impl Future<Output = Result<usize, StoreError>> + Send;
}
