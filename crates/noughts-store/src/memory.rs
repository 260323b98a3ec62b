//! In-process [`SessionStore`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use noughts_match::{
    Game, GameId, GameStatus, MoveRecord, NewGame, NewRematch, RematchId,
    RematchRequest, RematchStatus, UserId, challenge,
};
use parking_lot::Mutex;

use crate::{OnlineUser, PlayerStats, SessionStore, StoreError};

#[derive(Debug, Clone)]
struct Presence {
    name: String,
    in_game: bool,
    last_seen_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    next_game_id: u64,
    next_rematch_id: u64,
    games: HashMap<GameId, Game>,
    moves: HashMap<GameId, Vec<MoveRecord>>,
    rematches: HashMap<RematchId, RematchRequest>,
    presence: HashMap<UserId, Presence>,
    stats: HashMap<UserId, PlayerStats>,
}

impl Inner {
    fn live_games_of(&self, user: UserId) -> impl Iterator<Item = &Game> {
        self.games
            .values()
            .filter(move |g| g.status.is_live() && g.is_participant(user))
    }

    fn game_mut(&mut self, id: GameId) -> Result<&mut Game, StoreError> {
        self.games
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("game {id}")))
    }

    fn stats_mut(&mut self, user: UserId) -> &mut PlayerStats {
        self.stats
            .entry(user)
            .or_insert_with(|| PlayerStats::new(user))
    }
}

/// Keeps every record in a single mutex-guarded map set.
///
/// Each method takes the lock once and releases it before returning, so a
/// conditional write is checked and applied atomically.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Newest first, ties broken by id so the order is stable.
fn newest_first(a: &Game, b: &Game) -> std::cmp::Ordering {
    b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))
}

impl SessionStore for MemoryStore {
    async fn insert_game(&self, game: NewGame) -> Result<Game, StoreError> {
        let mut inner = self.inner.lock();
        if game.status.is_live() {
            for user in [game.player1_id, game.player2_id] {
                if let Some(existing) = inner.live_games_of(user).next() {
                    return Err(StoreError::Conflict(format!(
                        "user {user} already has live game {}",
                        existing.id
                    )));
                }
            }
        }
        inner.next_game_id += 1;
        let game = game.into_game(GameId(inner.next_game_id));
        inner.games.insert(game.id, game.clone());
        tracing::debug!(game_id = %game.id, status = ?game.status, "game inserted");
        Ok(game)
    }

    async fn load_game(&self, id: GameId) -> Result<Game, StoreError> {
        self.inner
            .lock()
            .games
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("game {id}")))
    }

    async fn live_game_for(&self, user: UserId) -> Result<Option<Game>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .live_games_of(user)
            .min_by(|a, b| newest_first(a, b))
            .cloned())
    }

    async fn waiting_challenges_for(&self, user: UserId) -> Result<Vec<Game>, StoreError> {
        let inner = self.inner.lock();
        let mut games: Vec<Game> = inner
            .games
            .values()
            .filter(|g| g.status == GameStatus::Waiting && g.player2_id == Some(user))
            .cloned()
            .collect();
        games.sort_by(newest_first);
        Ok(games)
    }

    async fn transition_game(
        &self,
        id: GameId,
        from: GameStatus,
        to: GameStatus,
        at: DateTime<Utc>,
    ) -> Result<Game, StoreError> {
        let mut inner = self.inner.lock();
        let game = inner.game_mut(id)?;
        if game.status != from {
            return Err(StoreError::Conflict(format!(
                "game {id} is {:?}, expected {from:?}",
                game.status
            )));
        }
        game.status = to;
        game.last_move_at = Some(at);
        Ok(game.clone())
    }

    async fn commit_move(
        &self,
        expected: &Game,
        next: Game,
        record: MoveRecord,
    ) -> Result<Game, StoreError> {
        let mut inner = self.inner.lock();
        let stored = inner.game_mut(expected.id)?;
        if *stored != *expected {
            return Err(StoreError::Conflict(format!(
                "game {} changed since it was read",
                expected.id
            )));
        }
        *stored = next.clone();
        inner.moves.entry(next.id).or_default().push(record);
        Ok(next)
    }

    async fn moves_for(&self, id: GameId) -> Result<Vec<MoveRecord>, StoreError> {
        Ok(self.inner.lock().moves.get(&id).cloned().unwrap_or_default())
    }

    async fn abandon_active_games(&self) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock();
        let mut changed = 0;
        for game in inner.games.values_mut() {
            if game.status == GameStatus::Active {
                game.status = GameStatus::Abandoned;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn purge_waiting_games(
        &self,
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock();
        let before = inner.games.len();
        inner.games.retain(|_, g| match cutoff {
            Some(cutoff) => !challenge::is_stale(g, cutoff),
            None => g.status != GameStatus::Waiting,
        });
        Ok(before - inner.games.len())
    }

    async fn touch_presence(
        &self,
        user: UserId,
        name: &str,
        in_game: bool,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if name.is_empty() {
            if let Some(entry) = inner.presence.get_mut(&user) {
                entry.in_game = in_game;
                entry.last_seen_at = at;
            }
            return Ok(());
        }
        inner.presence.insert(
            user,
            Presence {
                name: name.to_string(),
                in_game,
                last_seen_at: at,
            },
        );
        Ok(())
    }

    async fn online_users(
        &self,
        except: UserId,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<OnlineUser>, StoreError> {
        let inner = self.inner.lock();
        let mut users: Vec<OnlineUser> = inner
            .presence
            .iter()
            .filter(|(id, p)| **id != except && p.last_seen_at > cutoff)
            .map(|(id, p)| OnlineUser {
                user_id: *id,
                user_name: p.name.clone(),
                last_seen_at: p.last_seen_at,
                in_game: p.in_game,
            })
            .collect();
        users.sort_by(|a, b| a.user_name.cmp(&b.user_name).then(a.user_id.cmp(&b.user_id)));
        Ok(users)
    }

    async fn purge_presence(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock();
        let before = inner.presence.len();
        inner.presence.retain(|_, p| p.last_seen_at >= cutoff);
        Ok(before - inner.presence.len())
    }

    async fn clear_presence(&self, user: UserId) -> Result<(), StoreError> {
        self.inner.lock().presence.remove(&user);
        Ok(())
    }

    async fn clear_all_presence(&self) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock();
        let n = inner.presence.len();
        inner.presence.clear();
        Ok(n)
    }

    async fn in_game(&self, user: UserId) -> Result<bool, StoreError> {
        Ok(self
            .inner
            .lock()
            .presence
            .get(&user)
            .is_some_and(|p| p.in_game))
    }

    async fn record_series_result(
        &self,
        winner: UserId,
        loser: UserId,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let w = inner.stats_mut(winner);
        w.games_played += 1;
        w.games_won += 1;
        let l = inner.stats_mut(loser);
        l.games_played += 1;
        l.games_lost += 1;
        Ok(())
    }

    async fn stats(&self, user: UserId) -> Result<PlayerStats, StoreError> {
        Ok(self
            .inner
            .lock()
            .stats
            .get(&user)
            .cloned()
            .unwrap_or_else(|| PlayerStats::new(user)))
    }

    async fn insert_rematch(&self, request: NewRematch) -> Result<RematchRequest, StoreError> {
        let mut inner = self.inner.lock();
        let blocking = inner.rematches.values().find(|r| {
            r.game_id == request.game_id && r.blocks_new_request(request.created_at)
        });
        if let Some(existing) = blocking {
            return Err(StoreError::Conflict(format!(
                "game {} already has rematch {} ({:?})",
                request.game_id, existing.id, existing.status
            )));
        }
        inner.next_rematch_id += 1;
        let request = request.into_request(RematchId(inner.next_rematch_id));
        inner.rematches.insert(request.id, request.clone());
        Ok(request)
    }

    async fn load_rematch(&self, id: RematchId) -> Result<RematchRequest, StoreError> {
        self.inner
            .lock()
            .rematches
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("rematch {id}")))
    }

    async fn open_rematch_for(
        &self,
        game_id: GameId,
    ) -> Result<Option<RematchRequest>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .rematches
            .values()
            .filter(|r| r.game_id == game_id && r.status.is_open())
            .max_by_key(|r| (r.created_at, r.id))
            .cloned())
    }

    async fn transition_rematch(
        &self,
        id: RematchId,
        from: RematchStatus,
        to: RematchStatus,
    ) -> Result<RematchRequest, StoreError> {
        let mut inner = self.inner.lock();
        let request = inner
            .rematches
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("rematch {id}")))?;
        if request.status != from {
            return Err(StoreError::Conflict(format!(
                "rematch {id} is {:?}, expected {from:?}",
                request.status
            )));
        }
        request.status = to;
        Ok(request.clone())
    }

    async fn expire_rematches(
        &self,
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock();
        let mut changed = 0;
        for request in inner.rematches.values_mut() {
            let due = match cutoff {
                Some(now) => request.is_overdue(now),
                None => request.status == RematchStatus::Pending,
            };
            if due {
                request.status = RematchStatus::Expired;
                changed += 1;
            }
        }
        Ok(changed)
    }
}
