//! The game service the request layer calls.
//!
//! Every operation follows the same shape: load, validate with the pure
//! rules in `noughts-match`, apply one conditional write to the store, then
//! hand the result to the [`Dispatcher`]. A failed push never fails the
//! operation; a failed write always does, and leaves nothing behind.
//! Presence writes that follow a committed game write are the exception:
//! they are logged and skipped.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use noughts_match::{
    Challenge, Game, GameId, GameSettings, GameStatus, MoveRecord, RematchId, RematchRequest,
    RematchStatus, Seat, UserId, apply_move, challenge, rematch,
};
use noughts_session::Identity;
use noughts_store::{OnlineUser, PlayerStats, SessionStore, StoreError};

use crate::{Dispatcher, NoughtsError, ServerConfig};

/// What a move did, for the caller that submitted it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveReport {
    pub game: Game,
    pub round_over: bool,
    pub series_over: bool,
    pub is_draw: bool,
    pub winner_id: Option<UserId>,
}

/// Counts from a sweep or the startup reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub games_abandoned: usize,
    pub challenges_purged: usize,
    pub rematches_expired: usize,
    pub presence_cleared: usize,
}

/// Challenge, move and rematch operations over a [`SessionStore`].
///
/// Cheap to clone; clones share the store and the registries.
pub struct Arena<S> {
    store: Arc<S>,
    dispatch: Dispatcher,
    challenge_window: TimeDelta,
    rematch_window: TimeDelta,
    presence_window: TimeDelta,
    session_timeout: u32,
}

impl<S> Clone for Arena<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            dispatch: self.dispatch.clone(),
            challenge_window: self.challenge_window,
            rematch_window: self.rematch_window,
            presence_window: self.presence_window,
            session_timeout: self.session_timeout,
        }
    }
}

impl<S: SessionStore> Arena<S> {
    pub fn new(store: Arc<S>, dispatch: Dispatcher, config: &ServerConfig) -> Self {
        Self {
            store,
            dispatch,
            challenge_window: config.challenge_window(),
            rematch_window: config.rematch_window(),
            presence_window: config.presence_window(),
            session_timeout: config.default_session_timeout_mins,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatch
    }

    // -- challenges --------------------------------------------------------

    /// Creates a `waiting` game from `challenger` to `opponent_id` and
    /// pushes `challenge_received` to the opponent's lobby channel.
    ///
    /// # Errors
    /// - [`ChallengeError::SelfChallenge`](noughts_match::ChallengeError)
    ///   if both ids are the same.
    /// - `ChallengeError::PlayerBusy` if either player already has a
    ///   `waiting` or `active` game.
    /// - `StoreError::Conflict` if a concurrent request got there first.
    pub async fn create_challenge(
        &self,
        challenger: &Identity,
        opponent_id: UserId,
        opponent_name: &str,
        settings: GameSettings,
    ) -> Result<Game, NoughtsError> {
        let now = Utc::now();
        let new_game = Challenge {
            challenger_id: challenger.id,
            challenger_name: challenger.name.clone(),
            opponent_id,
            opponent_name: opponent_name.to_string(),
            settings,
        }
        .into_new_game(self.session_timeout, now)?;

        // Expired challenges must not count as "busy".
        self.store
            .purge_waiting_games(Some(challenge::stale_cutoff(now, self.challenge_window)))
            .await?;
        for user in [challenger.id, opponent_id] {
            let live = self.store.live_game_for(user).await?;
            challenge::ensure_available(user, live.as_ref())?;
        }

        let game = self.store.insert_game(new_game).await?;
        tracing::info!(
            game_id = %game.id,
            challenger = %challenger.id,
            opponent = %opponent_id,
            first_to = game.first_to.get(),
            "challenge created"
        );
        self.dispatch.challenge_received(&game);
        Ok(game)
    }

    /// Open challenges addressed to `user`, newest first.
    pub async fn pending_challenges(&self, user: UserId) -> Result<Vec<Game>, NoughtsError> {
        self.purge_stale_challenges().await?;
        Ok(self.store.waiting_challenges_for(user).await?)
    }

    /// Accepts or declines a challenge. Only the challenged player may
    /// answer, and only while the game is `waiting`.
    pub async fn respond_to_challenge(
        &self,
        user: UserId,
        game_id: GameId,
        accept: bool,
    ) -> Result<Game, NoughtsError> {
        let game = self.store.load_game(game_id).await?;
        challenge::check_response(&game, user)?;

        let now = Utc::now();
        if accept {
            let game = self
                .store
                .transition_game(game_id, GameStatus::Waiting, GameStatus::Active, now)
                .await?;
            self.mark_players(&game, true).await;
            tracing::info!(%game_id, %user, "challenge accepted");
            self.dispatch.challenge_accepted(&game);
            Ok(game)
        } else {
            let game = self
                .store
                .transition_game(game_id, GameStatus::Waiting, GameStatus::Declined, now)
                .await?;
            tracing::info!(%game_id, %user, "challenge declined");
            self.dispatch.challenge_declined(game.player1_id, game_id);
            Ok(game)
        }
    }

    /// The user's `waiting` or `active` game.
    pub async fn active_game(&self, user: UserId) -> Result<Option<Game>, NoughtsError> {
        Ok(self.store.live_game_for(user).await?)
    }

    pub async fn game(&self, game_id: GameId) -> Result<Game, NoughtsError> {
        Ok(self.store.load_game(game_id).await?)
    }

    // -- moves -------------------------------------------------------------

    /// Plays `position` for `user` and broadcasts the result.
    ///
    /// The write is a compare-and-swap against the game as it was loaded;
    /// a concurrent move against the same state fails with
    /// `StoreError::Conflict` and changes nothing.
    pub async fn make_move(
        &self,
        user: UserId,
        game_id: GameId,
        position: usize,
    ) -> Result<MoveReport, NoughtsError> {
        let current = self.store.load_game(game_id).await?;
        let outcome = apply_move(&current, user, position, Utc::now())?;
        let game = self
            .store
            .commit_move(&current, outcome.game.clone(), outcome.record.clone())
            .await?;
        tracing::debug!(%game_id, %user, position, round = current.current_round, "move accepted");

        if let (Some(winner), Some(loser)) = (outcome.series_winner, outcome.series_loser()) {
            tracing::info!(
                %game_id,
                %winner,
                score1 = game.player1_score,
                score2 = game.player2_score,
                "series completed"
            );
            self.finish_series(&game, winner, loser).await;
            self.dispatch.game_ended(&game);
        } else {
            if outcome.round_over() {
                tracing::info!(%game_id, round = game.current_round, draw = outcome.is_draw(), "round over");
            }
            self.dispatch.move_update(&game);
        }

        Ok(MoveReport {
            round_over: outcome.round_over(),
            series_over: outcome.series_over(),
            is_draw: outcome.is_draw(),
            winner_id: outcome.series_winner,
            game,
        })
    }

    /// Bookkeeping after the final move has been committed. The game is
    /// already `completed`, so failures here are logged, not returned.
    async fn finish_series(&self, game: &Game, winner: UserId, loser: UserId) {
        if let Err(e) = self.store.record_series_result(winner, loser).await {
            tracing::warn!(game_id = %game.id, error = %e, "failed to record series result");
        }
        self.mark_players(game, false).await;
    }

    pub async fn moves(&self, game_id: GameId) -> Result<Vec<MoveRecord>, NoughtsError> {
        Ok(self.store.moves_for(game_id).await?)
    }

    pub async fn stats(&self, user: UserId) -> Result<PlayerStats, NoughtsError> {
        Ok(self.store.stats(user).await?)
    }

    // -- rematches ---------------------------------------------------------

    /// Asks the other participant of a completed game for a new series.
    pub async fn request_rematch(
        &self,
        user: UserId,
        game_id: GameId,
    ) -> Result<RematchRequest, NoughtsError> {
        let game = self.store.load_game(game_id).await?;
        let now = Utc::now();
        let existing = self.open_rematch(game_id).await?;
        let new_request =
            rematch::request_rematch(&game, user, existing.as_ref(), now, self.rematch_window)?;
        let request = self.store.insert_rematch(new_request).await?;
        tracing::info!(
            rematch_id = %request.id,
            %game_id,
            requester = %user,
            opponent = %request.opponent_id,
            "rematch requested"
        );
        Ok(request)
    }

    /// The open rematch request for a game. Overdue requests are expired
    /// first, so a `pending` result is always still answerable.
    pub async fn rematch_for(
        &self,
        game_id: GameId,
    ) -> Result<Option<RematchRequest>, NoughtsError> {
        self.open_rematch(game_id).await
    }

    async fn open_rematch(&self, game_id: GameId) -> Result<Option<RematchRequest>, NoughtsError> {
        self.store.expire_rematches(Some(Utc::now())).await?;
        Ok(self.store.open_rematch_for(game_id).await?)
    }

    /// Accepts or declines a rematch. Acceptance starts a new `active`
    /// game with the same seats and settings and returns it.
    pub async fn respond_to_rematch(
        &self,
        user: UserId,
        rematch_id: RematchId,
        accept: bool,
    ) -> Result<Option<Game>, NoughtsError> {
        let now = Utc::now();
        let request = self.store.load_rematch(rematch_id).await?;
        if request.is_overdue(now) {
            match self
                .store
                .transition_rematch(rematch_id, RematchStatus::Pending, RematchStatus::Expired)
                .await
            {
                // Conflict: the sweep got there first.
                Ok(_) | Err(StoreError::Conflict(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        rematch::check_response(&request, user, now)?;

        if !accept {
            self.store
                .transition_rematch(rematch_id, RematchStatus::Pending, RematchStatus::Declined)
                .await?;
            tracing::info!(%rematch_id, %user, "rematch declined");
            return Ok(None);
        }

        let prior = self.store.load_game(request.game_id).await?;
        let new_game = rematch::rematch_game(&prior, self.session_timeout, now).ok_or_else(|| {
            StoreError::NotFound(format!("second player of game {}", prior.id))
        })?;
        let game = self.store.insert_game(new_game).await?;

        if let Err(e) = self
            .store
            .transition_rematch(rematch_id, RematchStatus::Pending, RematchStatus::Accepted)
            .await
        {
            // Someone else resolved the request; the new game must not
            // outlive it.
            self.store
                .transition_game(game.id, GameStatus::Active, GameStatus::Abandoned, now)
                .await?;
            return Err(e.into());
        }

        self.mark_players(&game, true).await;
        tracing::info!(%rematch_id, prior = %prior.id, game_id = %game.id, "rematch accepted");
        Ok(Some(game))
    }

    // -- presence and sweeps -----------------------------------------------

    /// Marks `user` online, flagged in-game if they play an `active` game.
    pub async fn heartbeat(&self, user: &Identity) -> Result<(), NoughtsError> {
        let in_game = self
            .store
            .live_game_for(user.id)
            .await?
            .is_some_and(|g| g.status == GameStatus::Active);
        self.store
            .touch_presence(user.id, &user.name, in_game, Utc::now())
            .await?;
        Ok(())
    }

    /// Everyone but `user` seen within the presence window, by name.
    pub async fn online_users(&self, user: UserId) -> Result<Vec<OnlineUser>, NoughtsError> {
        let cutoff = self.presence_cutoff();
        self.store.purge_presence(cutoff).await?;
        Ok(self.store.online_users(user, cutoff).await?)
    }

    /// Logout: forget presence and tell the lobby.
    pub async fn user_offline(&self, user: &Identity) -> Result<(), NoughtsError> {
        self.store.clear_presence(user.id).await?;
        tracing::info!(user_id = %user.id, "user offline");
        self.dispatch.user_offline(user.id, &user.name);
        Ok(())
    }

    /// Expires overdue rematches, purges stale challenges and forgets
    /// users not seen within the presence window.
    pub async fn sweep_expired(&self) -> Result<SweepReport, NoughtsError> {
        let report = SweepReport {
            rematches_expired: self.store.expire_rematches(Some(Utc::now())).await?,
            challenges_purged: self.purge_stale_challenges().await?,
            presence_cleared: self.store.purge_presence(self.presence_cutoff()).await?,
            ..SweepReport::default()
        };
        if report != SweepReport::default() {
            tracing::debug!(?report, "expiry sweep");
        }
        Ok(report)
    }

    /// Cold-start pass. No connection survives a restart, so nothing can
    /// still be `active`, `waiting`, `pending`, or in a game.
    pub async fn reconcile_on_startup(&self) -> Result<SweepReport, NoughtsError> {
        let report = SweepReport {
            games_abandoned: self.store.abandon_active_games().await?,
            challenges_purged: self.store.purge_waiting_games(None).await?,
            rematches_expired: self.store.expire_rematches(None).await?,
            presence_cleared: self.store.clear_all_presence().await?,
        };
        tracing::info!(
            abandoned = report.games_abandoned,
            purged = report.challenges_purged,
            expired = report.rematches_expired,
            presence = report.presence_cleared,
            "startup reconciliation complete"
        );
        Ok(report)
    }

    async fn purge_stale_challenges(&self) -> Result<usize, NoughtsError> {
        let cutoff = challenge::stale_cutoff(Utc::now(), self.challenge_window);
        Ok(self.store.purge_waiting_games(Some(cutoff)).await?)
    }

    fn presence_cutoff(&self) -> DateTime<Utc> {
        let now = Utc::now();
        now.checked_sub_signed(self.presence_window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Presence follows the game record; the record has already been
    /// written, so a failure here is logged, not returned.
    async fn mark_players(&self, game: &Game, in_game: bool) {
        let now = Utc::now();
        for seat in [Seat::One, Seat::Two] {
            if let Some(user) = game.player(seat) {
                if let Err(e) = self
                    .store
                    .touch_presence(user, game.player_name(seat), in_game, now)
                    .await
                {
                    tracing::warn!(game_id = %game.id, %user, in_game, error = %e, "failed to update presence");
                }
            }
        }
    }
}
