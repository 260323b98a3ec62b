//! The connection registry: one live channel per (game, user).
//!
//! Workers never write to each other's sockets. Each connection owns an
//! outbound queue ([`OutboundSender`]); the registry keeps the sending half
//! and a broadcast is a non-blocking push onto every queue registered for
//! the game. The worker that owns the socket drains its queue.
//!
//! ```text
//! register() ──▶ [pending] ──mark_ready()──▶ [ready] ──drop / unregister()──▶ gone
//!                    │                          ▲
//!                    └── invisible to broadcast ┘ receives broadcasts
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use noughts_match::{GameId, UserId};
use noughts_protocol::ServerMessage;
use noughts_transport::ConnectionId;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::SessionError;

/// An instruction for the worker that owns a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Encode and send this message.
    Message(ServerMessage),
    /// Close the connection.
    Close,
}

pub type OutboundSender = mpsc::UnboundedSender<Outbound>;
pub type OutboundReceiver = mpsc::UnboundedReceiver<Outbound>;

/// Creates the queue a connection worker drains.
pub fn outbound_channel() -> (OutboundSender, OutboundReceiver) {
    mpsc::unbounded_channel()
}

struct Slot {
    conn_id: ConnectionId,
    sender: OutboundSender,
    ready: bool,
}

type GameMap = HashMap<GameId, HashMap<UserId, Slot>>;

/// Thread-safe map of (game, user) to that user's live game channel.
///
/// Cloning is cheap and every clone sees the same map. All operations take
/// one short lock; nothing awaits while holding it.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    games: Arc<Mutex<GameMap>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the (game, user) slot for `conn_id`.
    ///
    /// The slot starts out pending: it blocks a second registration but
    /// receives no broadcasts until [`Registration::mark_ready`]. Dropping
    /// the returned [`Registration`] frees the slot.
    ///
    /// # Errors
    /// [`SessionError::AlreadyConnected`] if the user already holds a slot
    /// for this game. The existing connection is not touched.
    pub fn register(
        &self,
        game_id: GameId,
        user_id: UserId,
        conn_id: ConnectionId,
        sender: OutboundSender,
    ) -> Result<Registration, SessionError> {
        let mut games = self.games.lock();
        let users = games.entry(game_id).or_default();
        if users.contains_key(&user_id) {
            return Err(SessionError::AlreadyConnected { game_id, user_id });
        }
        users.insert(
            user_id,
            Slot {
                conn_id,
                sender,
                ready: false,
            },
        );
        tracing::info!(%game_id, %user_id, %conn_id, "game connection registered");
        Ok(Registration {
            registry: self.clone(),
            game_id,
            user_id,
            conn_id,
        })
    }

    /// Removes the user's slot regardless of which connection holds it.
    /// Returns whether a slot was removed.
    pub fn unregister(&self, game_id: GameId, user_id: UserId) -> bool {
        self.remove_where(game_id, user_id, |_| true)
    }

    fn unregister_conn(&self, game_id: GameId, user_id: UserId, conn_id: ConnectionId) -> bool {
        self.remove_where(game_id, user_id, |slot| slot.conn_id == conn_id)
    }

    fn remove_where(
        &self,
        game_id: GameId,
        user_id: UserId,
        pred: impl FnOnce(&Slot) -> bool,
    ) -> bool {
        let mut games = self.games.lock();
        let Some(users) = games.get_mut(&game_id) else {
            return false;
        };
        let removed = match users.get(&user_id) {
            Some(slot) if pred(slot) => users.remove(&user_id).is_some(),
            _ => false,
        };
        if users.is_empty() {
            games.remove(&game_id);
        }
        if removed {
            tracing::info!(%game_id, %user_id, "game connection unregistered");
        }
        removed
    }

    fn set_ready(&self, game_id: GameId, user_id: UserId, conn_id: ConnectionId) {
        let mut games = self.games.lock();
        if let Some(slot) = games
            .get_mut(&game_id)
            .and_then(|users| users.get_mut(&user_id))
            .filter(|slot| slot.conn_id == conn_id)
        {
            slot.ready = true;
        }
    }

    /// Whether `user_id` holds a slot (pending or ready) for `game_id`.
    pub fn has_connection(&self, user_id: UserId, game_id: GameId) -> bool {
        self.games
            .lock()
            .get(&game_id)
            .is_some_and(|users| users.contains_key(&user_id))
    }

    /// Slots held for `game_id`, pending ones included.
    pub fn connection_count(&self, game_id: GameId) -> usize {
        self.games.lock().get(&game_id).map_or(0, HashMap::len)
    }

    /// Number of games with at least one slot.
    pub fn game_count(&self) -> usize {
        self.games.lock().len()
    }

    /// Queues `msg` for every ready connection of `game_id`.
    ///
    /// Returns how many connections accepted it. A closed queue means the
    /// worker is already exiting; it is skipped.
    pub fn broadcast(&self, game_id: GameId, msg: &ServerMessage) -> usize {
        self.fan_out(game_id, None, msg)
    }

    /// Like [`broadcast`](Self::broadcast) but skips `except`.
    pub fn broadcast_except(
        &self,
        game_id: GameId,
        except: UserId,
        msg: &ServerMessage,
    ) -> usize {
        self.fan_out(game_id, Some(except), msg)
    }

    fn fan_out(&self, game_id: GameId, except: Option<UserId>, msg: &ServerMessage) -> usize {
        let games = self.games.lock();
        let Some(users) = games.get(&game_id) else {
            return 0;
        };
        let mut delivered = 0;
        for (user_id, slot) in users {
            if !slot.ready || Some(*user_id) == except {
                continue;
            }
            match slot.sender.send(Outbound::Message(msg.clone())) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    tracing::debug!(%game_id, %user_id, kind = msg.kind(), "broadcast skipped closed connection");
                }
            }
        }
        delivered
    }
}

/// Proof of a claimed (game, user) slot. Frees the slot when dropped.
pub struct Registration {
    registry: ConnectionRegistry,
    game_id: GameId,
    user_id: UserId,
    conn_id: ConnectionId,
}

impl Registration {
    /// Makes the connection visible to broadcasts.
    pub fn mark_ready(&self) {
        self.registry
            .set_ready(self.game_id, self.user_id, self.conn_id);
    }

    pub fn game_id(&self) -> GameId {
        self.game_id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn conn_id(&self) -> ConnectionId {
        self.conn_id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry
            .unregister_conn(self.game_id, self.user_id, self.conn_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GAME: GameId = GameId(1);
    const ALICE: UserId = UserId(1);
    const BOB: UserId = UserId(2);

    fn register(
        registry: &ConnectionRegistry,
        user: UserId,
    ) -> (Registration, OutboundReceiver) {
        let (tx, rx) = outbound_channel();
        let reg = registry
            .register(GAME, user, ConnectionId::next(), tx)
            .expect("slot is free");
        (reg, rx)
    }

    #[test]
    fn test_register_duplicate_is_conflict_not_replacement() {
        let registry = ConnectionRegistry::new();
        let (first, _rx) = register(&registry, ALICE);
        first.mark_ready();

        let (tx, _rx2) = outbound_channel();
        let err = registry
            .register(GAME, ALICE, ConnectionId::next(), tx)
            .err()
            .expect("second registration must fail");
        assert_eq!(
            err,
            SessionError::AlreadyConnected {
                game_id: GAME,
                user_id: ALICE
            }
        );
        // The first connection still receives broadcasts.
        assert_eq!(registry.broadcast(GAME, &ServerMessage::Pong), 1);
    }

    #[test]
    fn test_pending_registration_is_not_broadcast_to() {
        let registry = ConnectionRegistry::new();
        let (reg, mut rx) = register(&registry, ALICE);

        assert!(registry.has_connection(ALICE, GAME));
        assert_eq!(registry.broadcast(GAME, &ServerMessage::Pong), 0);
        assert!(rx.try_recv().is_err());

        reg.mark_ready();
        assert_eq!(registry.broadcast(GAME, &ServerMessage::Pong), 1);
        assert_eq!(rx.try_recv().unwrap(), Outbound::Message(ServerMessage::Pong));
    }

    #[test]
    fn test_broadcast_except_skips_user() {
        let registry = ConnectionRegistry::new();
        let (a, mut rx_a) = register(&registry, ALICE);
        let (b, mut rx_b) = register(&registry, BOB);
        a.mark_ready();
        b.mark_ready();

        let msg = ServerMessage::OpponentDisconnected { user_id: ALICE };
        assert_eq!(registry.broadcast_except(GAME, ALICE, &msg), 1);
        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_b.try_recv().unwrap(), Outbound::Message(msg));
    }

    #[test]
    fn test_drop_unregisters_and_removes_empty_game() {
        let registry = ConnectionRegistry::new();
        let (a, _rx_a) = register(&registry, ALICE);
        let (b, _rx_b) = register(&registry, BOB);
        assert_eq!(registry.connection_count(GAME), 2);

        drop(a);
        assert!(!registry.has_connection(ALICE, GAME));
        assert_eq!(registry.connection_count(GAME), 1);

        drop(b);
        assert_eq!(registry.connection_count(GAME), 0);
        assert_eq!(registry.game_count(), 0);
    }

    #[test]
    fn test_stale_registration_drop_keeps_newer_slot() {
        let registry = ConnectionRegistry::new();
        let (old, _rx_old) = register(&registry, ALICE);

        // Forcibly removed, then re-claimed by a newer connection.
        assert!(registry.unregister(GAME, ALICE));
        let (new, _rx_new) = register(&registry, ALICE);

        drop(old);
        assert!(registry.has_connection(ALICE, GAME));
        drop(new);
        assert!(!registry.has_connection(ALICE, GAME));
    }

    #[test]
    fn test_broadcast_skips_closed_queue() {
        let registry = ConnectionRegistry::new();
        let (a, rx_a) = register(&registry, ALICE);
        let (b, _rx_b) = register(&registry, BOB);
        a.mark_ready();
        b.mark_ready();
        drop(rx_a);

        assert_eq!(registry.broadcast(GAME, &ServerMessage::Pong), 1);
    }

    #[test]
    fn test_unregister_unknown_is_noop() {
        let registry = ConnectionRegistry::new();
        assert!(!registry.unregister(GAME, ALICE));
        assert_eq!(registry.broadcast(GameId(7), &ServerMessage::Pong), 0);
    }

    #[test]
    fn test_registry_is_shared_across_threads() {
        let registry = ConnectionRegistry::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    let (tx, _rx) = outbound_channel();
                    registry
                        .register(GAME, UserId(100), ConnectionId::new(i), tx)
                        .ok()
                        .map(std::mem::forget)
                        .is_some()
                })
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(registry.connection_count(GAME), 1);
    }
}
