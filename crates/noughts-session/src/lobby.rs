//! The lobby notification registry.
//!
//! Lobby channels carry best-effort pushes (challenge received, accepted,
//! declined, user offline) to users browsing for opponents. Every event
//! also has a polling path, so a missed push is never an error.
//!
//! A lobby channel lives for a fixed window from connect time, whatever
//! the traffic. The window is enforced by an [`ExpiryTimer`] stored next to
//! the channel it guards: removing the entry drops the timer, and dropping
//! the timer cancels it.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use noughts_match::UserId;
use noughts_protocol::ServerMessage;
use noughts_transport::ConnectionId;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::{Outbound, OutboundSender};

/// A scheduled callback that is cancelled when dropped.
#[derive(Debug)]
pub struct ExpiryTimer {
    handle: JoinHandle<()>,
}

impl ExpiryTimer {
    /// Runs `on_expiry` after `after`, unless the timer is dropped first.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn schedule(after: Duration, on_expiry: impl FnOnce() + Send + 'static) -> Self {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            on_expiry();
        });
        Self { handle }
    }
}

impl Drop for ExpiryTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct LobbyEntry {
    conn_id: ConnectionId,
    sender: OutboundSender,
    connected_at: Instant,
    _timer: ExpiryTimer,
}

type LobbyMap = HashMap<UserId, LobbyEntry>;

/// Thread-safe map of user to that user's lobby channel.
///
/// At most one entry per user: a new registration closes and replaces the
/// previous one.
#[derive(Clone)]
pub struct LobbyRegistry {
    entries: Arc<Mutex<LobbyMap>>,
    window: Duration,
}

impl LobbyRegistry {
    /// Creates a registry whose channels live for `window` after connecting.
    pub fn new(window: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            window,
        }
    }

    /// Registers `user_id`'s lobby channel and arms its expiry timer.
    ///
    /// Any previous channel for the user is sent [`Outbound::Close`] and
    /// forgotten.
    pub fn register(
        &self,
        user_id: UserId,
        conn_id: ConnectionId,
        sender: OutboundSender,
    ) -> LobbyRegistration {
        let prior = {
            // The timer callback takes this lock too, so it cannot observe
            // the map before the entry is in place.
            let mut entries = self.entries.lock();
            let weak = Arc::downgrade(&self.entries);
            let timer = ExpiryTimer::schedule(self.window, move || {
                expire(&weak, user_id, conn_id);
            });
            let entry = LobbyEntry {
                conn_id,
                sender,
                connected_at: Instant::now(),
                _timer: timer,
            };
            entries.insert(user_id, entry)
        };
        if let Some(prior) = prior {
            tracing::info!(%user_id, old = %prior.conn_id, new = %conn_id, "lobby connection replaced");
            let _ = prior.sender.send(Outbound::Close);
        } else {
            tracing::info!(%user_id, %conn_id, "lobby connection registered");
        }

        LobbyRegistration {
            registry: self.clone(),
            user_id,
            conn_id,
        }
    }

    /// Removes the user's channel and cancels its timer.
    pub fn unregister(&self, user_id: UserId) -> bool {
        let removed = self.entries.lock().remove(&user_id);
        removed.is_some()
    }

    fn unregister_conn(&self, user_id: UserId, conn_id: ConnectionId) {
        let mut entries = self.entries.lock();
        if entries.get(&user_id).is_some_and(|e| e.conn_id == conn_id) {
            entries.remove(&user_id);
            tracing::debug!(%user_id, %conn_id, "lobby connection unregistered");
        }
    }

    /// Pushes `msg` to the user's lobby channel.
    ///
    /// Returns `false` when the user has no live lobby channel. That is
    /// not an error.
    pub fn notify(&self, user_id: UserId, msg: ServerMessage) -> bool {
        let entries = self.entries.lock();
        let Some(entry) = entries.get(&user_id) else {
            tracing::debug!(%user_id, kind = msg.kind(), "no lobby connection, notification dropped");
            return false;
        };
        entry.sender.send(Outbound::Message(msg)).is_ok()
    }

    /// Pushes `msg` to every lobby channel except `except`'s.
    pub fn notify_all_except(&self, except: UserId, msg: &ServerMessage) -> usize {
        let entries = self.entries.lock();
        entries
            .iter()
            .filter(|(user_id, _)| **user_id != except)
            .filter(|(_, entry)| entry.sender.send(Outbound::Message(msg.clone())).is_ok())
            .count()
    }

    pub fn is_connected(&self, user_id: UserId) -> bool {
        self.entries.lock().contains_key(&user_id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Timer callback: closes the channel if it is still the one the timer was
/// armed for.
fn expire(entries: &Weak<Mutex<LobbyMap>>, user_id: UserId, conn_id: ConnectionId) {
    let Some(entries) = entries.upgrade() else {
        return;
    };
    let mut map = entries.lock();
    if !map.get(&user_id).is_some_and(|e| e.conn_id == conn_id) {
        return;
    }
    if let Some(entry) = map.remove(&user_id) {
        drop(map);
        tracing::info!(
            %user_id,
            %conn_id,
            lived_ms = entry.connected_at.elapsed().as_millis() as u64,
            "lobby connection expired"
        );
        let _ = entry.sender.send(Outbound::Close);
    }
}

/// Handle for a registered lobby channel. Removes it when dropped, unless
/// a newer channel for the same user has replaced it.
pub struct LobbyRegistration {
    registry: LobbyRegistry,
    user_id: UserId,
    conn_id: ConnectionId,
}

impl LobbyRegistration {
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn conn_id(&self) -> ConnectionId {
        self.conn_id
    }
}

impl Drop for LobbyRegistration {
    fn drop(&mut self) {
        self.registry.unregister_conn(self.user_id, self.conn_id);
    }
}
