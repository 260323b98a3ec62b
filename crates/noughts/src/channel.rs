//! Per-connection workers, one per upgraded socket.
//!
//! Both are written against [`Connection`] so they run the same over a real
//! WebSocket and over the in-memory double used in tests.

use std::time::Duration;

use noughts_protocol::{Codec, ServerMessage};
use noughts_session::{Identity, LobbyRegistry, OutboundReceiver, Registration, outbound_channel};
use noughts_store::SessionStore;
use noughts_transport::Connection;

use crate::handshake::handshake;
use crate::pump::{PumpExit, PumpSettings, pump};
use crate::{Dispatcher, NoughtsError, ServerConfig};

/// Deadlines for both channel kinds, taken from [`ServerConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ChannelTimings {
    pub handshake_timeout: Duration,
    pub game: PumpSettings,
    pub lobby: PumpSettings,
}

impl ChannelTimings {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            handshake_timeout: config.handshake_timeout(),
            game: PumpSettings {
                ping_interval: config.ping_interval(),
                idle_timeout: config.keepalive_timeout(),
            },
            lobby: PumpSettings {
                ping_interval: config.lobby_ping_interval(),
                idle_timeout: config.lobby_idle_timeout(),
            },
        }
    }
}

/// Drives an admitted game channel: handshake, steady state, cleanup.
///
/// The registration was claimed before the upgrade. It is released when
/// this returns, after which the opponent (if connected) is told.
pub(crate) async fn game_channel<C, K, S>(
    mut conn: C,
    registration: Registration,
    mut outbound: OutboundReceiver,
    codec: &K,
    store: &S,
    dispatch: &Dispatcher,
    timings: ChannelTimings,
) -> Result<(), NoughtsError>
where
    C: Connection,
    K: Codec,
    S: SessionStore,
{
    let game_id = registration.game_id();
    let user_id = registration.user_id();
    let conn_id = conn.id();

    let game = match handshake(
        &mut conn,
        codec,
        store,
        &registration,
        timings.handshake_timeout,
    )
    .await
    {
        Ok(game) => game,
        Err(e) => {
            tracing::info!(%game_id, %user_id, %conn_id, error = %e, "handshake failed");
            drop(registration);
            let _ = conn.close().await;
            return Err(e);
        }
    };
    tracing::info!(%game_id, %user_id, %conn_id, status = ?game.status, "game connection ready");

    let exit = pump(&mut conn, codec, &mut outbound, timings.game).await;

    drop(registration);
    dispatch.opponent_disconnected(game_id, user_id);
    let _ = conn.close().await;

    let exit = exit?;
    tracing::info!(%game_id, %user_id, %conn_id, ?exit, "game connection closed");
    Ok(())
}

/// Drives a lobby channel until the client leaves, it idles out, or the
/// registry's expiry timer closes it.
pub(crate) async fn lobby_channel<C, K>(
    mut conn: C,
    identity: &Identity,
    lobby: &LobbyRegistry,
    codec: &K,
    settings: PumpSettings,
) -> Result<PumpExit, NoughtsError>
where
    C: Connection,
    K: Codec,
{
    let (tx, mut outbound) = outbound_channel();
    let registration = lobby.register(identity.id, conn.id(), tx);

    let result = match codec.encode(&ServerMessage::LobbyConnected) {
        Ok(hello) => match conn.send(hello).await {
            Ok(()) => pump(&mut conn, codec, &mut outbound, settings).await,
            Err(e) => Err(e.into()),
        },
        Err(e) => Err(e.into()),
    };

    drop(registration);
    let _ = conn.close().await;

    let exit = result?;
    tracing::info!(user_id = %identity.id, ?exit, "lobby connection closed");
    Ok(exit)
}
