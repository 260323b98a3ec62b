//! Steady-state loop shared by game and lobby channels.
//!
//! One task owns the connection and waits on four things at once: the next
//! inbound frame, the next queued [`Outbound`] instruction, the transport
//! ping timer, and the idle deadline. Any inbound frame, transport pongs
//! included, pushes the idle deadline back.

use std::time::Duration;

use noughts_protocol::{ClientMessage, Codec, ServerMessage};
use noughts_session::{Outbound, OutboundReceiver};
use noughts_transport::{Connection, Frame};
use tokio::time::{Instant, MissedTickBehavior};

use crate::NoughtsError;

/// Timers for one channel kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PumpSettings {
    pub ping_interval: Duration,
    pub idle_timeout: Duration,
}

/// Why the pump stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PumpExit {
    /// The client closed the connection.
    PeerClosed,
    /// Nothing arrived within the idle timeout.
    IdleTimeout,
    /// The server asked for the connection to be closed, or dropped its
    /// side of the queue.
    Closed,
}

/// Runs until the connection ends. Transport errors are returned; every
/// other way out is a [`PumpExit`].
pub(crate) async fn pump<C: Connection, K: Codec>(
    conn: &mut C,
    codec: &K,
    outbound: &mut OutboundReceiver,
    settings: PumpSettings,
) -> Result<PumpExit, NoughtsError> {
    let mut ping = tokio::time::interval_at(
        Instant::now() + settings.ping_interval,
        settings.ping_interval,
    );
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let idle = tokio::time::sleep(settings.idle_timeout);
    tokio::pin!(idle);

    loop {
        tokio::select! {
            frame = conn.recv() => {
                let Some(frame) = frame? else {
                    return Ok(PumpExit::PeerClosed);
                };
                idle.as_mut().reset(Instant::now() + settings.idle_timeout);
                if let Frame::Data(data) = frame {
                    respond(conn, codec, &data).await?;
                }
            }
            instruction = outbound.recv() => match instruction {
                Some(Outbound::Message(msg)) => {
                    tracing::debug!(conn_id = %conn.id(), kind = msg.kind(), "pushing message");
                    conn.send(codec.encode(&msg)?).await?;
                }
                Some(Outbound::Close) | None => return Ok(PumpExit::Closed),
            },
            _ = ping.tick() => conn.ping().await?,
            () = &mut idle => return Ok(PumpExit::IdleTimeout),
        }
    }
}

/// Answers `ping` with `pong`; everything else is only logged.
async fn respond<C: Connection, K: Codec>(
    conn: &mut C,
    codec: &K,
    data: &[u8],
) -> Result<(), NoughtsError> {
    let conn_id = conn.id();
    match codec.decode::<ClientMessage>(data) {
        Ok(ClientMessage::Ping) => conn.send(codec.encode(&ServerMessage::Pong)?).await?,
        Ok(ClientMessage::Reconnecting) => {
            tracing::info!(%conn_id, "client reports reconnecting");
        }
        Ok(msg) => tracing::debug!(%conn_id, kind = msg.kind(), "ignoring message"),
        Err(e) => tracing::debug!(%conn_id, error = %e, "ignoring undecodable message"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockPeer, Sent, mock_pair};
    use noughts_protocol::JsonCodec;
    use noughts_session::{OutboundSender, outbound_channel};

    const SETTINGS: PumpSettings = PumpSettings {
        ping_interval: Duration::from_secs(30),
        idle_timeout: Duration::from_secs(60),
    };

    fn spawn_pump(
        settings: PumpSettings,
    ) -> (
        tokio::task::JoinHandle<Result<PumpExit, NoughtsError>>,
        MockPeer,
        OutboundSender,
    ) {
        let (mut conn, peer) = mock_pair();
        let (tx, mut rx) = outbound_channel();
        let handle = tokio::spawn(async move {
            pump(&mut conn, &JsonCodec, &mut rx, settings).await
        });
        (handle, peer, tx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_pump_forwards_queue_then_closes_on_instruction() {
        let (handle, mut peer, tx) = spawn_pump(SETTINGS);
        tx.send(Outbound::Message(ServerMessage::LobbyConnected)).unwrap();
        tx.send(Outbound::Close).unwrap();

        assert_eq!(peer.next_message().await, Some(ServerMessage::LobbyConnected));
        assert_eq!(handle.await.unwrap().unwrap(), PumpExit::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pump_answers_ping_and_ignores_others() {
        let (handle, mut peer, _tx) = spawn_pump(SETTINGS);
        peer.send_text(r#"{"type":"reconnecting"}"#);
        peer.send_text(r#"{"type":"ack"}"#);
        peer.send_text("not json");
        peer.send_text(r#"{"type":"ping"}"#);

        assert_eq!(peer.next_message().await, Some(ServerMessage::Pong));
        drop(peer.tx);
        assert_eq!(handle.await.unwrap().unwrap(), PumpExit::PeerClosed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pump_sends_transport_pings() {
        let (handle, mut peer, _tx) = spawn_pump(SETTINGS);
        let start = Instant::now();
        assert_eq!(peer.rx.recv().await, Some(Sent::Ping));
        assert!(start.elapsed() >= SETTINGS.ping_interval);
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_pump_idle_timeout_when_silent() {
        let (handle, _peer, _tx) = spawn_pump(SETTINGS);
        let start = Instant::now();
        assert_eq!(handle.await.unwrap().unwrap(), PumpExit::IdleTimeout);
        assert!(start.elapsed() >= SETTINGS.idle_timeout);
        assert!(start.elapsed() < SETTINGS.idle_timeout + Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pump_heartbeat_renews_idle_deadline() {
        let (handle, peer, _tx) = spawn_pump(SETTINGS);
        let start = Instant::now();

        tokio::time::sleep(Duration::from_secs(50)).await;
        peer.tx.send(Frame::Heartbeat).unwrap();
        tokio::time::sleep(Duration::from_secs(50)).await;
        assert!(!handle.is_finished(), "heartbeat at 50s should keep it alive past 60s");

        assert_eq!(handle.await.unwrap().unwrap(), PumpExit::IdleTimeout);
        assert!(start.elapsed() >= Duration::from_secs(110));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pump_queue_dropped_is_closed() {
        let (handle, _peer, tx) = spawn_pump(SETTINGS);
        drop(tx);
        assert_eq!(handle.await.unwrap().unwrap(), PumpExit::Closed);
    }
}
