//! Per-connection handler: admission, upgrade, and hand-off to a channel
//! worker.
//!
//! Each accepted TCP connection gets its own Tokio task running this
//! handler. The flow is:
//!   1. Read the HTTP request line (bounded by the upgrade timeout)
//!   2. Admit or refuse it; refusals get a plain HTTP status
//!   3. Upgrade and run the game or lobby channel until it ends

use std::sync::Arc;

use noughts_protocol::Codec;
use noughts_session::IdentityGateway;
use noughts_store::SessionStore;
use noughts_transport::{PendingUpgrade, Rejection, TransportError};

use crate::admission::{Admitted, admit};
use crate::channel::{game_channel, lobby_channel};
use crate::server::ServerState;
use crate::NoughtsError;

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<S, A, K>(
    mut pending: PendingUpgrade,
    state: Arc<ServerState<S, A, K>>,
) -> Result<(), NoughtsError>
where
    S: SessionStore,
    A: IdentityGateway,
    K: Codec,
{
    let conn_id = pending.id();
    let peer = pending.peer_addr();

    let request = match pending.read_request(state.upgrade_timeout).await {
        Ok(request) => request,
        Err(TransportError::MalformedRequest(reason)) => {
            tracing::debug!(%conn_id, %peer, %reason, "malformed upgrade request");
            pending.reject(Rejection::bad_request(reason)).await?;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let arena = &state.arena;
    let dispatch = arena.dispatcher();
    let admitted = match admit(
        &request,
        conn_id,
        arena.store().as_ref(),
        &state.gateway,
        dispatch.games(),
    )
    .await
    {
        Ok(admitted) => admitted,
        Err(rejection) => {
            tracing::info!(
                %conn_id,
                %peer,
                path = request.path(),
                status = rejection.status,
                reason = %rejection.reason,
                "connection refused"
            );
            pending.reject(rejection).await?;
            return Ok(());
        }
    };

    match admitted {
        Admitted::Game {
            identity,
            registration,
            outbound,
        } => {
            // A failed upgrade drops the registration and frees the slot.
            let conn = pending.accept().await?;
            tracing::info!(
                %conn_id,
                user_id = %identity.id,
                game_id = %registration.game_id(),
                "game connection upgraded"
            );
            game_channel(
                conn,
                registration,
                outbound,
                &state.codec,
                arena.store().as_ref(),
                dispatch,
                state.timings,
            )
            .await
        }
        Admitted::Lobby { identity } => {
            let conn = pending.accept().await?;
            tracing::info!(%conn_id, user_id = %identity.id, "lobby connection upgraded");
            lobby_channel(
                conn,
                &identity,
                dispatch.lobby(),
                &state.codec,
                state.timings.lobby,
            )
            .await?;
            Ok(())
        }
    }
}
