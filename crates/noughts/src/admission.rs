//! Pre-upgrade admission: routing, token check, participant check, and
//! the per-game connection slot.
//!
//! Everything here runs on the HTTP request line. A refused request is
//! answered with a plain status and never upgraded.

use noughts_match::GameId;
use noughts_session::{
    ConnectionRegistry, Identity, IdentityGateway, OutboundReceiver, Registration, SessionError,
    outbound_channel,
};
use noughts_store::{SessionStore, StoreError};
use noughts_transport::{ConnectionId, Rejection, UpgradeRequest};

const GAME_PREFIX: &str = "/api/ws/game/";
const LOBBY_PATH: &str = "/api/ws/lobby";

/// The two WebSocket endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Route {
    Game(String),
    Lobby,
}

impl Route {
    pub fn parse(path: &str) -> Option<Self> {
        let path = path.strip_suffix('/').unwrap_or(path);
        if path == LOBBY_PATH {
            return Some(Route::Lobby);
        }
        let id = path.strip_prefix(GAME_PREFIX)?;
        (!id.is_empty() && !id.contains('/')).then(|| Route::Game(id.to_string()))
    }
}

/// A request that passed admission.
pub(crate) enum Admitted {
    /// The (game, user) slot is already claimed, pending the handshake.
    Game {
        identity: Identity,
        registration: Registration,
        outbound: OutboundReceiver,
    },
    Lobby {
        identity: Identity,
    },
}

/// Decides whether `request` may be upgraded.
pub(crate) async fn admit<S, A>(
    request: &UpgradeRequest,
    conn_id: ConnectionId,
    store: &S,
    gateway: &A,
    games: &ConnectionRegistry,
) -> Result<Admitted, Rejection>
where
    S: SessionStore,
    A: IdentityGateway,
{
    let route = Route::parse(request.path())
        .ok_or_else(|| Rejection::not_found(format!("no endpoint at {}", request.path())))?;

    let token = request
        .query_param("token")
        .ok_or_else(|| Rejection::unauthorized("missing token"))?;
    let identity = gateway
        .validate(token)
        .await
        .map_err(|e| Rejection::unauthorized(e.to_string()))?;

    let raw_id = match route {
        Route::Lobby => return Ok(Admitted::Lobby { identity }),
        Route::Game(raw_id) => raw_id,
    };

    let game_id: GameId = raw_id
        .parse()
        .map_err(|_| Rejection::not_found(format!("no game {raw_id}")))?;
    let game = match store.load_game(game_id).await {
        Ok(game) => game,
        Err(StoreError::NotFound(_)) => {
            return Err(Rejection::not_found(format!("no game {game_id}")));
        }
        Err(e) => {
            tracing::error!(%game_id, error = %e, "store failure during admission");
            return Err(Rejection::new(500, "internal error"));
        }
    };
    if !game.is_participant(identity.id) {
        return Err(Rejection::forbidden("not a participant"));
    }
    if !game.status.is_live() {
        return Err(Rejection::forbidden(format!("game is {:?}", game.status)));
    }

    let (tx, outbound) = outbound_channel();
    let registration = games
        .register(game_id, identity.id, conn_id, tx)
        .map_err(|e| match e {
            SessionError::AlreadyConnected { .. } => Rejection::conflict(e.to_string()),
            SessionError::AuthFailed(_) => Rejection::unauthorized(e.to_string()),
        })?;

    Ok(Admitted::Game {
        identity,
        registration,
        outbound,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use noughts_match::{Game, GameSettings, GameStatus, NewGame, UserId};
    use noughts_session::TokenTable;
    use noughts_store::MemoryStore;

    fn identity(id: u64, name: &str) -> Identity {
        Identity {
            id: UserId(id),
            name: name.into(),
            is_admin: false,
        }
    }

    fn tokens() -> TokenTable {
        TokenTable::new()
            .with("tok-a", identity(1, "alice"))
            .with("tok-b", identity(2, "bob"))
            .with("tok-c", identity(3, "carol"))
    }

    async fn game(store: &MemoryStore, status: GameStatus) -> Game {
        store
            .insert_game(NewGame {
                player1_id: UserId(1),
                player1_name: "alice".into(),
                player2_id: UserId(2),
                player2_name: "bob".into(),
                status,
                settings: GameSettings::default(),
                session_timeout: 60,
                created_at: Utc::now(),
            })
            .await
            .unwrap()
    }

    async fn try_admit(
        store: &MemoryStore,
        games: &ConnectionRegistry,
        target: &str,
    ) -> Result<Admitted, Rejection> {
        let request = UpgradeRequest::from_target(target);
        admit(&request, ConnectionId::next(), store, &tokens(), games).await
    }

    async fn status_of(store: &MemoryStore, games: &ConnectionRegistry, target: &str) -> u16 {
        match try_admit(store, games, target).await {
            Ok(_) => 101,
            Err(rejection) => rejection.status,
        }
    }

    #[test]
    fn test_route_parse() {
        assert_eq!(Route::parse("/api/ws/lobby"), Some(Route::Lobby));
        assert_eq!(Route::parse("/api/ws/lobby/"), Some(Route::Lobby));
        assert_eq!(Route::parse("/api/ws/game/7"), Some(Route::Game("7".into())));
        assert_eq!(Route::parse("/api/ws/game/7/"), Some(Route::Game("7".into())));
        assert_eq!(Route::parse("/api/ws/game/"), None);
        assert_eq!(Route::parse("/api/ws/game/7/moves"), None);
        assert_eq!(Route::parse("/"), None);
    }

    #[tokio::test]
    async fn test_admit_game_participant() {
        let store = MemoryStore::new();
        let games = ConnectionRegistry::new();
        let g = game(&store, GameStatus::Active).await;

        let admitted = try_admit(&store, &games, &format!("/api/ws/game/{}?token=tok-a", g.id.0))
            .await
            .unwrap();
        let Admitted::Game {
            identity,
            registration,
            ..
        } = admitted
        else {
            panic!("expected a game admission");
        };
        assert_eq!(identity.name, "alice");
        assert_eq!(registration.game_id(), g.id);
        assert!(games.has_connection(UserId(1), g.id));
    }

    #[tokio::test]
    async fn test_admit_waiting_game_allowed() {
        let store = MemoryStore::new();
        let games = ConnectionRegistry::new();
        let g = game(&store, GameStatus::Waiting).await;
        let target = format!("/api/ws/game/{}?token=tok-b", g.id.0);
        assert_eq!(status_of(&store, &games, &target).await, 101);
    }

    #[tokio::test]
    async fn test_admit_rejections() {
        let store = MemoryStore::new();
        let games = ConnectionRegistry::new();
        let g = game(&store, GameStatus::Active).await;
        let id = g.id.0;

        assert_eq!(status_of(&store, &games, "/api/ws/nope?token=tok-a").await, 404);
        assert_eq!(status_of(&store, &games, &format!("/api/ws/game/{id}")).await, 401);
        assert_eq!(
            status_of(&store, &games, &format!("/api/ws/game/{id}?token=bogus")).await,
            401
        );
        assert_eq!(status_of(&store, &games, "/api/ws/lobby").await, 401);
        assert_eq!(status_of(&store, &games, "/api/ws/game/999?token=tok-a").await, 404);
        assert_eq!(status_of(&store, &games, "/api/ws/game/abc?token=tok-a").await, 404);
        assert_eq!(
            status_of(&store, &games, &format!("/api/ws/game/{id}?token=tok-c")).await,
            403
        );
        assert_eq!(games.game_count(), 0);
    }

    #[tokio::test]
    async fn test_admit_finished_game_forbidden() {
        let store = MemoryStore::new();
        let games = ConnectionRegistry::new();
        for status in [GameStatus::Completed, GameStatus::Abandoned, GameStatus::Declined] {
            let g = game(&store, status).await;
            let target = format!("/api/ws/game/{}?token=tok-a", g.id.0);
            assert_eq!(status_of(&store, &games, &target).await, 403, "{status:?}");
        }
    }

    #[tokio::test]
    async fn test_admit_duplicate_is_conflict_until_released() {
        let store = MemoryStore::new();
        let games = ConnectionRegistry::new();
        let g = game(&store, GameStatus::Active).await;
        let target = format!("/api/ws/game/{}?token=tok-a", g.id.0);

        let first = try_admit(&store, &games, &target).await.unwrap();
        assert_eq!(status_of(&store, &games, &target).await, 409);
        // The other player is unaffected.
        let other = format!("/api/ws/game/{}?token=tok-b", g.id.0);
        assert_eq!(status_of(&store, &games, &other).await, 101);

        drop(first);
        assert_eq!(status_of(&store, &games, &target).await, 101);
    }

    #[tokio::test]
    async fn test_admit_lobby() {
        let store = MemoryStore::new();
        let games = ConnectionRegistry::new();
        let admitted = try_admit(&store, &games, "/api/ws/lobby?token=tok-c").await.unwrap();
        assert!(matches!(admitted, Admitted::Lobby { identity } if identity.id == UserId(3)));
    }
}
