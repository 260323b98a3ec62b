//! `NoughtsServer` builder and server loop.
//!
//! Ties the layers together: transport → admission → channel workers, with
//! the [`Arena`] and its registries shared by every task.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use noughts_protocol::{Codec, JsonCodec};
use noughts_session::{ConnectionRegistry, IdentityGateway, LobbyRegistry};
use noughts_store::SessionStore;
use noughts_transport::WebSocketListener;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::channel::ChannelTimings;
use crate::handler::handle_connection;
use crate::{Arena, Dispatcher, NoughtsError, ServerConfig};

/// Shared server state passed to each connection task.
pub(crate) struct ServerState<S, A, K> {
    pub(crate) arena: Arena<S>,
    pub(crate) gateway: A,
    pub(crate) codec: K,
    pub(crate) timings: ChannelTimings,
    pub(crate) upgrade_timeout: Duration,
}

/// Builder for configuring and starting a noughts server.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use noughts::prelude::*;
///
/// # async fn run() -> Result<(), NoughtsError> {
/// let config = ServerConfig::load("noughts.toml")?;
/// let gateway = config.token_table();
/// let server = NoughtsServer::builder()
///     .config(config)
///     .build(Arc::new(MemoryStore::new()), gateway)
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct NoughtsServerBuilder {
    config: ServerConfig,
}

impl NoughtsServerBuilder {
    /// Creates a builder with the default configuration.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Validates the configuration, binds the listener and runs the
    /// startup reconciliation against `store`.
    ///
    /// Uses [`JsonCodec`] on the wire.
    pub async fn build<S, A>(
        self,
        store: Arc<S>,
        gateway: A,
    ) -> Result<NoughtsServer<S, A, JsonCodec>, NoughtsError>
    where
        S: SessionStore,
        A: IdentityGateway,
    {
        let config = self.config;
        config.validate()?;

        let listener = WebSocketListener::bind(&config.bind_addr).await?;
        let dispatch = Dispatcher::new(
            ConnectionRegistry::new(),
            LobbyRegistry::new(config.lobby_window()),
        );
        let arena = Arena::new(store, dispatch, &config);
        arena.reconcile_on_startup().await?;

        let state = Arc::new(ServerState {
            arena,
            gateway,
            codec: JsonCodec,
            timings: ChannelTimings::from_config(&config),
            upgrade_timeout: config.upgrade_timeout(),
        });

        Ok(NoughtsServer {
            listener,
            state,
            config,
        })
    }
}

impl Default for NoughtsServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound noughts server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct NoughtsServer<S, A, K> {
    listener: WebSocketListener,
    state: Arc<ServerState<S, A, K>>,
    config: ServerConfig,
}

impl NoughtsServer<(), (), ()> {
    /// Creates a new builder.
    pub fn builder() -> NoughtsServerBuilder {
        NoughtsServerBuilder::new()
    }
}

impl<S, A, K> NoughtsServer<S, A, K>
where
    S: SessionStore,
    A: IdentityGateway,
    K: Codec,
{
    /// The game service, for the request/response surface in front of
    /// this server.
    pub fn arena(&self) -> &Arena<S> {
        &self.state.arena
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop and the background expiry sweep.
    ///
    /// Each accepted connection gets its own task. Runs until the process
    /// is terminated.
    pub async fn run(self) -> Result<(), NoughtsError> {
        let _sweeper = Sweeper::spawn(self.state.arena.clone(), self.config.sweep_interval());
        tracing::info!(addr = %self.config.bind_addr, "noughts server running");

        loop {
            match self.listener.accept().await {
                Ok(pending) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        let conn_id = pending.id();
                        if let Err(e) = handle_connection(pending, state).await {
                            tracing::debug!(%conn_id, error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}

/// Periodic expiry sweep. Stops when dropped.
struct Sweeper {
    handle: JoinHandle<()>,
}

impl Sweeper {
    fn spawn<S: SessionStore>(arena: Arena<S>, period: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticks = tokio::time::interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                if let Err(e) = arena.sweep_expired().await {
                    tracing::warn!(error = %e, "expiry sweep failed");
                }
            }
        });
        Self { handle }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use noughts_match::{GameSettings, GameStatus, NewGame, UserId};
    use noughts_session::TokenTable;
    use noughts_store::MemoryStore;

    fn local() -> ServerConfig {
        ServerConfig {
            bind_addr: "127.0.0.1:0".into(),
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_build_rejects_invalid_config() {
        let config = ServerConfig {
            handshake_timeout_secs: 0,
            ..local()
        };
        let result = NoughtsServer::builder()
            .config(config)
            .build(Arc::new(MemoryStore::new()), TokenTable::new())
            .await;
        assert!(matches!(result, Err(NoughtsError::Config(_))));
    }

    #[tokio::test]
    async fn test_build_reconciles_store() {
        let store = Arc::new(MemoryStore::new());
        let game = store
            .insert_game(NewGame {
                player1_id: UserId(1),
                player1_name: "alice".into(),
                player2_id: UserId(2),
                player2_name: "bob".into(),
                status: GameStatus::Active,
                settings: GameSettings::default(),
                session_timeout: 60,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let server = NoughtsServer::builder()
            .config(local())
            .build(Arc::clone(&store), TokenTable::new())
            .await
            .unwrap();
        assert_ne!(server.local_addr().unwrap().port(), 0);
        assert_eq!(
            store.load_game(game.id).await.unwrap().status,
            GameStatus::Abandoned
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_purges_stale_challenges() {
        let store = Arc::new(MemoryStore::new());
        let config = ServerConfig {
            challenge_window_secs: 30,
            ..local()
        };
        let stale = store
            .insert_game(NewGame {
                player1_id: UserId(1),
                player1_name: "alice".into(),
                player2_id: UserId(2),
                player2_name: "bob".into(),
                status: GameStatus::Waiting,
                settings: GameSettings::default(),
                session_timeout: 60,
                created_at: Utc::now() - chrono::TimeDelta::seconds(60),
            })
            .await
            .unwrap();
        let dispatch = Dispatcher::new(
            ConnectionRegistry::new(),
            LobbyRegistry::new(config.lobby_window()),
        );
        let arena = Arena::new(Arc::clone(&store), dispatch, &config);

        let sweeper = Sweeper::spawn(arena, config.sweep_interval());
        tokio::time::sleep(config.sweep_interval() + Duration::from_secs(1)).await;
        assert!(store.load_game(stale.id).await.is_err());
        drop(sweeper);
    }
}
