//! # Noughts
//!
//! Real-time session server for two-player noughts and crosses.
//!
//! Players challenge each other from a lobby, then each opens a game
//! channel. A channel becomes live only after a ping/pong/ack/ready
//! handshake, so nothing is pushed to a client before it can render.
//! Every accepted move is broadcast to both players' channels; the lobby
//! channel carries best-effort challenge notifications.
//!
//! The request/response surface (create a challenge, make a move, ask for
//! a rematch) is the [`Arena`]. The WebSocket side is [`NoughtsServer`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use noughts::prelude::*;
//!
//! # async fn run() -> Result<(), NoughtsError> {
//! let server = NoughtsServer::builder()
//!     .bind("0.0.0.0:30041")
//!     .build(Arc::new(MemoryStore::new()), TokenTable::new())
//!     .await?;
//! server.run().await
//! # }
//! ```

mod admission;
mod arena;
mod channel;
mod config;
mod dispatch;
mod error;
mod handler;
mod handshake;
mod pump;
mod server;
#[cfg(test)]
mod testing;

pub use arena::{Arena, MoveReport, SweepReport};
pub use config::{ConfigError, MAX_PERIOD_SECS, ServerConfig, UserEntry};
pub use dispatch::Dispatcher;
pub use error::NoughtsError;
pub use handshake::{HandshakeError, handshake};
pub use server::{NoughtsServer, NoughtsServerBuilder};

/// Everything needed to embed the server.
pub mod prelude {
    pub use crate::{
        Arena, ConfigError, Dispatcher, HandshakeError, MoveReport, NoughtsError, NoughtsServer,
        NoughtsServerBuilder, ServerConfig, SweepReport, UserEntry,
    };
    pub use noughts_match::{
        FirstTo, Game, GameId, GameMode, GameSettings, GameStatus, RematchId, RematchRequest,
        RematchStatus, Seat, UserId,
    };
    pub use noughts_protocol::{ClientMessage, Codec, JsonCodec, ServerMessage};
    pub use noughts_session::{Identity, IdentityGateway, TokenTable};
    pub use noughts_store::{MemoryStore, OnlineUser, PlayerStats, SessionStore, StoreError};
}
