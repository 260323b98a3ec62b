//! Identity and live connection state for noughts.
//!
//! - **Identity** ([`IdentityGateway`], [`Identity`], [`TokenTable`]):
//!   turns a bearer token into a verified user.
//! - **Connection registry** ([`ConnectionRegistry`]): at most one game
//!   channel per (game, user), with broadcast to a game's channels.
//! - **Lobby registry** ([`LobbyRegistry`]): at most one self-expiring
//!   lobby channel per user, with targeted best-effort notifications.
//!
//! Neither registry is persisted. Both start empty on every process start.

mod auth;
mod error;
mod lobby;
mod registry;

pub use auth::{Identity, IdentityGateway, TokenTable};
pub use error::SessionError;
pub use lobby::{ExpiryTimer, LobbyRegistration, LobbyRegistry};
pub use registry::{
    ConnectionRegistry, Outbound, OutboundReceiver, OutboundSender, Registration,
    outbound_channel,
};
