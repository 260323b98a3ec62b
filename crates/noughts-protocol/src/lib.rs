//! Wire protocol for noughts.
//!
//! - **Messages** ([`ClientMessage`], [`ServerMessage`]): the `{type,
//!   payload}` envelope as one sum type per direction.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those messages are
//!   converted to and from bytes.
//! - **Errors** ([`ProtocolError`]).
//!
//! ```text
//! Transport (bytes) → Protocol (messages) → handshake / pump
//! ```

mod codec;
mod error;
mod messages;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use messages::{ClientMessage, ServerMessage};
