/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding or accepting connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The WebSocket upgrade handshake failed.
    #[error("upgrade failed: {0}")]
    UpgradeFailed(String),

    /// The client did not send a usable HTTP request line in time.
    #[error("upgrade request timed out")]
    RequestTimeout,

    /// The HTTP request line could not be parsed.
    #[error("malformed upgrade request: {0}")]
    MalformedRequest(String),
}
