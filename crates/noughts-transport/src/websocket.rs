//! WebSocket transport implementation using `tokio-tungstenite`.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request, Response,
};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::{self, Message};

use crate::{
    Connection, ConnectionId, Frame, Rejection, TransportError, UpgradeRequest,
};

type WsStream = tokio_tungstenite::WebSocketStream<ReplayStream>;

/// Upper bound on the request line we are willing to buffer.
const MAX_REQUEST_LINE: usize = 4096;

/// Listens for TCP connections that are expected to upgrade to WebSocket.
pub struct WebSocketListener {
    listener: TcpListener,
}

impl WebSocketListener {
    /// Binds a new listener to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "WebSocket listener bound");
        Ok(Self { listener })
    }

    /// Returns the local address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Waits for the next TCP connection. The upgrade is not performed yet.
    pub async fn accept(&self) -> Result<PendingUpgrade, TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;
        let id = ConnectionId::next();
        tracing::debug!(%id, %addr, "accepted TCP connection");
        Ok(PendingUpgrade {
            id,
            addr,
            stream: ReplayStream::new(stream),
        })
    }
}

/// An accepted TCP connection whose WebSocket upgrade is still undecided.
pub struct PendingUpgrade {
    id: ConnectionId,
    addr: SocketAddr,
    stream: ReplayStream,
}

/// A TCP stream that first yields the bytes already read off it.
pub(crate) struct ReplayStream {
    inner: TcpStream,
    head: Vec<u8>,
    pos: usize,
}

impl ReplayStream {
    fn new(inner: TcpStream) -> Self {
        Self {
            inner,
            head: Vec::new(),
            pos: 0,
        }
    }
}

impl AsyncRead for ReplayStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.pos < this.head.len() {
            let n = buf.remaining().min(this.head.len() - this.pos);
            buf.put_slice(&this.head[this.pos..this.pos + n]);
            this.pos += n;
            if this.pos == this.head.len() {
                this.head = Vec::new();
                this.pos = 0;
            }
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for ReplayStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

impl PendingUpgrade {
    /// The identifier the upgraded connection will carry.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The remote address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Reads the HTTP request line. The bytes are kept and replayed, so
    /// the upgrade handshake still sees the full request afterwards.
    pub async fn read_request(
        &mut self,
        limit: Duration,
    ) -> Result<UpgradeRequest, TransportError> {
        let line = tokio::time::timeout(limit, self.read_request_line())
            .await
            .map_err(|_| TransportError::RequestTimeout)??;
        UpgradeRequest::parse_request_line(&line)
    }

    async fn read_request_line(&mut self) -> Result<String, TransportError> {
        let mut chunk = [0u8; 512];
        loop {
            if let Some(end) = self.stream.head.windows(2).position(|w| w == b"\r\n") {
                return Ok(String::from_utf8_lossy(&self.stream.head[..end]).into_owned());
            }
            if self.stream.head.len() >= MAX_REQUEST_LINE {
                return Err(TransportError::MalformedRequest(
                    "request line too long".into(),
                ));
            }
            let n = self
                .stream
                .inner
                .read(&mut chunk)
                .await
                .map_err(TransportError::ReceiveFailed)?;
            if n == 0 {
                return Err(TransportError::ConnectionClosed(
                    "closed before request line".into(),
                ));
            }
            self.stream.head.extend_from_slice(&chunk[..n]);
        }
    }

    /// Completes the WebSocket handshake.
    pub async fn accept(self) -> Result<WebSocketConnection, TransportError> {
        let ws = tokio_tungstenite::accept_async(self.stream)
            .await
            .map_err(|e| TransportError::UpgradeFailed(e.to_string()))?;
        tracing::debug!(id = %self.id, addr = %self.addr, "upgraded to WebSocket");
        Ok(WebSocketConnection { id: self.id, ws })
    }

    /// Answers the upgrade request with an HTTP error instead of upgrading.
    pub async fn reject(self, rejection: Rejection) -> Result<(), TransportError> {
        let mut response = ErrorResponse::new(Some(rejection.reason.clone()));
        *response.status_mut() = StatusCode::from_u16(rejection.status)
            .unwrap_or(StatusCode::BAD_REQUEST);

        let callback = move |_req: &Request,
                             _resp: Response|
              -> Result<Response, ErrorResponse> { Err(response) };

        match tokio_tungstenite::accept_hdr_async(self.stream, callback).await {
            // The handshake reports the error response it just wrote.
            Err(tungstenite::Error::Http(_)) => {
                tracing::debug!(
                    id = %self.id,
                    status = rejection.status,
                    reason = %rejection.reason,
                    "upgrade rejected"
                );
                Ok(())
            }
            Err(e) => Err(TransportError::UpgradeFailed(e.to_string())),
            Ok(_) => Err(TransportError::UpgradeFailed(
                "rejected upgrade completed".into(),
            )),
        }
    }
}

/// A single upgraded WebSocket connection.
pub struct WebSocketConnection {
    id: ConnectionId,
    ws: WsStream,
}

impl Connection for WebSocketConnection {
    async fn send(&mut self, data: Vec<u8>) -> Result<(), TransportError> {
        let msg = match String::from_utf8(data) {
            Ok(text) => Message::Text(text.into()),
            Err(e) => Message::Binary(e.into_bytes().into()),
        };
        self.ws.send(msg).await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    async fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
        match self.ws.next().await {
            Some(Ok(Message::Text(text))) => {
                Ok(Some(Frame::Data(text.as_bytes().to_vec())))
            }
            Some(Ok(Message::Binary(data))) => Ok(Some(Frame::Data(data.to_vec()))),
            // Pings are answered by tungstenite itself; both directions
            // still count as liveness.
            Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {
                Ok(Some(Frame::Heartbeat))
            }
            Some(Ok(Message::Close(_))) | None => Ok(None),
            Some(Err(e)) => Err(TransportError::ReceiveFailed(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                e,
            ))),
        }
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        self.ws
            .send(Message::Ping(Vec::new().into()))
            .await
            .map_err(|e| {
                TransportError::SendFailed(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    e,
                ))
            })
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.ws.close(None).await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
