//! In-memory connection double for exercising the handshake and the pump
//! without sockets.

use noughts_protocol::ServerMessage;
use noughts_transport::{Connection, ConnectionId, Frame, TransportError};
use tokio::sync::mpsc;

/// What the server did to a [`MockConnection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Sent {
    Data(Vec<u8>),
    Ping,
    Close,
}

pub(crate) struct MockConnection {
    id: ConnectionId,
    inbound: mpsc::UnboundedReceiver<Frame>,
    outbound: mpsc::UnboundedSender<Sent>,
}

/// The client side of a [`MockConnection`]. Dropping `tx` closes the
/// connection from the client.
pub(crate) struct MockPeer {
    pub tx: mpsc::UnboundedSender<Frame>,
    pub rx: mpsc::UnboundedReceiver<Sent>,
}

pub(crate) fn mock_pair() -> (MockConnection, MockPeer) {
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let conn = MockConnection {
        id: ConnectionId::next(),
        inbound: in_rx,
        outbound: out_tx,
    };
    (conn, MockPeer { tx: in_tx, rx: out_rx })
}

impl MockPeer {
    pub fn send_text(&self, raw: &str) {
        self.tx.send(Frame::Data(raw.as_bytes().to_vec())).unwrap();
    }

    /// Next data frame decoded as a server message, skipping pings.
    /// `None` once the server closed or dropped the connection.
    pub async fn next_message(&mut self) -> Option<ServerMessage> {
        loop {
            match self.rx.recv().await? {
                Sent::Data(data) => return Some(serde_json::from_slice(&data).unwrap()),
                Sent::Ping => continue,
                Sent::Close => return None,
            }
        }
    }
}

impl Connection for MockConnection {
    async fn send(&mut self, data: Vec<u8>) -> Result<(), TransportError> {
        self.outbound
            .send(Sent::Data(data))
            .map_err(|_| TransportError::ConnectionClosed("peer dropped".into()))
    }

    async fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
        Ok(self.inbound.recv().await)
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        self.outbound
            .send(Sent::Ping)
            .map_err(|_| TransportError::ConnectionClosed("peer dropped".into()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let _ = self.outbound.send(Sent::Close);
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
