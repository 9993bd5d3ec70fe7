//! In-process transport.
//!
//! [`link`] returns the client's ends ([`MemoryLink`]) and a [`MemoryPeer`]
//! that plays the server: it sees every envelope the client writes and can
//! inject envelopes into the client's inbound stream.

use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::PollSender;

use crate::core::envelope::Envelope;
use crate::error::{ProtocolError, Result};
use crate::transport::{InboundStream, Outbound};

/// Client side of an in-process link.
pub struct MemoryLink {
    pub outbound: Arc<Outbound>,
    pub inbound: InboundStream,
}

/// Server side of an in-process link.
pub struct MemoryPeer {
    to_client: mpsc::Sender<Envelope>,
    from_client: mpsc::Receiver<Envelope>,
}

/// Create a connected pair with `buffer` envelopes of capacity per direction.
pub fn link(buffer: usize) -> (MemoryLink, MemoryPeer) {
    let (client_tx, peer_rx) = mpsc::channel(buffer);
    let (peer_tx, client_rx) = mpsc::channel(buffer);

    let sink = PollSender::new(client_tx).sink_map_err(|_| ProtocolError::ConnectionClosed);
    let inbound = ReceiverStream::new(client_rx).map(Ok);

    (
        MemoryLink {
            outbound: Arc::new(Outbound::new(sink)),
            inbound: Box::pin(inbound),
        },
        MemoryPeer {
            to_client: peer_tx,
            from_client: peer_rx,
        },
    )
}

impl MemoryPeer {
    /// Deliver `envelope` to the client's inbound stream.
    pub async fn send(&self, envelope: Envelope) -> Result<()> {
        self.to_client
            .send(envelope)
            .await
            .map_err(|_| ProtocolError::ConnectionClosed)
    }

    /// Next envelope written by the client; `None` once the client side is gone.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.from_client.recv().await
    }

    /// Envelope already written by the client, without waiting.
    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.from_client.try_recv().ok()
    }
}
