//! Byte-stream transport.
//!
//! Wraps any `AsyncRead + AsyncWrite` (TCP, a TLS stream, a duplex pipe) in
//! [`EnvelopeCodec`] and splits it into the shared outbound handle and the
//! inbound stream.

use futures::StreamExt;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::Framed;
use tracing::{info, instrument};

use crate::config::ClientConfig;
use crate::core::codec::EnvelopeCodec;
use crate::error::{ProtocolError, Result};
use crate::transport::{InboundStream, Outbound};

/// Split `io` into the outbound handle and inbound envelope stream.
pub fn split<S>(io: S, max_frame_size: usize) -> (Arc<Outbound>, InboundStream)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let framed = Framed::new(io, EnvelopeCodec::new(max_frame_size));
    let (sink, stream) = framed.split();
    (Arc::new(Outbound::new(sink)), Box::pin(stream))
}

/// Open a TCP connection framed with the configured size limit.
#[instrument(skip(addr, config))]
pub async fn connect<A>(addr: A, config: &ClientConfig) -> Result<(Arc<Outbound>, InboundStream)>
where
    A: ToSocketAddrs,
{
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|e| ProtocolError::TransportError(format!("connect failed: {e}")))?;
    stream.set_nodelay(true)?;
    info!(peer = ?stream.peer_addr().ok(), "Connected");
    Ok(split(stream, config.max_frame_size))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::core::envelope::Envelope;
    use bytes::Bytes;
    use futures::SinkExt;

    #[tokio::test]
    async fn test_duplex_carries_envelopes() {
        let (client_io, server_io) = tokio::io::duplex(1024);
        let (outbound, mut inbound) = split(client_io, 4096);
        let mut server = Framed::new(server_io, EnvelopeCodec::new(4096));

        outbound.send(Envelope::keepalive()).await.unwrap();
        let got = server.next().await.unwrap().unwrap();
        assert!(got.is_keepalive());

        server
            .send(Envelope::new("s1", Bytes::from_static(b"[\"Conn\",{}]")))
            .await
            .unwrap();
        let env = inbound.next().await.unwrap().unwrap();
        assert_eq!(env.tag, "s1");
    }

    #[tokio::test]
    async fn test_connect_over_tcp() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut framed = Framed::new(socket, EnvelopeCodec::new(4096));
            framed.next().await.unwrap().unwrap()
        });

        let (outbound, _inbound) = connect(addr, &ClientConfig::default()).await.unwrap();
        outbound.send(Envelope::keepalive()).await.unwrap();
        assert!(server.await.unwrap().is_keepalive());
    }

    #[tokio::test]
    async fn test_refused_connect_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = connect(addr, &ClientConfig::default()).await.err().unwrap();
        assert!(matches!(err, ProtocolError::TransportError(_)));
        assert!(err.is_fatal());
    }
}
