//! Integration tests for envelope framing over byte streams

#![allow(clippy::unwrap_used, clippy::expect_used)]

use bytes::{Bytes, BytesMut};
use chatwire::core::codec::EnvelopeCodec;
use chatwire::error::ProtocolError;
use chatwire::transport::framed;
use chatwire::Envelope;
use futures::{SinkExt, StreamExt};
use tokio_util::codec::{Decoder, Encoder, Framed};

#[test]
fn test_keepalive_frame_bytes() {
    let mut codec = EnvelopeCodec::default();
    let mut buf = BytesMut::new();
    codec.encode(Envelope::keepalive(), &mut buf).unwrap();
    assert_eq!(&buf[..], &[0, 0, 0, 3, b'?', b',', b',']);
}

#[test]
fn test_payload_commas_survive() {
    let mut codec = EnvelopeCodec::default();
    let mut buf = BytesMut::new();
    let env = Envelope::new("1540998012.--0", Bytes::from_static(b"[\"admin\",\"init\"]"));
    codec.encode(env.clone(), &mut buf).unwrap();
    assert_eq!(codec.decode(&mut buf).unwrap(), Some(env));
}

#[test]
fn test_back_to_back_frames() {
    let mut codec = EnvelopeCodec::default();
    let mut buf = BytesMut::new();
    for i in 0..3 {
        codec
            .encode(Envelope::new(format!("t{i}"), vec![i; 4]), &mut buf)
            .unwrap();
    }
    for i in 0..3 {
        let env = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(env.tag, format!("t{i}"));
    }
    assert!(codec.decode(&mut buf).unwrap().is_none());
}

#[test]
fn test_frame_without_separator() {
    let mut codec = EnvelopeCodec::default();
    let mut buf = BytesMut::from(&[0u8, 0, 0, 4, b'p', b'o', b'n', b'g'][..]);
    assert!(matches!(
        codec.decode(&mut buf),
        Err(ProtocolError::MalformedEnvelope)
    ));
}

#[test]
fn test_declared_length_over_limit() {
    let mut codec = EnvelopeCodec::new(1024);
    let mut buf = BytesMut::from(&[0u8, 0x10, 0, 0][..]);
    assert!(matches!(
        codec.decode(&mut buf),
        Err(ProtocolError::OversizedPacket(0x10_0000))
    ));
}

#[tokio::test]
async fn test_split_transport_over_duplex() {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let (outbound, mut inbound) = framed::split(client_io, 64 * 1024);
    let mut server = Framed::new(server_io, EnvelopeCodec::new(64 * 1024));

    let big = Envelope::new("big", vec![0xAB; 32 * 1024]);
    outbound.send(big.clone()).await.unwrap();
    assert_eq!(server.next().await.unwrap().unwrap(), big);

    server
        .send(Envelope::new("s", Bytes::from_static(b"{\"status\":200}")))
        .await
        .unwrap();
    let env = inbound.next().await.unwrap().unwrap();
    assert_eq!(env.tag, "s");

    drop(server);
    assert!(inbound.next().await.is_none());
}
