//! Integration tests for the login state machine, keepalives and the client
//! driver loop over an in-memory link

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use bytes::Bytes;
use chatwire::config::ClientConfig;
use chatwire::core::encode;
use chatwire::error::{ProtocolError, Result};
use chatwire::transport::memory::{self, MemoryPeer};
use chatwire::{
    Client, Connection, ConnectionState, CryptoProvider, DerivedKeys, Dispatcher, Envelope,
    MemorySessionStore, Node, SessionState,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

struct StubCrypto;

impl CryptoProvider for StubCrypto {
    fn derive_secret(&self, secret: &[u8]) -> Result<DerivedKeys> {
        Ok(DerivedKeys {
            shared_secret: secret.to_vec(),
            peer_key: None,
        })
    }

    fn solve_challenge(&self, challenge: &str, _session: &SessionState) -> Result<String> {
        Ok(challenge.chars().rev().collect())
    }
}

fn config() -> ClientConfig {
    ClientConfig {
        client_id: "cid".into(),
        keepalive_tick: Duration::from_millis(10),
        response_timeout: Duration::from_secs(5),
        ..ClientConfig::default()
    }
}

fn control(tag: &str, value: Value) -> Envelope {
    Envelope::json(tag, &value).unwrap()
}

fn conn_frame() -> Envelope {
    control(
        "s1",
        json!(["Conn", {
            "secret": "c2VjcmV0",
            "ref": "1@ref",
            "serverToken": "st",
            "clientToken": "ct",
            "browserToken": "bt",
        }]),
    )
}

fn stored_session() -> SessionState {
    SessionState {
        client_token: Some("ct".into()),
        server_token: Some("st".into()),
        ..SessionState::new("cid")
    }
}

async fn next_from_client(peer: &mut MemoryPeer) -> Envelope {
    timeout(Duration::from_secs(5), peer.recv())
        .await
        .expect("client wrote nothing")
        .expect("client side closed")
}

async fn wait_for_state(conn: &Connection, state: ConnectionState) {
    timeout(Duration::from_secs(5), async {
        while conn.state() != state {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("state not reached");
}

#[tokio::test]
async fn test_heartbeat_intervals_over_many_rounds() {
    let (link, mut peer) = memory::link(4);
    let dispatcher = Arc::new(Dispatcher::new(link.outbound, None));
    let store = Arc::new(MemorySessionStore::new());
    let conn = Connection::new(&config(), dispatcher, Arc::new(StubCrypto), store.clone());

    // never while unauthenticated
    for now in [0u64, 100, 10_000] {
        assert!(!conn.keepalive(now).await.unwrap());
    }
    assert!(peer.try_recv().is_none());

    conn.receive(&conn_frame()).unwrap();
    assert_eq!(store.save_count(), 1);

    let mut now = 1_540_998_012u64;
    for _ in 0..1000 {
        assert!(conn.keepalive(now).await.unwrap());
        assert!(peer.recv().await.unwrap().is_keepalive());
        let next = conn.next_keepalive_at();
        let interval = next - now;
        assert!((20..90).contains(&interval), "interval {interval}");
        assert!(!conn.keepalive(next - 1).await.unwrap());
        now = next;
    }
}

#[tokio::test]
async fn test_client_authenticates_and_forwards_nodes() {
    let (link, mut peer) = memory::link(16);
    let store = Arc::new(MemorySessionStore::new());
    let client = Arc::new(Client::new(
        config(),
        link.outbound,
        Arc::new(StubCrypto),
        store.clone(),
    ));
    let (node_tx, mut node_rx) = mpsc::channel(8);

    let runner = {
        let client = client.clone();
        tokio::spawn(async move { client.run(link.inbound, node_tx).await })
    };

    peer.send(conn_frame()).await.unwrap();
    wait_for_state(client.connection(), ConnectionState::Authenticated).await;
    assert_eq!(store.save_count(), 1);
    assert!(next_from_client(&mut peer).await.is_keepalive());

    // malformed control is dropped, the loop keeps going
    peer.send(control("bad", json!([1, 2]))).await.unwrap();
    peer.send(Envelope::new("junk", Bytes::from_static(&[248, 9])))
        .await
        .unwrap();

    let node = Node::new("message").with_attr("from", "abc@c.us");
    peer.send(Envelope::new("n1", encode(&node).unwrap().freeze()))
        .await
        .unwrap();
    let got = timeout(Duration::from_secs(5), node_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(got, node);

    drop(peer);
    let result = timeout(Duration::from_secs(5), runner).await.unwrap().unwrap();
    assert!(matches!(result, Err(ProtocolError::ConnectionClosed)));
}

#[tokio::test]
async fn test_client_restores_through_challenge() {
    let (link, mut peer) = memory::link(16);
    let client = Arc::new(Client::with_session(
        config(),
        link.outbound,
        Arc::new(StubCrypto),
        Arc::new(MemorySessionStore::new()),
        stored_session(),
    ));
    let (node_tx, _node_rx) = mpsc::channel(8);
    let runner = {
        let client = client.clone();
        tokio::spawn(async move { client.run(link.inbound, node_tx).await })
    };

    client.connection().restore().await.unwrap();
    let login = next_from_client(&mut peer).await;
    assert_eq!(
        serde_json::from_slice::<Value>(&login.payload).unwrap(),
        json!(["admin", "login", "ct", "st", "cid", "takeover"])
    );

    // the login reply is unsolicited and ignored
    peer.send(control(&login.tag, json!({"status": 200})))
        .await
        .unwrap();
    peer.send(control(
        "s2",
        json!(["Cmd", {"type": "challenge", "challenge": "abc"}]),
    ))
    .await
    .unwrap();

    let reply = next_from_client(&mut peer).await;
    assert_eq!(
        serde_json::from_slice::<Value>(&reply.payload).unwrap(),
        json!(["admin", "challenge", "cba", "st", "cid"])
    );
    assert_eq!(client.connection().state(), ConnectionState::ChallengeSent);

    peer.send(control(&reply.tag, json!({"status": 200})))
        .await
        .unwrap();
    wait_for_state(client.connection(), ConnectionState::Authenticated).await;

    runner.abort();
}

#[tokio::test]
async fn test_client_stops_on_rejected_challenge() {
    let (link, mut peer) = memory::link(16);
    let client = Arc::new(Client::with_session(
        config(),
        link.outbound,
        Arc::new(StubCrypto),
        Arc::new(MemorySessionStore::new()),
        stored_session(),
    ));
    let (node_tx, _node_rx) = mpsc::channel(8);
    let runner = {
        let client = client.clone();
        tokio::spawn(async move { client.run(link.inbound, node_tx).await })
    };

    client.connection().restore().await.unwrap();
    next_from_client(&mut peer).await;
    peer.send(control(
        "s2",
        json!(["Cmd", {"type": "challenge", "challenge": "abc"}]),
    ))
    .await
    .unwrap();
    let reply = next_from_client(&mut peer).await;
    peer.send(control(&reply.tag, json!({"status": 409})))
        .await
        .unwrap();

    let result = timeout(Duration::from_secs(5), runner).await.unwrap().unwrap();
    assert!(matches!(result, Err(ProtocolError::ChallengeFailed(409))));
    assert_eq!(client.connection().state(), ConnectionState::ChallengeSent);
}
