//! # Session State
//!
//! Connection state, the credentials negotiated with the peer, and the
//! collaborator traits that consume them.
//!
//! Only the connection state machine mutates [`SessionState`]. The crypto and
//! storage collaborators receive it by shared reference.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;

use crate::error::{constants, ProtocolError, Result};

/// Position of a connection in the login sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ConnectionState {
    /// Waiting for `Conn` with fresh credentials.
    #[default]
    Authenticating,
    /// A restore login was sent; waiting for the peer's challenge.
    ChallengeExpected,
    /// Challenge solution sent; waiting for its correlated response.
    ChallengeSent,
    Authenticated,
}

/// Credentials and identifiers for one session.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub client_id: String,
    #[serde(rename = "ref", default)]
    pub connection_ref: Option<String>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub server_token: Option<String>,
    #[serde(default)]
    pub client_token: Option<String>,
    #[serde(default)]
    pub browser_token: Option<String>,
    /// Shared secret produced by [`CryptoProvider::derive_secret`].
    #[serde(default)]
    pub derived_secret: Option<Vec<u8>>,
    /// Public half of the local key pair.
    #[serde(default)]
    pub local_key: Option<Vec<u8>>,
    /// The peer's public key recovered from the `Conn` secret.
    #[serde(default)]
    pub peer_key: Option<Vec<u8>>,
    /// Unix second at or after which the next keepalive may go out.
    #[serde(default)]
    pub next_keepalive: u64,
}

impl SessionState {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            ..Self::default()
        }
    }

    /// Client and server tokens, if both are known.
    pub fn resume_tokens(&self) -> Option<(&str, &str)> {
        match (&self.client_token, &self.server_token) {
            (Some(client), Some(server)) => Some((client.as_str(), server.as_str())),
            _ => None,
        }
    }
}

fn redacted(value: &Option<String>) -> Option<usize> {
    value.as_ref().map(String::len)
}

fn redacted_bytes(value: &Option<Vec<u8>>) -> Option<usize> {
    value.as_ref().map(Vec::len)
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionState")
            .field("client_id", &self.client_id)
            .field("ref_len", &redacted(&self.connection_ref))
            .field("secret_len", &redacted(&self.secret))
            .field("server_token_len", &redacted(&self.server_token))
            .field("client_token_len", &redacted(&self.client_token))
            .field("browser_token_len", &redacted(&self.browser_token))
            .field("derived_secret_len", &redacted_bytes(&self.derived_secret))
            .field("local_key_len", &redacted_bytes(&self.local_key))
            .field("peer_key_len", &redacted_bytes(&self.peer_key))
            .field("next_keepalive", &self.next_keepalive)
            .finish()
    }
}

/// Key material recovered from the `secret` of a `Conn` frame.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct DerivedKeys {
    pub shared_secret: Vec<u8>,
    /// The peer's public key, when the secret carries one.
    pub peer_key: Option<Vec<u8>>,
}

impl fmt::Debug for DerivedKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedKeys")
            .field("shared_secret_len", &self.shared_secret.len())
            .field("peer_key_len", &redacted_bytes(&self.peer_key))
            .finish()
    }
}

/// Cryptographic operations the login sequence depends on.
pub trait CryptoProvider: Send + Sync {
    /// Turn the `secret` field of a `Conn` frame into working key material.
    fn derive_secret(&self, secret: &[u8]) -> Result<DerivedKeys>;

    /// Public half of the local key pair, if the provider holds one.
    fn local_key(&self) -> Option<Vec<u8>> {
        None
    }

    /// Compute the reply to a server challenge.
    fn solve_challenge(&self, challenge: &str, session: &SessionState) -> Result<String>;
}

/// Persistence for established sessions.
pub trait SessionStore: Send + Sync {
    fn persist_session(&self, session: &SessionState) -> Result<()>;
}

/// Keeps every persisted snapshot in memory.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    saved: Mutex<Vec<SessionState>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times a session was persisted.
    pub fn save_count(&self) -> usize {
        self.saved.lock().map(|saved| saved.len()).unwrap_or(0)
    }

    /// Most recently persisted session.
    pub fn latest(&self) -> Option<SessionState> {
        self.saved
            .lock()
            .ok()
            .and_then(|saved| saved.last().cloned())
    }
}

impl SessionStore for MemorySessionStore {
    fn persist_session(&self, session: &SessionState) -> Result<()> {
        let mut saved = self
            .saved
            .lock()
            .map_err(|_| ProtocolError::Custom(constants::ERR_LOCK_POISONED.into()))?;
        saved.push(session.clone());
        Ok(())
    }
}
