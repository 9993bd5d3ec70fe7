//! # chatwire
//!
//! Client side of a tagged, multiplexed chat wire protocol.
//!
//! Frames travel as `<tag>,<payload>` envelopes. A payload is either a JSON
//! control value (login, challenge, admin responses) or a binary node tree
//! compressed with a shared token table. The crate provides:
//!
//! - [`core`]: the binary node codec, envelopes and their stream codec
//! - [`protocol`]: the login state machine, request dispatcher and driver loop
//! - [`transport`]: the serialized outbound path plus in-memory and byte-stream
//!   transports
//! - [`config`], [`error`], [`utils`]: configuration, errors, logging and metrics
//!
//! ```rust
//! use chatwire::core::{decode, encode, Content, Node};
//!
//! let node = Node::new("message")
//!     .with_attr("to", "abc@c.us")
//!     .with_content(Content::Integer(1540998012));
//! let bytes = encode(&node).unwrap();
//! assert_eq!(decode(&bytes).unwrap(), Some(node));
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod utils;

pub use crate::config::Config;
pub use crate::core::envelope::Envelope;
pub use crate::core::node::{Content, Node};
pub use crate::error::{ProtocolError, Result};
pub use crate::protocol::client::Client;
pub use crate::protocol::connection::{Connection, Inbound};
pub use crate::protocol::dispatcher::Dispatcher;
pub use crate::protocol::session::{
    ConnectionState, CryptoProvider, DerivedKeys, MemorySessionStore, SessionState, SessionStore,
};
