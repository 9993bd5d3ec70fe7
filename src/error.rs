//! # Error Types
//!
//! Error handling for the wire protocol.
//!
//! This module defines every error that can surface while decoding frames,
//! driving the session state machine or waiting on correlated requests.
//!
//! ## Error Categories
//! - **Frame Errors**: `Truncated`, `InvalidTag`, `NotImplemented`, `InvalidUtf8`,
//!   `NestingTooDeep`, `OversizedPacket`, `MalformedEnvelope`. Fatal for the
//!   frame being decoded; the connection decides whether to drop or close.
//! - **Session Errors**: `ProtocolViolation` (logged, event dropped, connection
//!   stays open) and `ChallengeFailed` (connection must be re-established).
//! - **Encode Errors**: `Unrepresentable`, for text content with no textual
//!   wire form.
//! - **Dispatcher Errors**: `TimedOut`; the caller owns the retry policy.
//! - **Ambient Errors**: I/O, JSON, transport, configuration.
//!
//! ## Example Usage
//! ```rust
//! use chatwire::core::decoder::decode;
//! use chatwire::error::ProtocolError;
//!
//! match decode(&[248, 0x02]) {
//!     Err(ProtocolError::Truncated { .. }) => {}
//!     other => panic!("unexpected: {other:?}"),
//! }
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Synchronisation errors
    pub const ERR_LOCK_POISONED: &str = "Synchronization primitive poisoned";

    /// Control frame errors
    pub const ERR_NOT_AN_ACTION: &str = "Control frame does not start with an action name";
    pub const ERR_PAYLOAD_NOT_OBJECT: &str = "Control payload is not an object";
    pub const ERR_MISSING_REF: &str = "Conn frame without ref";
    pub const ERR_MISSING_SERVER_TOKEN: &str = "Conn frame without serverToken";
    pub const ERR_MISSING_CLIENT_TOKEN: &str = "Conn frame without clientToken";
    pub const ERR_MISSING_BROWSER_TOKEN: &str = "Conn frame without browserToken";
    pub const ERR_MISSING_STATUS: &str = "Response without numeric status";
    pub const ERR_MISSING_TYPE: &str = "Cmd frame without type";

    /// Session errors
    pub const ERR_NO_STORED_TOKENS: &str = "No stored client/server tokens to restore";

    /// Dispatcher errors
    pub const ERR_RESPONDER_DROPPED: &str = "Pending request dropped before a response arrived";
}

/// ProtocolError is the primary error type for all protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Frame truncated: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("Invalid tag: {0}")]
    InvalidTag(u8),

    #[error("Dictionary tag {0} is not implemented")]
    NotImplemented(u8),

    #[error("String field is not valid UTF-8")]
    InvalidUtf8,

    #[error("Node nesting exceeds {0} levels")]
    NestingTooDeep(usize),

    #[error("Packet too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Unrepresentable content: {0}")]
    Unrepresentable(String),

    #[error("Malformed envelope: missing tag separator")]
    MalformedEnvelope,

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Challenge failed with status {0}")]
    ChallengeFailed(i64),

    #[error("Request timed out")]
    TimedOut,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl ProtocolError {
    /// Whether the error ends the connection rather than a single event.
    ///
    /// Frame decode errors are not fatal here: the frame is dropped and the
    /// connection keeps reading.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProtocolError::ChallengeFailed(_)
                | ProtocolError::ConnectionClosed
                | ProtocolError::TransportError(_)
                | ProtocolError::Io(_)
        )
    }

    /// Whether the error came from decoding a single frame or envelope.
    pub fn is_frame_error(&self) -> bool {
        matches!(
            self,
            ProtocolError::Truncated { .. }
                | ProtocolError::InvalidTag(_)
                | ProtocolError::NotImplemented(_)
                | ProtocolError::InvalidUtf8
                | ProtocolError::NestingTooDeep(_)
                | ProtocolError::OversizedPacket(_)
                | ProtocolError::MalformedEnvelope
        )
    }

    pub(crate) fn violation(msg: &str) -> Self {
        ProtocolError::ProtocolViolation(msg.to_string())
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatality_split() {
        assert!(ProtocolError::ChallengeFailed(409).is_fatal());
        assert!(ProtocolError::ConnectionClosed.is_fatal());
        assert!(!ProtocolError::violation("x").is_fatal());
        assert!(!ProtocolError::TimedOut.is_fatal());
        assert!(!ProtocolError::InvalidTag(7).is_fatal());
        assert!(ProtocolError::InvalidTag(7).is_frame_error());
        assert!(!ProtocolError::TimedOut.is_frame_error());
    }

    #[test]
    fn test_display() {
        let err = ProtocolError::Truncated {
            needed: 4,
            remaining: 1,
        };
        assert_eq!(
            err.to_string(),
            "Frame truncated: needed 4 bytes, 1 remaining"
        );
        assert_eq!(
            ProtocolError::ChallengeFailed(409).to_string(),
            "Challenge failed with status 409"
        );
    }
}
