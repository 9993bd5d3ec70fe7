//! Tagged frames exchanged with the peer.
//!
//! On the wire an envelope is `<tag>,<payload>`. The tag correlates a request
//! with its response; the payload is either a structured-text control value or
//! a binary node frame.

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

use crate::error::{ProtocolError, Result};

const SEPARATOR: u8 = b',';

/// Tag of the keepalive frame.
pub const KEEPALIVE_TAG: &str = "?";

/// Correlation tag plus opaque payload.
#[derive(Clone, PartialEq, Eq)]
pub struct Envelope {
    pub tag: String,
    pub payload: Bytes,
}

impl Envelope {
    /// `tag` must not contain a comma; the first comma ends the tag on the wire.
    pub fn new(tag: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        let tag = tag.into();
        debug_assert!(!tag.contains(','), "envelope tag contains separator");
        Self {
            tag,
            payload: payload.into(),
        }
    }

    /// Build an envelope whose payload is a serialized JSON value.
    pub fn json(tag: impl Into<String>, value: &serde_json::Value) -> Result<Self> {
        Ok(Self::new(tag, serde_json::to_vec(value)?))
    }

    /// The one-byte keepalive, `?,,` on the wire.
    pub fn keepalive() -> Self {
        Self::new(KEEPALIVE_TAG, Bytes::from_static(b","))
    }

    pub fn is_keepalive(&self) -> bool {
        self.tag == KEEPALIVE_TAG && self.payload.as_ref() == b","
    }

    /// Split a raw frame at its first comma.
    pub fn parse(frame: Bytes) -> Result<Self> {
        let split = frame
            .iter()
            .position(|b| *b == SEPARATOR)
            .ok_or(ProtocolError::MalformedEnvelope)?;
        let tag = std::str::from_utf8(&frame[..split])
            .map_err(|_| ProtocolError::MalformedEnvelope)?
            .to_owned();
        let payload = frame.slice(split + 1..);
        Ok(Self { tag, payload })
    }

    /// Length of the wire form.
    pub fn wire_len(&self) -> usize {
        self.tag.len() + 1 + self.payload.len()
    }

    pub fn write_to(&self, dst: &mut BytesMut) {
        dst.reserve(self.wire_len());
        dst.put_slice(self.tag.as_bytes());
        dst.put_u8(SEPARATOR);
        dst.put_slice(&self.payload);
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(self.wire_len());
        self.write_to(&mut out);
        out.freeze()
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("tag", &self.tag)
            .field("len", &self.payload.len())
            .finish()
    }
}
