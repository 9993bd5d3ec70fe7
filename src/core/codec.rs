//! Tokio codec carrying envelopes over a byte stream.
//!
//! ```text
//! [Length(4, big-endian)] [tag "," payload (Length bytes)]
//! ```
//!
//! The length is checked against the configured maximum before any buffer
//! space is reserved.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::config::MAX_FRAME_SIZE;
use crate::core::envelope::Envelope;
use crate::error::{ProtocolError, Result};

const LENGTH_PREFIX: usize = 4;

/// Length-prefixed envelope framing.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeCodec {
    max_frame: usize,
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self::new(MAX_FRAME_SIZE)
    }
}

impl EnvelopeCodec {
    pub fn new(max_frame: usize) -> Self {
        Self { max_frame }
    }
}

impl Decoder for EnvelopeCodec {
    type Item = Envelope;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Envelope>> {
        if src.len() < LENGTH_PREFIX {
            return Ok(None);
        }

        let len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if len > self.max_frame {
            return Err(ProtocolError::OversizedPacket(len));
        }

        if src.len() < LENGTH_PREFIX + len {
            src.reserve(LENGTH_PREFIX + len - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX);
        let frame = src.split_to(len).freeze();
        trace!(bytes = len, "Envelope frame decoded");
        Envelope::parse(frame).map(Some)
    }
}

impl Encoder<Envelope> for EnvelopeCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Envelope, dst: &mut BytesMut) -> Result<()> {
        let len = item.wire_len();
        if len > self.max_frame {
            return Err(ProtocolError::OversizedPacket(len));
        }
        dst.reserve(LENGTH_PREFIX + len);
        dst.put_u32(len as u32);
        item.write_to(dst);
        Ok(())
    }
}
