//! Binary node encoder, the structural inverse of the decoder.
//!
//! Strings take the most compact form available: token, JID pair, decimal
//! packing, hex packing, and finally a length-prefixed blob. List sizes and
//! blob lengths use the shortest discriminant that fits.
//!
//! Text content has no blob fallback, since a blob decodes as binary content.
//! Encoding such a node fails with `Unrepresentable`.

use bytes::{BufMut, BytesMut};

use crate::core::decoder::canonical_integer;
use crate::core::node::{Content, Node};
use crate::core::packed::Alphabet;
use crate::core::tags;
use crate::core::token::{TokenTable, STANDARD};
use crate::error::{ProtocolError, Result};

/// Encode `node` with the standard token table.
pub fn encode(node: &Node) -> Result<BytesMut> {
    let mut enc = Encoder::new();
    enc.write_node(node)?;
    Ok(enc.into_inner())
}

/// Growable output buffer plus the token table used for compression.
pub struct Encoder<'t> {
    out: BytesMut,
    table: &'t TokenTable,
}

impl Default for Encoder<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder<'static> {
    pub fn new() -> Self {
        Self::with_table(&STANDARD)
    }
}

impl<'t> Encoder<'t> {
    pub fn with_table(table: &'t TokenTable) -> Self {
        Self {
            out: BytesMut::with_capacity(64),
            table,
        }
    }

    pub fn into_inner(self) -> BytesMut {
        self.out
    }

    /// Append the stream-end sentinel as a node of its own.
    pub fn write_stream_end(&mut self) {
        self.out.put_slice(&[tags::LIST_8, 1, tags::STREAM_END]);
    }

    pub fn write_node(&mut self, node: &Node) -> Result<()> {
        self.write_list_size(node.declared_count())?;
        self.write_string(&node.tag)?;
        for (key, value) in &node.attrs {
            self.write_string(key)?;
            self.write_string(value)?;
        }
        self.write_content(&node.content)
    }

    fn write_list_size(&mut self, size: usize) -> Result<()> {
        match size {
            0 => self.out.put_u8(tags::LIST_EMPTY),
            1..=0xFF => {
                self.out.put_u8(tags::LIST_8);
                self.out.put_u8(size as u8);
            }
            0x100..=0xFFFF => {
                self.out.put_u8(tags::LIST_16);
                self.out.put_u16(size as u16);
            }
            _ => return Err(ProtocolError::OversizedPacket(size)),
        }
        Ok(())
    }

    fn write_blob(&mut self, raw: &[u8]) -> Result<()> {
        let len = raw.len();
        if len <= 0xFF {
            self.out.put_u8(tags::BINARY_8);
            self.out.put_u8(len as u8);
        } else if len <= tags::BINARY_20_MASK as usize {
            self.out.put_u8(tags::BINARY_20);
            self.out.put_uint(len as u64, 3);
        } else if let Ok(len) = u32::try_from(len) {
            self.out.put_u8(tags::BINARY_32);
            self.out.put_u32(len);
        } else {
            return Err(ProtocolError::OversizedPacket(len));
        }
        self.out.put_slice(raw);
        Ok(())
    }

    fn write_packed(&mut self, alphabet: Alphabet, text: &str) -> bool {
        match alphabet.pack(text) {
            Some(packed) => {
                self.out.put_u8(alphabet.tag());
                self.out.put_slice(&packed);
                true
            }
            None => false,
        }
    }

    /// Any form except a JID pair.
    fn write_plain_string(&mut self, text: &str) -> Result<()> {
        if let Some(code) = self.table.code_of(text) {
            self.out.put_u8(code);
            return Ok(());
        }
        if self.write_packed(Alphabet::Decimal, text) {
            return Ok(());
        }
        if self.write_packed(Alphabet::Hex, text) {
            return Ok(());
        }
        self.write_blob(text.as_bytes())
    }

    fn write_jid(&mut self, text: &str) -> Result<bool> {
        let Some((user, server)) = text.split_once('@') else {
            return Ok(false);
        };
        // The decoder does not accept a JID inside a JID half.
        if server.contains('@') || self.table.code_of(text).is_some() {
            return Ok(false);
        }
        self.out.put_u8(tags::JID_PAIR);
        self.write_plain_string(user)?;
        self.write_plain_string(server)?;
        Ok(true)
    }

    fn write_string(&mut self, text: &str) -> Result<()> {
        if self.write_jid(text)? {
            return Ok(());
        }
        self.write_plain_string(text)
    }

    fn write_content(&mut self, content: &Content) -> Result<()> {
        match content {
            Content::Empty => Ok(()),
            Content::List(children) => {
                self.write_list_size(children.len())?;
                for child in children {
                    self.write_node(child)?;
                }
                Ok(())
            }
            Content::Binary(raw) => self.write_blob(raw),
            Content::Integer(n) => {
                let digits = n.to_string();
                if self.write_packed(Alphabet::Decimal, &digits) {
                    Ok(())
                } else {
                    Err(unrepresentable("integer", digits.len()))
                }
            }
            Content::Text(text) => self.write_text_content(text),
        }
    }

    /// Text content must use a textual form: a blob would decode as
    /// `Binary`, so text without one is rejected.
    fn write_text_content(&mut self, text: &str) -> Result<()> {
        if self.write_jid(text)? {
            return Ok(());
        }
        if let Some(code) = self.table.code_of(text) {
            self.out.put_u8(code);
            return Ok(());
        }
        // Canonical integers come back as `Integer` when decimal packed.
        if canonical_integer(text).is_none() && self.write_packed(Alphabet::Decimal, text) {
            return Ok(());
        }
        if self.write_packed(Alphabet::Hex, text) {
            return Ok(());
        }
        Err(unrepresentable("text", text.len()))
    }
}

fn unrepresentable(kind: &str, len: usize) -> ProtocolError {
    ProtocolError::Unrepresentable(format!(
        "{kind} content of {len} bytes has no textual wire form"
    ))
}
