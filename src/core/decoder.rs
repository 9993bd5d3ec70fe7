//! Binary node decoder.
//!
//! Decodes one frame body into a [`Node`] tree. Every read is checked against
//! the end of the buffer; running out of input yields
//! [`ProtocolError::Truncated`]. A failed decode returns only the error, any
//! partially built subtree is dropped.

use bytes::Bytes;
use tracing::{debug, trace};

use crate::core::node::{Content, Node};
use crate::core::packed::Alphabet;
use crate::core::tags;
use crate::core::token::{TokenTable, STANDARD};
use crate::error::{ProtocolError, Result};

/// Default cap on nested list depth.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Decode a single node from `buf` using the standard token table.
///
/// Returns `Ok(None)` when the frame starts with the stream-end sentinel.
pub fn decode(buf: &[u8]) -> Result<Option<Node>> {
    Decoder::new(buf).read_node()
}

/// Cursor over a frame body.
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
    table: &'a TokenTable,
    max_depth: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self::with_table(buf, &STANDARD)
    }

    pub fn with_table(buf: &'a [u8], table: &'a TokenTable) -> Self {
        Self {
            buf,
            pos: 0,
            table,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Override the nesting cap.
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Decode the next node at top level.
    ///
    /// `Ok(None)` signals a clean end of stream. Bytes left after the node are
    /// not an error; they stay available through [`Decoder::remaining`].
    pub fn read_node(&mut self) -> Result<Option<Node>> {
        let node = self.read_node_at(0)?;
        if node.is_some() && self.remaining() > 0 {
            debug!(trailing = self.remaining(), "Bytes left after top-level node");
        }
        Ok(node)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let remaining = self.remaining();
        if len > remaining {
            return Err(ProtocolError::Truncated {
                needed: len,
                remaining,
            });
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    #[inline]
    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Big-endian unsigned integer of 1..=4 bytes.
    fn read_uint(&mut self, len: usize) -> Result<u32> {
        debug_assert!((1..=4).contains(&len));
        Ok(self
            .take(len)?
            .iter()
            .fold(0u32, |acc, byte| (acc << 8) | u32::from(*byte)))
    }

    /// Element count introduced by a list discriminant.
    pub fn read_list_size(&mut self, tag: u8) -> Result<usize> {
        match tag {
            tags::LIST_EMPTY => Ok(0),
            tags::LIST_8 => Ok(self.read_uint(1)? as usize),
            tags::LIST_16 => Ok(self.read_uint(2)? as usize),
            other => Err(ProtocolError::InvalidTag(other)),
        }
    }

    fn read_blob_len(&mut self, tag: u8) -> Result<usize> {
        let len = match tag {
            tags::BINARY_8 => self.read_uint(1)?,
            tags::BINARY_20 => self.read_uint(3)? & tags::BINARY_20_MASK,
            tags::BINARY_32 => self.read_uint(4)?,
            other => return Err(ProtocolError::InvalidTag(other)),
        };
        Ok(len as usize)
    }

    fn read_packed(&mut self, alphabet: Alphabet) -> Result<String> {
        let header = self.read_u8()?;
        let body = self.take(usize::from(header & 0x7F))?;
        alphabet.unpack(header, body)
    }

    fn read_jid_pair(&mut self) -> Result<String> {
        let user_tag = self.read_u8()?;
        let user = self.read_plain_string(user_tag)?;
        let server_tag = self.read_u8()?;
        let server = self.read_plain_string(server_tag)?;
        Ok(format!("{user}@{server}"))
    }

    fn read_token(&self, tag: u8) -> Result<String> {
        self.table
            .lookup(tag)
            .map(str::to_owned)
            .ok_or(ProtocolError::InvalidTag(tag))
    }

    /// String in any position: descriptor, attribute or JID half.
    fn read_string(&mut self, tag: u8) -> Result<String> {
        match tag {
            tags::JID_PAIR => self.read_jid_pair(),
            _ => self.read_plain_string(tag),
        }
    }

    /// Any string form except a JID pair, so JID halves cannot recurse.
    fn read_plain_string(&mut self, tag: u8) -> Result<String> {
        match tag {
            tags::NIBBLE_8 => self.read_packed(Alphabet::Decimal),
            tags::HEX_8 => self.read_packed(Alphabet::Hex),
            tags::BINARY_8 | tags::BINARY_20 | tags::BINARY_32 => {
                let len = self.read_blob_len(tag)?;
                let raw = self.take(len)?;
                String::from_utf8(raw.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)
            }
            t if tags::is_dictionary(t) => Err(ProtocolError::NotImplemented(t)),
            t => self.read_token(t),
        }
    }

    fn read_content(&mut self, tag: u8, depth: usize) -> Result<Content> {
        match tag {
            tags::LIST_EMPTY | tags::LIST_8 | tags::LIST_16 => {
                let size = self.read_list_size(tag)?;
                // Each child needs at least two bytes; cap the reservation by
                // what the buffer can actually hold.
                let mut children = Vec::with_capacity(size.min(self.remaining() / 2));
                for _ in 0..size {
                    match self.read_node_at(depth + 1)? {
                        Some(child) => children.push(child),
                        None => return Err(ProtocolError::InvalidTag(tags::STREAM_END)),
                    }
                }
                Ok(Content::List(children))
            }
            tags::BINARY_8 | tags::BINARY_20 | tags::BINARY_32 => {
                let len = self.read_blob_len(tag)?;
                let raw = self.take(len)?;
                Ok(Content::Binary(Bytes::copy_from_slice(raw)))
            }
            tags::NIBBLE_8 => {
                let text = self.read_packed(Alphabet::Decimal)?;
                Ok(match canonical_integer(&text) {
                    Some(n) => Content::Integer(n),
                    None => Content::Text(text),
                })
            }
            tags::JID_PAIR | tags::HEX_8 => Ok(Content::Text(self.read_string(tag)?)),
            t if tags::is_dictionary(t) => Err(ProtocolError::NotImplemented(t)),
            t => Ok(Content::Text(self.read_token(t)?)),
        }
    }

    fn read_node_at(&mut self, depth: usize) -> Result<Option<Node>> {
        if depth > self.max_depth {
            return Err(ProtocolError::NestingTooDeep(self.max_depth));
        }

        let list_tag = self.read_u8()?;
        let count = self.read_list_size(list_tag)?;

        let desc_tag = self.read_u8()?;
        if desc_tag == tags::STREAM_END {
            trace!(depth, "Stream end");
            return Ok(None);
        }
        let tag = self.read_string(desc_tag)?;

        let attr_count = count.saturating_sub(1) / 2;
        let mut attrs = Vec::with_capacity(attr_count.min(self.remaining() / 2));
        for _ in 0..attr_count {
            let key_tag = self.read_u8()?;
            let key = self.read_string(key_tag)?;
            let value_tag = self.read_u8()?;
            let value = self.read_string(value_tag)?;
            attrs.push((key, value));
        }

        let content = if count % 2 == 0 {
            let content_tag = self.read_u8()?;
            self.read_content(content_tag, depth)?
        } else {
            Content::Empty
        };

        trace!(depth, tag = %tag, attrs = attrs.len(), content = %content, "Decoded node");
        Ok(Some(Node {
            tag,
            attrs,
            content,
        }))
    }
}

/// `text` as an `i64` when printing the number gives back exactly `text`.
pub(crate) fn canonical_integer(text: &str) -> Option<i64> {
    text.parse::<i64>()
        .ok()
        .filter(|n| n.to_string() == text)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    fn token(s: &str) -> u8 {
        STANDARD.code_of(s).unwrap()
    }

    #[test]
    fn test_list_sizes() {
        let buf = [0x05, 0x01, 0x02];
        let mut dec = Decoder::new(&buf);
        assert_eq!(dec.read_list_size(tags::LIST_8).unwrap(), 5);
        assert_eq!(dec.position(), 1);
        assert_eq!(dec.read_list_size(tags::LIST_16).unwrap(), 0x0102);

        let mut dec = Decoder::new(&buf);
        assert_eq!(dec.read_list_size(tags::LIST_EMPTY).unwrap(), 0);
        assert_eq!(dec.position(), 0);

        assert!(matches!(
            Decoder::new(&buf).read_list_size(7),
            Err(ProtocolError::InvalidTag(7))
        ));
    }

    #[test]
    fn test_stream_end_is_not_an_error() {
        assert_eq!(decode(&[tags::LIST_8, 1, tags::STREAM_END]).unwrap(), None);
    }

    #[test]
    fn test_token_descriptor_without_content() {
        let buf = [tags::LIST_8, 1, token("message")];
        let node = decode(&buf).unwrap().unwrap();
        assert_eq!(node, Node::new("message"));
    }

    #[test]
    fn test_attributes_and_text_content() {
        let buf = [
            tags::LIST_8,
            4,
            token("message"),
            token("type"),
            token("chat"),
            token("text"),
        ];
        let node = decode(&buf).unwrap().unwrap();
        assert_eq!(node.attr("type"), Some("chat"));
        assert_eq!(node.text(), Some("text"));
    }

    #[test]
    fn test_jid_pair_descriptor() {
        let buf = [
            tags::LIST_8,
            1,
            tags::JID_PAIR,
            tags::BINARY_8,
            3,
            b'a',
            b'b',
            b'c',
            token("c.us"),
        ];
        assert_eq!(decode(&buf).unwrap().unwrap().tag, "abc@c.us");
    }

    #[test]
    fn test_nested_jid_rejected() {
        let buf = [tags::LIST_8, 1, tags::JID_PAIR, tags::JID_PAIR];
        assert!(matches!(
            decode(&buf),
            Err(ProtocolError::InvalidTag(tags::JID_PAIR))
        ));
    }

    #[test]
    fn test_binary_20_length_is_masked() {
        let mut buf = vec![tags::LIST_8, 2, token("media"), tags::BINARY_20, 0xF0, 0x00, 0x10];
        buf.extend(std::iter::repeat(0xAB).take(0x10));
        let node = decode(&buf).unwrap().unwrap();
        assert_eq!(node.bytes().map(|b| b.len()), Some(0x10));
    }

    #[test]
    fn test_decimal_content_integer_and_text() {
        let buf = [tags::LIST_8, 2, token("t"), tags::NIBBLE_8, 0x02, 0x15, 0x40];
        assert_eq!(
            decode(&buf).unwrap().unwrap().content,
            Content::Integer(1540)
        );

        let buf = [tags::LIST_8, 2, token("t"), tags::NIBBLE_8, 0x02, 0x01, 0x54];
        assert_eq!(
            decode(&buf).unwrap().unwrap().content,
            Content::Text("0154".into())
        );
    }

    #[test]
    fn test_dictionary_tags_not_implemented() {
        for tag in tags::DICTIONARY_0..=tags::DICTIONARY_3 {
            let buf = [tags::LIST_8, 1, tag, 0x00];
            assert!(matches!(
                decode(&buf),
                Err(ProtocolError::NotImplemented(t)) if t == tag
            ));
        }
    }

    #[test]
    fn test_unassigned_token_rejected() {
        let buf = [tags::LIST_8, 1, 200];
        assert!(matches!(decode(&buf), Err(ProtocolError::InvalidTag(200))));
    }

    #[test]
    fn test_truncation_everywhere() {
        let full = [
            tags::LIST_8,
            4,
            token("message"),
            token("id"),
            tags::BINARY_8,
            2,
            b'x',
            b'y',
            tags::BINARY_8,
            1,
            0xFF,
        ];
        assert!(decode(&full).is_ok());
        for cut in 0..full.len() {
            assert!(
                matches!(decode(&full[..cut]), Err(ProtocolError::Truncated { .. })),
                "prefix of {cut} bytes"
            );
        }
    }

    #[test]
    fn test_huge_blob_length_does_not_allocate() {
        let buf = [tags::LIST_8, 2, token("media"), tags::BINARY_32, 0xFF, 0xFF, 0xFF, 0xFF];
        match decode(&buf) {
            Err(ProtocolError::Truncated { needed, remaining }) => {
                assert_eq!(needed, u32::MAX as usize);
                assert_eq!(remaining, 0);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_depth_cap() {
        // Each level: list of one child containing a list of one child ...
        let mut buf = Vec::new();
        for _ in 0..4 {
            buf.extend([tags::LIST_8, 2, token("item"), tags::LIST_8, 1]);
        }
        buf.extend([tags::LIST_8, 1, token("item")]);

        assert!(Decoder::new(&buf).max_depth(4).read_node().is_ok());
        assert!(matches!(
            Decoder::new(&buf).max_depth(3).read_node(),
            Err(ProtocolError::NestingTooDeep(3))
        ));
    }

    #[test]
    fn test_stream_end_inside_list_rejected() {
        let buf = [tags::LIST_8, 2, token("item"), tags::LIST_8, 1, tags::LIST_8, 1, tags::STREAM_END];
        assert!(matches!(
            decode(&buf),
            Err(ProtocolError::InvalidTag(tags::STREAM_END))
        ));
    }

    #[test]
    fn test_canonical_integer() {
        assert_eq!(canonical_integer("42"), Some(42));
        assert_eq!(canonical_integer("-7"), Some(-7));
        assert_eq!(canonical_integer("007"), None);
        assert_eq!(canonical_integer("-0"), None);
        assert_eq!(canonical_integer("1.5"), None);
        assert_eq!(canonical_integer(""), None);
    }
}
