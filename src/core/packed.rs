//! Packed-digit fields: two symbols per byte, one per 4-bit nibble.
//!
//! The header byte carries the number of body bytes in its low 7 bits. Bit 7
//! marks an odd symbol count, in which case the final (pad) nibble is dropped
//! without being looked up.

use crate::core::tags;
use crate::error::{ProtocolError, Result};

/// Longest string a packed field can hold (127 bytes of two nibbles).
pub const MAX_PACKED_CHARS: usize = 2 * 0x7F;

const ODD_FLAG: u8 = 0x80;
const PAD_NIBBLE: u8 = 0x0F;

const DECIMAL_SYMBOLS: [Option<char>; 16] = [
    Some('0'),
    Some('1'),
    Some('2'),
    Some('3'),
    Some('4'),
    Some('5'),
    Some('6'),
    Some('7'),
    Some('8'),
    Some('9'),
    Some('-'),
    Some('.'),
    None,
    None,
    None,
    None,
];

const HEX_SYMBOLS: &[u8; 16] = b"0123456789ABCDEF";

/// Symbol set of a packed field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alphabet {
    /// Digits, `-` and `.` (tag 255).
    Decimal,
    /// Uppercase hexadecimal (tag 251).
    Hex,
}

impl Alphabet {
    /// Wire discriminant introducing a field in this alphabet.
    pub fn tag(self) -> u8 {
        match self {
            Alphabet::Decimal => tags::NIBBLE_8,
            Alphabet::Hex => tags::HEX_8,
        }
    }

    #[inline]
    fn symbol(self, nibble: u8) -> Option<char> {
        let nibble = usize::from(nibble & 0x0F);
        match self {
            Alphabet::Decimal => DECIMAL_SYMBOLS[nibble],
            Alphabet::Hex => Some(char::from(HEX_SYMBOLS[nibble])),
        }
    }

    #[inline]
    fn nibble(self, symbol: char) -> Option<u8> {
        match (self, symbol) {
            (_, '0'..='9') => Some(symbol as u8 - b'0'),
            (Alphabet::Decimal, '-') => Some(10),
            (Alphabet::Decimal, '.') => Some(11),
            (Alphabet::Hex, 'A'..='F') => Some(symbol as u8 - b'A' + 10),
            _ => None,
        }
    }

    /// Whether `text` can be packed in this alphabet without loss.
    pub fn can_pack(self, text: &str) -> bool {
        !text.is_empty()
            && text.len() <= MAX_PACKED_CHARS
            && text.chars().all(|c| self.nibble(c).is_some())
    }

    /// Unpack a field given its header byte and body.
    ///
    /// `body` must hold exactly `header & 0x7F` bytes.
    pub fn unpack(self, header: u8, body: &[u8]) -> Result<String> {
        let odd = header & ODD_FLAG != 0;
        let mut len = body.len() * 2;
        if odd {
            len = len.saturating_sub(1);
        }

        let mut out = String::with_capacity(len);
        for (i, byte) in body.iter().enumerate() {
            for (j, nibble) in [byte >> 4, byte & 0x0F].into_iter().enumerate() {
                if 2 * i + j >= len {
                    break;
                }
                let symbol = self
                    .symbol(nibble)
                    .ok_or(ProtocolError::InvalidTag(self.tag()))?;
                out.push(symbol);
            }
        }
        Ok(out)
    }

    /// Pack `text` into header byte plus body, or `None` if it does not fit
    /// this alphabet.
    pub fn pack(self, text: &str) -> Option<Vec<u8>> {
        if !self.can_pack(text) {
            return None;
        }

        let nibbles: Vec<u8> = text.chars().filter_map(|c| self.nibble(c)).collect();
        let body_len = nibbles.len().div_ceil(2);
        let mut header = body_len as u8;
        if nibbles.len() % 2 == 1 {
            header |= ODD_FLAG;
        }

        let mut out = Vec::with_capacity(1 + body_len);
        out.push(header);
        for pair in nibbles.chunks(2) {
            let high = pair[0];
            let low = pair.get(1).copied().unwrap_or(PAD_NIBBLE);
            out.push((high << 4) | low);
        }
        Some(out)
    }
}
