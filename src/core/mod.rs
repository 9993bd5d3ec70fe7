//! # Core Protocol Components
//!
//! Wire-level building blocks: the binary node codec, the token table it
//! compresses strings with, and the tagged envelopes frames travel in.
//!
//! ## Components
//! - **Token**: fixed code <-> string table
//! - **Node**: decoded tree model
//! - **Decoder / Encoder**: binary node codec
//! - **Envelope**: `<tag>,<payload>` frames exchanged with the peer
//! - **Codec**: Tokio codec carrying envelopes over a byte stream
//!
//! ## Wire Format
//! ```text
//! node    := list_size descriptor attr* content?
//! attr    := string string
//! content := list | blob | jid | packed | token
//! ```
//!
//! ## Security
//! - Every read is bounds-checked (`Truncated`, never a panic)
//! - Nesting depth is capped before recursion
//! - Blob lengths are validated against the buffer before allocation

pub mod codec;
pub mod decoder;
pub mod encoder;
pub mod envelope;
pub mod node;
pub mod packed;
pub mod token;

/// Single-byte discriminants of the binary format.
pub mod tags {
    pub const LIST_EMPTY: u8 = 0;
    pub const STREAM_END: u8 = 2;
    pub const DICTIONARY_0: u8 = 236;
    pub const DICTIONARY_3: u8 = 239;
    pub const LIST_8: u8 = 248;
    pub const LIST_16: u8 = 249;
    pub const JID_PAIR: u8 = 250;
    pub const HEX_8: u8 = 251;
    pub const BINARY_8: u8 = 252;
    pub const BINARY_20: u8 = 253;
    pub const BINARY_32: u8 = 254;
    pub const NIBBLE_8: u8 = 255;

    /// Mask applied to the 3-byte length of a `BINARY_20` blob.
    pub const BINARY_20_MASK: u32 = 0x000F_FFFF;

    /// Whether `tag` is one of the reserved dictionary discriminants.
    #[inline]
    pub fn is_dictionary(tag: u8) -> bool {
        (DICTIONARY_0..=DICTIONARY_3).contains(&tag)
    }
}

pub use decoder::{decode, Decoder};
pub use encoder::{encode, Encoder};
pub use envelope::Envelope;
pub use node::{Content, Node};
