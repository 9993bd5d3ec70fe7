//! # Transport Layer
//!
//! Moves envelopes between the client and its peer.
//!
//! ## Components
//! - **Sender**: the single serialized outbound boundary shared by every writer
//! - **Memory**: in-process channel pair for tests and embedders
//! - **Framed**: any `AsyncRead + AsyncWrite` byte stream via the envelope codec
//!
//! Inbound traffic is exposed as a [`InboundStream`]; the client driver is its
//! only reader.

pub mod framed;
pub mod memory;
pub mod sender;

use futures::Stream;
use std::pin::Pin;

use crate::core::envelope::Envelope;
use crate::error::Result;

/// Envelopes arriving from the peer, in order.
pub type InboundStream = Pin<Box<dyn Stream<Item = Result<Envelope>> + Send>>;

pub use sender::Outbound;
