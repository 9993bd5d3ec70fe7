//! # Protocol Layer
//!
//! Session logic on top of the wire codec.
//!
//! ## Components
//! - **Control**: classification of inbound payloads, admin command shapes
//! - **Session**: connection states, session credentials, collaborator traits
//! - **Connection**: the login state machine and keepalive schedule
//! - **Dispatcher**: tag-correlated request/response
//! - **Client**: the driver loop tying transport, dispatcher and connection

pub mod client;
pub mod connection;
pub mod control;
pub mod dispatcher;
pub mod session;
