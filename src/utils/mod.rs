//! # Utility Modules
//!
//! Supporting utilities for logging, metrics and timing.
//!
//! ## Components
//! - **Logging**: Structured logging configuration
//! - **Metrics**: Thread-safe observability counters
//! - **Time**: Wall-clock helpers for keepalive scheduling
//! - **Timeout**: Default deadlines and deadline-bounded waits

pub mod logging;
pub mod metrics;
pub mod time;
pub mod timeout;
