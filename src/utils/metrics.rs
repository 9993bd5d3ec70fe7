//! Observability and Metrics
//!
//! Counters for frame intake, decoding, request correlation and keepalives.
//!
//! Uses atomic counters for thread-safe metrics collection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Global metrics collector for protocol operations
#[derive(Debug)]
pub struct Metrics {
    /// Control (structured-text) frames received
    pub control_frames: AtomicU64,
    /// Binary node frames received
    pub binary_frames: AtomicU64,
    /// Binary frames that failed to decode
    pub decode_errors: AtomicU64,
    /// Control events dropped as protocol violations
    pub protocol_violations: AtomicU64,
    /// Correlated requests issued
    pub requests_issued: AtomicU64,
    /// Correlated requests that hit their deadline
    pub requests_timed_out: AtomicU64,
    /// Tagged frames with no pending request
    pub unsolicited_responses: AtomicU64,
    /// Keepalives sent
    pub keepalives_sent: AtomicU64,
    /// Total envelopes sent
    pub messages_sent: AtomicU64,
    /// Total bytes sent
    pub bytes_sent: AtomicU64,
    /// Total bytes received
    pub bytes_received: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            control_frames: AtomicU64::new(0),
            binary_frames: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            protocol_violations: AtomicU64::new(0),
            requests_issued: AtomicU64::new(0),
            requests_timed_out: AtomicU64::new(0),
            unsolicited_responses: AtomicU64::new(0),
            keepalives_sent: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn control_frame(&self, byte_count: u64) {
        self.control_frames.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn binary_frame(&self, byte_count: u64) {
        self.binary_frames.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn protocol_violation(&self) {
        self.protocol_violations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_issued(&self) {
        self.requests_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_timed_out(&self) {
        self.requests_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn unsolicited_response(&self) {
        self.unsolicited_responses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn keepalive_sent(&self) {
        self.keepalives_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a message sent
    pub fn message_sent(&self, byte_count: u64) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            control_frames: self.control_frames.load(Ordering::Relaxed),
            binary_frames: self.binary_frames.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            protocol_violations: self.protocol_violations.load(Ordering::Relaxed),
            requests_issued: self.requests_issued.load(Ordering::Relaxed),
            requests_timed_out: self.requests_timed_out.load(Ordering::Relaxed),
            unsolicited_responses: self.unsolicited_responses.load(Ordering::Relaxed),
            keepalives_sent: self.keepalives_sent.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            control_frames = snapshot.control_frames,
            binary_frames = snapshot.binary_frames,
            decode_errors = snapshot.decode_errors,
            protocol_violations = snapshot.protocol_violations,
            requests_issued = snapshot.requests_issued,
            requests_timed_out = snapshot.requests_timed_out,
            unsolicited_responses = snapshot.unsolicited_responses,
            keepalives_sent = snapshot.keepalives_sent,
            messages_sent = snapshot.messages_sent,
            bytes_sent = snapshot.bytes_sent,
            bytes_received = snapshot.bytes_received,
            uptime_seconds = snapshot.uptime_seconds,
            "Protocol metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub control_frames: u64,
    pub binary_frames: u64,
    pub decode_errors: u64,
    pub protocol_violations: u64,
    pub requests_issued: u64,
    pub requests_timed_out: u64,
    pub unsolicited_responses: u64,
    pub keepalives_sent: u64,
    pub messages_sent: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub uptime_seconds: u64,
}

/// Global metrics instance (lazy static for simplicity)
static METRICS: once_cell::sync::Lazy<Metrics> = once_cell::sync::Lazy::new(Metrics::new);

/// Get the global metrics instance
pub fn global_metrics() -> &'static Metrics {
    &METRICS
}
