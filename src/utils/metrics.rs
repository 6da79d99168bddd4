//! Observability and Metrics
//!
//! Counters for monitoring request traffic and protocol health.
//!
//! Each client and server owns its own [`Metrics`]; atomic counters make
//! them safe to read from any task while requests are in flight.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Metrics collector for one client or server
#[derive(Debug)]
pub struct Metrics {
    /// Requests started by a client
    pub requests_total: AtomicU64,
    /// Connection attempts made by a client, retries included
    pub attempts_total: AtomicU64,
    /// Requests abandoned after every attempt failed
    pub transport_failures: AtomicU64,
    /// Replies that arrived and authenticated
    pub responses_received: AtomicU64,
    /// Responses rejected by the message's validator
    pub invalid_responses: AtomicU64,
    /// Connections accepted by a server
    pub connections_accepted: AtomicU64,
    /// Messages handed to a handler
    pub messages_dispatched: AtomicU64,
    /// Envelopes whose tag did not verify
    pub authentication_failures: AtomicU64,
    /// Authenticated envelopes that failed to decode or were stale
    pub malformed_envelopes: AtomicU64,
    /// Messages with no matching handler
    pub no_handler: AtomicU64,
    /// Serve cycles that ended without a request
    pub idle_ticks: AtomicU64,
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
            requests_total: AtomicU64::new(0),
            attempts_total: AtomicU64::new(0),
            transport_failures: AtomicU64::new(0),
            responses_received: AtomicU64::new(0),
            invalid_responses: AtomicU64::new(0),
            connections_accepted: AtomicU64::new(0),
            messages_dispatched: AtomicU64::new(0),
            authentication_failures: AtomicU64::new(0),
            malformed_envelopes: AtomicU64::new(0),
            no_handler: AtomicU64::new(0),
            idle_ticks: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn request_started(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn attempt(&self) {
        self.attempts_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transport_failure(&self) {
        self.transport_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn invalid_response(&self) {
        self.invalid_responses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_accepted(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dispatched(&self) {
        self.messages_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn idle_tick(&self) {
        self.idle_ticks.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a sealed frame written to the socket
    pub fn frame_sent(&self, byte_count: u64) {
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    /// Record a sealed frame read from the socket
    pub fn frame_received(&self, byte_count: u64) {
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    /// Record a reply that opened successfully
    pub fn response_received(&self) {
        self.responses_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Classify a failed envelope open
    pub fn rejected(&self, err: &crate::error::ProtocolError) {
        use crate::error::ProtocolError;

        match err {
            ProtocolError::Authentication(_) => {
                self.authentication_failures.fetch_add(1, Ordering::Relaxed);
            }
            ProtocolError::MalformedPayload(_) | ProtocolError::StaleEnvelope(_) => {
                self.malformed_envelopes.fetch_add(1, Ordering::Relaxed);
            }
            ProtocolError::NoHandler(_) => {
                self.no_handler.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            attempts_total: self.attempts_total.load(Ordering::Relaxed),
            transport_failures: self.transport_failures.load(Ordering::Relaxed),
            responses_received: self.responses_received.load(Ordering::Relaxed),
            invalid_responses: self.invalid_responses.load(Ordering::Relaxed),
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            messages_dispatched: self.messages_dispatched.load(Ordering::Relaxed),
            authentication_failures: self.authentication_failures.load(Ordering::Relaxed),
            malformed_envelopes: self.malformed_envelopes.load(Ordering::Relaxed),
            no_handler: self.no_handler.load(Ordering::Relaxed),
            idle_ticks: self.idle_ticks.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_summary(&self) {
        let snapshot = self.snapshot();
        info!(
            requests_total = snapshot.requests_total,
            attempts_total = snapshot.attempts_total,
            transport_failures = snapshot.transport_failures,
            responses_received = snapshot.responses_received,
            invalid_responses = snapshot.invalid_responses,
            connections_accepted = snapshot.connections_accepted,
            messages_dispatched = snapshot.messages_dispatched,
            authentication_failures = snapshot.authentication_failures,
            malformed_envelopes = snapshot.malformed_envelopes,
            no_handler = snapshot.no_handler,
            idle_ticks = snapshot.idle_ticks,
            bytes_sent = snapshot.bytes_sent,
            bytes_received = snapshot.bytes_received,
            uptime_seconds = snapshot.uptime_seconds,
            "IPC metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub attempts_total: u64,
    pub transport_failures: u64,
    pub responses_received: u64,
    pub invalid_responses: u64,
    pub connections_accepted: u64,
    pub messages_dispatched: u64,
    pub authentication_failures: u64,
    pub malformed_envelopes: u64,
    pub no_handler: u64,
    pub idle_ticks: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub uptime_seconds: u64,
}

/// Timer for measuring operation duration
pub struct Timer {
    start: Instant,
    operation: &'static str,
}

impl Timer {
    /// Start timing an operation
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        debug!(
            operation = self.operation,
            duration_ms = duration.as_millis(),
            "Operation completed"
        );
    }
}
