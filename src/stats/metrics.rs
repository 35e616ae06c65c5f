//! Statistics and metrics for relay sessions

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Session-level statistics
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// Logical messages reassembled
    pub messages_received: u64,
    /// Total payload bytes received
    pub bytes_received: u64,
    /// Replies queued back to the peer
    pub replies_sent: u64,
    /// Images accepted for relay
    pub images: u64,
    /// Protocol and coding errors answered with an ERROR reply
    pub errors: u64,
    /// Connection duration
    pub duration: Duration,
}

impl SessionStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one reassembled message
    pub fn record_message(&mut self, len: usize) {
        self.messages_received += 1;
        self.bytes_received += len as u64;
    }

    /// Average receive rate in bytes per second
    pub fn receive_rate(&self) -> u64 {
        let secs = self.duration.as_secs();
        if secs > 0 {
            self.bytes_received / secs
        } else {
            0
        }
    }
}

/// Server-wide counters shared by every session
#[derive(Debug)]
pub struct RelayStats {
    started_at: Instant,
    connections_accepted: AtomicU64,
    connections_rejected: AtomicU64,
    images_received: AtomicU64,
    image_bytes: AtomicU64,
    encoded_bytes: AtomicU64,
    fanout_delivered: AtomicU64,
    fanout_skipped: AtomicU64,
    fanout_failed: AtomicU64,
    protocol_errors: AtomicU64,
}

/// Point-in-time copy of [`RelayStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayStatsSnapshot {
    pub uptime: Duration,
    pub connections_accepted: u64,
    pub connections_rejected: u64,
    pub images_received: u64,
    /// Bytes of base64 image text received
    pub image_bytes: u64,
    /// Bytes after Huffman coding
    pub encoded_bytes: u64,
    pub fanout_delivered: u64,
    pub fanout_skipped: u64,
    pub fanout_failed: u64,
    pub protocol_errors: u64,
}

impl RelayStatsSnapshot {
    /// Encoded size as a fraction of the received image text
    pub fn compression_ratio(&self) -> f64 {
        if self.image_bytes == 0 {
            0.0
        } else {
            self.encoded_bytes as f64 / self.image_bytes as f64
        }
    }
}

impl RelayStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            connections_accepted: AtomicU64::new(0),
            connections_rejected: AtomicU64::new(0),
            images_received: AtomicU64::new(0),
            image_bytes: AtomicU64::new(0),
            encoded_bytes: AtomicU64::new(0),
            fanout_delivered: AtomicU64::new(0),
            fanout_skipped: AtomicU64::new(0),
            fanout_failed: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
        }
    }

    pub fn record_connection_accepted(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one image and the size it coded down to
    pub fn record_image(&self, image_len: usize, encoded_len: usize) {
        self.images_received.fetch_add(1, Ordering::Relaxed);
        self.image_bytes.fetch_add(image_len as u64, Ordering::Relaxed);
        self.encoded_bytes
            .fetch_add(encoded_len as u64, Ordering::Relaxed);
    }

    pub fn record_fanout(&self, delivered: usize, skipped: usize, failed: usize) {
        self.fanout_delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        self.fanout_skipped.fetch_add(skipped as u64, Ordering::Relaxed);
        self.fanout_failed.fetch_add(failed as u64, Ordering::Relaxed);
    }

    pub fn record_protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RelayStatsSnapshot {
        RelayStatsSnapshot {
            uptime: self.started_at.elapsed(),
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            connections_rejected: self.connections_rejected.load(Ordering::Relaxed),
            images_received: self.images_received.load(Ordering::Relaxed),
            image_bytes: self.image_bytes.load(Ordering::Relaxed),
            encoded_bytes: self.encoded_bytes.load(Ordering::Relaxed),
            fanout_delivered: self.fanout_delivered.load(Ordering::Relaxed),
            fanout_skipped: self.fanout_skipped.load(Ordering::Relaxed),
            fanout_failed: self.fanout_failed.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
        }
    }
}

impl Default for RelayStats {
    fn default() -> Self {
        Self::new()
    }
}
