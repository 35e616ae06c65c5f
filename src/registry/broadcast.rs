//! Broadcast fan-out to subscribers
//!
//! Each call spawns one supervising task that runs a delivery task per
//! subscriber in a `JoinSet` and joins them all. A slow or closed subscriber
//! only costs its own delivery: it is counted and skipped, never removed from
//! the registry (that happens in its own session teardown).
//!
//! ```text
//!   publisher session ──fan_out()──► supervisor ──┬─► deliver(sub 1) ──► queue
//!          │  (not awaited)                       ├─► deliver(sub 2) ──► queue
//!          ▼                                      └─► deliver(sub n) ──► queue
//!   reads next message                      JoinHandle<FanoutReport>
//! ```
//!
//! Deliveries run concurrently across subscribers but in order per
//! subscriber: `fan_out` reserves a relay ticket on every handle before
//! spawning anything, and a delivery waits until the earlier frames for that
//! handle have been queued, skipped or timed out.
//!
//! Payloads are `Bytes`, so every subscriber shares one allocation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::task::{JoinHandle, JoinSet};

use crate::protocol::constants::DEFAULT_SEND_TIMEOUT;
use crate::stats::RelayStats;

use super::entry::{ConnectionHandle, RelayTicket, SendError};

/// Outcome of one fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutReport {
    /// Subscribers the payload was queued for
    pub delivered: usize,
    /// Subscribers that were no longer open
    pub skipped: usize,
    /// Subscribers whose queue timed out or whose writer had stopped
    pub failed: usize,
}

impl FanoutReport {
    pub fn attempted(&self) -> usize {
        self.delivered + self.skipped + self.failed
    }
}

enum Delivery {
    Delivered,
    Skipped,
    Failed,
}

/// Sends one payload to a subscriber snapshot
#[derive(Debug, Clone)]
pub struct Broadcaster {
    send_timeout: Duration,
    stats: Option<Arc<RelayStats>>,
}

impl Broadcaster {
    pub fn new(send_timeout: Duration) -> Self {
        Self {
            send_timeout,
            stats: None,
        }
    }

    /// Record fan-out outcomes in `stats`
    pub fn with_stats(mut self, stats: Arc<RelayStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Deliver `payload` to every handle in `subscribers`
    ///
    /// Returns immediately; the handle resolves once every delivery has
    /// finished. Dropping the handle does not cancel the fan-out.
    pub fn fan_out(
        &self,
        payload: Bytes,
        subscribers: Vec<Arc<ConnectionHandle>>,
    ) -> JoinHandle<FanoutReport> {
        let send_timeout = self.send_timeout;
        let stats = self.stats.clone();

        // Tickets are taken here, in call order, so each subscriber sees
        // frames in the order the publisher sent them
        let reserved_at = Instant::now();
        let reserved: Vec<_> = subscribers
            .into_iter()
            .map(|subscriber| {
                let ticket = subscriber.reserve_relay();
                (subscriber, ticket)
            })
            .collect();

        tokio::spawn(async move {
            let mut deliveries = JoinSet::new();
            for (subscriber, ticket) in reserved {
                deliveries.spawn(deliver(
                    subscriber,
                    ticket,
                    payload.clone(),
                    reserved_at,
                    send_timeout,
                ));
            }

            let mut report = FanoutReport::default();
            while let Some(joined) = deliveries.join_next().await {
                match joined {
                    Ok(Delivery::Delivered) => report.delivered += 1,
                    Ok(Delivery::Skipped) => report.skipped += 1,
                    Ok(Delivery::Failed) => report.failed += 1,
                    Err(e) => {
                        tracing::error!(error = %e, "Fan-out delivery task failed");
                        report.failed += 1;
                    }
                }
            }

            if let Some(stats) = stats {
                stats.record_fanout(report.delivered, report.skipped, report.failed);
            }

            tracing::debug!(
                size = payload.len(),
                attempted = report.attempted(),
                delivered = report.delivered,
                skipped = report.skipped,
                failed = report.failed,
                "Fan-out complete"
            );
            report
        })
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_SEND_TIMEOUT)
    }
}

async fn deliver(
    subscriber: Arc<ConnectionHandle>,
    ticket: RelayTicket,
    payload: Bytes,
    reserved_at: Instant,
    timeout: Duration,
) -> Delivery {
    match subscriber.send_relayed(ticket, payload, reserved_at, timeout).await {
        Ok(()) => Delivery::Delivered,
        Err(SendError::NotOpen) => {
            tracing::debug!(
                subscriber = subscriber.id(),
                state = ?subscriber.state(),
                "Skipping subscriber that is not open"
            );
            Delivery::Skipped
        }
        Err(e) => {
            tracing::warn!(
                subscriber = subscriber.id(),
                peer = %subscriber.peer(),
                error = %e,
                "Fan-out delivery failed"
            );
            Delivery::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::protocol::Outbound;
    use crate::registry::Role;

    fn subscriber(id: u64, capacity: usize) -> (Arc<ConnectionHandle>, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity);
        let peer = "127.0.0.1:5000".parse().unwrap();
        (Arc::new(ConnectionHandle::new(id, Role::Subscriber, peer, tx)), rx)
    }

    #[tokio::test]
    async fn test_delivers_to_every_subscriber() {
        let (a, mut rx_a) = subscriber(1, 4);
        let (b, mut rx_b) = subscriber(2, 4);
        let payload = Bytes::from_static(br#"{"type":"IMAGE","image":"AA=="}"#);

        let report = Broadcaster::default()
            .fan_out(payload.clone(), vec![a, b])
            .await
            .unwrap();

        assert_eq!(
            report,
            FanoutReport {
                delivered: 2,
                skipped: 0,
                failed: 0
            }
        );
        assert_eq!(rx_a.recv().await, Some(Outbound::Text(payload.clone())));
        assert_eq!(rx_b.recv().await, Some(Outbound::Text(payload)));
    }

    #[tokio::test]
    async fn test_closed_subscriber_does_not_block_others() {
        let (open, mut rx_open) = subscriber(1, 4);
        let (closing, _rx_closing) = subscriber(2, 4);
        let (gone, rx_gone) = subscriber(3, 4);
        closing.mark_closing();
        drop(rx_gone);

        let report = Broadcaster::default()
            .fan_out(Bytes::from_static(b"{}"), vec![closing, gone, open])
            .await
            .unwrap();

        assert_eq!(report.delivered, 1);
        assert_eq!(report.skipped, 2);
        assert!(rx_open.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_full_queue_fails_only_that_subscriber() {
        let (slow, _rx_slow) = subscriber(1, 1);
        let (fast, mut rx_fast) = subscriber(2, 4);
        slow.send(Bytes::from_static(b"backlog"), Duration::from_millis(10))
            .await
            .unwrap();

        let stats = Arc::new(RelayStats::new());
        let broadcaster = Broadcaster::new(Duration::from_millis(20)).with_stats(Arc::clone(&stats));
        let report = broadcaster
            .fan_out(Bytes::from_static(b"{}"), vec![slow.clone(), fast])
            .await
            .unwrap();

        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.attempted(), 2);
        assert_eq!(rx_fast.recv().await, Some(Outbound::Text(Bytes::from_static(b"{}"))));
        // Failure never changes the subscriber's own state
        assert!(slow.is_open());

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.fanout_delivered, 1);
        assert_eq!(snapshot.fanout_failed, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_frames_arrive_in_publish_order() {
        const FRAMES: usize = 2000;

        let (a, rx_a) = subscriber(1, 64);
        let (b, rx_b) = subscriber(2, 64);
        let broadcaster = Broadcaster::new(Duration::from_secs(10));

        let collect = |mut rx: mpsc::Receiver<Outbound>| {
            tokio::spawn(async move {
                let mut seen = Vec::with_capacity(FRAMES);
                while seen.len() < FRAMES {
                    match rx.recv().await {
                        Some(Outbound::Text(bytes)) => {
                            seen.push(std::str::from_utf8(&bytes).unwrap().parse::<usize>().unwrap())
                        }
                        other => panic!("unexpected {:?}", other),
                    }
                }
                seen
            })
        };
        let seen_a = collect(rx_a);
        let seen_b = collect(rx_b);

        let mut handles = Vec::with_capacity(FRAMES);
        for frame in 0..FRAMES {
            handles.push(broadcaster.fan_out(
                Bytes::from(frame.to_string()),
                vec![Arc::clone(&a), Arc::clone(&b)],
            ));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().delivered, 2);
        }

        let expected: Vec<usize> = (0..FRAMES).collect();
        assert_eq!(seen_a.await.unwrap(), expected);
        assert_eq!(seen_b.await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_empty_snapshot() {
        let report = Broadcaster::default()
            .fan_out(Bytes::from_static(b"{}"), Vec::new())
            .await
            .unwrap();
        assert_eq!(report, FanoutReport::default());
    }
}
