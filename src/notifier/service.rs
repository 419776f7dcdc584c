//! Notification queue and delivery worker
//!
//! Engine side: [`NotifierHandle::send`] never blocks. A full queue drops
//! the message with a warning.
//! Worker side: drains the queue high-priority first (FIFO within a
//! priority), spaces deliveries with the rate limiter and retries failures
//! with linear backoff. Dropping every handle closes the queue; the worker
//! delivers what is left and returns its stats.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::telegram::DeliverySink;
use super::{Notifier, Priority};
use crate::common::RateLimiter;
use crate::config::NotifierConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Outgoing {
    text: String,
    priority: Priority,
}

/// Cloneable sending side of the notification queue
#[derive(Debug, Clone)]
pub struct NotifierHandle {
    tx: mpsc::Sender<Outgoing>,
    dropped: Arc<AtomicU64>,
}

impl NotifierHandle {
    /// Messages discarded because the queue was full or closed
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Notifier for NotifierHandle {
    fn send(&self, text: &str, priority: Priority) {
        let message = Outgoing {
            text: text.to_string(),
            priority,
        };
        match self.tx.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(m)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Notification queue full, dropping {:?} message: {}",
                    m.priority,
                    first_line(&m.text)
                );
            }
            Err(TrySendError::Closed(m)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Notification worker stopped, dropping message: {}",
                    first_line(&m.text)
                );
            }
        }
    }
}

/// Messages waiting for delivery, high priority first then arrival order
#[derive(Debug, Default)]
pub struct PendingQueue {
    high: VecDeque<String>,
    normal: VecDeque<String>,
}

impl PendingQueue {
    pub fn push(&mut self, text: String, priority: Priority) {
        match priority {
            Priority::High => self.high.push_back(text),
            Priority::Normal => self.normal.push_back(text),
        }
    }

    pub fn pop(&mut self) -> Option<(String, Priority)> {
        if let Some(text) = self.high.pop_front() {
            return Some((text, Priority::High));
        }
        self.normal.pop_front().map(|text| (text, Priority::Normal))
    }

    pub fn len(&self) -> usize {
        self.high.len() + self.normal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.high.is_empty() && self.normal.is_empty()
    }
}

/// Worker totals, returned when the worker exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryStats {
    pub delivered: u64,
    pub failed: u64,
    pub retries: u64,
}

pub struct NotificationService {
    rx: mpsc::Receiver<Outgoing>,
    sink: DeliverySink,
    limiter: RateLimiter,
    max_retries: u32,
    retry_backoff: Duration,
    pending: PendingQueue,
    stats: DeliveryStats,
}

impl NotificationService {
    /// Start the delivery worker on the current tokio runtime
    pub fn spawn(
        config: &NotifierConfig,
        sink: DeliverySink,
    ) -> (NotifierHandle, JoinHandle<DeliveryStats>) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        info!(
            "Notification service started (sink: {}, queue: {}, min interval: {}ms)",
            sink.name(),
            config.queue_capacity,
            config.min_interval_ms
        );

        let service = NotificationService {
            rx,
            sink,
            limiter: RateLimiter::per_interval(Duration::from_millis(config.min_interval_ms)),
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            pending: PendingQueue::default(),
            stats: DeliveryStats::default(),
        };
        let handle = NotifierHandle {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (handle, tokio::spawn(service.run()))
    }

    async fn run(mut self) -> DeliveryStats {
        loop {
            if self.pending.is_empty() {
                match self.rx.recv().await {
                    Some(m) => self.pending.push(m.text, m.priority),
                    None => break,
                }
            }
            // Pull in everything already queued so priority ordering applies
            while let Ok(m) = self.rx.try_recv() {
                self.pending.push(m.text, m.priority);
            }

            let Some((text, priority)) = self.pending.pop() else {
                continue;
            };
            self.limiter.acquire().await;
            self.deliver_with_retry(&text, priority).await;
        }

        info!(
            "Notification service stopped: {} delivered, {} failed",
            self.stats.delivered, self.stats.failed
        );
        self.stats
    }

    async fn deliver_with_retry(&mut self, text: &str, priority: Priority) {
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                self.stats.retries += 1;
                let delay = self.retry_backoff * attempt;
                debug!("Retrying delivery after {}ms", delay.as_millis());
                sleep(delay).await;
            }

            match self.sink.deliver(text).await {
                Ok(()) => {
                    self.stats.delivered += 1;
                    debug!("Delivered {:?} notification: {}", priority, first_line(text));
                    return;
                }
                Err(e) => warn!(
                    "Delivery failed (attempt {}/{}): {}",
                    attempt + 1,
                    self.max_retries + 1,
                    e
                ),
            }
        }

        self.stats.failed += 1;
        error!(
            "Dropping notification after {} attempts: {}",
            self.max_retries + 1,
            first_line(text)
        );
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config(capacity: usize) -> NotifierConfig {
        NotifierConfig {
            queue_capacity: capacity,
            min_interval_ms: 0,
            max_retries: 1,
            retry_backoff_ms: 1,
            telegram: None,
        }
    }

    #[test]
    fn test_pending_queue_order() {
        let mut queue = PendingQueue::default();
        queue.push("n1".into(), Priority::Normal);
        queue.push("h1".into(), Priority::High);
        queue.push("n2".into(), Priority::Normal);
        queue.push("h2".into(), Priority::High);
        assert_eq!(queue.len(), 4);

        let order: Vec<String> = std::iter::from_fn(|| queue.pop().map(|(t, _)| t)).collect();
        assert_eq!(order, vec!["h1", "h2", "n1", "n2"]);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_delivers_and_drains_on_close() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (handle, worker) = NotificationService::spawn(&fast_config(16), DeliverySink::Channel(tx));

        handle.send("one", Priority::Normal);
        handle.send("two", Priority::High);
        drop(handle);

        let stats = worker.await.unwrap();
        assert_eq!(stats.delivered, 2);
        assert_eq!(stats.failed, 0);

        let mut received = Vec::new();
        while let Ok(text) = rx.try_recv() {
            received.push(text);
        }
        assert_eq!(received.len(), 2);
        assert!(received.contains(&"one".to_string()));
        assert!(received.contains(&"two".to_string()));
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (handle, worker) = NotificationService::spawn(&fast_config(1), DeliverySink::Channel(tx));

        // Current-thread runtime: the worker cannot run until we yield
        handle.send("kept", Priority::Normal);
        handle.send("dropped", Priority::High);
        assert_eq!(handle.dropped(), 1);

        drop(handle);
        let stats = worker.await.unwrap();
        assert_eq!(stats.delivered, 1);
    }

    #[tokio::test]
    async fn test_failed_delivery_counted_after_retries() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let (handle, worker) = NotificationService::spawn(&fast_config(4), DeliverySink::Channel(tx));
        handle.send("lost", Priority::High);
        drop(handle);

        let stats = worker.await.unwrap();
        assert_eq!(stats.delivered, 0);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.retries, 1);
    }
}
