//! Live tail fan-out.
//!
//! Each subscriber owns a bounded broadcast queue: when it falls behind,
//! the oldest queued entries are dropped and the subscriber sees a single
//! `Lagged` marker before delivery resumes with the newest retained
//! entries. Slow subscribers never affect fast ones, and the publisher
//! never blocks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use logwell_model::{LogEntry, LogFilter};

use crate::error::{EngineError, Result};

/// What a subscriber receives.
#[derive(Debug, Clone)]
pub enum TailEvent {
    Entry(Arc<LogEntry>),
    /// The subscriber overflowed its queue; older entries were dropped.
    Lagged,
}

struct SubscriberSlot {
    id: u64,
    sender: broadcast::Sender<Arc<LogEntry>>,
    filter: LogFilter,
}

/// Bounded multiplexer between the single ingestion writer and live tail
/// subscribers.
pub struct TailBroker {
    slots: Mutex<Vec<SubscriberSlot>>,
    next_id: AtomicU64,
    max_subscribers: usize,
    queue_depth: usize,
}

impl std::fmt::Debug for TailBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TailBroker")
            .field("subscribers", &self.slots.lock().len())
            .field("max_subscribers", &self.max_subscribers)
            .field("queue_depth", &self.queue_depth)
            .finish()
    }
}

impl TailBroker {
    pub fn new(max_subscribers: usize, queue_depth: usize) -> Self {
        Self {
            slots: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            max_subscribers,
            queue_depth,
        }
    }

    /// Register a subscriber. Server-side filtering by container and level
    /// happens before enqueue, so a filtered subscriber cannot lag on
    /// traffic it never asked for.
    pub fn subscribe(&self, filter: LogFilter) -> Result<TailSubscription> {
        let mut slots = self.slots.lock();
        slots.retain(|slot| slot.sender.receiver_count() > 0);
        if slots.len() >= self.max_subscribers {
            return Err(EngineError::TooManySubscribers(self.max_subscribers));
        }

        let (sender, receiver) = broadcast::channel(self.queue_depth);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        slots.push(SubscriberSlot { id, sender, filter });
        debug!(subscriber = id, total = slots.len(), "tail subscriber attached");

        Ok(TailSubscription { receiver })
    }

    /// Publish one committed entry to every matching subscriber, in the
    /// order entries were committed. Dead subscribers are pruned here.
    pub fn publish(&self, entry: &Arc<LogEntry>) {
        let mut slots = self.slots.lock();
        slots.retain(|slot| {
            if slot.sender.receiver_count() == 0 {
                debug!(subscriber = slot.id, "pruning detached tail subscriber");
                return false;
            }
            if slot.filter.matches_stream(&entry.container, entry.level) {
                // A send error means the receiver went away between the
                // count check and here; the next publish prunes it.
                let _ = slot.sender.send(Arc::clone(entry));
            }
            true
        });
    }

    pub fn subscriber_count(&self) -> usize {
        let mut slots = self.slots.lock();
        slots.retain(|slot| slot.sender.receiver_count() > 0);
        slots.len()
    }
}

/// Receiving half of one tail subscription. Dropping it detaches the
/// subscriber; the broker prunes the slot on its next publish.
#[derive(Debug)]
pub struct TailSubscription {
    receiver: broadcast::Receiver<Arc<LogEntry>>,
}

impl TailSubscription {
    /// Next event, in committed-id order. `None` once the broker is gone.
    pub async fn recv(&mut self) -> Option<TailEvent> {
        match self.receiver.recv().await {
            Ok(entry) => Some(TailEvent::Entry(entry)),
            Err(broadcast::error::RecvError::Lagged(_)) => Some(TailEvent::Lagged),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use logwell_model::{LogLevel, StreamKind};

    fn entry(id: i64, container: &str, level: LogLevel) -> Arc<LogEntry> {
        Arc::new(LogEntry {
            id,
            timestamp: Utc::now(),
            container: container.to_string(),
            stream: StreamKind::Stdout,
            level,
            message: format!("message {id}"),
            raw: String::new(),
        })
    }

    #[tokio::test]
    async fn delivers_in_commit_order() {
        let broker = TailBroker::new(5, 16);
        let mut sub = broker.subscribe(LogFilter::default()).unwrap();

        for id in 1..=3 {
            broker.publish(&entry(id, "web", LogLevel::Info));
        }
        for expected in 1..=3 {
            match sub.recv().await.unwrap() {
                TailEvent::Entry(entry) => assert_eq!(entry.id, expected),
                TailEvent::Lagged => panic!("unexpected lag"),
            }
        }
    }

    #[tokio::test]
    async fn subscriber_cap_is_enforced() {
        let broker = TailBroker::new(2, 16);
        let _a = broker.subscribe(LogFilter::default()).unwrap();
        let _b = broker.subscribe(LogFilter::default()).unwrap();
        let err = broker.subscribe(LogFilter::default()).unwrap_err();
        assert!(matches!(err, EngineError::TooManySubscribers(2)));
    }

    #[tokio::test]
    async fn dropping_a_subscription_frees_its_slot() {
        let broker = TailBroker::new(1, 16);
        let sub = broker.subscribe(LogFilter::default()).unwrap();
        drop(sub);
        assert_eq!(broker.subscriber_count(), 0);
        broker.subscribe(LogFilter::default()).unwrap();
    }

    #[tokio::test]
    async fn filtering_happens_before_enqueue() {
        let broker = TailBroker::new(5, 16);
        let filter = LogFilter {
            container: Some("web".to_string()),
            level: Some(LogLevel::Error),
            ..Default::default()
        };
        let mut sub = broker.subscribe(filter).unwrap();

        broker.publish(&entry(1, "db", LogLevel::Error));
        broker.publish(&entry(2, "web", LogLevel::Info));
        broker.publish(&entry(3, "web", LogLevel::Error));

        match sub.recv().await.unwrap() {
            TailEvent::Entry(entry) => assert_eq!(entry.id, 3),
            TailEvent::Lagged => panic!("unexpected lag"),
        }
    }

    #[tokio::test]
    async fn slow_subscriber_lags_while_fast_one_sees_everything() {
        let broker = TailBroker::new(5, 4);
        let mut slow = broker.subscribe(LogFilter::default()).unwrap();
        let mut fast = broker.subscribe(LogFilter::default()).unwrap();

        let mut fast_seen = Vec::new();
        for id in 1..=10 {
            broker.publish(&entry(id, "web", LogLevel::Info));
            // The fast subscriber keeps up, draining after every publish.
            if let Some(TailEvent::Entry(entry)) = fast.recv().await {
                fast_seen.push(entry.id);
            }
        }
        assert_eq!(fast_seen, (1..=10).collect::<Vec<i64>>());

        // The slow subscriber wakes up late: a lag marker first, then the
        // newest retained entries in order.
        match slow.recv().await.unwrap() {
            TailEvent::Lagged => {}
            TailEvent::Entry(entry) => panic!("expected lag, got {}", entry.id),
        }
        let mut resumed = Vec::new();
        while let Ok(Some(TailEvent::Entry(entry))) =
            tokio::time::timeout(std::time::Duration::from_millis(20), slow.recv()).await
        {
            resumed.push(entry.id);
        }
        assert!(!resumed.is_empty());
        assert_eq!(resumed.last().copied(), Some(10));
        assert!(resumed.windows(2).all(|pair| pair[0] < pair[1]));
    }
}
