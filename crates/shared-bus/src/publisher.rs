//! # Event Publisher
//!
//! Producers hold an `Arc<dyn EventPublisher>`; the wallet runs a single
//! [`InMemoryEventBus`] behind it and counts traffic per topic so a quiet
//! bus (nobody subscribed yet) can be told apart from a dead one.

use crate::events::{EventFilter, EventTopic, WalletEvent};
use crate::subscriber::{EventStream, Subscription};
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Publishing side of the bus.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Hand `event` to every current subscriber. Returns how many there were.
    async fn publish(&self, event: WalletEvent) -> usize;
}

/// Per-topic publish counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
    pub connection: u64,
    pub daemon: u64,
    pub migration: u64,
    pub errors: u64,
    /// Events published while no subscriber existed.
    pub unobserved: u64,
}

impl BusStats {
    #[must_use]
    pub fn total(&self) -> u64 {
        self.connection + self.daemon + self.migration + self.errors
    }
}

#[derive(Default)]
struct Counters {
    connection: AtomicU64,
    daemon: AtomicU64,
    migration: AtomicU64,
    errors: AtomicU64,
    unobserved: AtomicU64,
}

impl Counters {
    fn slot(&self, topic: EventTopic) -> &AtomicU64 {
        match topic {
            EventTopic::Connection => &self.connection,
            EventTopic::Daemon => &self.daemon,
            EventTopic::Migration => &self.migration,
            EventTopic::Errors | EventTopic::All => &self.errors,
        }
    }

    fn snapshot(&self) -> BusStats {
        BusStats {
            connection: self.connection.load(Ordering::Relaxed),
            daemon: self.daemon.load(Ordering::Relaxed),
            migration: self.migration.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            unobserved: self.unobserved.load(Ordering::Relaxed),
        }
    }
}

/// Broadcast-backed bus. Filtering happens on the receiving side, so every
/// subscriber costs one buffered clone per event regardless of its filter.
pub struct InMemoryEventBus {
    sender: broadcast::Sender<WalletEvent>,
    counters: Counters,
}

impl InMemoryEventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// `capacity` is the per-subscriber backlog before it starts lagging.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            counters: Counters::default(),
        }
    }

    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        debug!(topics = ?filter.topics, "Bus subscriber attached");
        Subscription::new(self.sender.subscribe(), filter)
    }

    /// Same as [`InMemoryEventBus::subscribe`], as a `Stream`.
    #[must_use]
    pub fn stream(&self, filter: EventFilter) -> EventStream {
        EventStream::new(self.sender.subscribe(), filter)
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    #[must_use]
    pub fn stats(&self) -> BusStats {
        self.counters.snapshot()
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, event: WalletEvent) -> usize {
        let topic = event.topic();
        self.counters.slot(topic).fetch_add(1, Ordering::Relaxed);

        match self.sender.send(event) {
            Ok(receivers) => {
                trace!(?topic, receivers, "Event delivered");
                receivers
            }
            Err(_) => {
                self.counters.unobserved.fetch_add(1, Ordering::Relaxed);
                trace!(?topic, "Event unobserved");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{ConnectionStatus, DownloadProgress, StatusSnapshot};

    fn status() -> WalletEvent {
        WalletEvent::StatusChanged(StatusSnapshot::new(ConnectionStatus::Starting, ""))
    }

    #[tokio::test]
    async fn test_unobserved_events_are_counted() {
        let bus = InMemoryEventBus::new();
        assert_eq!(bus.publish(status()).await, 0);

        let stats = bus.stats();
        assert_eq!(stats.connection, 1);
        assert_eq!(stats.unobserved, 1);
    }

    #[tokio::test]
    async fn test_every_subscriber_receives_regardless_of_filter() {
        let bus = InMemoryEventBus::new();
        let _all = bus.subscribe(EventFilter::all());
        let _migration = bus.subscribe(EventFilter::topics(vec![EventTopic::Migration]));

        assert_eq!(bus.publish(status()).await, 2);
        assert_eq!(bus.stats().unobserved, 0);
    }

    #[tokio::test]
    async fn test_stats_split_by_topic() {
        let bus = InMemoryEventBus::new();
        bus.publish(status()).await;
        bus.publish(WalletEvent::ParamsProgress(DownloadProgress::default()))
            .await;
        bus.publish(WalletEvent::ParamsProgress(DownloadProgress::default()))
            .await;

        let stats = bus.stats();
        assert_eq!(stats.connection, 1);
        assert_eq!(stats.daemon, 2);
        assert_eq!(stats.migration, 0);
        assert_eq!(stats.total(), 3);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let bus = InMemoryEventBus::with_capacity(0);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.stats(), BusStats::default());
    }
}
