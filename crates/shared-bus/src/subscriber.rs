//! # Event Subscriber
//!
//! A subscriber that falls behind by more than the bus capacity loses the
//! oldest events. Both receive paths skip the gap, count it, and carry on.

use crate::events::{EventFilter, WalletEvent};
use std::pin::Pin;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::Stream;
use tracing::debug;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("event bus closed")]
    Closed,
}

/// Pull-style handle over the bus.
pub struct Subscription {
    receiver: broadcast::Receiver<WalletEvent>,
    filter: EventFilter,
    missed: u64,
}

impl Subscription {
    pub(crate) fn new(receiver: broadcast::Receiver<WalletEvent>, filter: EventFilter) -> Self {
        Self {
            receiver,
            filter,
            missed: 0,
        }
    }

    /// Next matching event, or `None` once every publisher is gone.
    pub async fn recv(&mut self) -> Option<WalletEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => self.note_lag(n),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching event already buffered, without waiting.
    pub fn try_recv(&mut self) -> Result<Option<WalletEvent>, SubscriptionError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.filter.matches(&event) => return Ok(Some(event)),
                Ok(_) => {}
                Err(TryRecvError::Lagged(n)) => self.note_lag(n),
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Closed) => return Err(SubscriptionError::Closed),
            }
        }
    }

    /// Every matching event buffered right now, oldest first.
    pub fn drain(&mut self) -> Vec<WalletEvent> {
        std::iter::from_fn(|| self.try_recv().ok().flatten()).collect()
    }

    /// Events lost to lag since this subscription was created.
    #[must_use]
    pub fn missed(&self) -> u64 {
        self.missed
    }

    fn note_lag(&mut self, n: u64) {
        self.missed += n;
        debug!(skipped = n, total = self.missed, "Subscriber fell behind");
    }
}

/// Push-style handle over the bus.
pub struct EventStream {
    inner: BroadcastStream<WalletEvent>,
    filter: EventFilter,
}

impl EventStream {
    pub(crate) fn new(receiver: broadcast::Receiver<WalletEvent>, filter: EventFilter) -> Self {
        Self {
            inner: BroadcastStream::new(receiver),
            filter,
        }
    }
}

impl Stream for EventStream {
    type Item = WalletEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            let event = match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(event))) => event,
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(n)))) => {
                    debug!(skipped = n, "Event stream fell behind");
                    continue;
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            };
            if this.filter.matches(&event) {
                return Poll::Ready(Some(event));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventTopic;
    use crate::publisher::InMemoryEventBus;
    use crate::EventPublisher;
    use shared_types::{ConnectionStatus, DownloadProgress, StatusSnapshot};
    use std::time::Duration;
    use tokio::time::timeout;
    use tokio_stream::StreamExt;

    fn status(s: ConnectionStatus) -> WalletEvent {
        WalletEvent::StatusChanged(StatusSnapshot::new(s, ""))
    }

    fn params(file: &str) -> WalletEvent {
        WalletEvent::ParamsProgress(DownloadProgress {
            file: file.into(),
            bytes_done: 1,
            bytes_total: None,
            files_remaining: 1,
        })
    }

    #[tokio::test]
    async fn test_recv_skips_other_topics() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe(EventFilter::topics(vec![EventTopic::Connection]));

        bus.publish(params("sapling-spend.params")).await;
        bus.publish(status(ConnectionStatus::Syncing)).await;

        let received = timeout(Duration::from_millis(100), sub.recv())
            .await
            .expect("timeout")
            .expect("event");
        assert_eq!(received, status(ConnectionStatus::Syncing));
    }

    #[tokio::test]
    async fn test_recv_ends_when_bus_dropped() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe(EventFilter::all());
        drop(bus);
        assert!(sub.recv().await.is_none());
        assert_eq!(sub.try_recv(), Err(SubscriptionError::Closed));
    }

    #[tokio::test]
    async fn test_drain_returns_buffered_in_order() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe(EventFilter::all());
        assert!(sub.drain().is_empty());

        bus.publish(status(ConnectionStatus::Starting)).await;
        bus.publish(status(ConnectionStatus::Connecting)).await;

        assert_eq!(
            sub.drain(),
            vec![
                status(ConnectionStatus::Starting),
                status(ConnectionStatus::Connecting)
            ]
        );
        assert!(sub.drain().is_empty());
    }

    #[tokio::test]
    async fn test_lag_is_counted_and_skipped() {
        let bus = InMemoryEventBus::with_capacity(2);
        let mut sub = bus.subscribe(EventFilter::all());

        for _ in 0..5 {
            bus.publish(status(ConnectionStatus::Connecting)).await;
        }
        assert_eq!(sub.drain().len(), 2);
        assert_eq!(sub.missed(), 3);
    }

    #[tokio::test]
    async fn test_dropping_subscription_detaches() {
        let bus = InMemoryEventBus::new();
        let sub = bus.subscribe(EventFilter::all());
        assert_eq!(bus.subscriber_count(), 1);
        drop(sub);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_stream_filters() {
        let bus = InMemoryEventBus::new();
        let mut stream = bus.stream(EventFilter::topics(vec![EventTopic::Daemon]));

        bus.publish(status(ConnectionStatus::Starting)).await;
        bus.publish(params("sprout-groth16.params")).await;

        let next = timeout(Duration::from_millis(100), stream.next())
            .await
            .expect("timeout")
            .expect("event");
        assert_eq!(next, params("sprout-groth16.params"));
    }
}
