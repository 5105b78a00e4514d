//! Event publication seam.

use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;
use tracing::warn;

use crate::events::{SagaEvent, SagaEventType};

/// Sink for saga lifecycle events.
///
/// Publication must not block or fail the saga: implementations drop events
/// they cannot deliver.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: SagaEvent);
}

/// Publisher backed by an unbounded channel, for wiring saga progress into
/// an async consumer.
#[derive(Debug, Clone)]
pub struct ChannelEventPublisher {
    tx: mpsc::UnboundedSender<SagaEvent>,
}

impl ChannelEventPublisher {
    /// Creates the publisher together with the receiving half.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SagaEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventPublisher for ChannelEventPublisher {
    fn publish(&self, event: SagaEvent) {
        let event_type = event.event_type;
        if self.tx.send(event).is_err() {
            warn!(event_type = %event_type, "event receiver dropped, discarding saga event");
        }
    }
}

/// Publisher that collects events in memory, for tests and inspection.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventPublisher {
    events: Arc<RwLock<Vec<SagaEvent>>>,
}

impl InMemoryEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SagaEvent> {
        self.events.read().unwrap().clone()
    }

    pub fn event_types(&self) -> Vec<SagaEventType> {
        self.events
            .read()
            .unwrap()
            .iter()
            .map(|event| event.event_type)
            .collect()
    }

    pub fn clear(&self) {
        self.events.write().unwrap().clear();
    }
}

impl EventPublisher for InMemoryEventPublisher {
    fn publish(&self, event: SagaEvent) {
        self.events.write().unwrap().push(event);
    }
}

/// Publisher that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventPublisher;

impl EventPublisher for NoopEventPublisher {
    fn publish(&self, _event: SagaEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::SagaId;

    #[test]
    fn test_in_memory_publisher_records_events() {
        let publisher = InMemoryEventPublisher::new();
        let saga_id = SagaId::new();

        publisher.publish(SagaEvent::started(saga_id, "order-placement"));
        publisher.publish(SagaEvent::completed(saga_id, "order-placement"));

        assert_eq!(
            publisher.event_types(),
            vec![SagaEventType::Started, SagaEventType::Completed]
        );

        publisher.clear();
        assert!(publisher.events().is_empty());
    }

    #[tokio::test]
    async fn test_channel_publisher_delivers() {
        let (publisher, mut rx) = ChannelEventPublisher::new();
        let saga_id = SagaId::new();

        publisher.publish(SagaEvent::started(saga_id, "order-placement"));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.saga_id, saga_id);
        assert_eq!(received.event_type, SagaEventType::Started);
    }

    #[test]
    fn test_channel_publisher_survives_dropped_receiver() {
        let (publisher, rx) = ChannelEventPublisher::new();
        drop(rx);

        publisher.publish(SagaEvent::started(SagaId::new(), "order-placement"));
    }

    #[test]
    fn test_noop_publisher() {
        NoopEventPublisher.publish(SagaEvent::started(SagaId::new(), "order-placement"));
    }
}
