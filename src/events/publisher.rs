use super::types::MetricsEvent;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::debug;

/// Fan-out channel for [`MetricsEvent`]s
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<PublishedEvent>,
}

/// Event as delivered to subscribers
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub event: MetricsEvent,
    pub published_at: DateTime<Utc>,
}

impl EventPublisher {
    /// Create a publisher whose subscribers may lag by up to `capacity` events
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish to current subscribers.
    ///
    /// Delivery never fails the caller: with no subscribers the event is dropped.
    pub fn publish(&self, event: MetricsEvent) {
        let name = event.name();
        let published = PublishedEvent {
            event,
            published_at: Utc::now(),
        };

        if self.sender.send(published).is_err() {
            debug!(event = name, "No subscribers for metrics event");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{QueueDepthData, QueueIdentity};

    fn depth_event() -> MetricsEvent {
        let depth = QueueDepthData {
            pending_jobs: 150,
            ..QueueDepthData::empty(&QueueIdentity::new("redis", "default"), Utc::now())
        };
        MetricsEvent::threshold_exceeded(depth, 100)
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let publisher = EventPublisher::new(16);
        let mut receiver = publisher.subscribe();
        assert_eq!(publisher.subscriber_count(), 1);

        publisher.publish(depth_event());

        let received = receiver.recv().await.unwrap();
        match received.event {
            MetricsEvent::QueueDepthThresholdExceeded {
                threshold,
                percentage_over,
                ..
            } => {
                assert_eq!(threshold, 100);
                assert_eq!(percentage_over, 50.0);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        EventPublisher::default().publish(depth_event());
    }
}
