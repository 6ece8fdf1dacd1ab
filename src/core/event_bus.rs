// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/sensorflow

//! Event bus for pushing snapshots to subscribers

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;

use super::{SnapshotEvent, SnapshotSink};
use crate::error::CollaboratorResult;

/// In-process pub/sub channel. Each subscriber has its own bounded backlog; one that
/// falls behind loses its oldest events and never slows the publisher.
pub struct EventBus {
    event_tx: broadcast::Sender<SnapshotEvent>,
    event_counter: AtomicU64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(capacity);

        Self {
            event_tx,
            event_counter: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SnapshotEvent> {
        self.event_tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.event_tx.receiver_count()
    }

    /// Events published since creation
    pub fn published(&self) -> u64 {
        self.event_counter.load(Ordering::Relaxed)
    }
}

impl SnapshotSink for EventBus {
    fn publish(&self, event: SnapshotEvent) -> CollaboratorResult<usize> {
        self.event_counter.fetch_add(1, Ordering::Relaxed);
        // No subscribers is not a failure: nobody is listening yet
        Ok(self.event_tx.send(event).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::RecvError;

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(4);
        assert_eq!(bus.publish(SnapshotEvent::NewAlerts(vec![])).unwrap(), 0);
        assert_eq!(bus.published(), 1);
    }

    #[tokio::test]
    async fn test_slow_subscriber_lags_without_blocking() {
        let bus = EventBus::new(2);
        let mut slow = bus.subscribe();

        for _ in 0..5 {
            assert_eq!(bus.publish(SnapshotEvent::NewReadings(vec![])).unwrap(), 1);
        }

        assert!(matches!(slow.recv().await, Err(RecvError::Lagged(3))));
        assert!(matches!(slow.recv().await, Ok(SnapshotEvent::NewReadings(_))));
    }
}
