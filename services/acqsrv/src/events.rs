//! Event bus
//!
//! Fan-out of samples, alarm transitions and interface/device status
//! changes over a bounded tokio broadcast channel. Publishing never
//! blocks; subscribers that fall behind lag and lose the oldest events.

use tokio::sync::broadcast;
use tracing::trace;

use crate::model::{AlarmEvent, ConnectionStatus, Sample};

/// Everything observable from outside the pollers.
#[derive(Debug, Clone)]
pub enum Event {
    Sample(Sample),
    Alarm(AlarmEvent),
    InterfaceStatus {
        interface_id: u32,
        status: ConnectionStatus,
    },
    DeviceOnline { device_id: u32 },
    DeviceOffline { device_id: u32, reason: String },
}

/// Cloneable handle to the broadcast channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event. A zero receiver count is not an error; pollers run
    /// whether or not anyone listens.
    pub fn publish(&self, event: Event) {
        trace!(?event, "Publishing event");
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::model::Sample;

    #[tokio::test]
    async fn test_publish_and_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(Event::Sample(Sample::good(1, 1, 250.0, 25.0)));
        match rx.recv().await.unwrap() {
            Event::Sample(sample) => assert_eq!(sample.register_id, 1),
            other => panic!("Unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = EventBus::new(16);
        bus.publish(Event::DeviceOnline { device_id: 1 });
        assert_eq!(bus.receiver_count(), 0);
    }

    #[tokio::test]
    async fn test_lagged_subscriber_drops_oldest() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for i in 0..5 {
            bus.publish(Event::DeviceOnline { device_id: i });
        }
        // First recv reports the lag, subsequent recvs see the tail
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
        assert!(matches!(rx.recv().await, Ok(Event::DeviceOnline { device_id: 3 })));
    }
}
