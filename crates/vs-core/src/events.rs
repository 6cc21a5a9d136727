use tokio::sync::broadcast;
use tracing::trace;

use crate::resource::ResourceKind;

/// Notifications emitted by the session and sync layers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Interactive login (or MFA) completed
    LoggedIn,
    /// The credential could not be renewed; interactive login is needed
    SessionExpired,
    /// Credentials were erased
    LoggedOut,
    /// A resource kind was refetched from the network
    SyncCompleted { kind: ResourceKind, forced: bool },
    /// Every account resource was synced in one pass
    FullSyncCompleted,
}

/// Fan-out bus for [`Event`]s
///
/// Publishing never fails; events sent while nobody is subscribed are dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: Event) {
        if self.tx.send(event).is_err() {
            trace!("event dropped, no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_published_events() {
        let bus = EventBus::default();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.publish(Event::SyncCompleted {
            kind: ResourceKind::SkinRotation,
            forced: false,
        });

        for rx in [&mut first, &mut second] {
            assert_eq!(
                rx.recv().await.unwrap(),
                Event::SyncCompleted {
                    kind: ResourceKind::SkinRotation,
                    forced: false
                }
            );
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::new(4);
        bus.publish(Event::LoggedOut);
    }
}
