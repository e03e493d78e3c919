use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc, RwLock,
    },
};

use crate::{host_address::HostAddress, Document};

use super::{
    CommandFailedEvent, CommandStartedEvent, CommandSubscriber, CommandSucceededEvent,
    InFlightCommand, SubscriberError, SubscriptionId,
};

type Subscribers = Vec<(SubscriptionId, Arc<dyn CommandSubscriber>)>;

/**
Delivers command lifecycle events to registered subscribers.

One bus is created by the application root and cloned into every component that sends commands.
Clones share subscribers and the request id counter.

Each publish call runs every subscriber's callback, in subscription order, before returning.
Callers that want the started/terminal pairing enforced for them should use
[`start_command`](EventBus::start_command) instead of calling the publish functions directly.

```rust
use std::sync::Arc;
use mongodb_topology::{events::{CommandEventRecorder, EventBus}, HostAddress};
use serde_json::json;

let bus = EventBus::new();
let recorder = CommandEventRecorder::new();
bus.subscribe(Arc::new(recorder.clone()));

let command = bus.start_command("ping", "admin", json!({"ping": 1}), HostAddress::new("a", 1));
command.succeed(json!({"ok": 1}));

assert_eq!(recorder.events().len(), 2);
```
*/
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<EventBusInner>,
}

#[derive(Default)]
struct EventBusInner {
    subscribers: RwLock<Subscribers>,
    last_request_id: AtomicI64,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .field(
                "last_request_id",
                &self.inner.last_request_id.load(Ordering::Relaxed),
            )
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, subscriber: Arc<dyn CommandSubscriber>) -> SubscriptionId {
        let id = SubscriptionId::new();
        self.write_subscribers().push((id, subscriber));
        tracing::debug!(subscription = %id, "Command subscriber added");
        id
    }

    /// Removes a subscriber. Returns false if it was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.write_subscribers();
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != id);
        let removed = subscribers.len() != before;
        if removed {
            tracing::debug!(subscription = %id, "Command subscriber removed");
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Allocates the id shared by one command's started and terminal events. Ids start at 1.
    pub fn next_request_id(&self) -> i64 {
        self.inner.last_request_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Publishes a started event and returns the guard that will publish its terminal event.
    pub fn start_command(
        &self,
        command_name: impl Into<String>,
        database_name: impl Into<String>,
        command: Document,
        connection_address: HostAddress,
    ) -> InFlightCommand {
        let event = CommandStartedEvent {
            request_id: self.next_request_id(),
            command_name: command_name.into(),
            database_name: database_name.into(),
            command,
            connection_address,
        };
        let report = self.publish_started(&event);
        InFlightCommand::new(self.clone(), event, report)
    }

    pub fn publish_started(&self, event: &CommandStartedEvent) -> DeliveryReport {
        tracing::trace!(
            request_id = event.request_id,
            command = %event.command_name,
            "Publishing command started event"
        );
        self.deliver(event.request_id, |s| s.started(event))
    }

    pub fn publish_succeeded(&self, event: &CommandSucceededEvent) -> DeliveryReport {
        tracing::trace!(
            request_id = event.request_id,
            command = %event.command_name,
            "Publishing command succeeded event"
        );
        self.deliver(event.request_id, |s| s.succeeded(event))
    }

    pub fn publish_failed(&self, event: &CommandFailedEvent) -> DeliveryReport {
        tracing::trace!(
            request_id = event.request_id,
            command = %event.command_name,
            "Publishing command failed event"
        );
        self.deliver(event.request_id, |s| s.failed(event))
    }

    fn deliver<F>(&self, request_id: i64, callback: F) -> DeliveryReport
    where
        F: Fn(&dyn CommandSubscriber) -> Result<(), SubscriberError>,
    {
        // Work on a snapshot so subscribers may (un)subscribe from inside a callback.
        let subscribers = self
            .inner
            .subscribers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        let mut report = DeliveryReport::default();
        for (id, subscriber) in subscribers {
            let outcome = match catch_unwind(AssertUnwindSafe(|| callback(subscriber.as_ref()))) {
                Ok(result) => result,
                Err(payload) => Err(SubscriberError::Panicked(panic_message(payload.as_ref()))),
            };

            if let Err(error) = outcome {
                tracing::warn!(
                    request_id,
                    subscription = %id,
                    "Command subscriber failed. Caused by: {}",
                    error
                );
                report.failures.push(SubscriberFailure {
                    subscription: id,
                    request_id,
                    error,
                });
            }
        }
        report
    }

    fn write_subscribers(&self) -> std::sync::RwLockWriteGuard<'_, Subscribers> {
        self.inner
            .subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Subscriber failures collected while delivering events.
///
/// These never change the outcome of the command the events describe.
#[derive(Debug, Default)]
pub struct DeliveryReport {
    pub failures: Vec<SubscriberFailure>,
}

impl DeliveryReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub(crate) fn merge(&mut self, other: DeliveryReport) {
        self.failures.extend(other.failures);
    }
}

#[derive(Debug)]
pub struct SubscriberFailure {
    pub subscription: SubscriptionId,
    pub request_id: i64,
    pub error: SubscriberError,
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::events::{CommandEvent, CommandEventRecorder};

    struct Rejecting;
    impl CommandSubscriber for Rejecting {
        fn started(&self, _event: &CommandStartedEvent) -> Result<(), SubscriberError> {
            Err(SubscriberError::Rejected("not today".to_string()))
        }
    }

    struct Panicking;
    impl CommandSubscriber for Panicking {
        fn succeeded(&self, _event: &CommandSucceededEvent) -> Result<(), SubscriberError> {
            panic!("subscriber blew up");
        }
    }

    /// Appends its tag to a shared log so delivery order can be checked.
    struct Tagged(&'static str, Arc<Mutex<Vec<&'static str>>>);
    impl CommandSubscriber for Tagged {
        fn started(&self, _event: &CommandStartedEvent) -> Result<(), SubscriberError> {
            self.1.lock().unwrap().push(self.0);
            Ok(())
        }
    }

    fn address() -> HostAddress {
        HostAddress::new("a", 1)
    }

    #[test]
    fn request_ids_are_unique_and_increasing() {
        let bus = EventBus::new();
        let clone = bus.clone();

        assert_eq!(bus.next_request_id(), 1);
        assert_eq!(clone.next_request_id(), 2);
        assert_eq!(bus.next_request_id(), 3);
    }

    #[test]
    fn subscribers_are_called_in_subscription_order() {
        // Arrange
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(Arc::new(Tagged("first", log.clone())));
        bus.subscribe(Arc::new(Tagged("second", log.clone())));
        bus.subscribe(Arc::new(Tagged("third", log.clone())));

        // Act
        let command = bus.start_command("ping", "admin", json!({"ping": 1}), address());
        command.succeed(json!({"ok": 1}));

        // Assert
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn unsubscribed_subscribers_stop_receiving_events() {
        let bus = EventBus::new();
        let recorder = CommandEventRecorder::new();
        let id = bus.subscribe(Arc::new(recorder.clone()));

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.start_command("ping", "admin", json!({"ping": 1}), address())
            .succeed(json!({"ok": 1}));

        assert!(recorder.events().is_empty());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn failing_subscriber_does_not_block_later_subscribers() {
        // Arrange
        let bus = EventBus::new();
        bus.subscribe(Arc::new(Rejecting));
        bus.subscribe(Arc::new(Panicking));
        let recorder = CommandEventRecorder::new();
        bus.subscribe(Arc::new(recorder.clone()));

        // Act
        let command = bus.start_command("ping", "admin", json!({"ping": 1}), address());
        let request_id = command.request_id();
        let report = command.succeed(json!({"ok": 1}));

        // Assert
        let events = recorder.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], CommandEvent::Started(_)));
        assert!(matches!(events[1], CommandEvent::Succeeded(_)));
        assert!(events.iter().all(|e| e.request_id() == request_id));

        assert_eq!(report.failures.len(), 2);
        assert!(matches!(
            report.failures[0].error,
            SubscriberError::Rejected(_)
        ));
        assert!(matches!(
            &report.failures[1].error,
            SubscriberError::Panicked(msg) if msg == "subscriber blew up"
        ));
    }

    #[test]
    fn direct_publish_reaches_subscribers() {
        let bus = EventBus::new();
        let recorder = CommandEventRecorder::new();
        bus.subscribe(Arc::new(recorder.clone()));

        let report = bus.publish_failed(&CommandFailedEvent {
            request_id: 9,
            command_name: "oops!".to_string(),
            duration_micros: 0,
            failure: json!({"ok": 0}),
            connection_address: address(),
        });

        assert!(report.is_clean());
        assert_eq!(recorder.failed_events()[0].command_name, "oops!");
    }
}
