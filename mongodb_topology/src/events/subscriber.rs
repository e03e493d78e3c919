use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::error_chain_fmt;

use super::{CommandEvent, CommandFailedEvent, CommandStartedEvent, CommandSucceededEvent};

/// Receives command lifecycle events from an [`EventBus`](super::EventBus).
///
/// Callbacks run synchronously on the publishing task, so they should be quick. Returning an error
/// (or panicking) only affects this subscriber: delivery continues to the remaining subscribers and
/// the failure is reported back to the publisher in a [`DeliveryReport`](super::DeliveryReport).
pub trait CommandSubscriber: Send + Sync {
    fn started(&self, _event: &CommandStartedEvent) -> Result<(), SubscriberError> {
        Ok(())
    }

    fn succeeded(&self, _event: &CommandSucceededEvent) -> Result<(), SubscriberError> {
        Ok(())
    }

    fn failed(&self, _event: &CommandFailedEvent) -> Result<(), SubscriberError> {
        Ok(())
    }
}

/// Handle returned by [`EventBus::subscribe`](super::EventBus::subscribe).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(thiserror::Error)]
pub enum SubscriberError {
    #[error("Subscriber rejected the event: {0}")]
    Rejected(String),
    #[error("Subscriber panicked: {0}")]
    Panicked(String),
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}
impl std::fmt::Debug for SubscriberError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

/// A subscriber that keeps every event it sees, in delivery order.
#[derive(Clone, Debug, Default)]
pub struct CommandEventRecorder {
    events: Arc<Mutex<Vec<CommandEvent>>>,
}

impl CommandEventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<CommandEvent> {
        self.lock().clone()
    }

    /// Removes and returns everything recorded so far.
    pub fn take(&self) -> Vec<CommandEvent> {
        std::mem::take(&mut *self.lock())
    }

    pub fn started_events(&self) -> Vec<CommandStartedEvent> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                CommandEvent::Started(started) => Some(started.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn succeeded_events(&self) -> Vec<CommandSucceededEvent> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                CommandEvent::Succeeded(succeeded) => Some(succeeded.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn failed_events(&self) -> Vec<CommandFailedEvent> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                CommandEvent::Failed(failed) => Some(failed.clone()),
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<CommandEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, event: CommandEvent) -> Result<(), SubscriberError> {
        self.lock().push(event);
        Ok(())
    }
}

impl CommandSubscriber for CommandEventRecorder {
    fn started(&self, event: &CommandStartedEvent) -> Result<(), SubscriberError> {
        self.record(CommandEvent::Started(event.clone()))
    }

    fn succeeded(&self, event: &CommandSucceededEvent) -> Result<(), SubscriberError> {
        self.record(CommandEvent::Succeeded(event.clone()))
    }

    fn failed(&self, event: &CommandFailedEvent) -> Result<(), SubscriberError> {
        self.record(CommandEvent::Failed(event.clone()))
    }
}
